//! Snappy-compressed message framing shared by every RLPx capability, and
//! the `Message` enum that dispatches a raw `(id, payload)` pair to the
//! right decoder once [`crate::p2p::negotiate_capability_offsets`] has fixed
//! where each capability's id range begins.

use bytes::BufMut;
use ethwire_rlp::{
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
};
use snap::raw::{max_compress_len, Decoder as SnappyDecoder, Encoder as SnappyEncoder};
use std::fmt::Display;

use crate::eth::blocks::{
    BlockBodies, BlockHeaders, GetBlockBodies, GetBlockHeaders, NewBlock, NewBlockHashes,
};
use crate::eth::receipts::{GetReceipts, Receipts};
use crate::eth::status::StatusMessage;
use crate::eth::transactions::{
    GetPooledTransactions, NewPooledTransactionHashes, PooledTransactions, Transactions,
};
use crate::p2p::{DisconnectMessage, HelloMessage, PingMessage, PongMessage};

/// Every message is RLP-encoded and then snappy-compressed before it hits
/// the wire, except Hello: it's what negotiates snappy support in the
/// first place, so it always rides uncompressed. Disconnect/Ping/Pong are
/// sent post-Hello and are compressed like any other message.
pub fn snappy_compress(encoded_data: Vec<u8>) -> Result<Vec<u8>, RLPEncodeError> {
    let mut encoder = SnappyEncoder::new();
    let mut msg_data = vec![0; max_compress_len(encoded_data.len()) + 1];
    let compressed_size = encoder
        .compress(&encoded_data, &mut msg_data)
        .map_err(|_| RLPEncodeError::InvalidCompression)?;
    msg_data.truncate(compressed_size);
    Ok(msg_data)
}

pub fn snappy_decompress(data: &[u8]) -> Result<Vec<u8>, RLPDecodeError> {
    let mut decoder = SnappyDecoder::new();
    decoder
        .decompress_vec(data)
        .map_err(|err| RLPDecodeError::Custom(err.to_string()))
}

/// Every RLPx message type, capability or base protocol, implements this.
/// `encode`/`decode` operate on the message's own payload only — the
/// leading id byte is handled one layer up, by [`Message`].
pub trait RLPxMessage: Sized {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError>;

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError>;
}

#[derive(Debug)]
pub enum Message {
    Hello(HelloMessage),
    Disconnect(DisconnectMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    Status(StatusMessage),
    NewBlockHashes(NewBlockHashes),
    Transactions(Transactions),
    GetBlockHeaders(GetBlockHeaders),
    BlockHeaders(BlockHeaders),
    GetBlockBodies(GetBlockBodies),
    BlockBodies(BlockBodies),
    NewBlock(NewBlock),
    NewPooledTransactionHashes(NewPooledTransactionHashes),
    GetPooledTransactions(GetPooledTransactions),
    PooledTransactions(PooledTransactions),
    GetReceipts(GetReceipts),
    Receipts(Receipts),
}

impl Message {
    /// Decodes a message given its absolute wire id. Ids `0x00..0x10` are
    /// the base protocol; everything from `0x10` on is `eth`, offset by
    /// [`crate::p2p::BASE_PROTOCOL_LENGTH`] (the only capability modeled).
    pub fn decode(msg_id: u8, msg_data: &[u8]) -> Result<Message, RLPDecodeError> {
        match msg_id {
            0x00 => Ok(Message::Hello(HelloMessage::decode(msg_data)?)),
            0x01 => Ok(Message::Disconnect(DisconnectMessage::decode(msg_data)?)),
            0x02 => Ok(Message::Ping(PingMessage::decode(msg_data)?)),
            0x03 => Ok(Message::Pong(PongMessage::decode(msg_data)?)),
            0x10 => Ok(Message::Status(StatusMessage::decode(msg_data)?)),
            0x11 => Ok(Message::NewBlockHashes(NewBlockHashes::decode(msg_data)?)),
            0x12 => Ok(Message::Transactions(Transactions::decode(msg_data)?)),
            0x13 => Ok(Message::GetBlockHeaders(GetBlockHeaders::decode(msg_data)?)),
            0x14 => Ok(Message::BlockHeaders(BlockHeaders::decode(msg_data)?)),
            0x15 => Ok(Message::GetBlockBodies(GetBlockBodies::decode(msg_data)?)),
            0x16 => Ok(Message::BlockBodies(BlockBodies::decode(msg_data)?)),
            0x17 => Ok(Message::NewBlock(NewBlock::decode(msg_data)?)),
            0x18 => Ok(Message::NewPooledTransactionHashes(
                NewPooledTransactionHashes::decode(msg_data)?,
            )),
            0x19 => Ok(Message::GetPooledTransactions(GetPooledTransactions::decode(
                msg_data,
            )?)),
            0x1a => Ok(Message::PooledTransactions(PooledTransactions::decode(
                msg_data,
            )?)),
            0x1f => Ok(Message::GetReceipts(GetReceipts::decode(msg_data)?)),
            0x20 => Ok(Message::Receipts(Receipts::decode(msg_data)?)),
            _ => Err(RLPDecodeError::MalformedData),
        }
    }

    pub fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        match self {
            Message::Hello(msg) => {
                0x00_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Disconnect(msg) => {
                0x01_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Ping(msg) => {
                0x02_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Pong(msg) => {
                0x03_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Status(msg) => {
                0x10_u8.encode(buf);
                msg.encode(buf)
            }
            Message::NewBlockHashes(msg) => {
                0x11_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Transactions(msg) => {
                0x12_u8.encode(buf);
                msg.encode(buf)
            }
            Message::GetBlockHeaders(msg) => {
                0x13_u8.encode(buf);
                msg.encode(buf)
            }
            Message::BlockHeaders(msg) => {
                0x14_u8.encode(buf);
                msg.encode(buf)
            }
            Message::GetBlockBodies(msg) => {
                0x15_u8.encode(buf);
                msg.encode(buf)
            }
            Message::BlockBodies(msg) => {
                0x16_u8.encode(buf);
                msg.encode(buf)
            }
            Message::NewBlock(msg) => {
                0x17_u8.encode(buf);
                msg.encode(buf)
            }
            Message::NewPooledTransactionHashes(msg) => {
                0x18_u8.encode(buf);
                msg.encode(buf)
            }
            Message::GetPooledTransactions(msg) => {
                0x19_u8.encode(buf);
                msg.encode(buf)
            }
            Message::PooledTransactions(msg) => {
                0x1a_u8.encode(buf);
                msg.encode(buf)
            }
            Message::GetReceipts(msg) => {
                0x1f_u8.encode(buf);
                msg.encode(buf)
            }
            Message::Receipts(msg) => {
                0x20_u8.encode(buf);
                msg.encode(buf)
            }
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Hello(_) => "p2p:Hello".fmt(f),
            Message::Disconnect(_) => "p2p:Disconnect".fmt(f),
            Message::Ping(_) => "p2p:Ping".fmt(f),
            Message::Pong(_) => "p2p:Pong".fmt(f),
            Message::Status(_) => "eth:Status".fmt(f),
            Message::NewBlockHashes(_) => "eth:NewBlockHashes".fmt(f),
            Message::Transactions(_) => "eth:Transactions".fmt(f),
            Message::GetBlockHeaders(_) => "eth:GetBlockHeaders".fmt(f),
            Message::BlockHeaders(_) => "eth:BlockHeaders".fmt(f),
            Message::GetBlockBodies(_) => "eth:GetBlockBodies".fmt(f),
            Message::BlockBodies(_) => "eth:BlockBodies".fmt(f),
            Message::NewBlock(_) => "eth:NewBlock".fmt(f),
            Message::NewPooledTransactionHashes(_) => "eth:NewPooledTransactionHashes".fmt(f),
            Message::GetPooledTransactions(_) => "eth:GetPooledTransactions".fmt(f),
            Message::PooledTransactions(_) => "eth:PooledTransactions".fmt(f),
            Message::GetReceipts(_) => "eth:GetReceipts".fmt(f),
            Message::Receipts(_) => "eth:Receipts".fmt(f),
        }
    }
}
