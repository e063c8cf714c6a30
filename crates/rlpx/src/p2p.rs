//! The RLPx base ("p2p") protocol: Hello capability negotiation,
//! Disconnect, and the Ping/Pong keep-alive pair every capability rides on
//! top of. These four messages always occupy ids `0x00`-`0x03`; every
//! negotiated subprotocol's ids start at [`BASE_PROTOCOL_LENGTH`].

use bytes::BufMut;
use ethereum_types::H512;
use ethwire_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use k256::PublicKey;
use std::collections::BTreeMap;

use crate::{
    crypto::{id2pubkey, pubkey2id},
    message::{snappy_compress, snappy_decompress, RLPxMessage},
};

/// Every negotiated subprotocol's message ids start at this offset; ids
/// `0x00..0x10` are reserved for the base protocol messages in this module.
pub const BASE_PROTOCOL_LENGTH: u8 = 0x10;

pub const CLIENT_ID: &str = "ethwire-node/0.1.0";
pub const RLPX_PROTOCOL_VERSION: u64 = 5;

/// A capability a peer advertises in its Hello message: a name (e.g.
/// `"eth"`) and the highest protocol version it speaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Capability {
    pub name: String,
    pub version: u8,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: u8) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn eth(version: u8) -> Self {
        Self::new("eth", version)
    }
}

impl RLPEncode for Capability {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.name)
            .encode_field(&self.version)
            .finish();
    }
}

impl RLPDecode for Capability {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(rlp)?;
        let (name, decoder) = decoder.decode_field("name")?;
        let (version, decoder) = decoder.decode_field("version")?;
        decoder.finish()?;
        Ok((Capability { name, version }, remainder))
    }
}

/// The number of message ids a capability's id range reserves. Only `eth`
/// is modeled here (`Status` through `Receipts`, ids `0x00..=0x10`).
fn capability_range_length(name: &str) -> u8 {
    match name {
        "eth" => 0x11,
        _ => 0x01,
    }
}

/// Assigns each shared capability a contiguous id-offset range, in
/// alphabetical order by name starting at [`BASE_PROTOCOL_LENGTH`] — the
/// same ordering devp2p's multiplexing rule uses, so that both peers agree
/// on offsets without exchanging them explicitly.
pub fn negotiate_capability_offsets(shared: &[Capability]) -> BTreeMap<String, u8> {
    let mut sorted: Vec<&Capability> = shared.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut offsets = BTreeMap::new();
    let mut next_offset = BASE_PROTOCOL_LENGTH;
    for cap in sorted {
        offsets.insert(cap.name.clone(), next_offset);
        next_offset += capability_range_length(&cap.name);
    }
    offsets
}

#[derive(Debug, Clone)]
pub struct HelloMessage {
    pub capabilities: Vec<Capability>,
    pub node_id: PublicKey,
}

impl HelloMessage {
    pub fn new(capabilities: Vec<Capability>, node_id: PublicKey) -> Self {
        Self {
            capabilities,
            node_id,
        }
    }
}

impl RLPxMessage for HelloMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&RLPX_PROTOCOL_VERSION)
            .encode_field(&CLIENT_ID)
            .encode_field(&self.capabilities)
            .encode_field(&0u16) // listenPort, unused
            .encode_field(&pubkey2id(&self.node_id))
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoder, _) = Decoder::new(msg_data)?;
        let (protocol_version, decoder): (u64, _) = decoder.decode_field("protocolVersion")?;
        if protocol_version != RLPX_PROTOCOL_VERSION {
            return Err(RLPDecodeError::Custom(format!(
                "unsupported RLPx protocol version {protocol_version}"
            )));
        }
        let (_client_id, decoder): (String, _) = decoder.decode_field("clientId")?;
        let (capabilities, decoder): (Vec<Capability>, _) = decoder.decode_field("capabilities")?;
        let (_listen_port, decoder): (u16, _) = decoder.decode_field("listenPort")?;
        let (node_id, decoder): (H512, _) = decoder.decode_field("nodeId")?;
        decoder.finish_unchecked();

        Ok(Self::new(
            capabilities,
            id2pubkey(node_id).map_err(|_| RLPDecodeError::Custom("invalid node id".into()))?,
        ))
    }
}

/// The reason code a peer gives (or is given) when tearing down a session,
/// matching the devp2p base protocol's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested = 0x00,
    TcpError = 0x01,
    ProtocolError = 0x02,
    UselessPeer = 0x03,
    TooManyPeers = 0x04,
    AlreadyConnected = 0x05,
    IncompatibleVersion = 0x06,
    InvalidIdentity = 0x07,
    ClientQuitting = 0x08,
    UnexpectedIdentity = 0x09,
    SelfConnection = 0x0a,
    Timeout = 0x0b,
    SubprotocolError = 0x10,
}

impl DisconnectReason {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Requested,
            0x01 => Self::TcpError,
            0x02 => Self::ProtocolError,
            0x03 => Self::UselessPeer,
            0x04 => Self::TooManyPeers,
            0x05 => Self::AlreadyConnected,
            0x06 => Self::IncompatibleVersion,
            0x07 => Self::InvalidIdentity,
            0x08 => Self::ClientQuitting,
            0x09 => Self::UnexpectedIdentity,
            0x0a => Self::SelfConnection,
            0x0b => Self::Timeout,
            0x10 => Self::SubprotocolError,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DisconnectMessage {
    pub reason: Option<DisconnectReason>,
}

impl DisconnectMessage {
    pub fn new(reason: DisconnectReason) -> Self {
        Self {
            reason: Some(reason),
        }
    }
}

impl RLPxMessage for DisconnectMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut payload = Vec::new();
        match self.reason {
            Some(reason) => Encoder::new(&mut payload).encode_field(&(reason as u8)).finish(),
            None => Vec::<u8>::new().encode(&mut payload),
        }
        let compressed = snappy_compress(payload)?;
        buf.put_slice(&compressed);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        // Peers disagree on how to encode the reason: empty, a bare byte, or
        // an RLP list with one optional field. Accept all three.
        let reason = match decompressed.len() {
            0 => None,
            1 => DisconnectReason::from_byte(decompressed[0]),
            _ => {
                let (decoder, _) = Decoder::new(&decompressed)?;
                let (byte, _): (Option<u8>, _) = decoder.decode_optional_field();
                byte.and_then(DisconnectReason::from_byte)
            }
        };
        Ok(Self { reason })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PingMessage;

impl RLPxMessage for PingMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut payload = Vec::new();
        Vec::<u8>::new().encode(&mut payload);
        buf.put_slice(&snappy_compress(payload)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed)?;
        decoder
            .finish()
            .map_err(|_| RLPDecodeError::Custom("Ping payload must be empty".into()))?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PongMessage;

impl RLPxMessage for PongMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut payload = Vec::new();
        Vec::<u8>::new().encode(&mut payload);
        buf.put_slice(&snappy_compress(payload)?);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed)?;
        decoder
            .finish()
            .map_err(|_| RLPDecodeError::Custom("Pong payload must be empty".into()))?;
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::SecretKey;

    #[test]
    fn hello_message_roundtrip() {
        let node_key = SecretKey::random(&mut rand::thread_rng());
        let hello = HelloMessage::new(vec![Capability::eth(68)], node_key.public_key());
        let mut buf = Vec::new();
        hello.encode(&mut buf).unwrap();
        let decoded = HelloMessage::decode(&buf).unwrap();
        assert_eq!(decoded.capabilities, vec![Capability::eth(68)]);
    }

    #[test]
    fn hello_message_rejects_wrong_protocol_version() {
        let node_key = SecretKey::random(&mut rand::thread_rng());
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&99u64)
            .encode_field(&"other")
            .encode_field(&vec![Capability::eth(68)])
            .encode_field(&0u16)
            .encode_field(&pubkey2id(&node_key.public_key()))
            .finish();
        assert!(HelloMessage::decode(&buf).is_err());
    }

    #[test]
    fn disconnect_message_roundtrips_each_wire_encoding() {
        let mut buf = Vec::new();
        DisconnectMessage::new(DisconnectReason::TooManyPeers).encode(&mut buf).unwrap();
        let decoded = DisconnectMessage::decode(&buf).unwrap();
        assert_eq!(decoded.reason, Some(DisconnectReason::TooManyPeers));
    }

    #[test]
    fn ping_pong_have_empty_payloads() {
        let mut ping_buf = Vec::new();
        PingMessage.encode(&mut ping_buf).unwrap();
        PingMessage::decode(&ping_buf).unwrap();

        let mut pong_buf = Vec::new();
        PongMessage.encode(&mut pong_buf).unwrap();
        PongMessage::decode(&pong_buf).unwrap();
    }

    #[test]
    fn ping_rejects_nonempty_payload() {
        let mut payload = Vec::new();
        Encoder::new(&mut payload).encode_field(&1u8).finish();
        let compressed = snappy_compress(payload).unwrap();
        assert!(PingMessage::decode(&compressed).is_err());
    }

    #[test]
    fn capability_offsets_start_eth_at_base_protocol_length() {
        let offsets = negotiate_capability_offsets(&[Capability::eth(68)]);
        assert_eq!(offsets.get("eth"), Some(&BASE_PROTOCOL_LENGTH));
    }
}
