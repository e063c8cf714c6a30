use bytes::BufMut;
use ethereum_types::U256;
use ethwire_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use ethwire_types::{BlockBody, BlockHash, BlockHeader, BlockNumber, Transaction};

use crate::message::{snappy_compress, snappy_decompress, RLPxMessage};

/// The RLP header byte of a 32-byte string (`0x80 + 32`); used to tell a
/// block hash from a block number in [`HashOrNumber`]'s single encoded
/// field without a discriminant byte of its own.
pub const HASH_FIRST_BYTE_DECODER: u8 = 160;

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockheaders-0x03
/// identifies the requested range's start either by hash or by number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOrNumber {
    Hash(BlockHash),
    Number(BlockNumber),
}

impl RLPEncode for HashOrNumber {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            HashOrNumber::Hash(hash) => hash.encode(buf),
            HashOrNumber::Number(number) => number.encode(buf),
        }
    }

    fn length(&self) -> usize {
        match self {
            HashOrNumber::Hash(hash) => hash.length(),
            HashOrNumber::Number(number) => number.length(),
        }
    }
}

impl RLPDecode for HashOrNumber {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = buf.first().ok_or(RLPDecodeError::InputTooShort)?;
        if *first_byte == HASH_FIRST_BYTE_DECODER {
            let (hash, rest) = BlockHash::decode_unfinished(buf)?;
            return Ok((Self::Hash(hash), rest));
        }
        let (number, rest) = u64::decode_unfinished(buf)?;
        Ok((Self::Number(number), rest))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblockhashes-0x01
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlockHashEntry {
    pub hash: BlockHash,
    pub number: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewBlockHashes {
    pub entries: Vec<NewBlockHashEntry>,
}

impl NewBlockHashes {
    pub fn new(entries: Vec<NewBlockHashEntry>) -> Self {
        Self { entries }
    }
}

impl RLPEncode for NewBlockHashEntry {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.hash)
            .encode_field(&self.number)
            .finish();
    }
}

impl RLPDecode for NewBlockHashEntry {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(buf)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (number, decoder) = decoder.decode_field("number")?;
        decoder.finish()?;
        Ok((Self { hash, number }, remainder))
    }
}

impl RLPxMessage for NewBlockHashes {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.entries)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (entries, decoder): (Vec<NewBlockHashEntry>, _) = decoder.decode_field("entries")?;
        decoder.finish()?;
        Ok(Self::new(entries))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblock-0x07
///
/// The block itself rides as the canonical `[header, transactions, ommers]`
/// triple, alongside the chain's running total difficulty at that block.
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub ommers: Vec<BlockHeader>,
    pub total_difficulty: U256,
}

impl NewBlock {
    pub fn new(
        header: BlockHeader,
        transactions: Vec<Transaction>,
        ommers: Vec<BlockHeader>,
        total_difficulty: U256,
    ) -> Self {
        Self {
            header,
            transactions,
            ommers,
            total_difficulty,
        }
    }
}

impl RLPxMessage for NewBlock {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        let block = (
            self.header.clone(),
            self.transactions.clone(),
            self.ommers.clone(),
        );
        Encoder::new(&mut encoded_data)
            .encode_field(&block)
            .encode_field(&self.total_difficulty)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (block, decoder): ((BlockHeader, Vec<Transaction>, Vec<BlockHeader>), _) =
            decoder.decode_field("block")?;
        let (total_difficulty, decoder): (U256, _) = decoder.decode_field("td")?;
        decoder.finish()?;
        let (header, transactions, ommers) = block;
        Ok(Self::new(header, transactions, ommers, total_difficulty))
    }
}

#[derive(Debug, Clone)]
pub struct GetBlockHeaders {
    pub id: u64,
    pub startblock: HashOrNumber,
    pub limit: u64,
    pub skip: u64,
    pub reverse: bool,
}

impl GetBlockHeaders {
    pub fn new(id: u64, startblock: HashOrNumber, limit: u64, skip: u64, reverse: bool) -> Self {
        Self {
            id,
            startblock,
            limit,
            skip,
            reverse,
        }
    }
}

impl RLPxMessage for GetBlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.startblock)
            .encode_field(&self.limit)
            .encode_field(&self.skip)
            .encode_field(&self.reverse)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (startblock, decoder): (HashOrNumber, _) = decoder.decode_field("startBlock")?;
        let (limit, decoder): (u64, _) = decoder.decode_field("limit")?;
        let (skip, decoder): (u64, _) = decoder.decode_field("skip")?;
        let (reverse, decoder): (bool, _) = decoder.decode_field("reverse")?;
        decoder.finish()?;
        Ok(Self::new(id, startblock, limit, skip, reverse))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockheaders-0x04
#[derive(Debug, Clone)]
pub struct BlockHeaders {
    pub id: u64,
    pub block_headers: Vec<BlockHeader>,
}

impl BlockHeaders {
    pub fn new(id: u64, block_headers: Vec<BlockHeader>) -> Self {
        Self { block_headers, id }
    }
}

impl RLPxMessage for BlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.block_headers)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (block_headers, decoder): (Vec<BlockHeader>, _) = decoder.decode_field("headers")?;
        decoder.finish()?;

        Ok(Self::new(id, block_headers))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockbodies-0x05
#[derive(Debug, Clone)]
pub struct GetBlockBodies {
    pub id: u64,
    pub block_hashes: Vec<BlockHash>,
}

impl GetBlockBodies {
    pub fn new(id: u64, block_hashes: Vec<BlockHash>) -> Self {
        Self { block_hashes, id }
    }
}

impl RLPxMessage for GetBlockBodies {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.block_hashes)
            .finish();

        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (block_hashes, decoder): (Vec<BlockHash>, _) = decoder.decode_field("blockHashes")?;
        decoder.finish()?;

        Ok(Self::new(id, block_hashes))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockbodies-0x06
#[derive(Debug, Clone)]
pub struct BlockBodies {
    pub id: u64,
    pub block_bodies: Vec<BlockBody>,
}

impl BlockBodies {
    pub fn new(id: u64, block_bodies: Vec<BlockBody>) -> Self {
        Self { block_bodies, id }
    }
}

impl RLPxMessage for BlockBodies {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.block_bodies)
            .finish();

        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (block_bodies, decoder): (Vec<BlockBody>, _) = decoder.decode_field("blockBodies")?;
        decoder.finish()?;

        Ok(Self::new(id, block_bodies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_block_headers_startblock_number_message() {
        let get_block_headers = GetBlockHeaders::new(1, HashOrNumber::Number(1), 0, 0, false);

        let mut buf = Vec::new();
        get_block_headers.encode(&mut buf).unwrap();

        let decoded = GetBlockHeaders::decode(&buf).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.startblock, HashOrNumber::Number(1));
    }

    #[test]
    fn get_block_headers_startblock_hash_message() {
        let get_block_headers =
            GetBlockHeaders::new(1, HashOrNumber::Hash(BlockHash::from([1; 32])), 5, 0, true);

        let mut buf = Vec::new();
        get_block_headers.encode(&mut buf).unwrap();

        let decoded = GetBlockHeaders::decode(&buf).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.limit, 5);
        assert!(decoded.reverse);
        assert_eq!(
            decoded.startblock,
            HashOrNumber::Hash(BlockHash::from([1; 32]))
        );
    }

    #[test]
    fn get_block_bodies_empty_message() {
        let block_hashes = vec![];
        let get_block_bodies = GetBlockBodies::new(1, block_hashes.clone());

        let mut buf = Vec::new();
        get_block_bodies.encode(&mut buf).unwrap();

        let decoded = GetBlockBodies::decode(&buf).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.block_hashes, block_hashes);
    }

    #[test]
    fn get_block_bodies_not_empty_message() {
        let block_hashes = vec![
            BlockHash::from([0; 32]),
            BlockHash::from([1; 32]),
            BlockHash::from([2; 32]),
        ];
        let get_block_bodies = GetBlockBodies::new(1, block_hashes.clone());

        let mut buf = Vec::new();
        get_block_bodies.encode(&mut buf).unwrap();

        let decoded = GetBlockBodies::decode(&buf).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.block_hashes, block_hashes);
    }

    #[test]
    fn block_bodies_empty_message() {
        let block_bodies = vec![];
        let block_bodies = BlockBodies::new(1, block_bodies);

        let mut buf = Vec::new();
        block_bodies.encode(&mut buf).unwrap();

        let decoded = BlockBodies::decode(&buf).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.block_bodies, vec![]);
    }

    #[test]
    fn new_block_hashes_roundtrip() {
        let entries = vec![
            NewBlockHashEntry {
                hash: BlockHash::from([1; 32]),
                number: 1,
            },
            NewBlockHashEntry {
                hash: BlockHash::from([2; 32]),
                number: 2,
            },
        ];
        let msg = NewBlockHashes::new(entries.clone());

        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();

        let decoded = NewBlockHashes::decode(&buf).unwrap();
        assert_eq!(decoded.entries, entries);
    }

    #[test]
    fn new_block_roundtrip() {
        let header = BlockHeader {
            number: 9,
            ..Default::default()
        };
        let msg = NewBlock::new(header.clone(), vec![], vec![], U256::from(100));

        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();

        let decoded = NewBlock::decode(&buf).unwrap();
        assert_eq!(decoded.header, header);
        assert!(decoded.transactions.is_empty());
        assert!(decoded.ommers.is_empty());
        assert_eq!(decoded.total_difficulty, U256::from(100));
    }

    #[test]
    fn block_headers_roundtrip_with_a_real_header() {
        let header = BlockHeader {
            number: 42,
            ..Default::default()
        };
        let block_headers = BlockHeaders::new(7, vec![header.clone()]);

        let mut buf = Vec::new();
        block_headers.encode(&mut buf).unwrap();

        let decoded = BlockHeaders::decode(&buf).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.block_headers, vec![header]);
    }
}
