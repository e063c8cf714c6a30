use bytes::BufMut;
use ethereum_types::U256;
use ethwire_rlp::{
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use ethwire_types::{BlockHash, ForkId};

use crate::message::{snappy_compress, snappy_decompress, RLPxMessage};

use super::ETH_VERSION;

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#status-0x00
///
/// The first message either side sends once the RLPx session is
/// established; it is not part of the Hello/capability-negotiation
/// handshake, but every peer that negotiated the `eth` capability is
/// expected to send it before anything else.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub eth_version: u32,
    pub network_id: u64,
    pub total_difficulty: U256,
    pub block_hash: BlockHash,
    pub genesis: BlockHash,
    pub fork_id: ForkId,
}

impl StatusMessage {
    pub fn new(
        network_id: u64,
        total_difficulty: U256,
        block_hash: BlockHash,
        genesis: BlockHash,
        fork_id: ForkId,
    ) -> Self {
        Self {
            eth_version: ETH_VERSION,
            network_id,
            total_difficulty,
            block_hash,
            genesis,
            fork_id,
        }
    }
}

impl RLPxMessage for StatusMessage {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.eth_version)
            .encode_field(&self.network_id)
            .encode_field(&self.total_difficulty)
            .encode_field(&self.block_hash)
            .encode_field(&self.genesis)
            .encode_field(&self.fork_id)
            .finish();

        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (eth_version, decoder): (u32, _) = decoder.decode_field("protocolVersion")?;
        if eth_version != ETH_VERSION {
            return Err(RLPDecodeError::Custom(format!(
                "unsupported eth protocol version {eth_version}"
            )));
        }
        let (network_id, decoder): (u64, _) = decoder.decode_field("networkId")?;
        let (total_difficulty, decoder): (U256, _) = decoder.decode_field("totalDifficulty")?;
        let (block_hash, decoder): (BlockHash, _) = decoder.decode_field("blockHash")?;
        let (genesis, decoder): (BlockHash, _) = decoder.decode_field("genesis")?;
        let (fork_id, decoder): (ForkId, _) = decoder.decode_field("forkId")?;
        decoder.finish()?;

        Ok(Self {
            eth_version,
            network_id,
            total_difficulty,
            block_hash,
            genesis,
            fork_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H32;

    #[test]
    fn status_message_roundtrip() {
        let status = StatusMessage::new(
            1,
            U256::from(100),
            BlockHash::random(),
            BlockHash::random(),
            ForkId::new(H32::zero(), 0),
        );
        let mut buf = Vec::new();
        status.encode(&mut buf).unwrap();
        let decoded = StatusMessage::decode(&buf).unwrap();
        assert_eq!(decoded.network_id, 1);
        assert_eq!(decoded.block_hash, status.block_hash);
        assert_eq!(decoded.fork_id, status.fork_id);
    }

    #[test]
    fn status_message_rejects_wrong_eth_version() {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&67u32)
            .encode_field(&1u64)
            .encode_field(&U256::zero())
            .encode_field(&BlockHash::zero())
            .encode_field(&BlockHash::zero())
            .encode_field(&ForkId::new(H32::zero(), 0))
            .finish();
        let mut buf = Vec::new();
        buf.put_slice(&snappy_compress(encoded_data).unwrap());
        assert!(StatusMessage::decode(&buf).is_err());
    }
}
