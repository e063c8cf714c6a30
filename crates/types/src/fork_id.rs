//! The `ForkId` carried in `eth` `Status` messages: a CRC32 checksum of past
//! fork activation points plus the block number/timestamp of the next
//! upcoming fork, letting two peers detect an incompatible chain config
//! without exchanging their full fork schedule.

use crc32fast::Hasher;
use ethereum_types::H32;
use ethwire_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::block::BlockNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkId {
    pub fork_hash: H32,
    pub fork_next: BlockNumber,
}

impl ForkId {
    pub fn new(fork_hash: H32, fork_next: BlockNumber) -> Self {
        Self {
            fork_hash,
            fork_next,
        }
    }

    /// Computes the fork hash by folding `genesis_hash` with every activation
    /// point in `block_forks`/`timestamp_forks` that has already happened
    /// relative to `head_block_number`/`head_timestamp`. `fork_next` is the
    /// first activation point still in the future, or 0 if none remain.
    pub fn compute(
        genesis_hash: [u8; 32],
        block_forks: &[u64],
        timestamp_forks: &[u64],
        head_block_number: u64,
        head_timestamp: u64,
    ) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&genesis_hash);

        let fork_next = accrue_checksum(block_forks, &mut hasher, head_block_number);
        if fork_next > 0 {
            let fork_hash = H32::from_slice(&hasher.finalize().to_be_bytes());
            return Self {
                fork_hash,
                fork_next,
            };
        }

        let fork_next = accrue_checksum(timestamp_forks, &mut hasher, head_timestamp);
        let fork_hash = H32::from_slice(&hasher.finalize().to_be_bytes());
        Self {
            fork_hash,
            fork_next,
        }
    }
}

fn accrue_checksum(forks: &[u64], hasher: &mut Hasher, head: u64) -> u64 {
    let mut last_included = 0;
    for &activation in forks {
        if activation <= head {
            if activation != last_included {
                hasher.update(&activation.to_be_bytes());
                last_included = activation;
            }
        } else {
            return activation;
        }
    }
    0
}

impl RLPEncode for ForkId {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.fork_hash)
            .encode_field(&self.fork_next)
            .finish();
    }
}

impl RLPDecode for ForkId {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(rlp)?;
        let (fork_hash, decoder) = decoder.decode_field("forkHash")?;
        let (fork_next, decoder) = decoder.decode_field("forkNext")?;
        decoder.finish()?;
        Ok((
            ForkId {
                fork_hash,
                fork_next,
            },
            remainder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::str::FromStr;

    #[test]
    fn encode_zero_fork_id() {
        let fork = ForkId::new(H32::zero(), 0);
        assert_eq!(ethwire_rlp::encode::encode(&fork), hex!("c6840000000080").to_vec());
    }

    #[test]
    fn encode_nonzero_fork_id() {
        let fork = ForkId::new(H32::from_str("0xdeadbeef").unwrap(), 0xbaddcafe);
        assert_eq!(
            ethwire_rlp::encode::encode(&fork),
            hex!("ca84deadbeef84baddcafe").to_vec()
        );
    }

    #[test]
    fn roundtrip() {
        let fork = ForkId::new(H32::from_low_u64_be(0xffff_ffff), u64::MAX);
        let encoded = ethwire_rlp::encode::encode(&fork);
        assert_eq!(ForkId::decode(&encoded).unwrap(), fork);
    }

    #[test]
    fn compute_folds_block_forks_into_checksum() {
        let genesis = [0u8; 32];
        let fork = ForkId::compute(genesis, &[0, 1_150_000], &[], 1_150_001, 0);
        assert_eq!(fork.fork_next, 0);
    }

    #[test]
    fn compute_reports_next_future_fork() {
        let genesis = [0u8; 32];
        let fork = ForkId::compute(genesis, &[0, 1_150_000, 2_000_000], &[], 1_150_001, 0);
        assert_eq!(fork.fork_next, 2_000_000);
    }
}
