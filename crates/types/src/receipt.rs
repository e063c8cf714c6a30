use bytes::Bytes;
use ethereum_types::{Address, Bloom, BloomInput, H256};
use ethwire_rlp::{
    decode::{decode_rlp_item, RLPDecode},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::transaction::TxType;

/// Result of executing one transaction. Typed receipts (anything but
/// `Legacy`) are prefixed with their type byte ahead of the RLP list, per
/// EIP-2718 — see [`Receipt::encode_canonical`] for that bare form, wrapped
/// as an RLP string by the `RLPEncode` impl below when nested in a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_type: TxType,
    pub succeeded: bool,
    pub cumulative_gas_used: u64,
    pub bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(tx_type: TxType, succeeded: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            tx_type,
            succeeded,
            cumulative_gas_used,
            bloom: bloom_from_logs(&logs),
            logs,
        }
    }
}

fn bloom_from_logs(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_ref()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_ref()));
        }
    }
    bloom
}

impl Receipt {
    fn encode_fields(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.succeeded)
            .encode_field(&self.cumulative_gas_used)
            .encode_field(&self.bloom)
            .encode_field(&self.logs)
            .finish();
    }

    /// Encodes `type_byte || rlp(fields)` for non-legacy receipts, or just
    /// `rlp(fields)` for legacy ones — the bare encoding used to compute the
    /// receipts trie root, per EIP-2718.
    pub fn encode_canonical(&self, buf: &mut dyn bytes::BufMut) {
        if !matches!(self.tx_type, TxType::Legacy) {
            buf.put_u8(self.tx_type as u8);
        }
        self.encode_fields(buf);
    }

    pub fn encode_canonical_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_canonical(&mut buf);
        buf
    }
}

impl RLPEncode for Receipt {
    /// Mirrors [`crate::transaction::Transaction`]'s encoding: a legacy
    /// receipt is `rlp(fields)`, a typed one wraps its bare encoding in an
    /// RLP string so it stays a single self-delimiting item when nested in
    /// a `Receipts` message or a receipts trie.
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self.tx_type {
            TxType::Legacy => self.encode_fields(buf),
            _ => Bytes::copy_from_slice(&self.encode_canonical_to_vec()).encode(buf),
        }
    }
}

impl RLPDecode for Receipt {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, remainder_outer) = decode_rlp_item(rlp)?;
        let (tx_type, fields_rlp) = if is_list {
            (TxType::Legacy, rlp)
        } else {
            let byte = *payload.first().ok_or(RLPDecodeError::InputTooShort)?;
            let tx_type = TxType::try_from(byte)
                .map_err(|_| RLPDecodeError::Custom(format!("invalid tx type: {byte}")))?;
            (tx_type, &payload[1..])
        };
        let (decoder, _) = Decoder::new(fields_rlp)?;
        let (succeeded, decoder) = decoder.decode_field("succeeded")?;
        let (cumulative_gas_used, decoder) = decoder.decode_field("cumulative_gas_used")?;
        let (bloom, decoder) = decoder.decode_field("bloom")?;
        let (logs, decoder) = decoder.decode_field("logs")?;
        decoder.finish()?;
        Ok((
            Receipt {
                tx_type,
                succeeded,
                cumulative_gas_used,
                bloom,
                logs,
            },
            remainder_outer,
        ))
    }
}

/// A single log entry emitted during transaction execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl RLPEncode for Log {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.address)
            .encode_field(&self.topics)
            .encode_field(&self.data)
            .finish();
    }
}

impl RLPDecode for Log {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(rlp)?;
        let (address, decoder) = decoder.decode_field("address")?;
        let (topics, decoder) = decoder.decode_field("topics")?;
        let (data, decoder) = decoder.decode_field("data")?;
        decoder.finish()?;
        Ok((
            Log {
                address,
                topics,
                data,
            },
            remainder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_receipt_roundtrip() {
        let receipt = Receipt::new(TxType::Legacy, true, 21_000, vec![]);
        let encoded = ethwire_rlp::encode::encode(&receipt);
        let decoded = Receipt::decode(&encoded).unwrap();
        assert_eq!(decoded, receipt);
    }

    #[test]
    fn typed_receipt_has_type_prefix() {
        let receipt = Receipt::new(TxType::EIP1559, true, 21_000, vec![]);
        assert_eq!(receipt.encode_canonical_to_vec()[0], TxType::EIP1559 as u8);
        let encoded = ethwire_rlp::encode::encode(&receipt);
        let decoded = Receipt::decode(&encoded).unwrap();
        assert_eq!(decoded, receipt);
    }

    #[test]
    fn receipts_roundtrip_when_nested_in_a_list() {
        let receipts = vec![
            Receipt::new(TxType::Legacy, true, 21_000, vec![]),
            Receipt::new(TxType::EIP1559, false, 42_000, vec![]),
        ];
        let encoded = ethwire_rlp::encode::encode(&receipts);
        let decoded: Vec<Receipt> = Vec::decode(&encoded).unwrap();
        assert_eq!(decoded, receipts);
    }

    #[test]
    fn log_with_topics_roundtrip() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![H256::repeat_byte(0x22), H256::repeat_byte(0x33)],
            data: Bytes::from_static(b"payload"),
        };
        let encoded = ethwire_rlp::encode::encode(&log);
        let decoded = Log::decode(&encoded).unwrap();
        assert_eq!(decoded, log);
    }
}
