use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ethwire_rlp::{
    decode::{decode_rlp_item, RLPDecode},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

/// EIP-2718 transaction type tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxType {
    #[default]
    Legacy = 0x00,
    EIP2930 = 0x01,
    EIP1559 = 0x02,
    EIP4844 = 0x03,
}

impl TryFrom<u8> for TxType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(TxType::Legacy),
            0x01 => Ok(TxType::EIP2930),
            0x02 => Ok(TxType::EIP1559),
            0x03 => Ok(TxType::EIP4844),
            _ => Err(()),
        }
    }
}

/// A signed transaction, as carried by the `eth` wire protocol's
/// `Transactions`/`PooledTransactions` messages. Only the fields needed to
/// encode/decode the wire shape are modeled; execution semantics (nonce
/// checks, balance checks, blob bundles) are out of scope for this core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub tx_type: TxType,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub gas_price: U256,
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<(Address, Vec<H256>)>,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

impl Transaction {
    fn encode_fields(&self, buf: &mut dyn bytes::BufMut) {
        let mut encoder = Encoder::new(buf);
        if !matches!(self.tx_type, TxType::Legacy) {
            if let Some(chain_id) = self.chain_id {
                encoder = encoder.encode_field(&chain_id);
            }
        }
        encoder = encoder.encode_field(&self.nonce);
        if !matches!(self.tx_type, TxType::Legacy) {
            encoder = encoder
                .encode_field(&self.max_priority_fee_per_gas.unwrap_or_default())
                .encode_field(&self.gas_price);
        } else {
            encoder = encoder.encode_field(&self.gas_price);
        }
        encoder
            .encode_field(&self.gas_limit)
            .encode_optional_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish();
    }

    /// Encodes `type_byte || rlp(fields)` for non-legacy transactions, or just
    /// `rlp(fields)` for legacy ones — the "bare" encoding used to compute a
    /// transaction's hash and its canonical size, per EIP-2718.
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

impl RLPEncode for Transaction {
    /// A legacy transaction is `rlp(fields)`, same as any other RLP list. A
    /// typed transaction's bare encoding (see [`Transaction::encode_canonical`])
    /// is not itself a self-delimiting RLP item, so when it appears as an
    /// item of a list (a block body, `Transactions`, ...) it must be wrapped
    /// as an RLP string, mirroring how go-ethereum's `Transaction.EncodeRLP`
    /// wraps `encodeTyped`'s output.
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self.tx_type {
            TxType::Legacy => self.encode_fields(buf),
            _ => Bytes::copy_from_slice(&self.encode_canonical_to_vec()).encode(buf),
        }
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, remainder_outer) = decode_rlp_item(rlp)?;
        let (tx_type, fields_rlp, remainder) = if is_list {
            (TxType::Legacy, rlp, remainder_outer)
        } else {
            let byte = *payload.first().ok_or(RLPDecodeError::InputTooShort)?;
            let tx_type = TxType::try_from(byte)
                .map_err(|_| RLPDecodeError::Custom(format!("invalid tx type: {byte}")))?;
            (tx_type, &payload[1..], remainder_outer)
        };
        let (decoder, fields_remainder) = Decoder::new(fields_rlp)?;
        let (chain_id, decoder) = if matches!(tx_type, TxType::Legacy) {
            (None, decoder)
        } else {
            decoder.decode_field("chain_id").map(|(v, d)| (Some(v), d))?
        };
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, max_priority_fee_per_gas, decoder) = if matches!(tx_type, TxType::Legacy) {
            let (gas_price, decoder) = decoder.decode_field("gas_price")?;
            (gas_price, None, decoder)
        } else {
            let (max_priority_fee_per_gas, decoder) = decoder.decode_field("max_priority_fee_per_gas")?;
            let (gas_price, decoder) = decoder.decode_field("gas_price")?;
            (gas_price, Some(max_priority_fee_per_gas), decoder)
        };
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_optional_field();
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;
        decoder.finish()?;

        Ok((
            Transaction {
                tx_type,
                chain_id,
                nonce,
                gas_price,
                max_priority_fee_per_gas,
                gas_limit,
                to,
                value,
                data,
                access_list,
                signature_y_parity,
                signature_r,
                signature_s,
            },
            remainder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tx_type: TxType) -> Transaction {
        Transaction {
            tx_type,
            chain_id: (!matches!(tx_type, TxType::Legacy)).then_some(1),
            nonce: 7,
            gas_price: U256::from(20_000_000_000u64),
            max_priority_fee_per_gas: (!matches!(tx_type, TxType::Legacy))
                .then_some(U256::from(1_000_000_000u64)),
            gas_limit: 21_000,
            to: Some(Address::repeat_byte(0xaa)),
            value: U256::from(1_000u64),
            data: Bytes::new(),
            access_list: vec![],
            signature_y_parity: true,
            signature_r: U256::from(123u64),
            signature_s: U256::from(456u64),
        }
    }

    #[test]
    fn legacy_transaction_roundtrip() {
        let tx = sample(TxType::Legacy);
        let encoded = ethwire_rlp::encode::encode(&tx);
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn eip1559_transaction_roundtrip() {
        let tx = sample(TxType::EIP1559);
        let encoded = ethwire_rlp::encode::encode(&tx);
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn typed_transaction_wraps_canonical_bytes_as_an_rlp_string() {
        // A non-legacy transaction's top-level encoding must be a single
        // self-delimiting RLP item, so that it can sit inside a list (a
        // block body, `Transactions`) alongside other items.
        let tx = sample(TxType::EIP1559);
        let encoded = ethwire_rlp::encode::encode(&tx);
        let canonical = tx.encode_canonical_to_vec();
        assert_eq!(canonical[0], TxType::EIP1559 as u8);
        let (is_list, payload, rest) = ethwire_rlp::decode::decode_rlp_item(&encoded).unwrap();
        assert!(!is_list);
        assert!(rest.is_empty());
        assert_eq!(payload, canonical.as_slice());
    }

    #[test]
    fn transactions_roundtrip_when_nested_in_a_list() {
        let txs = vec![sample(TxType::Legacy), sample(TxType::EIP1559)];
        let encoded = ethwire_rlp::encode::encode(&txs);
        let decoded: Vec<Transaction> = Vec::decode(&encoded).unwrap();
        assert_eq!(decoded, txs);
    }
}
