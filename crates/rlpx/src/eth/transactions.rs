use bytes::{BufMut, Bytes};
use ethereum_types::H256;
use ethwire_rlp::{
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use ethwire_types::Transaction;
use sha3::{Digest, Keccak256};

use crate::message::{snappy_compress, snappy_decompress, RLPxMessage};

/// Limit taken from go-ethereum's tx fetcher: a single `Transactions`
/// message is never allowed to carry more than this many transactions,
/// regardless of what a malicious or buggy peer claims to send.
pub const TRANSACTION_LIMIT: usize = 256;

fn transaction_hash(tx: &Transaction) -> H256 {
    H256::from_slice(Keccak256::digest(tx.encode_canonical_to_vec()).as_slice())
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#transactions-0x02
/// Broadcast message: announces full transaction bodies to a peer.
#[derive(Debug, Clone)]
pub struct Transactions {
    pub transactions: Vec<Transaction>,
}

impl Transactions {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

impl RLPxMessage for Transactions {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.transactions)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (mut transactions, decoder): (Vec<Transaction>, _) =
            decoder.decode_field("transactions")?;
        decoder.finish()?;
        transactions.truncate(TRANSACTION_LIMIT);
        Ok(Self::new(transactions))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newpooledtransactionhashes-0x08
/// Broadcast message: announces transactions a peer knows about without
/// sending their full bodies yet.
#[derive(Debug, Clone)]
pub struct NewPooledTransactionHashes {
    pub transaction_types: Bytes,
    pub transaction_sizes: Vec<usize>,
    pub transaction_hashes: Vec<H256>,
}

impl NewPooledTransactionHashes {
    pub fn new(transactions: &[Transaction]) -> Self {
        let mut transaction_types = Vec::with_capacity(transactions.len());
        let mut transaction_sizes = Vec::with_capacity(transactions.len());
        let mut transaction_hashes = Vec::with_capacity(transactions.len());
        for tx in transactions {
            transaction_types.push(tx.tx_type as u8);
            transaction_sizes.push(tx.encode_canonical_to_vec().len());
            transaction_hashes.push(transaction_hash(tx));
        }
        Self {
            transaction_types: transaction_types.into(),
            transaction_sizes,
            transaction_hashes,
        }
    }
}

impl RLPxMessage for NewPooledTransactionHashes {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.transaction_types)
            .encode_field(&self.transaction_sizes)
            .encode_field(&self.transaction_hashes)
            .finish();

        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (transaction_types, decoder): (Bytes, _) = decoder.decode_field("transactionTypes")?;
        let (transaction_sizes, decoder): (Vec<usize>, _) =
            decoder.decode_field("transactionSizes")?;
        let (transaction_hashes, decoder): (Vec<H256>, _) =
            decoder.decode_field("transactionHashes")?;
        decoder.finish()?;

        if transaction_hashes.len() != transaction_sizes.len()
            || transaction_sizes.len() != transaction_types.len()
        {
            return Err(RLPDecodeError::Custom(
                "transaction_hashes, transaction_sizes and transaction_types must have the same length"
                    .to_string(),
            ));
        }

        Ok(Self {
            transaction_types,
            transaction_sizes,
            transaction_hashes,
        })
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getpooledtransactions-0x09
#[derive(Debug, Clone)]
pub struct GetPooledTransactions {
    pub id: u64,
    pub transaction_hashes: Vec<H256>,
}

impl GetPooledTransactions {
    pub fn new(id: u64, transaction_hashes: Vec<H256>) -> Self {
        Self {
            transaction_hashes,
            id,
        }
    }
}

impl RLPxMessage for GetPooledTransactions {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.transaction_hashes)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (transaction_hashes, decoder): (Vec<H256>, _) =
            decoder.decode_field("transactionHashes")?;
        decoder.finish()?;

        Ok(Self::new(id, transaction_hashes))
    }
}

/// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#pooledtransactions-0x0a
#[derive(Debug, Clone)]
pub struct PooledTransactions {
    pub id: u64,
    pub pooled_transactions: Vec<Transaction>,
}

impl PooledTransactions {
    pub fn new(id: u64, pooled_transactions: Vec<Transaction>) -> Self {
        Self {
            pooled_transactions,
            id,
        }
    }
}

impl RLPxMessage for PooledTransactions {
    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut encoded_data = vec![];
        Encoder::new(&mut encoded_data)
            .encode_field(&self.id)
            .encode_field(&self.pooled_transactions)
            .finish();
        let msg_data = snappy_compress(encoded_data)?;
        buf.put_slice(&msg_data);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decompressed_data = snappy_decompress(msg_data)?;
        let (decoder, _) = Decoder::new(&decompressed_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (pooled_transactions, decoder): (Vec<Transaction>, _) =
            decoder.decode_field("pooledTransactions")?;
        decoder.finish()?;

        Ok(Self::new(id, pooled_transactions))
    }
}
