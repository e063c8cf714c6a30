//! The `eth` subprotocol: the reference capability this crate models on
//! top of the RLPx base protocol. Every message here rides at
//! [`crate::p2p::BASE_PROTOCOL_LENGTH`] plus its offset in the devp2p
//! `eth` spec, and is snappy-compressed before the RLP-encoded payload
//! goes on the wire.

pub mod blocks;
pub mod receipts;
pub mod status;
pub mod transactions;

pub const ETH_VERSION: u32 = 68;
