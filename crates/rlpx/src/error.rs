//! Error taxonomy for the RLPx transport: crypto/auth/framing errors are
//! raised at their originating layer and aggregated into a single
//! `RLPxError` at the session boundary, matching the propagation policy
//! every layer above them relies on.

use ethwire_rlp::error::{RLPDecodeError, RLPEncodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material")]
    InvalidKey,
    #[error("ECDH key agreement failed")]
    Ecdh,
    #[error("AES-CTR operation failed")]
    Aes,
    #[error("HMAC operation failed")]
    Hmac,
    #[error("KDF operation failed")]
    Kdf,
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("signature recovery failed")]
    RecoveryFailed,
    #[error("point is not on the secp256k1 curve")]
    InvalidPublicKey,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("ECIES encryption failed: {0}")]
    EciesEncryptFailed(CryptoError),
    #[error("ECIES decryption failed: {0}")]
    EciesDecryptFailed(CryptoError),
    #[error("auth message is malformed: {0}")]
    InvalidAuthMessage(RLPDecodeError),
    #[error("ack message is malformed: {0}")]
    InvalidAckMessage(RLPDecodeError),
    #[error("shared secret derivation failed")]
    SharedSecretFailed,
    #[error("recovered ephemeral key does not match signature")]
    SignatureInvalid,
    #[error("frame secret derivation failed")]
    KeyDerivationFailed,
    #[error("peer public key is invalid")]
    InvalidPublicKey,
    #[error("peer nonce has the wrong length")]
    InvalidNonce,
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("header MAC verification failed")]
    MacMismatch,
    #[error("frame size is zero or exceeds the configured maximum")]
    InvalidFrameSize,
    #[error("frame header is malformed")]
    InvalidHeader,
    #[error("snappy compression failed")]
    CompressionFailed,
    #[error("snappy decompression failed")]
    DecompressionFailed,
    #[error("buffer too small for declared frame size")]
    BufferTooSmall,
}

/// Session-level error surfaced through the public API. Every lower-layer
/// error kind is folded into one of these at the point it crosses the
/// session boundary.
#[derive(Debug, Error)]
pub enum RLPxError {
    #[error("network failure: {0}")]
    NetworkFailure(#[from] std::io::Error),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthError),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("peer disconnected: {0:?}")]
    PeerDisconnected(crate::p2p::DisconnectReason),
    #[error("operation timed out")]
    Timeout,
    #[error("invalid session state for this operation")]
    InvalidState,
    #[error("invalid protocol message: {0}")]
    InvalidMessage(String),
    #[error("session is not connected")]
    NotConnected,
    #[error("connection attempt failed: {0}")]
    ConnectionFailed(String),
    #[error("RLP decode error: {0}")]
    Decode(#[from] RLPDecodeError),
    #[error("RLP encode error: {0}")]
    Encode(#[from] RLPEncodeError),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
