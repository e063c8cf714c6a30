use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RLPDecodeError {
    #[error("input too short")]
    InputTooShort,
    #[error("input too long, unconsumed trailing bytes")]
    InputTooLong,
    #[error("non-canonical RLP size")]
    NonCanonicalSize,
    #[error("unsigned integer overflow")]
    Overflow,
    #[error("leading zero byte in unsigned integer payload")]
    LeadingZero,
    #[error("expected a string, found a list")]
    UnexpectedList,
    #[error("expected a list, found a string")]
    UnexpectedString,
    #[error("list payload was not fully consumed by its declared items")]
    ListLengthMismatch,
    #[error("malformed RLP header")]
    MalformedHeader,
    #[error("malformed boolean encoding")]
    MalformedBoolean,
    #[error("malformed data")]
    MalformedData,
    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RLPEncodeError {
    #[error("payload length does not fit a 64-bit length prefix")]
    PayloadTooLarge,
    #[error("empty input where a non-empty raw item was required")]
    EmptyInput,
    #[error("finish() called with an unclosed list")]
    UnclosedList,
    #[error("end_list() called without a matching begin_list()")]
    UnmatchedEndList,
    #[error("snappy compression failed")]
    InvalidCompression,
    #[error("{0}")]
    Custom(String),
}
