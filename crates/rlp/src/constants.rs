/// Single-byte literal values below this are emitted bare, without any header.
pub const RLP_SINGLE_BYTE_THRESHOLD: u8 = 0x80;

/// Header byte for the empty string / zero value.
pub const RLP_NULL: u8 = 0x80;

/// Header byte for the empty list.
pub const RLP_EMPTY_LIST: u8 = 0xc0;

/// Largest payload length, in bytes, that still uses the short string form.
pub const MAX_SHORT_STRING_LEN: usize = 55;

/// Largest payload length, in bytes, that still uses the short list form.
pub const MAX_SHORT_LIST_LEN: usize = 55;

/// First header byte of the long string form (`0xb7 + length_of_length`).
pub const LONG_STRING_OFFSET: u8 = 0xb7;

/// First header byte of the long list form (`0xf7 + length_of_length`).
pub const LONG_LIST_OFFSET: u8 = 0xf7;
