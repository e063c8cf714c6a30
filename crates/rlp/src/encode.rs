use bytes::{Bytes, BufMut};
use ethereum_types::{Address, Bloom, Signature, H128, H256, H32, H64};

use crate::compact::{to_big_compact, to_big_compact_u128};
use crate::constants::{
    LONG_LIST_OFFSET, LONG_STRING_OFFSET, MAX_SHORT_LIST_LEN, MAX_SHORT_STRING_LEN, RLP_EMPTY_LIST,
    RLP_NULL, RLP_SINGLE_BYTE_THRESHOLD,
};
use crate::error::RLPEncodeError;

/// Writes the RLP header for an item of `payload_len` bytes into `buf`.
fn encode_header(buf: &mut dyn BufMut, payload_len: usize, is_list: bool) {
    let (short_max, short_base, long_base) = if is_list {
        (MAX_SHORT_LIST_LEN, RLP_EMPTY_LIST, LONG_LIST_OFFSET)
    } else {
        (MAX_SHORT_STRING_LEN, RLP_NULL, LONG_STRING_OFFSET)
    };
    if payload_len <= short_max {
        buf.put_u8(short_base + payload_len as u8);
    } else {
        let len_bytes = payload_len.to_be_bytes();
        let first_nonzero = len_bytes.iter().position(|b| *b != 0).unwrap_or(len_bytes.len() - 1);
        let len_bytes = &len_bytes[first_nonzero..];
        buf.put_u8(long_base + len_bytes.len() as u8);
        buf.put_slice(len_bytes);
    }
}

/// Implemented by every type with a canonical RLP representation.
pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    /// Length, in bytes, of this value's full encoding (header + payload).
    /// The default implementation is correct but allocates; override when a
    /// cheaper computation is available.
    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }
}

/// Writes `payload` as the payload of an RLP list, prefixed with its header.
/// Used by [`crate::structs::Encoder`] once it has built up a list's fields.
pub(crate) fn encode_list_payload(buf: &mut dyn BufMut, payload: &[u8]) {
    encode_header(buf, payload.len(), true);
    buf.put_slice(payload);
}

/// Encodes `value` into a freshly allocated buffer.
pub fn encode<T: RLPEncode>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(1);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }
}

macro_rules! impl_encode_for_uint {
    ($($t:ty),+) => {
        $(
            impl RLPEncode for $t {
                fn encode(&self, buf: &mut dyn BufMut) {
                    let value = *self as u64;
                    if value != 0 && value < RLP_SINGLE_BYTE_THRESHOLD as u64 {
                        buf.put_u8(value as u8);
                        return;
                    }
                    let bytes = to_big_compact(value);
                    encode_header(buf, bytes.len(), false);
                    buf.put_slice(&bytes);
                }
            }
        )+
    };
}

impl_encode_for_uint!(u8, u16, u32, u64, usize);

impl RLPEncode for u128 {
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self != 0 && *self < RLP_SINGLE_BYTE_THRESHOLD as u128 {
            buf.put_u8(*self as u8);
            return;
        }
        let bytes = to_big_compact_u128(*self);
        encode_header(buf, bytes.len(), false);
        buf.put_slice(&bytes);
    }
}

impl RLPEncode for ethereum_types::U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        let first_nonzero = bytes.iter().position(|b| *b != 0);
        match first_nonzero {
            None => buf.put_u8(RLP_NULL),
            Some(idx) => {
                let trimmed = &bytes[idx..];
                if trimmed.len() == 1 && trimmed[0] < RLP_SINGLE_BYTE_THRESHOLD {
                    buf.put_u8(trimmed[0]);
                } else {
                    encode_header(buf, trimmed.len(), false);
                    buf.put_slice(trimmed);
                }
            }
        }
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_SINGLE_BYTE_THRESHOLD {
            buf.put_u8(self[0]);
            return;
        }
        encode_header(buf, self.len(), false);
        buf.put_slice(self);
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf);
    }
}

macro_rules! impl_encode_for_fixed_hash {
    ($($t:ty),+) => {
        $(
            impl RLPEncode for $t {
                fn encode(&self, buf: &mut dyn BufMut) {
                    self.as_bytes().encode(buf);
                }
            }
        )+
    };
}

impl_encode_for_fixed_hash!(
    H32, H64, H128, H256, Address, ethereum_types::H264, ethereum_types::H512,
    ethereum_types::H520, Bloom, Signature
);

impl RLPEncode for Vec<u8> {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf);
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf);
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf);
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        for item in self {
            item.encode(&mut payload);
        }
        encode_header(buf, payload.len(), true);
        buf.put_slice(&payload);
    }
}

impl<T: RLPEncode> RLPEncode for Option<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            Some(value) => value.encode(buf),
            None => buf.put_u8(RLP_NULL),
        }
    }
}

impl<A: RLPEncode, B: RLPEncode> RLPEncode for (A, B) {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        self.0.encode(&mut payload);
        self.1.encode(&mut payload);
        encode_header(buf, payload.len(), true);
        buf.put_slice(&payload);
    }
}

impl<A: RLPEncode, B: RLPEncode, C: RLPEncode> RLPEncode for (A, B, C) {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        self.0.encode(&mut payload);
        self.1.encode(&mut payload);
        self.2.encode(&mut payload);
        encode_header(buf, payload.len(), true);
        buf.put_slice(&payload);
    }
}

/// Incremental RLP builder mirroring a stack-based encoder: items are pushed
/// one at a time and lists are opened/closed explicitly, rather than building
/// a whole value up front and encoding it in one shot.
pub struct RlpEncoder {
    buffer: Vec<u8>,
    list_start_positions: Vec<usize>,
}

impl Default for RlpEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RlpEncoder {
    pub fn new() -> Self {
        RlpEncoder {
            buffer: Vec::new(),
            list_start_positions: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RlpEncoder {
            buffer: Vec::with_capacity(capacity),
            list_start_positions: Vec::new(),
        }
    }

    /// Appends a byte string item, applying the header automatically.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        bytes.encode(&mut self.buffer);
        self
    }

    /// Appends already-encoded RLP bytes verbatim, without adding a header.
    pub fn add_raw(&mut self, raw: &[u8]) -> Result<&mut Self, RLPEncodeError> {
        if raw.is_empty() {
            return Err(RLPEncodeError::EmptyInput);
        }
        self.buffer.put_slice(raw);
        Ok(self)
    }

    /// Appends an unsigned integer item in canonical minimal form.
    pub fn add_unsigned(&mut self, value: u64) -> &mut Self {
        value.encode(&mut self.buffer);
        self
    }

    /// Appends a boolean item.
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        value.encode(&mut self.buffer);
        self
    }

    /// Opens a new list: following items are nested inside it until the
    /// matching [`Self::end_list`].
    pub fn begin_list(&mut self) -> &mut Self {
        self.list_start_positions.push(self.buffer.len());
        self
    }

    /// Closes the innermost open list, inserting its header in front of the
    /// items added since the matching [`Self::begin_list`].
    pub fn end_list(&mut self) -> Result<&mut Self, RLPEncodeError> {
        let start = self
            .list_start_positions
            .pop()
            .ok_or(RLPEncodeError::UnmatchedEndList)?;
        let payload_len = self.buffer.len() - start;
        let mut header = Vec::new();
        encode_header(&mut header, payload_len, true);
        self.buffer.splice(start..start, header);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.list_start_positions.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buffer.reserve(additional);
    }

    /// Returns a reference to the bytes built so far without consuming the builder.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Finalizes the builder, failing if a list was left open.
    pub fn finish(self) -> Result<Vec<u8>, RLPEncodeError> {
        if !self.list_start_positions.is_empty() {
            return Err(RLPEncodeError::UnclosedList);
        }
        Ok(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encode_single_byte_literal() {
        assert_eq!(encode(&0u8), vec![0x00]);
        assert_eq!(encode(&0x7fu8), vec![0x7f]);
    }

    #[test]
    fn encode_short_string_value() {
        assert_eq!(encode(&0x0400u16), hex!("820400").to_vec());
    }

    #[test]
    fn encode_empty_string_and_list() {
        assert_eq!(encode(&Vec::<u8>::new()), vec![RLP_NULL]);
        assert_eq!(encode(&Vec::<Vec<u8>>::new()), vec![RLP_EMPTY_LIST]);
    }

    #[test]
    fn encode_list_of_strings() {
        let items = vec![b"cat".to_vec(), b"dog".to_vec()];
        assert_eq!(encode(&items), hex!("c88363617483646f67").to_vec());
    }

    #[test]
    fn encode_single_element_list() {
        // a Disconnect(ClientQuitting=0x08) payload's shape: `[0x08]`.
        let mut buf = Vec::new();
        crate::structs::Encoder::new(&mut buf).encode_field(&8u8).finish();
        assert_eq!(buf, hex!("c108").to_vec());
    }

    #[test]
    fn builder_matches_trait_encoding() {
        let mut encoder = RlpEncoder::new();
        encoder.begin_list();
        encoder.add_bytes(b"cat");
        encoder.add_bytes(b"dog");
        encoder.end_list().unwrap();
        let built = encoder.finish().unwrap();
        assert_eq!(built, hex!("c88363617483646f67").to_vec());
    }

    #[test]
    fn builder_nested_lists() {
        let mut encoder = RlpEncoder::new();
        encoder.begin_list();
        encoder.add_unsigned(1);
        encoder.begin_list();
        encoder.add_unsigned(2);
        encoder.add_unsigned(3);
        encoder.end_list().unwrap();
        encoder.end_list().unwrap();
        let built = encoder.finish().unwrap();
        assert!(crate::decode::decode_rlp_item(&built).unwrap().0);
    }

    #[test]
    fn builder_rejects_unclosed_list() {
        let mut encoder = RlpEncoder::new();
        encoder.begin_list();
        encoder.add_unsigned(1);
        assert_eq!(encoder.finish(), Err(RLPEncodeError::UnclosedList));
    }

    #[test]
    fn builder_rejects_unmatched_end_list() {
        let mut encoder = RlpEncoder::new();
        assert_eq!(encoder.end_list().err(), Some(RLPEncodeError::UnmatchedEndList));
    }

    #[test]
    fn builder_add_raw_embeds_preencoded_item() {
        let mut encoder = RlpEncoder::new();
        encoder.begin_list();
        encoder.add_raw(&hex!("83646f67")).unwrap();
        encoder.end_list().unwrap();
        let built = encoder.finish().unwrap();
        assert_eq!(built, hex!("c483646f67").to_vec());
    }

    #[test]
    fn roundtrip_with_decode() {
        use crate::decode::RLPDecode;
        let encoded = encode(&12345u64);
        assert_eq!(u64::decode(&encoded).unwrap(), 12345);
    }
}
