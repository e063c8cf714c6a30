//! Field-by-field helpers for encoding and decoding struct-shaped RLP lists.
//!
//! Every message and record type in this codebase (handshake messages, wire
//! protocol payloads, header/receipt types) is RLP-encoded as a list of its
//! fields in declaration order. `Encoder`/`Decoder` remove the boilerplate of
//! wrapping that list by hand.

use bytes::BufMut;

use crate::decode::{decode_rlp_item, RLPDecode};
use crate::encode::RLPEncode;
use crate::error::RLPDecodeError;

/// Builds the payload of a single RLP list field-by-field.
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Encoder {
            buf,
            temp_buf: Vec::new(),
        }
    }

    /// Encodes one field and appends it to the list payload being built.
    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// Encodes a field only if present; a `None` value is written as `0x80`,
    /// matching the convention [`RLPEncode`]'s `Option` impl uses.
    pub fn encode_optional_field<T: RLPEncode>(self, value: &Option<T>) -> Self {
        self.encode_field(value)
    }

    /// Writes the accumulated fields as a single RLP list into the outer buffer.
    pub fn finish(self) {
        crate::encode::encode_list_payload(self.buf, &self.temp_buf);
    }
}

/// Reads the fields of a single RLP list, in declaration order.
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Parses the outer list header and returns a decoder scoped to its
    /// payload, along with whatever follows the list in `data`.
    pub fn new(data: &'a [u8]) -> Result<(Self, &'a [u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        Ok((
            Decoder {
                payload,
                remaining: payload,
            },
            rest,
        ))
    }

    /// Decodes the next field.
    pub fn decode_field<T: RLPDecode>(mut self, name: &'static str) -> Result<(T, Self), RLPDecodeError> {
        let (value, rest) = T::decode_unfinished(self.remaining).map_err(|e| {
            if matches!(e, RLPDecodeError::InputTooShort) {
                RLPDecodeError::Custom(format!("missing field `{name}`"))
            } else {
                e
            }
        })?;
        self.remaining = rest;
        Ok((value, self))
    }

    /// Decodes the next field if any payload remains, otherwise returns `None`.
    pub fn decode_optional_field<T: RLPDecode>(mut self) -> (Option<T>, Self) {
        if self.remaining.is_empty() {
            return (None, self);
        }
        match T::decode_unfinished(self.remaining) {
            Ok((value, rest)) => {
                self.remaining = rest;
                (Some(value), self)
            }
            Err(_) => (None, self),
        }
    }

    /// Returns the raw, still-encoded bytes of the next item without decoding it.
    pub fn get_encoded_item(&self) -> Result<&'a [u8], RLPDecodeError> {
        let (_, _, rest) = decode_rlp_item(self.remaining)?;
        let consumed = self.remaining.len() - rest.len();
        Ok(&self.remaining[..consumed])
    }

    /// Asserts every field in the list has been consumed.
    pub fn finish(self) -> Result<(), RLPDecodeError> {
        if !self.remaining.is_empty() {
            return Err(RLPDecodeError::ListLengthMismatch);
        }
        Ok(())
    }

    /// Finalizes without checking for leftover fields, discarding them.
    /// Used for forward-compatible messages where trailing fields may be
    /// added by a future protocol version.
    pub fn finish_unchecked(self) {}

    /// The full list payload this decoder was constructed from.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        x: u64,
        y: u64,
    }

    impl RLPEncode for Point {
        fn encode(&self, buf: &mut dyn BufMut) {
            Encoder::new(buf)
                .encode_field(&self.x)
                .encode_field(&self.y)
                .finish();
        }
    }

    impl RLPDecode for Point {
        fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
            let (decoder, rest) = Decoder::new(data)?;
            let (x, decoder) = decoder.decode_field("x")?;
            let (y, decoder) = decoder.decode_field("y")?;
            decoder.finish()?;
            Ok((Point { x, y }, rest))
        }
    }

    #[test]
    fn field_roundtrip() {
        let point = Point { x: 1, y: 2 };
        let encoded = crate::encode::encode(&point);
        let decoded = Point::decode(&encoded).unwrap();
        assert_eq!((decoded.x, decoded.y), (1, 2));
    }

    #[test]
    fn missing_field_is_an_error() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).encode_field(&1u64).finish();
        assert!(Point::decode(&buf).is_err());
    }

    #[test]
    fn finish_unchecked_discards_trailing_fields() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&1u64)
            .encode_field(&2u64)
            .encode_field(&3u64)
            .finish();
        let (decoder, _rest) = Decoder::new(&buf).unwrap();
        let (x, decoder) = decoder.decode_field::<u64>("x").unwrap();
        let (y, decoder) = decoder.decode_field::<u64>("y").unwrap();
        decoder.finish_unchecked();
        assert_eq!((x, y), (1, 2));
    }
}
