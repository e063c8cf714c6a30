//! Stateful, single-pass RLP cursor.
//!
//! Unlike the [`RLPDecode`](crate::decode::RLPDecode) trait, which decodes one
//! value and hands back the remaining slice, `RlpCursor` holds the remaining
//! slice itself and is mutated in place as items are consumed. This mirrors
//! how a hand-written protocol decoder walks a message: peek the next header
//! to decide what it is, then pull fields off one at a time.

use crate::compact::from_big_compact;
use crate::decode::decode_rlp_item;
use crate::error::RLPDecodeError;

/// What policy to apply when a cursor (typically one scoped to a list's
/// payload) still has unread bytes once the caller believes it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leftover {
    /// Treat unread trailing bytes as a decode error.
    Prohibit,
    /// Silently discard unread trailing bytes.
    Allow,
}

/// The header of the next RLP item in a cursor, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub list: bool,
    pub payload_length: usize,
    pub header_length: usize,
}

/// A cursor over a byte slice containing a sequence of RLP items.
#[derive(Debug, Clone)]
pub struct RlpCursor<'a> {
    data: &'a [u8],
}

impl<'a> RlpCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        RlpCursor { data }
    }

    /// True once every byte of the cursor has been consumed.
    pub fn is_finished(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of unread bytes remaining.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Reads the header of the next item without consuming it.
    pub fn peek_header(&self) -> Result<Header, RLPDecodeError> {
        let (list, payload, rest) = decode_rlp_item(self.data)?;
        let header_length = self.data.len() - rest.len() - payload.len();
        Ok(Header {
            list,
            payload_length: payload.len(),
            header_length,
        })
    }

    /// True if the next item is a list.
    pub fn is_list(&self) -> Result<bool, RLPDecodeError> {
        Ok(self.peek_header()?.list)
    }

    /// True if the next item is a string (byte array).
    pub fn is_string(&self) -> Result<bool, RLPDecodeError> {
        Ok(!self.peek_header()?.list)
    }

    /// Reads the next item as a raw byte string.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(self.data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        self.data = rest;
        Ok(payload)
    }

    /// Reads the next item as an unsigned integer in canonical minimal form.
    pub fn read_unsigned(&mut self) -> Result<u64, RLPDecodeError> {
        let payload = self.read_bytes()?;
        from_big_compact(payload)
    }

    /// Reads the next item as a boolean (`0x80` = false, `0x01` = true).
    pub fn read_bool(&mut self) -> Result<bool, RLPDecodeError> {
        let payload = self.read_bytes()?;
        match payload {
            [] => Ok(false),
            [1] => Ok(true),
            _ => Err(RLPDecodeError::MalformedBoolean),
        }
    }

    /// Reads the next item as a fixed-size byte array.
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], RLPDecodeError> {
        let payload = self.read_bytes()?;
        payload.try_into().map_err(|_| RLPDecodeError::InputTooShort)
    }

    /// Consumes the next item's header (which must be a list) and returns a
    /// cursor scoped to its payload, advancing past the whole item.
    pub fn read_list_header(&mut self) -> Result<RlpCursor<'a>, RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(self.data)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        self.data = rest;
        Ok(RlpCursor::new(payload))
    }

    /// Reads a list of homogeneous items using [`RLPDecode`](crate::decode::RLPDecode).
    pub fn read_list_into_vec<T: crate::decode::RLPDecode>(
        &mut self,
    ) -> Result<Vec<T>, RLPDecodeError> {
        let mut inner = self.read_list_header()?;
        let mut items = Vec::new();
        while !inner.is_finished() {
            items.push(inner.read_item::<T>()?);
        }
        Ok(items)
    }

    /// Reads the next item via its [`RLPDecode`](crate::decode::RLPDecode) impl.
    pub fn read_item<T: crate::decode::RLPDecode>(&mut self) -> Result<T, RLPDecodeError> {
        let (value, rest) = T::decode_unfinished(self.data)?;
        self.data = rest;
        Ok(value)
    }

    /// Skips the next item, whatever its shape, without interpreting it.
    pub fn skip_item(&mut self) -> Result<(), RLPDecodeError> {
        let (_, _, rest) = decode_rlp_item(self.data)?;
        self.data = rest;
        Ok(())
    }

    /// Consumes the cursor, checking leftover bytes against `policy`.
    pub fn finish(self, policy: Leftover) -> Result<(), RLPDecodeError> {
        match policy {
            Leftover::Prohibit if !self.data.is_empty() => Err(RLPDecodeError::InputTooLong),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn peek_header_short_string() {
        let cursor = RlpCursor::new(&hex!("83646f67"));
        let header = cursor.peek_header().unwrap();
        assert!(!header.list);
        assert_eq!(header.payload_length, 3);
        assert_eq!(header.header_length, 1);
    }

    #[test]
    fn read_bytes_then_finished() {
        let mut cursor = RlpCursor::new(&hex!("83646f67"));
        assert_eq!(cursor.read_bytes().unwrap(), b"dog");
        assert!(cursor.is_finished());
    }

    #[test]
    fn read_list_header_scopes_payload() {
        let mut cursor = RlpCursor::new(&hex!("c88363617483646f67"));
        let mut list = cursor.read_list_header().unwrap();
        assert!(cursor.is_finished());
        assert_eq!(list.read_bytes().unwrap(), b"cat");
        assert_eq!(list.read_bytes().unwrap(), b"dog");
        assert!(list.is_finished());
        list.finish(Leftover::Prohibit).unwrap();
    }

    #[test]
    fn read_list_into_vec_of_u8() {
        let mut cursor = RlpCursor::new(&hex!("c20102"));
        let values: Vec<u8> = cursor.read_list_into_vec().unwrap();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn leftover_prohibit_rejects_trailing_bytes() {
        let mut cursor = RlpCursor::new(&hex!("c983646f6701"));
        let list = cursor.read_list_header().unwrap();
        let mut inner = list;
        inner.skip_item().unwrap();
        assert_eq!(inner.finish(Leftover::Prohibit), Err(RLPDecodeError::InputTooLong));
    }

    #[test]
    fn leftover_allow_accepts_trailing_bytes() {
        let mut cursor = RlpCursor::new(&hex!("c983646f6701"));
        let list = cursor.read_list_header().unwrap();
        let mut inner = list;
        inner.skip_item().unwrap();
        assert_eq!(inner.finish(Leftover::Allow), Ok(()));
    }

    #[test]
    fn skip_item_advances_past_list() {
        let mut cursor = RlpCursor::new(&hex!("c88363617483646f6701"));
        cursor.skip_item().unwrap();
        assert_eq!(cursor.read_unsigned().unwrap(), 1);
    }

    #[test]
    fn unexpected_list_on_read_bytes() {
        let mut cursor = RlpCursor::new(&hex!("c0"));
        assert_eq!(cursor.read_bytes(), Err(RLPDecodeError::UnexpectedList));
    }
}
