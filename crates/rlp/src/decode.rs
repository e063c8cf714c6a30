use bytes::Bytes;
use ethereum_types::{Address, Bloom, Signature, H128, H256, H32, H64};

use crate::compact::from_big_compact;
use crate::constants::{
    LONG_LIST_OFFSET, LONG_STRING_OFFSET, MAX_SHORT_LIST_LEN, MAX_SHORT_STRING_LEN, RLP_EMPTY_LIST,
    RLP_NULL, RLP_SINGLE_BYTE_THRESHOLD,
};
use crate::error::RLPDecodeError;

/// Splits the next RLP item off the front of `data`.
///
/// Returns `(is_list, payload, rest)` where `payload` is the item's raw content
/// (without its header) and `rest` is everything after the item. Enforces the
/// canonical encoding rules: no leading zero in the length-of-length field, and
/// no use of the long form where the short form (or the bare single-byte form)
/// would have sufficed.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first = *data.first().ok_or(RLPDecodeError::InputTooShort)?;

    match first {
        0..=0x7f => Ok((false, &data[..1], &data[1..])),
        RLP_NULL..=0xb7 => {
            let len = (first - RLP_NULL) as usize;
            let (payload, rest) = split_payload(data, 1, len)?;
            if len == 1 && payload[0] < RLP_SINGLE_BYTE_THRESHOLD {
                return Err(RLPDecodeError::NonCanonicalSize);
            }
            Ok((false, payload, rest))
        }
        0xb8..=0xbf => {
            let len_of_len = (first - LONG_STRING_OFFSET) as usize;
            let len = read_length(data, len_of_len)?;
            if len <= MAX_SHORT_STRING_LEN {
                return Err(RLPDecodeError::NonCanonicalSize);
            }
            let (payload, rest) = split_payload(data, 1 + len_of_len, len)?;
            Ok((false, payload, rest))
        }
        RLP_EMPTY_LIST..=0xf7 => {
            let len = (first - RLP_EMPTY_LIST) as usize;
            let (payload, rest) = split_payload(data, 1, len)?;
            Ok((true, payload, rest))
        }
        0xf8..=0xff => {
            let len_of_len = (first - LONG_LIST_OFFSET) as usize;
            let len = read_length(data, len_of_len)?;
            if len <= MAX_SHORT_LIST_LEN {
                return Err(RLPDecodeError::NonCanonicalSize);
            }
            let (payload, rest) = split_payload(data, 1 + len_of_len, len)?;
            Ok((true, payload, rest))
        }
    }
}

fn read_length(data: &[u8], len_of_len: usize) -> Result<usize, RLPDecodeError> {
    if len_of_len == 0 {
        return Err(RLPDecodeError::MalformedHeader);
    }
    let len_bytes = data
        .get(1..1 + len_of_len)
        .ok_or(RLPDecodeError::InputTooShort)?;
    if len_bytes[0] == 0 {
        return Err(RLPDecodeError::MalformedHeader);
    }
    if len_bytes.len() > std::mem::size_of::<usize>() {
        return Err(RLPDecodeError::Overflow);
    }
    let mut padded = [0u8; std::mem::size_of::<usize>()];
    padded[std::mem::size_of::<usize>() - len_bytes.len()..].copy_from_slice(len_bytes);
    Ok(usize::from_be_bytes(padded))
}

fn split_payload(
    data: &[u8],
    header_len: usize,
    payload_len: usize,
) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let end = header_len
        .checked_add(payload_len)
        .ok_or(RLPDecodeError::Overflow)?;
    if data.len() < end {
        return Err(RLPDecodeError::InputTooShort);
    }
    Ok((&data[header_len..end], &data[end..]))
}

/// Implemented by every type with a canonical RLP representation.
pub trait RLPDecode: Sized {
    /// Decodes `Self` from the front of `data`, returning the unconsumed remainder.
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    /// Decodes `Self`, requiring that `data` is consumed exactly (no trailing bytes).
    fn decode(data: &[u8]) -> Result<Self, RLPDecodeError> {
        let (value, rest) = Self::decode_unfinished(data)?;
        if !rest.is_empty() {
            return Err(RLPDecodeError::InputTooLong);
        }
        Ok(value)
    }
}

impl RLPDecode for bool {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        match payload {
            [] => Ok((false, rest)),
            [1] => Ok((true, rest)),
            _ => Err(RLPDecodeError::MalformedBoolean),
        }
    }
}

macro_rules! impl_decode_for_uint {
    ($($t:ty),+) => {
        $(
            impl RLPDecode for $t {
                fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                    let (is_list, payload, rest) = decode_rlp_item(data)?;
                    if is_list {
                        return Err(RLPDecodeError::UnexpectedList);
                    }
                    let value = from_big_compact(payload)?;
                    let value: $t = value.try_into().map_err(|_| RLPDecodeError::Overflow)?;
                    Ok((value, rest))
                }
            }
        )+
    };
}

impl_decode_for_uint!(u8, u16, u32, u64, usize);

impl RLPDecode for u128 {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        let value = crate::compact::from_big_compact_u128(payload)?;
        Ok((value, rest))
    }
}

impl RLPDecode for ethereum_types::U256 {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        if payload.len() > 32 {
            return Err(RLPDecodeError::Overflow);
        }
        if !payload.is_empty() && payload[0] == 0 {
            return Err(RLPDecodeError::LeadingZero);
        }
        Ok((ethereum_types::U256::from_big_endian(payload), rest))
    }
}

impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        let array: [u8; N] = payload
            .try_into()
            .map_err(|_| RLPDecodeError::InputTooShort)?;
        Ok((array, rest))
    }
}

macro_rules! impl_decode_for_fixed_hash {
    ($($t:ty, $n:expr),+) => {
        $(
            impl RLPDecode for $t {
                fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                    let (bytes, rest) = <[u8; $n]>::decode_unfinished(data)?;
                    Ok((<$t>::from(bytes), rest))
                }
            }
        )+
    };
}

impl_decode_for_fixed_hash!(
    H32, 4, H64, 8, H128, 16, H256, 32, Address, 20, ethereum_types::H264, 33,
    ethereum_types::H512, 64, ethereum_types::H520, 65, Bloom, 256, Signature, 65
);

impl RLPDecode for Vec<u8> {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if is_list {
            return Err(RLPDecodeError::UnexpectedList);
        }
        Ok((payload.to_vec(), rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = Vec::<u8>::decode_unfinished(data)?;
        Ok((Bytes::from(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = Vec::<u8>::decode_unfinished(data)?;
        let s = String::from_utf8(bytes).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((s, rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(data)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remainder) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = remainder;
        }
        Ok((items, rest))
    }
}

impl<T: RLPDecode> RLPDecode for Option<T> {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        if let Some((0x80, _)) = data.first().map(|b| (*b, ())) {
            let (_, rest) = decode_rlp_item(data)?;
            return Ok((None, rest));
        }
        let (value, rest) = T::decode_unfinished(data)?;
        Ok((Some(value), rest))
    }
}

impl<A: RLPDecode, B: RLPDecode> RLPDecode for (A, B) {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let (a, payload) = A::decode_unfinished(payload)?;
        let (b, payload) = B::decode_unfinished(payload)?;
        if !payload.is_empty() {
            return Err(RLPDecodeError::ListLengthMismatch);
        }
        Ok(((a, b), rest))
    }
}

impl<A: RLPDecode, B: RLPDecode, C: RLPDecode> RLPDecode for (A, B, C) {
    fn decode_unfinished(data: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(data)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let (a, payload) = A::decode_unfinished(payload)?;
        let (b, payload) = B::decode_unfinished(payload)?;
        let (c, payload) = C::decode_unfinished(payload)?;
        if !payload.is_empty() {
            return Err(RLPDecodeError::ListLengthMismatch);
        }
        Ok(((a, b, c), rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn decode_single_byte_literal() {
        assert_eq!(u8::decode(&[0x00]).unwrap(), 0);
        assert_eq!(u8::decode(&[0x7f]).unwrap(), 0x7f);
    }

    #[test]
    fn decode_short_string_value() {
        assert_eq!(u16::decode(&hex!("820400")).unwrap(), 0x0400);
    }

    #[test]
    fn decode_single_element_list() {
        // a Disconnect(ClientQuitting=0x08) payload's shape: `[0x08]`.
        let (decoder, rest) = crate::structs::Decoder::new(&hex!("c108")).unwrap();
        let (reason, decoder): (u8, _) = decoder.decode_field("reason").unwrap();
        decoder.finish().unwrap();
        assert_eq!(reason, 8);
        assert!(rest.is_empty());
    }

    #[test]
    fn rejects_noncanonical_single_byte_in_short_string() {
        // 0x00 alone should be encoded as the bare byte 0x00, not 0x8100.
        assert_eq!(
            decode_rlp_item(&hex!("8100")),
            Err(RLPDecodeError::NonCanonicalSize)
        );
    }

    #[test]
    fn rejects_long_form_for_short_payload() {
        // A 1-byte payload encoded with the long-string form is non-canonical.
        assert_eq!(
            decode_rlp_item(&hex!("b80161")),
            Err(RLPDecodeError::NonCanonicalSize)
        );
    }

    #[test]
    fn rejects_leading_zero_in_length_of_length() {
        assert_eq!(
            decode_rlp_item(&[0xb9, 0x00, 0x38]),
            Err(RLPDecodeError::MalformedHeader)
        );
    }

    #[test]
    fn decode_empty_string_and_list() {
        let (s, rest) = Vec::<u8>::decode_unfinished(&[0x80]).unwrap();
        assert!(s.is_empty());
        assert!(rest.is_empty());

        let (l, rest) = Vec::<u8>::decode_unfinished(&[0xc0]).unwrap();
        assert!(l.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_list_of_strings() {
        let encoded = hex!("c88363617483646f67");
        let (list, rest) = Vec::<Vec<u8>>::decode_unfinished(&encoded).unwrap();
        assert_eq!(list, vec![b"cat".to_vec(), b"dog".to_vec()]);
        assert!(rest.is_empty());
    }

    #[test]
    fn string_not_valid_utf8_rejected() {
        assert!(String::decode(&hex!("83ff0102")).is_err());
    }

    #[test]
    fn list_decoded_as_string_fails() {
        assert_eq!(Vec::<u8>::decode(&hex!("c0")), Err(RLPDecodeError::UnexpectedList));
    }

    #[test]
    fn string_decoded_as_list_fails() {
        assert_eq!(
            Vec::<Vec<u8>>::decode(&hex!("80")),
            Err(RLPDecodeError::UnexpectedString)
        );
    }

    #[test]
    fn tuple_decode() {
        let encoded = hex!("c20102");
        let ((a, b), rest) = <(u8, u8)>::decode_unfinished(&encoded).unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(rest.is_empty());
    }

    #[test]
    fn input_too_long_when_trailing_bytes_remain() {
        assert_eq!(u8::decode(&[0x01, 0x02]), Err(RLPDecodeError::InputTooLong));
    }
}
