pub mod compact;
pub mod constants;
pub mod cursor;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;

pub use compact::{from_big_compact, to_big_compact};
pub use cursor::RlpCursor;
pub use decode::{decode_rlp_item, RLPDecode};
pub use encode::{encode, RLPEncode};
pub use error::{RLPDecodeError, RLPEncodeError};
