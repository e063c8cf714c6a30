pub mod block;
pub mod fork_id;
pub mod receipt;
pub mod transaction;

pub use block::{BlockBody, BlockHash, BlockHeader, BlockNumber, Withdrawal};
pub use fork_id::ForkId;
pub use receipt::{Log, Receipt};
pub use transaction::{Transaction, TxType};
