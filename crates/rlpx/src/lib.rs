//! RLPx: the encrypted, authenticated transport devp2p peers speak once
//! they've found each other via discovery. Covers the ECIES auth handshake
//! (`handshake`), the AES-256-CTR framing layer with its rolling MAC
//! (`frame`), the base protocol (`p2p`) every capability rides on top of,
//! the `eth` subprotocol (`eth`), and the session state machine (`session`)
//! that ties all of the above into a single connection handle.

pub mod crypto;
pub mod error;
pub mod eth;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod p2p;
pub mod session;

pub use error::RLPxError;
pub use message::Message;
pub use p2p::{Capability, DisconnectReason};
pub use session::{PeerInfo, Session, SessionState};
