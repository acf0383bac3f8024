//! Peer management module
//!
//! A single-connection peer session, its state machine and the per-piece
//! download buffer.

pub mod piece;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main types
pub use piece::{plan_blocks, BlockRequest, PieceBuffer, BLOCK_MAX_SIZE};
pub use session::PeerSession;
pub use state::{Bitfield, SessionState};
