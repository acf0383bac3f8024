//! Tracker client module
//!
//! Announces to HTTP trackers and unpacks the peer lists they return.

pub mod announce;
pub mod peers;

pub use announce::{AnnounceRequest, AnnounceResponse, HttpTracker, PeerDiscovery, StaticPeers};
pub use peers::{parse_compact_peers, serialize_compact_peers, PeerAddress, COMPACT_PEER_LEN};
