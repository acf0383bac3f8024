//! rust-torrent-client
//!
//! A minimal BitTorrent client: bencode codec, torrent metainfo, HTTP tracker
//! announce and single-peer piece download with SHA-1 verification.

pub mod bencode;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod torrent;
pub mod tracker;

pub use error::TorrentError;

pub use bencode::{BencodeDict, BencodeValue};
pub use cli::{CliArgs, Command, ProgressDisplay};
pub use config::{generate_peer_id, ClientConfig};
pub use download::{DownloadSummary, Downloader, PieceProgress, RetryPolicy};
pub use peer::{Bitfield, PeerSession, PieceBuffer, SessionState};
pub use protocol::{Handshake, Message, MessageId};
pub use torrent::{Torrent, TorrentInfo, TorrentParser};
pub use tracker::{AnnounceRequest, AnnounceResponse, HttpTracker, PeerAddress, PeerDiscovery, StaticPeers};
