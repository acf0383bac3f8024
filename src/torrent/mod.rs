//! Torrent file handling module
//!
//! This module provides functionality for parsing .torrent files and deriving
//! the info hash and per-piece sizes.

pub mod info;
pub mod parser;

pub use info::{Torrent, TorrentInfo, HASH_LEN};
pub use parser::TorrentParser;
