//! Download module
//!
//! Sequences piece downloads across a torrent and writes the verified bytes
//! in order.

pub mod orchestrator;

pub use orchestrator::{DownloadSummary, Downloader, PieceProgress, RetryPolicy};
