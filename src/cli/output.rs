//! Command output formatting
//!
//! Everything a command prints on stdout.

use std::path::Path;

use crate::torrent::Torrent;
use crate::tracker::PeerAddress;

/// Metadata summary printed by `info`
pub fn format_info(torrent: &Torrent) -> String {
    let mut out = format!(
        "Tracker URL: {}\nLength: {}\nInfo Hash: {}\nPiece Length: {}\nPiece Hashes:\n",
        torrent.tracker_url,
        torrent.info.length,
        torrent.info.info_hash_hex(),
        torrent.info.piece_length
    );
    for hash in torrent.info.piece_hashes_hex() {
        out.push_str(&hash);
        out.push('\n');
    }
    out
}

/// One `ip:port` per line
pub fn format_peers(peers: &[PeerAddress]) -> String {
    peers.iter().map(|peer| format!("{}\n", peer)).collect()
}

pub fn format_handshake(peer_id_hex: &str) -> String {
    format!("Peer ID: {}", peer_id_hex)
}

pub fn format_piece_saved(index: usize, output: &Path) -> String {
    format!("Piece {} downloaded to {}", index, output.display())
}

pub fn format_download_saved(torrent: &Path, output: &Path) -> String {
    format!("Downloaded {} to {}", torrent.display(), output.display())
}
