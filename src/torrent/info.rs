//! Torrent information structures
//!
//! Typed view of a single-file torrent and its derived values.

use std::borrow::Cow;

use sha1::{Digest, Sha1};

use crate::bencode::BencodeValue;

/// Length of a SHA-1 digest
pub const HASH_LEN: usize = 20;

/// The `info` dictionary of a single-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Total size of the file in bytes
    pub length: u64,
    /// Advisory file name, raw bytes as they appear in the metainfo
    pub name: Vec<u8>,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// SHA-1 digest of every piece, in piece order
    pub piece_hashes: Vec<[u8; HASH_LEN]>,
}

/// A parsed metainfo file: tracker URL plus its info dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    /// Tracker announce URL
    pub tracker_url: String,
    /// Info dictionary
    pub info: TorrentInfo,
}

impl TorrentInfo {
    /// Canonical bencode form of the info dictionary
    pub fn to_bencode(&self) -> BencodeValue {
        BencodeValue::dict()
            .insert("length", self.length as i64)
            .insert("name", self.name.as_slice())
            .insert("piece length", self.piece_length as i64)
            .insert("pieces", self.piece_hashes.concat())
    }

    /// File name for display; bytes that are not UTF-8 are replaced
    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// SHA-1 of the canonical encoding of the info dictionary
    pub fn info_hash(&self) -> [u8; HASH_LEN] {
        let mut hasher = Sha1::new();
        hasher.update(self.to_bencode().encode());
        hasher.finalize().into()
    }

    /// Info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash())
    }

    /// Number of pieces in the torrent
    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Size of the piece at `index`; the last piece is sized to what remains
    pub fn piece_size(&self, index: usize) -> Option<usize> {
        if index >= self.piece_hashes.len() {
            return None;
        }

        if index + 1 < self.piece_hashes.len() {
            return Some(self.piece_length as usize);
        }

        match self.length % self.piece_length {
            0 => Some(self.piece_length as usize),
            rem => Some(rem as usize),
        }
    }

    /// Byte offset of the piece within the file
    pub fn piece_offset(&self, index: usize) -> Option<u64> {
        if index >= self.piece_hashes.len() {
            return None;
        }
        Some(index as u64 * self.piece_length)
    }

    /// Expected digest of the piece at `index`
    pub fn piece_hash(&self, index: usize) -> Option<[u8; HASH_LEN]> {
        self.piece_hashes.get(index).copied()
    }

    /// Piece hashes as hex strings, in order
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.piece_hashes.iter().map(hex::encode).collect()
    }

    /// Split the concatenated `pieces` string into 20-byte digests
    pub fn split_piece_hashes(pieces: &[u8]) -> Option<Vec<[u8; HASH_LEN]>> {
        if pieces.len() % HASH_LEN != 0 {
            return None;
        }

        let hashes = pieces
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        Some(hashes)
    }

    /// Number of pieces implied by `length` and `piece_length`
    pub fn expected_piece_count(length: u64, piece_length: u64) -> u64 {
        if piece_length == 0 {
            return 0;
        }
        length.div_ceil(piece_length)
    }
}

impl Torrent {
    /// Info hash of the torrent's info dictionary
    pub fn info_hash(&self) -> [u8; HASH_LEN] {
        self.info.info_hash()
    }

    /// Total size of the described file
    pub fn total_size(&self) -> u64 {
        self.info.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info(length: u64, piece_length: u64) -> TorrentInfo {
        let count = TorrentInfo::expected_piece_count(length, piece_length) as usize;
        TorrentInfo {
            length,
            name: b"sample.txt".to_vec(),
            piece_length,
            piece_hashes: (0..count).map(|i| [i as u8; 20]).collect(),
        }
    }

    #[test]
    fn test_info_hash_is_deterministic() {
        let info = sample_info(1048576, 262144);
        assert_eq!(info.info_hash(), info.info_hash());
        assert_eq!(info.info_hash_hex().len(), 40);
    }

    #[test]
    fn test_info_hash_changes_with_each_field() {
        let base = sample_info(1048576, 262144);
        let base_hash = base.info_hash();

        let mut changed = base.clone();
        changed.length += 1;
        assert_ne!(changed.info_hash(), base_hash);

        let mut changed = base.clone();
        changed.name = b"other.txt".to_vec();
        assert_ne!(changed.info_hash(), base_hash);

        let mut changed = base.clone();
        changed.piece_length = 131072;
        assert_ne!(changed.info_hash(), base_hash);

        let mut changed = base.clone();
        changed.piece_hashes[0][0] ^= 1;
        assert_ne!(changed.info_hash(), base_hash);
    }

    #[test]
    fn test_info_hash_matches_manual_encoding() {
        let info = TorrentInfo {
            length: 10,
            name: b"a".to_vec(),
            piece_length: 5,
            piece_hashes: vec![[b'x'; 20], [b'y'; 20]],
        };
        let mut raw = b"d6:lengthi10e4:name1:a12:piece lengthi5e6:pieces40:".to_vec();
        raw.extend_from_slice(&[b'x'; 20]);
        raw.extend_from_slice(&[b'y'; 20]);
        raw.push(b'e');

        let expected: [u8; 20] = Sha1::digest(&raw).into();
        assert_eq!(info.info_hash(), expected);
    }

    #[test]
    fn test_piece_size_even_split() {
        let info = sample_info(1048576, 262144);
        assert_eq!(info.num_pieces(), 4);
        let last = info.num_pieces() - 1;
        assert_eq!(info.piece_size(0), Some(262144));
        assert_eq!(info.piece_size(last), Some((1048576 - 262144 * last as u64) as usize));
        assert!(info.piece_size(last).unwrap() <= 262144);
        assert_eq!(info.piece_size(4), None);
    }

    #[test]
    fn test_piece_size_short_last_piece() {
        let info = sample_info(92063, 32768);
        assert_eq!(info.num_pieces(), 3);
        assert_eq!(info.piece_size(0), Some(32768));
        assert_eq!(info.piece_size(1), Some(32768));
        assert_eq!(info.piece_size(2), Some(92063 - 2 * 32768));
    }

    #[test]
    fn test_piece_offset_and_hash() {
        let info = sample_info(92063, 32768);
        assert_eq!(info.piece_offset(2), Some(65536));
        assert_eq!(info.piece_offset(3), None);
        assert_eq!(info.piece_hash(1), Some([1u8; 20]));
        assert_eq!(info.piece_hash(3), None);
        assert_eq!(info.piece_hashes_hex()[1], "01".repeat(20));
    }

    #[test]
    fn test_split_piece_hashes() {
        let raw: Vec<u8> = (0..40).collect();
        let hashes = TorrentInfo::split_piece_hashes(&raw).unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[1][0], 20);
        assert!(TorrentInfo::split_piece_hashes(&[0u8; 21]).is_none());
    }
}
