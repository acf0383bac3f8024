//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use anyhow::Result;
use tracing::{debug, info, trace};

use crate::bencode::{self, BencodeDict, BencodeValue};
use crate::error::TorrentError;
use crate::torrent::info::{Torrent, TorrentInfo};

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<Torrent> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let parsed = bencode::decode(data)?;
        let torrent = Self::convert_to_torrent(&parsed)?;

        info!("Parsed torrent '{}' with {} pieces", torrent.info.display_name(), torrent.info.num_pieces());
        Ok(torrent)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &std::path::Path) -> Result<Torrent> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            debug!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::from(e).with_context(format!("reading {}", path.display()))
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// Build a `Torrent` from an already decoded metainfo dictionary
    pub fn convert_to_torrent(parsed: &BencodeValue) -> Result<Torrent> {
        let root = parsed
            .as_dict()
            .ok_or_else(|| TorrentError::invalid_metadata(format!("Root must be a dictionary, got {}", parsed.kind())))?;

        let tracker_url = require_str(root, "announce")?.to_string();

        let info_dict = match root.get(b"info".as_slice()) {
            Some(BencodeValue::Dict(d)) => d,
            Some(other) => {
                return Err(TorrentError::invalid_metadata_field(
                    format!("expected dictionary, got {}", other.kind()),
                    "info",
                )
                .into())
            }
            None => return Err(TorrentError::invalid_metadata_field("missing key", "info").into()),
        };

        let length = require_non_negative(info_dict, "length")?;
        let name = require_bytes(info_dict, "name")?.to_vec();
        let piece_length = require_non_negative(info_dict, "piece length")?;
        if piece_length == 0 {
            return Err(TorrentError::invalid_metadata_field("piece length must be positive", "piece length").into());
        }
        // block offsets within a piece are 32-bit on the wire
        if piece_length > u64::from(u32::MAX) {
            return Err(TorrentError::invalid_metadata_field(
                format!("piece length {} exceeds {}", piece_length, u32::MAX),
                "piece length",
            )
            .into());
        }

        let pieces = require_bytes(info_dict, "pieces")?;
        let piece_hashes = TorrentInfo::split_piece_hashes(pieces).ok_or_else(|| {
            TorrentError::invalid_metadata_field(
                format!("length {} is not a multiple of 20", pieces.len()),
                "pieces",
            )
        })?;

        let expected = TorrentInfo::expected_piece_count(length, piece_length);
        if piece_hashes.len() as u64 != expected {
            return Err(TorrentError::invalid_metadata_field(
                format!("{} piece hashes for {} bytes at {} bytes per piece (expected {})",
                    piece_hashes.len(), length, piece_length, expected),
                "pieces",
            )
            .into());
        }

        debug!("Tracker URL: {}, length: {}, piece length: {}", tracker_url, length, piece_length);
        Ok(Torrent {
            tracker_url,
            info: TorrentInfo {
                length,
                name,
                piece_length,
                piece_hashes,
            },
        })
    }
}

fn require<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a BencodeValue> {
    dict.get(key.as_bytes())
        .ok_or_else(|| TorrentError::invalid_metadata_field("missing key", key).into())
}

fn require_bytes<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a [u8]> {
    let value = require(dict, key)?;
    value.as_bytes().ok_or_else(|| {
        TorrentError::invalid_metadata_field(format!("expected byte string, got {}", value.kind()), key).into()
    })
}

fn require_str<'a>(dict: &'a BencodeDict, key: &str) -> Result<&'a str> {
    let bytes = require_bytes(dict, key)?;
    std::str::from_utf8(bytes)
        .map_err(|_| TorrentError::invalid_metadata_field("not valid UTF-8", key).into())
}

fn require_non_negative(dict: &BencodeDict, key: &str) -> Result<u64> {
    let value = require(dict, key)?;
    let int = value.as_integer().ok_or_else(|| {
        TorrentError::invalid_metadata_field(format!("expected integer, got {}", value.kind()), key)
    })?;
    u64::try_from(int).map_err(|_| TorrentError::invalid_metadata_field("must not be negative", key).into())
}
