//! BitTorrent handshake protocol
//!
//! Handles the fixed 68-byte handshake exchanged before any framed message.

use bytes::{BufMut, BytesMut};
use anyhow::Result;
use tracing::{debug, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Length of a serialized handshake
pub const HANDSHAKE_LEN: usize = 68;

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved extension bits; we always send zeros
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);

        let mut out = [0u8; HANDSHAKE_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Deserialize a handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() < HANDSHAKE_LEN {
            debug!("Handshake data too short: expected {} bytes, got {}", HANDSHAKE_LEN, data.len());
            return Err(TorrentError::handshake_failed(format!(
                "handshake too short: expected {} bytes, got {}",
                HANDSHAKE_LEN,
                data.len()
            ))
            .into());
        }

        if data[0] != PROTOCOL_LENGTH || &data[1..20] != PROTOCOL_STRING {
            debug!("Invalid protocol header in handshake");
            return Err(TorrentError::handshake_failed(format!(
                "unexpected protocol header {:?}",
                String::from_utf8_lossy(&data[..20])
            ))
            .into());
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);
        debug!("Handshake info_hash: {}, peer_id: {}", hex::encode(info_hash), hex::encode(peer_id));

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Check that the remote side answered for the same torrent
    pub fn verify_info_hash(&self, expected_info_hash: &[u8; 20]) -> Result<()> {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake validation failed: info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return Err(TorrentError::handshake_failed(format!(
                "info hash mismatch: expected {}, got {}",
                hex::encode(expected_info_hash),
                hex::encode(self.info_hash)
            ))
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_layout() {
        let handshake = Handshake::new([0xab; 20], *b"deadbeefliveporkhaha");
        let bytes = handshake.serialize();

        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], b"BitTorrent protocol");
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..48], &[0xab; 20]);
        assert_eq!(&bytes[48..68], b"deadbeefliveporkhaha");
    }

    #[test]
    fn test_deserialize_extracts_peer_id() {
        let sent = Handshake::new([1u8; 20], [2u8; 20]);
        let received = Handshake::deserialize(&sent.serialize()).unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn test_deserialize_short_input() {
        let err = Handshake::deserialize(&[19u8; 40]).unwrap_err();
        assert!(matches!(TorrentError::classify(&err), Some(TorrentError::HandshakeFailed { .. })));
    }

    #[test]
    fn test_deserialize_wrong_protocol() {
        let mut bytes = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        bytes[1] = b'b';
        let err = Handshake::deserialize(&bytes).unwrap_err();
        assert!(matches!(TorrentError::classify(&err), Some(TorrentError::HandshakeFailed { .. })));
    }

    #[test]
    fn test_verify_info_hash() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        assert!(handshake.verify_info_hash(&[1u8; 20]).is_ok());
        assert!(handshake.verify_info_hash(&[3u8; 20]).is_err());
    }
}
