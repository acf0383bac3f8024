//! Client configuration
//!
//! Values the tracker client, peer sessions and the download orchestrator read
//! instead of embedding literals.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::error::TorrentError;

/// Prefix of generated peer ids (Azureus style)
pub const PEER_ID_PREFIX: &[u8; 8] = b"-RC0100-";

/// Default port advertised to trackers
pub const DEFAULT_PORT: u16 = 6881;

/// Configuration for the torrent client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Our 20-byte peer id
    pub peer_id: [u8; 20],
    /// Port advertised in announces; we never accept inbound connections
    pub port: u16,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for each read or write on a peer connection
    pub io_timeout: Duration,
    /// Timeout for a tracker announce
    pub tracker_timeout: Duration,
    /// Outstanding block requests per piece
    pub pipeline_depth: usize,
    /// Extra attempts per piece after a retryable failure
    pub max_retries: usize,
    /// Reject handshakes that echo a different info hash
    pub verify_info_hash: bool,
    /// Refuse to request pieces missing from the peer's bitfield
    pub require_piece_availability: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: generate_peer_id(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(15),
            pipeline_depth: 5,
            max_retries: 3,
            verify_info_hash: true,
            require_piece_availability: true,
        }
    }
}

impl ClientConfig {
    /// Default configuration with a fixed peer id
    pub fn with_peer_id(peer_id: [u8; 20]) -> Self {
        Self {
            peer_id,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port").into());
        }

        if self.pipeline_depth == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1", "pipeline_depth").into());
        }

        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("io_timeout", self.io_timeout),
            ("tracker_timeout", self.tracker_timeout),
        ] {
            if value.is_zero() {
                return Err(TorrentError::config_error_with_field("timeout cannot be zero", field).into());
            }
        }

        Ok(())
    }

    /// Peer id as a hex string
    pub fn peer_id_hex(&self) -> String {
        hex::encode(self.peer_id)
    }
}

/// Generate a random peer id with the client prefix
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
    info!("Generated new peer ID: {}", hex::encode(peer_id));
    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 6881);
        assert_eq!(&config.peer_id[..8], PEER_ID_PREFIX);
    }

    #[test]
    fn test_generated_peer_ids_differ() {
        assert_ne!(generate_peer_id(), generate_peer_id());
    }

    #[test]
    fn test_with_peer_id() {
        let config = ClientConfig::with_peer_id(*b"deadbeefliveporkhaha");
        assert_eq!(config.peer_id_hex(), hex::encode(b"deadbeefliveporkhaha"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.pipeline_depth = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.io_timeout = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(matches!(TorrentError::classify(&err), Some(TorrentError::ConfigError { .. })));
    }
}
