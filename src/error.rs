//! Error types for the torrent client
//!
//! This module defines the error taxonomy shared by the bencode codec,
//! metainfo parsing, tracker announces and the peer wire protocol.

use std::fmt;

/// Error type for all torrent client operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Bytes that are not valid bencode
    MalformedEncoding {
        message: String,
        position: Option<usize>,
    },

    /// Well-formed bencode with the wrong shape for a torrent
    InvalidMetadata {
        message: String,
        field: Option<String>,
    },

    /// Tracker could not be reached (transport failure)
    TrackerUnreachable {
        message: String,
        url: Option<String>,
        source: Option<String>,
    },

    /// Tracker answered with something we cannot use
    TrackerProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Peer handshake did not complete or did not match
    HandshakeFailed {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Peer sent a message we did not expect or could not frame
    ProtocolViolation {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Assembled piece does not match its declared digest
    HashVerificationFailed {
        piece_index: u32,
        expected: String,
        actual: String,
    },

    /// Connection level I/O failure, including timeouts
    Io {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new MalformedEncoding error
    pub fn malformed(message: impl Into<String>) -> Self {
        TorrentError::MalformedEncoding {
            message: message.into(),
            position: None,
        }
    }

    /// Create a new MalformedEncoding error at a byte position
    pub fn malformed_at(message: impl Into<String>, position: usize) -> Self {
        TorrentError::MalformedEncoding {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Create a new InvalidMetadata error
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        TorrentError::InvalidMetadata {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new InvalidMetadata error naming the offending key
    pub fn invalid_metadata_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::InvalidMetadata {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new TrackerUnreachable error
    pub fn tracker_unreachable(message: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::TrackerUnreachable {
            message: message.into(),
            url: Some(url.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new TrackerProtocolError
    pub fn tracker_protocol(message: impl Into<String>) -> Self {
        TorrentError::TrackerProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new TrackerProtocolError with source
    pub fn tracker_protocol_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::TrackerProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new HandshakeFailed error
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        TorrentError::HandshakeFailed {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new ProtocolViolation
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        TorrentError::ProtocolViolation {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new HashVerificationFailed error
    pub fn hash_mismatch(piece_index: u32, expected: &[u8; 20], actual: &[u8; 20]) -> Self {
        TorrentError::HashVerificationFailed {
            piece_index,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }

    /// Create a new Io error
    pub fn io(message: impl Into<String>) -> Self {
        TorrentError::Io {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new Io error with peer and source
    pub fn io_full(message: impl Into<String>, peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Io {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Attach the remote peer to peer-facing errors that do not carry one yet
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        match &mut self {
            TorrentError::HandshakeFailed { peer, .. }
            | TorrentError::ProtocolViolation { peer, .. }
            | TorrentError::Io { peer, .. } => {
                if peer.is_none() {
                    *peer = Some(addr.into());
                }
            }
            _ => {}
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::TrackerUnreachable { source, .. }
            | TorrentError::TrackerProtocolError { source, .. }
            | TorrentError::HandshakeFailed { source, .. }
            | TorrentError::ProtocolViolation { source, .. }
            | TorrentError::Io { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }

    /// Whether a fresh attempt at the same piece may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TorrentError::HashVerificationFailed { .. } | TorrentError::Io { .. })
    }

    /// Classify an `anyhow` error produced by this crate
    pub fn classify(err: &anyhow::Error) -> Option<&TorrentError> {
        err.downcast_ref::<TorrentError>()
    }
}

fn write_peer_source(f: &mut fmt::Formatter<'_>, peer: &Option<String>, source: &Option<String>) -> fmt::Result {
    match (peer, source) {
        (Some(p), Some(s)) => write!(f, " (peer: {}, source: {})", p, s),
        (Some(p), None) => write!(f, " (peer: {})", p),
        (None, Some(s)) => write!(f, " (source: {})", s),
        (None, None) => Ok(()),
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::MalformedEncoding { message, position } => {
                if let Some(pos) = position {
                    write!(f, "Malformed bencode: {} (at byte {})", message, pos)
                } else {
                    write!(f, "Malformed bencode: {}", message)
                }
            }
            TorrentError::InvalidMetadata { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Invalid metadata: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Invalid metadata: {}", message)
                }
            }
            TorrentError::TrackerUnreachable { message, url, source } => {
                match (url, source) {
                    (Some(u), Some(s)) => write!(f, "Tracker unreachable: {} (url: {}, source: {})", message, u, s),
                    (Some(u), None) => write!(f, "Tracker unreachable: {} (url: {})", message, u),
                    (None, Some(s)) => write!(f, "Tracker unreachable: {} (source: {})", message, s),
                    (None, None) => write!(f, "Tracker unreachable: {}", message),
                }
            }
            TorrentError::TrackerProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Tracker protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Tracker protocol error: {}", message)
                }
            }
            TorrentError::HandshakeFailed { message, peer, source } => {
                write!(f, "Handshake failed: {}", message)?;
                write_peer_source(f, peer, source)
            }
            TorrentError::ProtocolViolation { message, peer, source } => {
                write!(f, "Protocol violation: {}", message)?;
                write_peer_source(f, peer, source)
            }
            TorrentError::HashVerificationFailed { piece_index, expected, actual } => {
                write!(f, "Hash verification failed for piece {}: expected {}, got {}", piece_index, expected, actual)
            }
            TorrentError::Io { message, peer, source } => {
                write!(f, "I/O error: {}", message)?;
                write_peer_source(f, peer, source)
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::Io {
            message: err.to_string(),
            peer: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::io("Operation timed out")
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
        TorrentError::tracker_unreachable("HTTP request failed", url, err.to_string())
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::config_error_with_field(format!("Failed to parse address: {}", err), "peer address")
    }
}
