//! HTTP tracker announce
//!
//! Builds the announce GET request, sends it with reqwest and decodes the
//! bencoded response into a peer list.

use async_trait::async_trait;
use anyhow::Result;
use tracing::{debug, info, warn};
use url::Url;

use crate::bencode::{self, BencodeValue};
use crate::config::ClientConfig;
use crate::error::TorrentError;
use crate::torrent::Torrent;
use crate::tracker::peers::{parse_compact_peers, parse_peer_list, PeerAddress};

/// Source of candidate peers for a torrent
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Return peers in the order they should be tried
    async fn discover_peers(&self, torrent: &Torrent) -> Result<Vec<PeerAddress>>;
}

/// Parameters of one announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// Announce for a fresh download of `torrent`
    pub fn new(torrent: &Torrent, config: &ClientConfig) -> Self {
        Self {
            info_hash: torrent.info_hash(),
            peer_id: config.peer_id,
            port: config.port,
            uploaded: 0,
            downloaded: 0,
            left: torrent.total_size(),
        }
    }

    /// Query string; binary values are percent-encoded byte by byte
    pub fn query_string(&self) -> String {
        format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left,
        )
    }

    /// Full announce URL, keeping any query the tracker URL already carries
    pub fn build_url(&self, tracker_url: &str) -> Result<Url> {
        let mut url = Url::parse(tracker_url).map_err(|e| {
            TorrentError::tracker_unreachable("Invalid tracker URL", tracker_url, e.to_string())
        })?;

        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, self.query_string()),
            _ => self.query_string(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

/// Decoded tracker response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before re-announcing
    pub interval: Option<i64>,
    pub peers: Vec<PeerAddress>,
}

impl AnnounceResponse {
    /// Parse a bencoded response body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let decoded = bencode::decode(body).map_err(|e| {
            TorrentError::tracker_protocol_with_source("response is not valid bencode", e.to_string())
        })?;

        let dict = decoded.as_dict().ok_or_else(|| {
            TorrentError::tracker_protocol(format!("response must be a dictionary, got {}", decoded.kind()))
        })?;

        if let Some(reason) = dict.get(b"failure reason".as_slice()) {
            let reason = reason.as_bytes().map(String::from_utf8_lossy).unwrap_or_default();
            return Err(TorrentError::tracker_protocol_with_source("tracker reported failure", reason).into());
        }

        let peers = match dict.get(b"peers".as_slice()) {
            Some(BencodeValue::Bytes(compact)) => parse_compact_peers(compact)?,
            Some(BencodeValue::List(entries)) => parse_peer_list(entries)?,
            Some(other) => {
                return Err(TorrentError::tracker_protocol(format!("'peers' has unexpected kind {}", other.kind())).into())
            }
            None => return Err(TorrentError::tracker_protocol("response has no 'peers' key").into()),
        };

        let interval = dict.get(b"interval".as_slice()).and_then(|v| v.as_integer());
        Ok(Self { interval, peers })
    }
}

/// Tracker client speaking the HTTP announce protocol
pub struct HttpTracker {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTracker {
    /// Create a tracker client using `config.tracker_timeout`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.tracker_timeout)
            .build()
            .map_err(TorrentError::from)?;
        Ok(Self::with_client(client, config))
    }

    /// Create a tracker client around an existing reqwest client
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// Announce to the torrent's tracker and return its response
    pub async fn announce(&self, torrent: &Torrent) -> Result<AnnounceResponse> {
        let request = AnnounceRequest::new(torrent, &self.config);
        let url = request.build_url(&torrent.tracker_url)?;
        info!("Announcing to tracker: {}", torrent.tracker_url);
        debug!("Announce URL: {}", url);

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            debug!("Tracker request to {} failed: {}", torrent.tracker_url, e);
            TorrentError::from(e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(TorrentError::from)?;
        debug!("Tracker answered {} with {} bytes", status, body.len());

        match AnnounceResponse::parse(&body) {
            Ok(parsed) => {
                info!("Tracker returned {} peers", parsed.peers.len());
                Ok(parsed)
            }
            Err(e) if !status.is_success() => {
                warn!("Tracker returned HTTP {}: {}", status, e);
                Err(TorrentError::tracker_unreachable(format!("HTTP status {}", status), url.as_str(), e.to_string()).into())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PeerDiscovery for HttpTracker {
    async fn discover_peers(&self, torrent: &Torrent) -> Result<Vec<PeerAddress>> {
        Ok(self.announce(torrent).await?.peers)
    }
}

/// A fixed peer list, for when the peer is already known
#[derive(Debug, Clone, Default)]
pub struct StaticPeers(pub Vec<PeerAddress>);

#[async_trait]
impl PeerDiscovery for StaticPeers {
    async fn discover_peers(&self, _torrent: &Torrent) -> Result<Vec<PeerAddress>> {
        Ok(self.0.clone())
    }
}
