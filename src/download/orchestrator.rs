//! Download orchestrator
//!
//! Fetches pieces in ascending order over one reused peer session and streams
//! each verified piece to the output.

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::TorrentError;
use crate::peer::PeerSession;
use crate::torrent::{Torrent, TorrentInfo};
use crate::tracker::{PeerAddress, PeerDiscovery};

/// How many times a piece is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: usize,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    /// Whether another attempt should follow failed attempt number `attempt` (1-based)
    pub fn should_retry(&self, err: &anyhow::Error, attempt: usize) -> bool {
        attempt <= self.max_retries && TorrentError::classify(err).map_or(false, TorrentError::is_retryable)
    }
}

/// Progress after a piece was verified and written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceProgress {
    pub index: usize,
    pub completed: usize,
    pub total: usize,
    pub piece_bytes: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

/// Outcome of a full download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub pieces: usize,
    pub bytes: u64,
    /// Failed attempts that were retried
    pub retries: usize,
    pub elapsed: Duration,
}

/// Rotates through the known peers, keeping one live session
struct PeerRotation<'a> {
    peers: Vec<PeerAddress>,
    next: usize,
    session: Option<PeerSession<TcpStream>>,
    info_hash: [u8; 20],
    config: &'a ClientConfig,
}

impl<'a> PeerRotation<'a> {
    fn new(peers: Vec<PeerAddress>, info_hash: [u8; 20], config: &'a ClientConfig) -> Self {
        Self { peers, next: 0, session: None, info_hash, config }
    }

    async fn session(&mut self) -> Result<&mut PeerSession<TcpStream>> {
        if self.session.is_none() {
            let addr = self.peers[self.next % self.peers.len()];
            self.next += 1;
            let mut session = PeerSession::connect(addr, self.info_hash, self.config).await?;
            session.prepare().await?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| TorrentError::io("no peer session available").into())
    }

    /// Download one piece, reconnecting to the next peer after a retryable failure
    async fn fetch(&mut self, info: &TorrentInfo, index: usize, policy: RetryPolicy, retries: &mut usize) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.session().await {
                Ok(session) => session.download_piece(info, index).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(data) => return Ok(data),
                Err(e) => {
                    // a failed session may be out of sync with the peer
                    self.session = None;
                    if !policy.should_retry(&e, attempt) {
                        debug!("Piece {} failed after {} attempt(s): {}", index, attempt, e);
                        return Err(e);
                    }
                    warn!("Piece {} attempt {} failed: {}; retrying", index, attempt, e);
                    *retries += 1;
                }
            }
        }
    }
}

/// Sequential single-connection downloader
pub struct Downloader<D> {
    discovery: D,
    config: ClientConfig,
}

impl<D: PeerDiscovery> Downloader<D> {
    pub fn new(discovery: D, config: ClientConfig) -> Self {
        Self { discovery, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries)
    }

    async fn peers(&self, torrent: &Torrent) -> Result<Vec<PeerAddress>> {
        let peers = self.discovery.discover_peers(torrent).await?;
        if peers.is_empty() {
            return Err(TorrentError::tracker_protocol("tracker returned no peers").into());
        }
        debug!("Discovered {} peers", peers.len());
        Ok(peers)
    }

    /// Download and verify a single piece
    pub async fn download_piece(&self, torrent: &Torrent, index: usize) -> Result<Vec<u8>> {
        let peers = self.peers(torrent).await?;
        let mut rotation = PeerRotation::new(peers, torrent.info_hash(), &self.config);
        let mut retries = 0;
        rotation.fetch(&torrent.info, index, self.policy(), &mut retries).await
    }

    /// Download every piece in order, writing each one to `writer` as soon as it verifies
    pub async fn download_file<W, F>(&self, torrent: &Torrent, writer: &mut W, mut on_piece: F) -> Result<DownloadSummary>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(PieceProgress),
    {
        let info = &torrent.info;
        let total = info.num_pieces();
        info!("Downloading {} ({} bytes, {} pieces)", info.display_name(), info.length, total);

        let started = Instant::now();
        let peers = self.peers(torrent).await?;
        let mut rotation = PeerRotation::new(peers, torrent.info_hash(), &self.config);
        let policy = self.policy();
        let mut retries = 0;
        let mut downloaded_bytes = 0u64;

        for index in 0..total {
            let data = match rotation.fetch(info, index, policy, &mut retries).await {
                Ok(data) => data,
                Err(e) => {
                    // verified pieces already written stay in the output
                    if let Err(flush_err) = writer.flush().await {
                        debug!("Flushing partial output failed: {}", flush_err);
                    }
                    return Err(e);
                }
            };
            writer
                .write_all(&data)
                .await
                .map_err(|e| TorrentError::from(e).with_context("writing output"))?;

            downloaded_bytes += data.len() as u64;
            on_piece(PieceProgress {
                index,
                completed: index + 1,
                total,
                piece_bytes: data.len(),
                downloaded_bytes,
                total_bytes: info.length,
            });
        }

        writer.flush().await.map_err(|e| TorrentError::from(e).with_context("flushing output"))?;

        let summary = DownloadSummary {
            pieces: total,
            bytes: downloaded_bytes,
            retries,
            elapsed: started.elapsed(),
        };
        info!("Download complete: {} pieces, {} bytes in {:?}", summary.pieces, summary.bytes, summary.elapsed);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::mock::{fixture, sample_content, spawn_listener, MockPeer};
    use crate::protocol::Message;
    use crate::tracker::StaticPeers;

    const PIECE_LEN: usize = 20_000;

    fn test_config() -> ClientConfig {
        let mut config = ClientConfig::with_peer_id(*b"-RC0100-orchestrator");
        config.io_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(5);
        config
    }

    fn content_and_torrent() -> (Vec<u8>, Torrent, Vec<Vec<u8>>) {
        let content = sample_content(3 * PIECE_LEN + 1234);
        let (torrent, pieces) = fixture(&content, PIECE_LEN, "http://tracker.invalid/announce");
        (content, torrent, pieces)
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::new(2);
        let retryable: anyhow::Error = TorrentError::io("reset").into();
        let fatal: anyhow::Error = TorrentError::protocol_violation("bad").into();

        assert!(policy.should_retry(&retryable, 1));
        assert!(policy.should_retry(&retryable, 2));
        assert!(!policy.should_retry(&retryable, 3));
        assert!(!policy.should_retry(&fatal, 1));
        assert!(!policy.should_retry(&anyhow::anyhow!("untyped"), 1));
    }

    #[tokio::test]
    async fn test_download_file_in_order() {
        let (content, torrent, pieces) = content_and_torrent();
        let addr = spawn_listener(vec![MockPeer::new(pieces)]).await;
        let downloader = Downloader::new(StaticPeers(vec![addr]), test_config());

        let mut output = Vec::new();
        let mut seen = Vec::new();
        let summary = downloader
            .download_file(&torrent, &mut output, |progress| seen.push(progress.index))
            .await
            .unwrap();

        assert_eq!(output, content);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(summary.pieces, 4);
        assert_eq!(summary.bytes, content.len() as u64);
        assert_eq!(summary.retries, 0);
    }

    #[tokio::test]
    async fn test_corrupt_piece_retried_on_next_peer() {
        let (content, torrent, pieces) = content_and_torrent();
        let mut bad = MockPeer::new(pieces.clone());
        bad.corrupt_piece = Some(2);
        let addr = spawn_listener(vec![bad, MockPeer::new(pieces)]).await;
        let downloader = Downloader::new(StaticPeers(vec![addr]), test_config());

        let mut output = Vec::new();
        let summary = downloader.download_file(&torrent, &mut output, |_| {}).await.unwrap();
        assert_eq!(output, content);
        assert_eq!(summary.retries, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (_, torrent, pieces) = content_and_torrent();
        let mut bad = MockPeer::new(pieces);
        bad.corrupt_piece = Some(0);
        let addr = spawn_listener(vec![bad]).await;

        let mut config = test_config();
        config.max_retries = 1;
        let downloader = Downloader::new(StaticPeers(vec![addr]), config);

        let mut output = Vec::new();
        let err = downloader.download_file(&torrent, &mut output, |_| {}).await.unwrap_err();
        assert!(matches!(
            TorrentError::classify(&err),
            Some(TorrentError::HashVerificationFailed { piece_index: 0, .. })
        ));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_failure_flushes_verified_prefix() {
        let (content, torrent, pieces) = content_and_torrent();
        let mut bad = MockPeer::new(pieces);
        bad.corrupt_piece = Some(2);
        let addr = spawn_listener(vec![bad]).await;

        let mut config = test_config();
        config.max_retries = 0;
        let downloader = Downloader::new(StaticPeers(vec![addr]), config);

        let mut writer = tokio::io::BufWriter::with_capacity(1 << 20, Vec::new());
        let err = downloader.download_file(&torrent, &mut writer, |_| {}).await.unwrap_err();
        assert!(matches!(
            TorrentError::classify(&err),
            Some(TorrentError::HashVerificationFailed { piece_index: 2, .. })
        ));
        assert_eq!(writer.buffer().len(), 0);
        assert_eq!(writer.get_ref().as_slice(), &content[..2 * PIECE_LEN]);
    }

    #[tokio::test]
    async fn test_protocol_violation_is_not_retried() {
        let (_, torrent, pieces) = content_and_torrent();
        let mut rude = MockPeer::new(pieces);
        rude.instead_of_unchoke = Some(Message::NotInterested);
        let addr = spawn_listener(vec![rude]).await;
        let downloader = Downloader::new(StaticPeers(vec![addr]), test_config());

        let err = downloader.download_piece(&torrent, 1).await.unwrap_err();
        assert!(matches!(TorrentError::classify(&err), Some(TorrentError::ProtocolViolation { .. })));
    }

    #[tokio::test]
    async fn test_download_single_piece() {
        let (_, torrent, pieces) = content_and_torrent();
        let addr = spawn_listener(vec![MockPeer::new(pieces.clone())]).await;
        let downloader = Downloader::new(StaticPeers(vec![addr]), test_config());

        assert_eq!(downloader.download_piece(&torrent, 3).await.unwrap(), pieces[3]);
    }

    #[tokio::test]
    async fn test_no_peers() {
        let (_, torrent, _) = content_and_torrent();
        let downloader = Downloader::new(StaticPeers::default(), test_config());
        let err = downloader.download_piece(&torrent, 0).await.unwrap_err();
        assert!(matches!(TorrentError::classify(&err), Some(TorrentError::TrackerProtocolError { .. })));
    }
}
