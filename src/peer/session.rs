//! Peer session module
//!
//! Drives one peer connection through handshake, bitfield, interested and
//! unchoke, then downloads and verifies pieces over it.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::piece::PieceBuffer;
use super::state::{Bitfield, SessionState};
use crate::config::ClientConfig;
use crate::error::TorrentError;
use crate::protocol::{wire, Handshake, Message, MessageId};
use crate::torrent::TorrentInfo;
use crate::tracker::PeerAddress;

/// Run `fut`, turning expiry of `limit` into an `Io` error
async fn deadline<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Timed out after {:?} {}", limit, what);
            Err(TorrentError::io(format!("timed out after {:?} {}", limit, what)).into())
        }
    }
}

fn describe(message: &Message) -> String {
    match message.message_id() {
        Some(id) => format!("{:?}", id),
        None => "KeepAlive".to_string(),
    }
}

/// One connection to one peer, owned by a single task
pub struct PeerSession<S> {
    stream: S,
    /// Remote label used in logs and errors
    peer: String,
    info_hash: [u8; 20],
    remote_peer_id: [u8; 20],
    state: SessionState,
    bitfield: Option<Bitfield>,
    config: ClientConfig,
}

impl PeerSession<TcpStream> {
    /// Connect to a peer over TCP and perform the handshake
    pub async fn connect(addr: PeerAddress, info_hash: [u8; 20], config: &ClientConfig) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let stream = timeout(config.connect_timeout, TcpStream::connect(addr.socket_addr()))
            .await
            .map_err(|_| {
                debug!("Connection timeout to {}", addr);
                TorrentError::io_full(
                    "connection timed out",
                    addr.to_string(),
                    format!("no answer within {:?}", config.connect_timeout),
                )
            })?
            .map_err(|e| {
                debug!("Failed to connect to {}: {}", addr, e);
                TorrentError::io_full("failed to connect", addr.to_string(), e.to_string())
            })?;

        debug!("Connected to peer: {}", addr);
        Self::handshake(stream, addr.to_string(), info_hash, config).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerSession<S> {
    /// Exchange handshakes over an already connected stream
    pub async fn handshake(stream: S, peer: impl Into<String>, info_hash: [u8; 20], config: &ClientConfig) -> Result<Self> {
        let mut session = Self {
            stream,
            peer: peer.into(),
            info_hash,
            remote_peer_id: [0u8; 20],
            state: SessionState::Disconnected,
            bitfield: None,
            config: config.clone(),
        };

        let result = session.exchange_handshake().await;
        result.map_err(|e| session.tag(e))?;
        info!("Handshake completed with peer: {}", session.peer);
        Ok(session)
    }

    /// Remote peer id from its handshake
    pub fn peer_id(&self) -> [u8; 20] {
        self.remote_peer_id
    }

    pub fn peer_id_hex(&self) -> String {
        hex::encode(self.remote_peer_id)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bitfield(&self) -> Option<&Bitfield> {
        self.bitfield.as_ref()
    }

    /// Wait for the bitfield, declare interest and wait to be unchoked.
    /// Does nothing once the peer has unchoked us.
    pub async fn prepare(&mut self) -> Result<()> {
        if self.state.can_request() {
            return Ok(());
        }
        let result = self.prepare_inner().await;
        result.map_err(|e| self.tag(e))
    }

    /// Download one piece and check it against its digest
    pub async fn download_piece(&mut self, info: &TorrentInfo, index: usize) -> Result<Vec<u8>> {
        let result = self.download_piece_inner(info, index).await;
        result.map_err(|e| self.tag(e))
    }

    fn tag(&self, err: anyhow::Error) -> anyhow::Error {
        match err.downcast::<TorrentError>() {
            Ok(typed) => typed.with_peer(self.peer.clone()).into(),
            Err(other) => other,
        }
    }

    async fn send(&mut self, message: &Message, what: &str) -> Result<()> {
        trace!("Sending {} to {}", describe(message), self.peer);
        deadline(self.config.io_timeout, what, wire::write_message(&mut self.stream, message)).await
    }

    async fn recv(&mut self, what: &str) -> Result<Message> {
        let message = deadline(self.config.io_timeout, what, wire::read_message(&mut self.stream)).await?;
        trace!("Received {} from {}", describe(&message), self.peer);
        Ok(message)
    }

    fn record_have(&mut self, piece_index: u32) {
        debug!("Peer {} has piece {}", self.peer, piece_index);
        self.bitfield.get_or_insert_with(Bitfield::default).set_piece(piece_index as usize);
    }

    async fn exchange_handshake(&mut self) -> Result<()> {
        let ours = Handshake::new(self.info_hash, self.config.peer_id);
        debug!("Sending handshake to peer: {}", self.peer);
        deadline(self.config.io_timeout, "sending handshake", wire::write_handshake(&mut self.stream, &ours)).await?;
        self.state = SessionState::HandshakeSent;

        let theirs = deadline(self.config.io_timeout, "reading handshake", wire::read_handshake(&mut self.stream)).await?;
        if self.config.verify_info_hash {
            theirs.verify_info_hash(&self.info_hash)?;
        } else if theirs.info_hash != self.info_hash {
            warn!("Peer {} answered with info hash {}", self.peer, hex::encode(theirs.info_hash));
        }

        self.remote_peer_id = theirs.peer_id;
        self.state = SessionState::HandshakeAcked;
        debug!("Peer {} has id {}", self.peer, hex::encode(theirs.peer_id));
        Ok(())
    }

    async fn prepare_inner(&mut self) -> Result<()> {
        if self.state == SessionState::HandshakeAcked {
            loop {
                match self.recv("waiting for bitfield").await? {
                    Message::KeepAlive => continue,
                    Message::Bitfield { bitfield } => {
                        let bitfield = Bitfield::new(bitfield);
                        debug!("Peer {} advertises {} pieces", self.peer, bitfield.piece_count());
                        self.bitfield = Some(bitfield);
                        break;
                    }
                    other => {
                        return Err(TorrentError::protocol_violation(format!(
                            "expected Bitfield, got {}",
                            describe(&other)
                        ))
                        .into())
                    }
                }
            }
            self.state = SessionState::BitfieldReceived;
        }

        if self.state == SessionState::BitfieldReceived {
            self.send(&Message::Interested, "sending interested").await?;
            self.state = SessionState::Interested;
        }

        if self.state == SessionState::Interested {
            loop {
                match self.recv("waiting for unchoke").await? {
                    Message::KeepAlive => continue,
                    Message::Have { piece_index } => self.record_have(piece_index),
                    Message::Unchoke => break,
                    other => {
                        return Err(TorrentError::protocol_violation(format!(
                            "expected Unchoke, got {}",
                            describe(&other)
                        ))
                        .into())
                    }
                }
            }
            self.state = SessionState::Unchoked;
            debug!("Unchoked by peer: {}", self.peer);
        }

        if !self.state.can_request() {
            return Err(TorrentError::protocol_violation(format!("session not ready for requests ({:?})", self.state)).into());
        }
        Ok(())
    }

    async fn download_piece_inner(&mut self, info: &TorrentInfo, index: usize) -> Result<Vec<u8>> {
        let (size, hash) = match (info.piece_size(index), info.piece_hash(index)) {
            (Some(size), Some(hash)) => (size, hash),
            _ => {
                return Err(TorrentError::config_error_with_field(
                    format!("piece index {} out of range, torrent has {} pieces", index, info.num_pieces()),
                    "piece_index",
                )
                .into())
            }
        };

        let (Ok(wire_index), Ok(wire_size)) = (u32::try_from(index), u32::try_from(size)) else {
            return Err(TorrentError::invalid_metadata_field(
                format!("piece {} ({} bytes) does not fit 32-bit wire fields", index, size),
                "piece length",
            )
            .into());
        };

        self.prepare_inner().await?;

        if self.config.require_piece_availability {
            if let Some(bitfield) = &self.bitfield {
                if !bitfield.has_piece(index) {
                    return Err(TorrentError::protocol_violation(format!("peer does not have piece {}", index)).into());
                }
            }
        }

        info!("Downloading piece {} ({} bytes) from {}", index, size, self.peer);
        let mut piece = PieceBuffer::new(wire_index, wire_size, hash);
        let depth = self.config.pipeline_depth.max(1);
        let io_timeout = self.config.io_timeout;
        self.state = SessionState::Downloading;

        loop {
            while piece.pending_count() < depth {
                let Some(block) = piece.next_request() else {
                    break;
                };
                let request = Message::Request { index: block.index, begin: block.begin, length: block.length };
                self.send(&request, "sending request").await?;
            }

            if piece.is_complete() {
                break;
            }

            let header = deadline(io_timeout, "waiting for piece", wire::read_frame_header(&mut self.stream)).await?;
            match header.id {
                None => trace!("Keep-alive from {}", self.peer),
                Some(id) if id == MessageId::Piece as u8 => {
                    if header.payload_len() < 8 {
                        return Err(TorrentError::protocol_violation(format!(
                            "Piece message with length {} is too short",
                            header.length
                        ))
                        .into());
                    }

                    let mut meta = [0u8; 8];
                    deadline(io_timeout, "reading block header", wire::read_into(&mut self.stream, &mut meta)).await?;
                    let block_index = u32::from_be_bytes([meta[0], meta[1], meta[2], meta[3]]);
                    let begin = u32::from_be_bytes([meta[4], meta[5], meta[6], meta[7]]);

                    let slot = piece.accept_block(block_index, begin, header.payload_len() - 8)?;
                    deadline(io_timeout, "reading block", wire::read_into(&mut self.stream, slot)).await?;
                }
                Some(_) => {
                    let message = deadline(io_timeout, "reading message", wire::read_body(&mut self.stream, header)).await?;
                    match message {
                        Message::Have { piece_index } => self.record_have(piece_index),
                        Message::Unchoke => {}
                        Message::Choke => {
                            return Err(TorrentError::protocol_violation(format!(
                                "choked while downloading piece {}",
                                index
                            ))
                            .into())
                        }
                        other => {
                            return Err(TorrentError::protocol_violation(format!(
                                "unexpected {} while downloading piece {}",
                                describe(&other),
                                index
                            ))
                            .into())
                        }
                    }
                }
            }
        }

        self.state = SessionState::Idle;
        let data = piece.verify().map_err(|e| {
            debug!("Piece {} from {} failed verification", index, self.peer);
            e
        })?;
        info!("Piece {} verified", index);
        Ok(data)
    }
}
