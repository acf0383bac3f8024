//! Wire protocol utilities
//!
//! Reading and writing handshakes and length-prefixed messages on any async
//! byte stream.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::Message;
use crate::error::TorrentError;

/// Largest frame we accept: a 16 KiB block plus generous headroom for bitfields
pub const MAX_MESSAGE_LEN: u32 = 1 << 21;

/// Length prefix and id of a framed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length prefix: id byte plus payload
    pub length: u32,
    /// Message id, `None` for keep-alives
    pub id: Option<u8>,
}

impl FrameHeader {
    /// Payload bytes following the id
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }
}

fn io_error(err: std::io::Error, what: &str) -> TorrentError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TorrentError::io(format!("connection closed while reading {}", what))
    } else {
        TorrentError::from(err).with_context(format!("reading {}", what))
    }
}

/// Write our handshake
pub async fn write_handshake<W: AsyncWrite + Unpin>(writer: &mut W, handshake: &Handshake) -> Result<()> {
    writer.write_all(&handshake.serialize()).await.map_err(TorrentError::from)?;
    writer.flush().await.map_err(TorrentError::from)?;
    Ok(())
}

/// Read exactly 68 handshake bytes; a short stream is a failed handshake
pub async fn read_handshake<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Handshake> {
    let mut buf = [0u8; HANDSHAKE_LEN];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TorrentError::handshake_failed("connection closed before 68 handshake bytes arrived")
        } else {
            TorrentError::from(e).with_context("reading handshake")
        }
    })?;
    Handshake::deserialize(&buf)
}

/// Read a length prefix and, unless it is a keep-alive, the id byte
pub async fn read_frame_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<FrameHeader> {
    let length = reader.read_u32().await.map_err(|e| io_error(e, "length prefix"))?;

    if length == 0 {
        return Ok(FrameHeader { length, id: None });
    }

    if length > MAX_MESSAGE_LEN {
        return Err(TorrentError::protocol_violation(format!(
            "frame length {} exceeds limit {}",
            length, MAX_MESSAGE_LEN
        ))
        .into());
    }

    let id = reader.read_u8().await.map_err(|e| io_error(e, "message id"))?;
    trace!("Frame header: length={}, id={}", length, id);
    Ok(FrameHeader { length, id: Some(id) })
}

/// Fill `buf` completely, accumulating partial reads
pub async fn read_into<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).await.map_err(|e| io_error(e, "message payload"))?;
    Ok(())
}

/// Read the payload that follows `header` and parse it
pub async fn read_body<R: AsyncRead + Unpin>(reader: &mut R, header: FrameHeader) -> Result<Message> {
    let Some(id) = header.id else {
        return Ok(Message::KeepAlive);
    };

    let mut payload = vec![0u8; header.payload_len()];
    read_into(reader, &mut payload).await?;
    Message::parse(id, &payload)
}

/// Read a complete message from the stream
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let header = read_frame_header(reader).await?;
    read_body(reader, header).await
}

/// Write a message to the stream
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    writer.write_all(&message.serialize()).await.map_err(TorrentError::from)?;
    writer.flush().await.map_err(TorrentError::from)?;
    Ok(())
}
