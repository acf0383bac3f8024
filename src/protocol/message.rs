//! BitTorrent protocol messages
//!
//! Every framed message is `[4-byte big-endian length][1-byte id][payload]`,
//! where the length counts the id byte and the payload.

use bytes::{Buf, BufMut, BytesMut};
use anyhow::Result;
use tracing::{debug, trace};

use crate::error::TorrentError;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_violation(format!("unknown message id {}", value))),
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        if let Some(id) = self.message_id() {
            buf.put_u8(id as u8);
        }

        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
        }

        buf.to_vec()
    }

    /// Parse a message body (id byte already split off)
    ///
    /// Fixed-size messages must carry exactly their payload size; anything else
    /// means the length prefix disagrees with the message kind.
    pub fn parse(id: u8, payload: &[u8]) -> Result<Self> {
        let message_id = MessageId::try_from(id)?;
        let mut buf = payload;

        let expect_len = |expected: usize| -> Result<()> {
            if payload.len() != expected {
                debug!("{:?} payload is {} bytes, expected {}", message_id, payload.len(), expected);
                return Err(TorrentError::protocol_violation(format!(
                    "{:?} message with {} payload bytes, expected {}",
                    message_id,
                    payload.len(),
                    expected
                ))
                .into());
            }
            Ok(())
        };

        let message = match message_id {
            MessageId::Choke => {
                expect_len(0)?;
                Message::Choke
            }
            MessageId::Unchoke => {
                expect_len(0)?;
                Message::Unchoke
            }
            MessageId::Interested => {
                expect_len(0)?;
                Message::Interested
            }
            MessageId::NotInterested => {
                expect_len(0)?;
                Message::NotInterested
            }
            MessageId::Have => {
                expect_len(4)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: payload.to_vec() },
            MessageId::Request => {
                expect_len(12)?;
                Message::Request { index: buf.get_u32(), begin: buf.get_u32(), length: buf.get_u32() }
            }
            MessageId::Cancel => {
                expect_len(12)?;
                Message::Cancel { index: buf.get_u32(), begin: buf.get_u32(), length: buf.get_u32() }
            }
            MessageId::Piece => {
                if payload.len() < 8 {
                    return Err(TorrentError::protocol_violation(format!(
                        "Piece message with {} payload bytes, expected at least 8",
                        payload.len()
                    ))
                    .into());
                }
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf.to_vec() }
            }
        };

        trace!("Parsed {:?}", message_id);
        Ok(message)
    }

    /// Deserialize a message from bytes (including length prefix)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(TorrentError::protocol_violation("message shorter than its length prefix").into());
        }

        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let body = &data[4..];
        if body.len() != length {
            return Err(TorrentError::protocol_violation(format!(
                "length prefix {} does not match {} body bytes",
                length,
                body.len()
            ))
            .into());
        }

        match body.split_first() {
            None => Ok(Message::KeepAlive),
            Some((&id, payload)) => Self::parse(id, payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_violation(err: &anyhow::Error) -> bool {
        matches!(TorrentError::classify(err), Some(TorrentError::ProtocolViolation { .. }))
    }

    #[test]
    fn test_interested_wire_bytes() {
        assert_eq!(Message::Interested.serialize(), vec![0, 0, 0, 1, 2]);
        assert_eq!(Message::KeepAlive.serialize(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_request_wire_bytes() {
        let bytes = Message::Request { index: 1, begin: 16384, length: 16384 }.serialize();
        assert_eq!(bytes, vec![0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]);
    }

    #[test]
    fn test_piece_message() {
        let message = Message::Piece { index: 10, begin: 32, block: vec![1, 2, 3] };
        assert_eq!(message.length(), 12);
        assert_eq!(Message::deserialize(&message.serialize()).unwrap(), message);
    }

    #[test]
    fn test_deserialize_keepalive_and_have() {
        assert_eq!(Message::deserialize(&[0, 0, 0, 0]).unwrap(), Message::KeepAlive);
        assert_eq!(
            Message::deserialize(&[0, 0, 0, 5, 4, 0, 0, 0, 42]).unwrap(),
            Message::Have { piece_index: 42 }
        );
    }

    #[test]
    fn test_length_prefix_mismatch() {
        // prefix claims 2 bytes for an unchoke
        assert!(is_violation(&Message::deserialize(&[0, 0, 0, 2, 1, 0]).unwrap_err()));
        // prefix disagrees with the bytes present
        assert!(is_violation(&Message::deserialize(&[0, 0, 0, 5, 1]).unwrap_err()));
        // request with a short payload
        assert!(is_violation(&Message::parse(6, &[0; 8]).unwrap_err()));
        assert!(is_violation(&Message::parse(7, &[0; 7]).unwrap_err()));
    }

    #[test]
    fn test_unknown_id() {
        assert!(is_violation(&Message::parse(20, &[]).unwrap_err()));
        assert!(MessageId::try_from(9).is_err());
        assert_eq!(MessageId::try_from(5).unwrap(), MessageId::Bitfield);
    }

    #[test]
    fn test_message_id() {
        assert_eq!(Message::Unchoke.message_id(), Some(MessageId::Unchoke));
        assert_eq!(Message::Bitfield { bitfield: vec![] }.message_id(), Some(MessageId::Bitfield));
        assert_eq!(Message::Cancel { index: 0, begin: 0, length: 0 }.message_id(), Some(MessageId::Cancel));
        assert_eq!(Message::KeepAlive.message_id(), None);
    }
}
