//! Per-piece download buffer
//!
//! Plans the block requests for one piece, tracks which are in flight and
//! checks the assembled bytes against the expected digest.

use std::collections::BTreeMap;

use anyhow::Result;
use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::error::TorrentError;

/// Largest block we request
pub const BLOCK_MAX_SIZE: u32 = 16 * 1024;

/// One block request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Split a piece of `piece_size` bytes into blocks in ascending offset order
pub fn plan_blocks(index: u32, piece_size: u32) -> Vec<BlockRequest> {
    (0..piece_size)
        .step_by(BLOCK_MAX_SIZE as usize)
        .map(|begin| BlockRequest {
            index,
            begin,
            length: BLOCK_MAX_SIZE.min(piece_size - begin),
        })
        .collect()
}

/// Assembly state of a piece being downloaded
#[derive(Debug)]
pub struct PieceBuffer {
    index: u32,
    expected_hash: [u8; 20],
    data: Vec<u8>,
    /// Requests not sent yet, in ascending order
    queued: std::vec::IntoIter<BlockRequest>,
    /// Sent but unanswered requests, keyed by block offset
    pending: BTreeMap<u32, u32>,
    received_blocks: usize,
    total_blocks: usize,
}

impl PieceBuffer {
    pub fn new(index: u32, piece_size: u32, expected_hash: [u8; 20]) -> Self {
        let blocks = plan_blocks(index, piece_size);
        debug!("Piece {}: {} bytes in {} blocks", index, piece_size, blocks.len());
        Self {
            index,
            expected_hash,
            data: vec![0u8; piece_size as usize],
            total_blocks: blocks.len(),
            queued: blocks.into_iter(),
            pending: BTreeMap::new(),
            received_blocks: 0,
        }
    }

    /// Take the next unsent request and mark it in flight
    pub fn next_request(&mut self) -> Option<BlockRequest> {
        let request = self.queued.next()?;
        self.pending.insert(request.begin, request.length);
        Some(request)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Every block has been received
    pub fn is_complete(&self) -> bool {
        self.received_blocks == self.total_blocks
    }

    /// Match an incoming block against the in-flight requests and return the
    /// slot its payload must be read into
    pub fn accept_block(&mut self, index: u32, begin: u32, length: usize) -> Result<&mut [u8]> {
        if index != self.index {
            return Err(TorrentError::protocol_violation(format!(
                "received block for piece {} while downloading piece {}",
                index, self.index
            ))
            .into());
        }

        match self.pending.get(&begin) {
            Some(&requested) if requested as usize == length => {}
            Some(&requested) => {
                return Err(TorrentError::protocol_violation(format!(
                    "block at offset {} has {} bytes, requested {}",
                    begin, length, requested
                ))
                .into())
            }
            None => {
                return Err(TorrentError::protocol_violation(format!(
                    "unrequested block at offset {} of piece {}",
                    begin, index
                ))
                .into())
            }
        }

        self.pending.remove(&begin);
        self.received_blocks += 1;
        trace!("Piece {}: block at {} accepted ({}/{})", self.index, begin, self.received_blocks, self.total_blocks);

        let start = begin as usize;
        Ok(&mut self.data[start..start + length])
    }

    /// Compare the SHA-1 of the assembled bytes with the expected digest
    pub fn verify(self) -> Result<Vec<u8>> {
        let actual: [u8; 20] = Sha1::digest(&self.data).into();
        if actual != self.expected_hash {
            return Err(TorrentError::hash_mismatch(self.index, &self.expected_hash, &actual).into());
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha1(data: &[u8]) -> [u8; 20] {
        Sha1::digest(data).into()
    }

    #[test]
    fn test_plan_blocks_with_remainder() {
        let blocks = plan_blocks(2, 2 * BLOCK_MAX_SIZE + 100);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], BlockRequest { index: 2, begin: 0, length: BLOCK_MAX_SIZE });
        assert_eq!(blocks[1].begin, BLOCK_MAX_SIZE);
        assert_eq!(blocks[2], BlockRequest { index: 2, begin: 2 * BLOCK_MAX_SIZE, length: 100 });
    }

    #[test]
    fn test_plan_blocks_exact_multiple_and_small() {
        let blocks = plan_blocks(0, 2 * BLOCK_MAX_SIZE);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.length == BLOCK_MAX_SIZE));

        assert_eq!(plan_blocks(0, 10), vec![BlockRequest { index: 0, begin: 0, length: 10 }]);
        assert!(plan_blocks(0, 0).is_empty());
    }

    #[test]
    fn test_out_of_order_assembly() {
        let content: Vec<u8> = (0..(BLOCK_MAX_SIZE + 50)).map(|i| (i % 251) as u8).collect();
        let mut piece = PieceBuffer::new(0, content.len() as u32, sha1(&content));

        let first = piece.next_request().unwrap();
        let second = piece.next_request().unwrap();
        assert!(piece.next_request().is_none());
        assert_eq!(piece.pending_count(), 2);

        for block in [second, first] {
            let start = block.begin as usize;
            let slot = piece.accept_block(0, block.begin, block.length as usize).unwrap();
            slot.copy_from_slice(&content[start..start + block.length as usize]);
        }

        assert!(piece.is_complete());
        assert_eq!(piece.verify().unwrap(), content);
    }

    #[test]
    fn test_rejects_unrequested_or_mismatched_blocks() {
        let mut piece = PieceBuffer::new(1, 100, [0u8; 20]);
        let request = piece.next_request().unwrap();

        assert!(piece.accept_block(0, 0, 100).is_err());
        assert!(piece.accept_block(1, 50, 50).is_err());
        assert!(piece.accept_block(1, 0, 99).is_err());
        assert!(piece.accept_block(1, request.begin, 100).is_ok());
        // the same block twice is no longer pending
        assert!(piece.accept_block(1, request.begin, 100).is_err());
    }

    #[test]
    fn test_verify_detects_flipped_bit() {
        let content = vec![7u8; 64];
        let mut piece = PieceBuffer::new(3, 64, sha1(&content));
        piece.next_request().unwrap();
        let slot = piece.accept_block(3, 0, 64).unwrap();
        slot.copy_from_slice(&content);
        slot[10] ^= 0x01;

        let err = piece.verify().unwrap_err();
        assert!(matches!(
            TorrentError::classify(&err),
            Some(TorrentError::HashVerificationFailed { piece_index: 3, .. })
        ));
    }
}
