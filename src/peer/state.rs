//! Peer state module
//!
//! Session state machine positions and the peer's advertised bitfield.

/// Where a peer session is in the protocol exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection
    #[default]
    Disconnected,
    /// TCP connected, our handshake sent
    HandshakeSent,
    /// Peer's handshake received and accepted
    HandshakeAcked,
    /// Peer's bitfield received
    BitfieldReceived,
    /// Interested sent, waiting for unchoke
    Interested,
    /// Peer unchoked us; requests may be sent
    Unchoked,
    /// Block requests for a piece are in flight
    Downloading,
    /// Last piece verified, ready for the next one
    Idle,
}

impl SessionState {
    /// Check whether block requests may be sent
    pub fn can_request(&self) -> bool {
        matches!(self, SessionState::Unchoked | SessionState::Idle)
    }
}

/// Pieces a peer claims to hold, high bit of byte 0 is piece 0
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield {
    bytes: Vec<u8>,
}

impl Bitfield {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Check if peer has specific piece
    pub fn has_piece(&self, piece_index: usize) -> bool {
        let byte_index = piece_index / 8;
        let bit_index = 7 - (piece_index % 8);
        self.bytes
            .get(byte_index)
            .map_or(false, |byte| (byte >> bit_index) & 1 == 1)
    }

    /// Record a piece announced with `Have`, growing the field if needed
    pub fn set_piece(&mut self, piece_index: usize) {
        let byte_index = piece_index / 8;
        if byte_index >= self.bytes.len() {
            self.bytes.resize(byte_index + 1, 0);
        }
        self.bytes[byte_index] |= 1 << (7 - (piece_index % 8));
    }

    /// Get the number of pieces the peer has
    pub fn piece_count(&self) -> usize {
        self.bytes.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
