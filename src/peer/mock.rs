//! Scripted peer used by the session and download tests

use anyhow::Result;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::protocol::wire::{read_handshake, read_message, write_handshake, write_message};
use crate::protocol::{Handshake, Message};
use crate::torrent::{Torrent, TorrentInfo};
use crate::tracker::PeerAddress;

/// Behaviour of one mock connection
#[derive(Debug, Clone)]
pub(crate) struct MockPeer {
    pub peer_id: [u8; 20],
    pub pieces: Vec<Vec<u8>>,
    /// Bitfield to advertise, every piece when `None`
    pub bitfield: Option<Vec<u8>>,
    /// Flip one bit in the first block of this piece
    pub corrupt_piece: Option<u32>,
    /// Collect this many requests and answer them in reverse order
    pub reverse_batch: usize,
    /// Send a keep-alive before every scripted message
    pub keepalives: bool,
    /// Sent in place of Unchoke
    pub instead_of_unchoke: Option<Message>,
    /// Info hash echoed in the handshake, the client's own when `None`
    pub answer_info_hash: Option<[u8; 20]>,
}

impl MockPeer {
    pub fn new(pieces: Vec<Vec<u8>>) -> Self {
        Self {
            peer_id: *b"-MOCK01-abcdefghijkl",
            pieces,
            bitfield: None,
            corrupt_piece: None,
            reverse_batch: 1,
            keepalives: false,
            instead_of_unchoke: None,
            answer_info_hash: None,
        }
    }

    fn full_bitfield(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.pieces.len().div_ceil(8)];
        for index in 0..self.pieces.len() {
            bytes[index / 8] |= 1 << (7 - index % 8);
        }
        bytes
    }
}

/// Deterministic file content
pub(crate) fn sample_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

/// Torrent describing `content` split into `piece_length` pieces, plus the pieces
pub(crate) fn fixture(content: &[u8], piece_length: usize, tracker_url: &str) -> (Torrent, Vec<Vec<u8>>) {
    let pieces: Vec<Vec<u8>> = content.chunks(piece_length).map(<[u8]>::to_vec).collect();
    let torrent = Torrent {
        tracker_url: tracker_url.to_string(),
        info: TorrentInfo {
            length: content.len() as u64,
            name: b"fixture.bin".to_vec(),
            piece_length: piece_length as u64,
            piece_hashes: pieces.iter().map(|p| -> [u8; 20] { Sha1::digest(p).into() }).collect(),
        },
    };
    (torrent, pieces)
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, mock: &MockPeer, message: &Message) -> Result<()> {
    if mock.keepalives {
        write_message(stream, &Message::KeepAlive).await?;
    }
    write_message(stream, message).await
}

/// Play the peer side of one connection until the client hangs up
pub(crate) async fn serve<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, mock: MockPeer) -> Result<()> {
    let theirs = read_handshake(&mut stream).await?;
    let info_hash = mock.answer_info_hash.unwrap_or(theirs.info_hash);
    write_handshake(&mut stream, &Handshake::new(info_hash, mock.peer_id)).await?;

    let bitfield = mock.bitfield.clone().unwrap_or_else(|| mock.full_bitfield());
    send(&mut stream, &mock, &Message::Bitfield { bitfield }).await?;

    loop {
        match read_message(&mut stream).await {
            Ok(Message::Interested) => break,
            Ok(_) => continue,
            Err(_) => return Ok(()),
        }
    }
    let answer = mock.instead_of_unchoke.clone().unwrap_or(Message::Unchoke);
    send(&mut stream, &mock, &answer).await?;

    let mut batch = Vec::new();
    loop {
        let Ok(message) = read_message(&mut stream).await else {
            return Ok(());
        };
        let Message::Request { index, begin, length } = message else {
            continue;
        };

        batch.push((index, begin, length));
        let last_block = (begin + length) as usize == mock.pieces[index as usize].len();
        if batch.len() < mock.reverse_batch.max(1) && !last_block {
            continue;
        }

        batch.reverse();
        for (index, begin, length) in batch.drain(..) {
            let start = begin as usize;
            let mut block = mock.pieces[index as usize][start..start + length as usize].to_vec();
            if mock.corrupt_piece == Some(index) && begin == 0 {
                block[0] ^= 0x01;
            }
            send(&mut stream, &mock, &Message::Piece { index, begin, block }).await?;
        }
    }
}

/// Accept loopback connections, serving the n-th one with `mocks[n]`
/// (the last mock serves every later connection)
pub(crate) async fn spawn_listener(mocks: Vec<MockPeer>) -> PeerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut served = 0usize;
        while let Ok((socket, _)) = listener.accept().await {
            let mock = mocks[served.min(mocks.len() - 1)].clone();
            served += 1;
            tokio::spawn(serve(socket, mock));
        }
    });

    PeerAddress::new(std::net::Ipv4Addr::LOCALHOST, port)
}
