//! Peer addresses as handed out by trackers

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use anyhow::Result;
use tracing::{debug, trace};

use crate::bencode::BencodeValue;
use crate::error::TorrentError;

/// Bytes per peer in the compact format (4 IPv4 + 2 port)
pub const COMPACT_PEER_LEN: usize = 6;

/// An IPv4 peer endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Compact 6-byte form
    pub fn to_compact(&self) -> [u8; COMPACT_PEER_LEN] {
        let mut out = [0u8; COMPACT_PEER_LEN];
        out[..4].copy_from_slice(&self.ip.octets());
        out[4..].copy_from_slice(&self.port.to_be_bytes());
        out
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = TorrentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Unpack a compact peer list, 6 bytes per peer
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerAddress>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::tracker_protocol(format!(
            "compact peer list length {} is not a multiple of {}",
            data.len(),
            COMPACT_PEER_LEN
        ))
        .into());
    }

    let peers: Vec<PeerAddress> = data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerAddress::new(ip, port)
        })
        .collect();

    debug!("Parsed {} compact peers", peers.len());
    Ok(peers)
}

/// Pack peers into the compact format
pub fn serialize_compact_peers(peers: &[PeerAddress]) -> Vec<u8> {
    peers.iter().flat_map(|p| p.to_compact()).collect()
}

/// Parse the dictionary form: a list of `{ip, port, peer id}` entries
pub fn parse_peer_list(entries: &[BencodeValue]) -> Result<Vec<PeerAddress>> {
    let mut peers = Vec::with_capacity(entries.len());
    for entry in entries {
        let ip = entry
            .get(b"ip")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TorrentError::tracker_protocol("peer entry without textual 'ip'"))?;
        let port = entry
            .get(b"port")
            .and_then(|v| v.as_integer())
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| TorrentError::tracker_protocol("peer entry without valid 'port'"))?;

        match ip.parse::<Ipv4Addr>() {
            Ok(ip) => peers.push(PeerAddress::new(ip, port)),
            // hostnames and IPv6 peers are not dialable by this client
            Err(_) => trace!("Skipping non-IPv4 peer entry {}", ip),
        }
    }
    Ok(peers)
}
