//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ClientConfig, DEFAULT_PORT};

/// CLI arguments for the torrent client
#[derive(Debug, Parser)]
#[command(name = "rust-torrent-client")]
#[command(about = "A minimal BitTorrent client", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Port advertised to the tracker
    #[arg(short, long, global = true, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds to wait on any single peer read or write
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// Block requests kept in flight per piece
    #[arg(long, global = true, default_value_t = 5, value_name = "DEPTH")]
    pub pipeline: usize,

    /// Extra attempts per piece after a hash mismatch or connection failure
    #[arg(long, global = true, default_value_t = 3)]
    pub retries: usize,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded string and print it as JSON
    Decode {
        #[arg(value_name = "BENCODED", allow_hyphen_values = true)]
        value: String,
    },

    /// Print tracker, length, info hash and piece hashes of a torrent
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Ask the tracker for peers
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Handshake with one peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Peer address as ip:port
        #[arg(value_name = "PEER")]
        peer: String,
    },

    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Output file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        #[arg(value_name = "PIECE_INDEX")]
        piece: usize,
    },

    /// Download the whole file
    Download {
        /// Output file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },
}

impl CliArgs {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }

    /// Build the client configuration from the global flags
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.port,
            io_timeout: Duration::from_secs(self.timeout),
            pipeline_depth: self.pipeline,
            max_retries: self.retries,
            ..ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["rust-torrent-client", "info", "sample.torrent"]).unwrap();
        assert_eq!(args.port, 6881);
        assert_eq!(args.timeout, 30);
        assert_eq!(args.pipeline, 5);
        assert_eq!(args.retries, 3);
        assert_eq!(args.log_level(), tracing::Level::WARN);
        assert!(matches!(args.command, Command::Info { ref torrent } if torrent == &PathBuf::from("sample.torrent")));
    }

    #[test]
    fn test_download_piece_command() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "download_piece",
            "-o",
            "/tmp/piece-0",
            "sample.torrent",
            "0",
        ])
        .unwrap();

        match args.command {
            Command::DownloadPiece { output, torrent, piece } => {
                assert_eq!(output, PathBuf::from("/tmp/piece-0"));
                assert_eq!(torrent, PathBuf::from("sample.torrent"));
                assert_eq!(piece, 0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_handshake_and_decode_commands() {
        let args = CliArgs::try_parse_from(["rust-torrent-client", "handshake", "a.torrent", "127.0.0.1:6881"]).unwrap();
        assert!(matches!(args.command, Command::Handshake { ref peer, .. } if peer == "127.0.0.1:6881"));

        let args = CliArgs::try_parse_from(["rust-torrent-client", "decode", "i-52e"]).unwrap();
        assert!(matches!(args.command, Command::Decode { ref value } if value == "i-52e"));
    }

    #[test]
    fn test_global_flags_build_config() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "download",
            "-o",
            "out.bin",
            "a.torrent",
            "--verbose",
            "--port",
            "7000",
            "--timeout",
            "12",
            "--pipeline",
            "1",
            "--retries",
            "0",
        ])
        .unwrap();

        assert!(args.is_verbose());
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        let config = args.to_config();
        assert_eq!(config.port, 7000);
        assert_eq!(config.io_timeout, Duration::from_secs(12));
        assert_eq!(config.pipeline_depth, 1);
        assert_eq!(config.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quiet_and_missing_output() {
        let args = CliArgs::try_parse_from(["rust-torrent-client", "-q", "peers", "a.torrent"]).unwrap();
        assert!(args.is_quiet());
        assert_eq!(args.log_level(), tracing::Level::ERROR);

        assert!(CliArgs::try_parse_from(["rust-torrent-client", "download", "a.torrent"]).is_err());
        assert!(CliArgs::try_parse_from(["rust-torrent-client", "download_piece", "-o", "x", "a.torrent", "-1"]).is_err());
    }
}
