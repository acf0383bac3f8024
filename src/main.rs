//! rust-torrent-client - Main entry point
//!
//! Decodes bencode, inspects torrents, talks to trackers and peers, and
//! downloads single pieces or whole files.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use rust_torrent_client::cli::output::{format_download_saved, format_handshake, format_info, format_peers, format_piece_saved};
use rust_torrent_client::{
    bencode, CliArgs, Command, Downloader, HttpTracker, PeerAddress, PeerSession, ProgressDisplay, Torrent,
    TorrentError, TorrentParser,
};
use tokio::io::BufWriter;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        if let Some(location) = panic_info.location() {
            error!("PANIC occurred at {}:{}:{}", location.file(), location.line(), location.column());
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized at {:?}", args.log_level());
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_panic_handler();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };

    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("Command failed: {:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn load_torrent(path: &Path) -> Result<Torrent> {
    let torrent = TorrentParser::parse_file(path)?;
    info!("Loaded torrent {} ({} pieces)", torrent.info.display_name(), torrent.info.num_pieces());
    Ok(torrent)
}

async fn run(args: &CliArgs) -> Result<()> {
    let config = args.to_config();
    config.validate()?;

    match &args.command {
        Command::Decode { value } => {
            let decoded = bencode::decode(value.as_bytes())?;
            println!("{}", serde_json::to_string(&decoded)?);
        }

        Command::Info { torrent } => {
            let torrent = load_torrent(torrent)?;
            print!("{}", format_info(&torrent));
        }

        Command::Peers { torrent } => {
            let torrent = load_torrent(torrent)?;
            let response = HttpTracker::new(config)?.announce(&torrent).await?;
            print!("{}", format_peers(&response.peers));
        }

        Command::Handshake { torrent, peer } => {
            let torrent = load_torrent(torrent)?;
            let addr: PeerAddress = peer.parse()?;
            let session = PeerSession::connect(addr, torrent.info_hash(), &config).await?;
            println!("{}", format_handshake(&session.peer_id_hex()));
        }

        Command::DownloadPiece { output, torrent, piece } => {
            let torrent = load_torrent(torrent)?;
            let downloader = Downloader::new(HttpTracker::new(config.clone())?, config);
            let data = downloader.download_piece(&torrent, *piece).await?;

            tokio::fs::write(output, &data)
                .await
                .map_err(|e| TorrentError::from(e).with_context(format!("writing {}", output.display())))?;
            println!("{}", format_piece_saved(*piece, output));
        }

        Command::Download { output, torrent: path } => {
            let torrent = load_torrent(path)?;
            let downloader = Downloader::new(HttpTracker::new(config.clone())?, config);

            let file = tokio::fs::File::create(output)
                .await
                .map_err(|e| TorrentError::from(e).with_context(format!("creating {}", output.display())))?;
            let mut writer = BufWriter::new(file);

            let mut progress = ProgressDisplay::new(args.is_quiet());
            let summary = downloader
                .download_file(&torrent, &mut writer, |piece| {
                    if let Err(e) = progress.piece_done(&piece) {
                        debug!("Progress output failed: {}", e);
                    }
                })
                .await?;
            progress.finish(&summary)?;

            println!("{}", format_download_saved(path, output));
        }
    }

    Ok(())
}
