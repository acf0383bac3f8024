//! Progress display module
//!
//! Per-piece download progress, written to stderr so stdout carries only
//! command output.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::download::{DownloadSummary, PieceProgress};

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed to human readable string
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format duration to human readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Calculate ETA based on download speed and remaining bytes
pub fn calculate_eta(downloaded: u64, total: u64, speed: f64) -> Option<Duration> {
    if speed <= 0.0 || downloaded >= total {
        return None;
    }

    let remaining = total.saturating_sub(downloaded) as f64;
    Some(Duration::from_secs_f64(remaining / speed))
}

/// Render one progress line
pub fn render_line(progress: &PieceProgress, elapsed: Duration) -> String {
    let fraction = if progress.total == 0 {
        1.0
    } else {
        progress.completed as f64 / progress.total as f64
    };

    let bar_width: usize = 40;
    let filled = ((fraction * bar_width as f64) as usize).min(bar_width);
    let bar: String = "=".repeat(filled) + &" ".repeat(bar_width - filled);

    let speed = if elapsed.as_secs_f64() > 0.0 {
        progress.downloaded_bytes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    let eta = calculate_eta(progress.downloaded_bytes, progress.total_bytes, speed)
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    format!(
        "[{}] {:.1}% | piece {}/{} | {} / {} | {} | ETA: {}",
        bar,
        fraction * 100.0,
        progress.completed,
        progress.total,
        format_bytes(progress.downloaded_bytes),
        format_bytes(progress.total_bytes),
        format_speed(speed),
        eta,
    )
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the download
    start_time: Instant,
    /// Last update time
    last_update: Option<Instant>,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self::with_interval(quiet, Duration::from_millis(200))
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            update_interval: interval,
            quiet,
        }
    }

    /// Report a verified piece; redraws at most once per interval and always on the last piece
    pub fn piece_done(&mut self, progress: &PieceProgress) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let last_piece = progress.completed == progress.total;
        if let Some(last) = self.last_update {
            if !last_piece && last.elapsed() < self.update_interval {
                return Ok(());
            }
        }
        self.last_update = Some(Instant::now());

        let mut stderr = io::stderr().lock();
        write!(stderr, "\r\x1b[2K{}", render_line(progress, self.start_time.elapsed()))?;
        stderr.flush()
    }

    /// Print completion message
    pub fn finish(&self, summary: &DownloadSummary) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut stderr = io::stderr().lock();
        writeln!(stderr)?;
        writeln!(
            stderr,
            "Downloaded {} in {} pieces ({} retries) in {}",
            format_bytes(summary.bytes),
            summary.pieces,
            summary.retries,
            format_duration(summary.elapsed)
        )
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024.0), "1.00 KB/s");
        assert_eq!(format_speed(1024.0 * 1024.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_calculate_eta() {
        assert_eq!(calculate_eta(50, 100, 10.0), Some(Duration::from_secs(5)));
        assert_eq!(calculate_eta(100, 100, 10.0), None);
        assert_eq!(calculate_eta(50, 100, 0.0), None);
    }

    #[test]
    fn test_render_line() {
        let progress = PieceProgress {
            index: 1,
            completed: 2,
            total: 4,
            piece_bytes: 1024,
            downloaded_bytes: 2048,
            total_bytes: 4096,
        };
        let line = render_line(&progress, Duration::from_secs(2));
        assert!(line.starts_with(&format!("[{}{}]", "=".repeat(20), " ".repeat(20))));
        assert!(line.contains("50.0%"));
        assert!(line.contains("piece 2/4"));
        assert!(line.contains("2.00 KB / 4.00 KB"));
        assert!(line.contains("1.00 KB/s"));
        assert!(line.contains("ETA: 2s"));
    }

    #[test]
    fn test_quiet_display_prints_nothing() {
        let mut display = ProgressDisplay::new(true);
        assert!(display.is_quiet());
        let progress = PieceProgress {
            index: 0,
            completed: 1,
            total: 1,
            piece_bytes: 1,
            downloaded_bytes: 1,
            total_bytes: 1,
        };
        assert!(display.piece_done(&progress).is_ok());
        assert!(display.last_update.is_none());
    }
}
