use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Width of the textual progress bar, in cells.
pub const BAR_WIDTH: usize = 30;

/// Progress counters for one port sweep.
///
/// Owned by a single scan invocation and shared with its worker tasks behind an
/// `Arc`. Every connect attempt calls [`ScanProgress::record`] exactly once, so
/// `scanned` reaches `total` when the sweep finishes.
pub struct ScanProgress {
    scanned: AtomicU64,
    total: u64,
    started: Instant,
    bar: ProgressBar,
}

impl ScanProgress {
    /// Counters only, nothing drawn.
    pub fn new(total: u64) -> Self {
        Self::with_bar(total, ProgressBar::hidden())
    }

    /// Counters plus a live terminal bar on stderr.
    pub fn with_terminal_bar(total: u64, label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} |{bar:30}| {percent}% ({pos}/{len}) {per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░"),
        );
        bar.set_prefix(label.to_string());
        Self::with_bar(total, bar)
    }

    fn with_bar(total: u64, bar: ProgressBar) -> Self {
        Self {
            scanned: AtomicU64::new(0),
            total,
            started: Instant::now(),
            bar,
        }
    }

    /// Count one finished attempt and nudge the display. Never blocks on drawing.
    pub fn record(&self) -> u64 {
        let scanned = self.scanned.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(scanned <= self.total, "scanned {scanned} exceeds total {}", self.total);
        self.bar.inc(1);
        scanned
    }

    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scanned: self.scanned(),
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }

    /// Tear down the terminal bar, leaving the final state on screen.
    pub fn finish(&self) {
        self.bar.finish();
    }
}

/// Point-in-time copy of the progress counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub scanned: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.scanned as f64 * 100.0 / self.total as f64
    }

    /// Attempts per second since the sweep started.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.scanned as f64 / secs
        } else {
            0.0
        }
    }

    /// Fixed-width bar of `width` cells, e.g. `███░░░`.
    pub fn bar(&self, width: usize) -> String {
        let filled = if self.total == 0 {
            width
        } else {
            ((width as u64 * self.scanned) / self.total).min(width as u64) as usize
        };
        let mut out = String::with_capacity(width * 3);
        out.extend(std::iter::repeat('█').take(filled));
        out.extend(std::iter::repeat('░').take(width - filled));
        out
    }

    /// One-line rendering: `|bar| 42.0% (21/50) 310.5 ports/s`.
    pub fn render(&self) -> String {
        format!(
            "|{}| {:.1}% ({}/{}) {:.1} ports/s",
            self.bar(BAR_WIDTH),
            self.percent(),
            self.scanned,
            self.total,
            self.rate()
        )
    }
}
