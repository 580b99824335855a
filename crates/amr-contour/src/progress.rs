//! Progress reporting and cancellation between blocks.
//!
//! A run counts one unit per local block and iso-value. Before each block the
//! driver hands a [`Progress`] to the callback, at most every 100 ms; a
//! callback returning `false` stops the run.
//!
//! ```
//! use amr_contour::progress::{Progress, ProgressCallback};
//!
//! let callback: ProgressCallback = Box::new(|progress: &Progress| {
//!     println!("iso {}: {}%", progress.iso_value, progress.percent());
//!     true
//! });
//! # let _ = callback;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum time between two callback invocations.
const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Blocks walked so far, over all iso-values.
    pub completed_blocks: u64,
    pub total_blocks: u64,
    /// Iso-value of the pass in progress.
    pub iso_value: f64,
    pub elapsed: Duration,
}

impl Progress {
    /// Completed share of the run, 0.0 for an empty run.
    pub fn fraction(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            self.completed_blocks as f64 / self.total_blocks as f64
        }
    }

    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// Called between blocks; returns `false` to cancel the run.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// Block counter shared by the workers of a run.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    completed: AtomicU64,
    total: u64,
    cancelled: AtomicBool,
    start: Instant,
    last_report: Mutex<Option<Instant>>,
}

impl ProgressTracker {
    pub(crate) fn new(total_blocks: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total: total_blocks,
            cancelled: AtomicBool::new(false),
            start: Instant::now(),
            last_report: Mutex::new(None),
        }
    }

    pub(crate) fn block_done(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Report before walking a block of the pass at `iso_value`.
    ///
    /// The first report always reaches the callback. Returns `false` once the
    /// run is cancelled, by this call or an earlier one.
    pub(crate) fn before_block(
        &self,
        callback: Option<&ProgressCallback>,
        iso_value: f64,
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let Some(callback) = callback else {
            return true;
        };

        let now = Instant::now();
        {
            let mut last = self
                .last_report
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.is_some_and(|previous| now.duration_since(previous) < REPORT_INTERVAL) {
                return true;
            }
            *last = Some(now);
        }

        let progress = Progress {
            completed_blocks: self.completed(),
            total_blocks: self.total,
            iso_value,
            elapsed: now.duration_since(self.start),
        };
        if callback(&progress) {
            true
        } else {
            self.cancelled.store(true, Ordering::Relaxed);
            false
        }
    }
}
