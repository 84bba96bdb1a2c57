//! Progress reporting for synchronization runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Observer for run progress.
///
/// Called from the orchestrating thread. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    /// A run is about to execute `total` pairs.
    fn start(&self, total: u64);

    /// One more pair has been committed to the ledger.
    fn increment(&self);

    /// The run is over (completed, cancelled or failed).
    fn finish(&self);
}

/// Ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: u64) {}

    fn increment(&self) {}

    fn finish(&self) {}
}

/// Records progress in atomics.
#[derive(Debug, Default)]
pub struct CountingProgress {
    total: AtomicU64,
    done: AtomicU64,
    starts: AtomicU64,
    finished: AtomicBool,
}

impl CountingProgress {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total announced by the last `start`.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Pairs committed since the last `start`.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }

    /// Number of runs started.
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Returns true once `finish` was called for the current run.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Fraction of the current run done, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => (self.done() as f64 / total as f64).min(1.0),
        }
    }
}

impl ProgressReporter for CountingProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn increment(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_progress() {
        let progress = CountingProgress::new();
        progress.start(4);
        progress.increment();
        progress.increment();

        assert_eq!(progress.total(), 4);
        assert_eq!(progress.done(), 2);
        assert!((progress.fraction() - 0.5).abs() < f64::EPSILON);
        assert!(!progress.is_finished());

        progress.finish();
        assert!(progress.is_finished());

        progress.start(1);
        assert_eq!(progress.done(), 0);
        assert_eq!(progress.starts(), 2);
    }

    #[test]
    fn empty_run_is_complete() {
        let progress = CountingProgress::new();
        progress.start(0);
        assert_eq!(progress.fraction(), 1.0);
    }
}
