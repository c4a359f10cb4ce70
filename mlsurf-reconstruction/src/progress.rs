//! Progress reporting and cooperative cancellation
//!
//! Long running operations report a monotonically increasing percentage to a
//! host callback. The callback returns `false` to request cancellation; the
//! request is latched in an atomic flag that workers poll between elements.

use mlsurf_core::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Elements processed between two progress updates in per-element loops
pub(crate) const PROGRESS_BATCH: usize = 256;

/// Host callback receiving progress updates.
///
/// Returning `false` requests cancellation of the running operation.
pub trait ProgressCallback: Sync {
    fn report(&self, percent: u8, message: &str) -> bool;
}

impl<F> ProgressCallback for F
where
    F: Fn(u8, &str) -> bool + Sync,
{
    fn report(&self, percent: u8, message: &str) -> bool {
        self(percent, message)
    }
}

/// Callback that ignores progress and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn report(&self, _percent: u8, _message: &str) -> bool {
        true
    }
}

/// Shared progress state for one operation.
///
/// Each percentage is claimed by a single caller, so the callback is invoked
/// at most 101 times whatever the number of processed elements. Callers on
/// one thread see strictly increasing percentages. No lock is held while the
/// callback runs.
pub struct ProgressTracker<'a> {
    callback: &'a dyn ProgressCallback,
    cancelled: AtomicBool,
    /// One past the highest claimed percentage, 0 before the first report
    claimed: AtomicU8,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(callback: &'a dyn ProgressCallback) -> Self {
        Self {
            callback,
            cancelled: AtomicBool::new(false),
            claimed: AtomicU8::new(0),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report `percent`, forwarding it to the callback if it advances the progress
    pub fn report(&self, percent: u8, message: &str) -> Result<()> {
        self.check()?;
        let percent = percent.min(100);
        if self.claimed.fetch_max(percent + 1, Ordering::AcqRel) > percent {
            return Ok(());
        }

        if !self.callback.report(percent, message) {
            self.cancelled.store(true, Ordering::Relaxed);
        }
        self.check()
    }

    /// Map `total` work items onto the percentage range `[start, end]`
    pub fn stage(&self, message: impl Into<String>, start: u8, end: u8, total: usize) -> Stage<'_, 'a> {
        Stage {
            tracker: self,
            message: message.into(),
            start: start.min(100),
            end: end.clamp(start.min(100), 100),
            total,
            done: AtomicUsize::new(0),
        }
    }
}

/// A slice of an operation's percentage range, advanced from worker threads
pub struct Stage<'t, 'a> {
    tracker: &'t ProgressTracker<'a>,
    message: String,
    start: u8,
    end: u8,
    total: usize,
    done: AtomicUsize,
}

impl Stage<'_, '_> {
    /// Report the start of the stage
    pub fn begin(&self) -> Result<()> {
        self.tracker.report(self.start, &self.message)
    }

    /// Mark `count` more items as done
    pub fn advance(&self, count: usize) -> Result<()> {
        let done = self.done.fetch_add(count, Ordering::Relaxed) + count;
        let span = (self.end - self.start) as usize;
        let offset = if self.total == 0 {
            span
        } else {
            span * done.min(self.total) / self.total
        };
        self.tracker.report(self.start + offset as u8, &self.message)
    }

    /// Report the end of the stage
    pub fn finish(&self) -> Result<()> {
        self.tracker.report(self.end, &self.message)
    }
}
