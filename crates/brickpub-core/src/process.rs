//! Traversal process tracking.
//!
//! Exactly one traversal (page counting, page finding, page drawing, or
//! work-file writing) may mutate document-derived state at a time. The
//! [`ProcessTracker`] enforces that single-runner rule: a traversal claims
//! the tracker before starting and the returned [`ProcessGuard`] releases
//! it on drop, including on early return and panic unwind.
//!
//! Cancellation is cooperative. [`AbortFlag`] is a cheap cloneable handle
//! that traversal loops poll once per iteration.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// What the engine is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessState {
    /// No traversal running.
    #[default]
    Idle,
    /// Counting pages to the end of the document.
    CountPages,
    /// Scanning for a page boundary.
    FindPage,
    /// Materializing page content.
    DrawPage,
    /// Writing renderer working files.
    WriteWorkFiles,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Idle => write!(f, "idle"),
            ProcessState::CountPages => write!(f, "counting pages"),
            ProcessState::FindPage => write!(f, "finding page"),
            ProcessState::DrawPage => write!(f, "drawing page"),
            ProcessState::WriteWorkFiles => write!(f, "writing work files"),
        }
    }
}

/// Errors from process tracking
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// Another traversal holds the tracker
    #[error("Busy: a traversal is already running ({current})")]
    Busy {
        /// The state of the traversal that holds the tracker.
        current: ProcessState,
    },
}

/// Cloneable cancellation handle polled by traversal loops
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Create an unraised flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lower the flag for a fresh traversal
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Enforces the single-runner rule across traversals
#[derive(Debug, Default)]
pub struct ProcessTracker {
    state: Mutex<ProcessState>,
    abort: AbortFlag,
}

impl ProcessTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the tracker for a traversal
    ///
    /// Clears the abort flag so a stale cancellation from the previous
    /// traversal cannot kill the new one.
    ///
    /// # Errors
    /// Returns [`ProcessError::Busy`] if another traversal holds the
    /// tracker.
    pub fn try_begin(&self, state: ProcessState) -> Result<ProcessGuard<'_>, ProcessError> {
        let mut current = self.state.lock();
        if *current != ProcessState::Idle {
            return Err(ProcessError::Busy { current: *current });
        }
        *current = state;
        self.abort.clear();
        tracing::debug!("Process started: {}", state);
        Ok(ProcessGuard { tracker: self })
    }

    /// The state of the traversal currently holding the tracker
    pub fn current(&self) -> ProcessState {
        *self.state.lock()
    }

    /// Whether any traversal is running
    pub fn is_busy(&self) -> bool {
        self.current() != ProcessState::Idle
    }

    /// Request cancellation of the running traversal
    pub fn request_abort(&self) {
        tracing::info!("Abort requested while {}", self.current());
        self.abort.request();
    }

    /// Handle for traversal loops to poll
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }
}

/// Holds the tracker for the duration of one traversal
///
/// Dropping the guard returns the tracker to idle.
#[derive(Debug)]
pub struct ProcessGuard<'a> {
    tracker: &'a ProcessTracker,
}

impl ProcessGuard<'_> {
    /// Move to a new phase without releasing the tracker
    ///
    /// A page-display operation counts, then draws, then writes files
    /// under one continuous hold.
    pub fn transition(&self, state: ProcessState) {
        let mut current = self.tracker.state.lock();
        tracing::debug!("Process phase: {} -> {}", *current, state);
        *current = state;
    }
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.tracker.state.lock();
        tracing::debug!("Process finished: {}", *current);
        *current = ProcessState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_release() {
        let tracker = ProcessTracker::new();
        assert!(!tracker.is_busy());

        {
            let guard = tracker.try_begin(ProcessState::CountPages).expect("idle");
            assert_eq!(tracker.current(), ProcessState::CountPages);
            guard.transition(ProcessState::DrawPage);
            assert_eq!(tracker.current(), ProcessState::DrawPage);
        }

        assert_eq!(tracker.current(), ProcessState::Idle);
    }

    #[test]
    fn test_second_begin_reports_busy() {
        let tracker = ProcessTracker::new();
        let _guard = tracker.try_begin(ProcessState::DrawPage).expect("idle");

        let err = tracker
            .try_begin(ProcessState::CountPages)
            .expect_err("should be busy");
        match err {
            ProcessError::Busy { current } => assert_eq!(current, ProcessState::DrawPage),
        }
    }

    #[test]
    fn test_begin_clears_stale_abort() {
        let tracker = ProcessTracker::new();
        tracker.request_abort();
        assert!(tracker.abort_flag().is_raised());

        let _guard = tracker.try_begin(ProcessState::FindPage).expect("idle");
        assert!(!tracker.abort_flag().is_raised());
    }

    #[test]
    fn test_abort_flag_is_shared() {
        let tracker = ProcessTracker::new();
        let flag = tracker.abort_flag();
        assert!(!flag.is_raised());

        tracker.request_abort();
        assert!(flag.is_raised());

        flag.clear();
        assert!(!tracker.abort_flag().is_raised());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let tracker = ProcessTracker::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.try_begin(ProcessState::DrawPage).expect("idle");
            panic!("simulated traversal failure");
        }));
        assert!(result.is_err());
        assert_eq!(tracker.current(), ProcessState::Idle);
    }
}
