//! Traversal result codes
//!
//! Every traversal call, recursive or top-level, reports one of these
//! codes instead of communicating through shared flags. Interrupting
//! codes propagate through all active recursion levels immediately; the
//! navigator decides whether to restart, surface, or abort.

use std::fmt;

use brickpub_core::data::Where;

/// Outcome of one traversal call
#[derive(Debug, Clone, PartialEq)]
pub enum TraverseRc {
    /// Scanning proceeded to the end of the requested span.
    Continue,
    /// The page under construction is complete.
    EndOfPage,
    /// A build-modification action diverged from recorded history; the
    /// caller must invalidate downstream state and restart.
    BuildModAction {
        /// The modification key that diverged.
        key: String,
        /// The step index at which the divergence was seen.
        step: usize,
    },
    /// Assembly annotations went stale mid-draw; the caller must refresh
    /// the annotation cache and restart.
    CsiAnnotation,
    /// Abort was requested; no partial output is valid.
    AbortProcess,
    /// A malformed line made continuing this traversal call unsafe.
    InvalidLine {
        /// The offending position.
        loc: Where,
    },
    /// A page or range could not be resolved.
    RangeError {
        /// The page number that could not be resolved.
        page: usize,
    },
}

impl TraverseRc {
    /// Whether this code interrupts the enclosing traversal
    ///
    /// Interrupting codes must propagate upward without finishing the
    /// current page.
    pub fn is_interrupt(&self) -> bool {
        !matches!(self, TraverseRc::Continue | TraverseRc::EndOfPage)
    }

    /// Whether the navigator can retry after handling this code
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            TraverseRc::BuildModAction { .. } | TraverseRc::CsiAnnotation
        )
    }
}

impl fmt::Display for TraverseRc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraverseRc::Continue => write!(f, "continue"),
            TraverseRc::EndOfPage => write!(f, "end of page"),
            TraverseRc::BuildModAction { key, step } => {
                write!(f, "build modification '{}' diverged at step {}", key, step)
            }
            TraverseRc::CsiAnnotation => write!(f, "annotation refresh required"),
            TraverseRc::AbortProcess => write!(f, "abort requested"),
            TraverseRc::InvalidLine { loc } => write!(f, "invalid line at {}", loc),
            TraverseRc::RangeError { page } => write!(f, "page {} out of range", page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_classification() {
        assert!(!TraverseRc::Continue.is_interrupt());
        assert!(!TraverseRc::EndOfPage.is_interrupt());
        assert!(TraverseRc::AbortProcess.is_interrupt());
        assert!(TraverseRc::BuildModAction {
            key: "k".to_string(),
            step: 2
        }
        .is_interrupt());
        assert!(TraverseRc::InvalidLine {
            loc: Where::new("m.ldr", 0, 4)
        }
        .is_interrupt());
    }

    #[test]
    fn test_restartable_codes() {
        assert!(TraverseRc::CsiAnnotation.is_restartable());
        assert!(TraverseRc::BuildModAction {
            key: "k".to_string(),
            step: 0
        }
        .is_restartable());
        assert!(!TraverseRc::AbortProcess.is_restartable());
        assert!(!TraverseRc::RangeError { page: 9 }.is_restartable());
    }
}
