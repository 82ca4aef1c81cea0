//! The event vocabulary.
//!
//! Everything that crosses the bus is an [`AppEvent`]: a small,
//! cloneable description of something that already happened. Events
//! serialize, so a front end can log or replay a session. Each
//! sub-enum is one category, which is also the unit of filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::data::Where;
use crate::message::MessageLevel;

/// Any event the application can publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// Document lifecycle and edits.
    Document(DocumentEvent),
    /// Traversal progress and page display.
    Navigation(NavigationEvent),
    /// Working files and step images.
    Render(RenderEvent),
    /// Configuration persistence.
    Settings(SettingsEvent),
    /// Surfaced diagnostics.
    Error(ErrorEvent),
}

impl AppEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Document(_) => EventCategory::Document,
            AppEvent::Navigation(_) => EventCategory::Navigation,
            AppEvent::Render(_) => EventCategory::Render,
            AppEvent::Settings(_) => EventCategory::Settings,
            AppEvent::Error(_) => EventCategory::Error,
        }
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::Document(e) => e.fmt(f),
            AppEvent::Navigation(e) => e.fmt(f),
            AppEvent::Render(e) => e.fmt(f),
            AppEvent::Settings(e) => e.fmt(f),
            AppEvent::Error(e) => e.fmt(f),
        }
    }
}

/// Coarse event kind, used by [`EventFilter`](super::EventFilter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Document,
    Navigation,
    Render,
    Settings,
    Error,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventCategory::Document => "document",
            EventCategory::Navigation => "navigation",
            EventCategory::Render => "render",
            EventCategory::Settings => "settings",
            EventCategory::Error => "error",
        })
    }
}

/// Document lifecycle and edit notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentEvent {
    /// A document finished loading.
    Opened {
        /// Path of the loaded document.
        path: PathBuf,
        /// Number of submodels the document contains.
        submodels: usize,
    },
    /// The document was written back to disk.
    Saved { path: PathBuf },
    /// A single content line was replaced.
    LineChanged { loc: Where },
    /// Lines were inserted into a submodel.
    LinesInserted {
        /// Location of the first inserted line.
        loc: Where,
        count: usize,
    },
    /// Lines were deleted from a submodel.
    LinesDeleted {
        /// Location of the first deleted line.
        loc: Where,
        count: usize,
    },
    /// The unsaved-changes flag flipped.
    ModifiedChanged { modified: bool },
}

impl fmt::Display for DocumentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentEvent::Opened { path, submodels } => {
                write!(f, "opened {} with {submodels} submodels", path.display())
            }
            DocumentEvent::Saved { path } => write!(f, "saved {}", path.display()),
            DocumentEvent::LineChanged { loc } => write!(f, "line changed at {loc}"),
            DocumentEvent::LinesInserted { loc, count } => {
                write!(f, "inserted {count} lines at {loc}")
            }
            DocumentEvent::LinesDeleted { loc, count } => {
                write!(f, "deleted {count} lines at {loc}")
            }
            DocumentEvent::ModifiedChanged { modified } => {
                write!(
                    f,
                    "document {}",
                    if *modified { "modified" } else { "unmodified" }
                )
            }
        }
    }
}

/// Traversal progress and page display notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NavigationEvent {
    /// A traversal pass started.
    TraversalStarted {
        /// Name of the traversal process, for example "FindPage".
        process: String,
    },
    /// A page finished displaying.
    PageDisplayed {
        /// One-based displayed page number.
        page: usize,
        /// Total page count of the document.
        of: usize,
    },
    /// The total page count changed.
    PageCountChanged { pages: usize },
    /// A traversal pass was aborted before completion.
    TraversalAborted,
    /// A build modification changed its active action.
    ModificationActionChanged {
        /// Key of the build modification.
        key: String,
        /// Step number where the action took effect.
        step: usize,
    },
}

impl fmt::Display for NavigationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationEvent::TraversalStarted { process } => {
                write!(f, "traversal started: {process}")
            }
            NavigationEvent::PageDisplayed { page, of } => write!(f, "page {page} of {of}"),
            NavigationEvent::PageCountChanged { pages } => write!(f, "page count {pages}"),
            NavigationEvent::TraversalAborted => f.write_str("traversal aborted"),
            NavigationEvent::ModificationActionChanged { key, step } => {
                write!(f, "modification '{key}' changed at step {step}")
            }
        }
    }
}

/// Working-file and step-image notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RenderEvent {
    /// A step image was produced.
    StepRendered { path: PathBuf },
    /// A step image could not be produced.
    RenderFailed {
        /// Reason the renderer gave.
        reason: String,
    },
    /// Working files were flushed to the render directory.
    WorkFilesWritten {
        /// Files that actually changed on disk.
        written: usize,
        /// Files left untouched because content matched.
        unchanged: usize,
    },
}

impl fmt::Display for RenderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderEvent::StepRendered { path } => write!(f, "rendered {}", path.display()),
            RenderEvent::RenderFailed { reason } => write!(f, "render failed: {reason}"),
            RenderEvent::WorkFilesWritten { written, unchanged } => {
                write!(f, "work files: {written} written, {unchanged} unchanged")
            }
        }
    }
}

/// Configuration persistence notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingsEvent {
    /// Configuration was read from disk.
    Loaded { path: PathBuf },
    /// Configuration was written to disk.
    Saved { path: PathBuf },
}

impl fmt::Display for SettingsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsEvent::Loaded { path } => write!(f, "settings loaded from {}", path.display()),
            SettingsEvent::Saved { path } => write!(f, "settings saved to {}", path.display()),
        }
    }
}

/// A diagnostic cleared its routing and reached the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErrorEvent {
    Surfaced {
        /// Bucket the message was dispatched under.
        bucket: String,
        level: MessageLevel,
        /// Rendered message text, location included.
        text: String,
    },
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorEvent::Surfaced {
                bucket,
                level,
                text,
            } => {
                write!(f, "{level} [{bucket}] {text}")
            }
        }
    }
}
