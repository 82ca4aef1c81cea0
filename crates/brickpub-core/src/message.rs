//! User-facing diagnostic messages.
//!
//! Traversal and parsing report authoring problems (bad field counts,
//! unmatched BEGIN/END, unknown modification keys) as [`UserMessage`]s
//! rather than hard errors. Each message belongs to a severity bucket and
//! the dispatcher routes it according to per-bucket configuration:
//! surfaced to the user, logged only, or silenced. Duplicate messages
//! (same bucket, location, and text) are reported once per session.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::data::Where;
use crate::event_bus::{event_bus, AppEvent, ErrorEvent};

/// Severity bucket a diagnostic message belongs to
///
/// Buckets are routed independently, so a user can silence include-file
/// noise while keeping parse problems visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageBucket {
    /// Malformed lines and invalid BEGIN/END nesting.
    Parse,
    /// Problems with INSERT directives.
    Insert,
    /// Problems locating or reading an included file.
    IncludeFile,
    /// Build-modification consistency problems found during traversal.
    BuildMod,
    /// Build-modification problems found while editing.
    BuildModEdit,
    /// Assembly-annotation problems.
    Annotation,
    /// Out-of-range directive parameters and configuration conflicts.
    Configuration,
}

impl MessageBucket {
    /// All buckets, for iterating routing tables
    pub const ALL: [MessageBucket; 7] = [
        MessageBucket::Parse,
        MessageBucket::Insert,
        MessageBucket::IncludeFile,
        MessageBucket::BuildMod,
        MessageBucket::BuildModEdit,
        MessageBucket::Annotation,
        MessageBucket::Configuration,
    ];
}

impl std::fmt::Display for MessageBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageBucket::Parse => write!(f, "Parse"),
            MessageBucket::Insert => write!(f, "Insert"),
            MessageBucket::IncludeFile => write!(f, "IncludeFile"),
            MessageBucket::BuildMod => write!(f, "BuildMod"),
            MessageBucket::BuildModEdit => write!(f, "BuildModEdit"),
            MessageBucket::Annotation => write!(f, "Annotation"),
            MessageBucket::Configuration => write!(f, "Configuration"),
        }
    }
}

/// How serious a diagnostic message is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageLevel {
    /// Informational only.
    Info,
    /// The directive was skipped or a default was substituted.
    Warning,
    /// The enclosing unit of work was abandoned.
    Error,
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Warning => write!(f, "warning"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

/// Where a bucket's messages are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageRouting {
    /// Surface to the user and log.
    #[default]
    Surface,
    /// Log only, never surface.
    LogOnly,
    /// Drop entirely.
    Silenced,
}

/// One user-facing diagnostic message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Severity bucket.
    pub bucket: MessageBucket,
    /// Message level.
    pub level: MessageLevel,
    /// Document location the message refers to, if any.
    pub loc: Option<Where>,
    /// Message text.
    pub text: String,
}

impl UserMessage {
    /// Create a message anchored to a document location
    pub fn at(bucket: MessageBucket, level: MessageLevel, loc: Where, text: impl Into<String>) -> Self {
        Self {
            bucket,
            level,
            loc: Some(loc),
            text: text.into(),
        }
    }

    /// Create a message with no document location
    pub fn global(bucket: MessageBucket, level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            bucket,
            level,
            loc: None,
            text: text.into(),
        }
    }

    fn dedupe_key(&self) -> String {
        match &self.loc {
            Some(loc) => format!("{}|{}|{}", self.bucket, loc, self.text),
            None => format!("{}||{}", self.bucket, self.text),
        }
    }
}

impl std::fmt::Display for UserMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{}: {} ({}): {}", loc, self.level, self.bucket, self.text),
            None => write!(f, "{} ({}): {}", self.level, self.bucket, self.text),
        }
    }
}

/// Collects, deduplicates, and routes diagnostic messages
///
/// One dispatcher lives for the lifetime of an open document. Traversals
/// call [`MessageDispatcher::begin_session`] before a pass so that the
/// per-session duplicate suppression starts fresh.
pub struct MessageDispatcher {
    routing: RwLock<HashMap<MessageBucket, MessageRouting>>,
    seen: RwLock<HashSet<String>>,
    retained: RwLock<Vec<UserMessage>>,
    counts: RwLock<HashMap<MessageBucket, usize>>,
}

impl MessageDispatcher {
    /// Create a dispatcher with every bucket surfaced
    pub fn new() -> Self {
        Self {
            routing: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
            retained: RwLock::new(Vec::new()),
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Set the routing for one bucket
    pub fn set_routing(&self, bucket: MessageBucket, routing: MessageRouting) {
        self.routing.write().insert(bucket, routing);
    }

    /// Get the routing for one bucket
    pub fn routing(&self, bucket: MessageBucket) -> MessageRouting {
        self.routing
            .read()
            .get(&bucket)
            .copied()
            .unwrap_or_default()
    }

    /// Reset duplicate suppression and counters for a new traversal
    pub fn begin_session(&self) {
        self.seen.write().clear();
        self.retained.write().clear();
        self.counts.write().clear();
    }

    /// Route one message
    ///
    /// Returns the routing that was applied. A duplicate of an
    /// already-dispatched message reports `Silenced` without logging or
    /// counting again.
    pub fn dispatch(&self, message: UserMessage) -> MessageRouting {
        let routing = self.routing(message.bucket);
        if routing == MessageRouting::Silenced {
            return MessageRouting::Silenced;
        }

        if !self.seen.write().insert(message.dedupe_key()) {
            return MessageRouting::Silenced;
        }

        *self.counts.write().entry(message.bucket).or_insert(0) += 1;

        match message.level {
            MessageLevel::Info => tracing::info!("{}", message),
            MessageLevel::Warning => tracing::warn!("{}", message),
            MessageLevel::Error => tracing::error!("{}", message),
        }

        if routing == MessageRouting::Surface {
            let _ = event_bus().publish(AppEvent::Error(ErrorEvent::Surfaced {
                bucket: message.bucket.to_string(),
                level: message.level,
                text: message.to_string(),
            }));
            self.retained.write().push(message);
        }

        routing
    }

    /// Messages surfaced so far this session, in dispatch order
    pub fn surfaced(&self) -> Vec<UserMessage> {
        self.retained.read().clone()
    }

    /// Number of messages dispatched for one bucket this session
    pub fn count(&self, bucket: MessageBucket) -> usize {
        self.counts.read().get(&bucket).copied().unwrap_or(0)
    }

    /// Total messages dispatched this session
    pub fn total(&self) -> usize {
        self.counts.read().values().sum()
    }

    /// Whether any error-level message was surfaced this session
    pub fn has_errors(&self) -> bool {
        self.retained
            .read()
            .iter()
            .any(|m| m.level == MessageLevel::Error)
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("total", &self.total())
            .finish()
    }
}
