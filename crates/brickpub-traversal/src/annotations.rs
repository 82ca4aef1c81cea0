//! Assembly annotation cache
//!
//! Annotations are the short labels shown against parts-list entries,
//! usually a size like "2 x 4". They come from two places: derived from
//! the part catalog's descriptions, and explicit overrides staged by the
//! application. Staged overrides do not take effect mid-draw; they mark
//! the cache stale, the draw pass reports the annotation signal, and the
//! navigator refreshes the cache before restarting so every step of the
//! redrawn page sees the same annotation set.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

fn size_regex() -> &'static Regex {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    SIZE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?(?:\s*[xX]\s*\d+(?:\.\d+)?)+)").expect("invalid regex pattern")
    })
}

/// Derive a display annotation from a part description
///
/// Pulls the dimension pattern out of titles like "Brick 2 x 4"; returns
/// `None` when the description has no such pattern.
pub fn derive_annotation(description: &str) -> Option<String> {
    size_regex()
        .captures(description)
        .map(|c| c[1].split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Part annotation lookup with staged overrides
#[derive(Debug, Clone, Default)]
pub struct AnnotationCache {
    entries: HashMap<String, String>,
    pending: HashMap<String, String>,
    stale: bool,
}

impl AnnotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active annotation for a part
    pub fn annotation(&self, part: &str) -> Option<&str> {
        self.entries.get(&part.to_ascii_lowercase()).map(String::as_str)
    }

    /// Stage an override, marking the cache stale
    ///
    /// The override becomes visible only after [`AnnotationCache::refresh`].
    pub fn stage(&mut self, part: &str, text: impl Into<String>) {
        self.pending.insert(part.to_ascii_lowercase(), text.into());
        self.stale = true;
    }

    /// Whether staged overrides are waiting to be applied
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Apply staged overrides and clear the stale mark
    pub fn refresh(&mut self) {
        if !self.pending.is_empty() {
            debug!(staged = self.pending.len(), "annotation overrides applied");
        }
        self.entries.extend(self.pending.drain());
        self.stale = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
