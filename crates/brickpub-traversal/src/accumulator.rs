//! Content accumulator
//!
//! The growing buffer of assembly content for the step being built. Lines
//! accumulate from the start of the model so each step's image shows the
//! whole assembly so far. A parallel index array maps every accumulated
//! line back to its source position; build modifications, buffered
//! exchange, and scripted removal all change the line count without
//! changing what position a surviving line came from, so the two arrays
//! move in lockstep through every operation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use brickpub_core::data::Where;
use brickpub_document::line::{classify, ClassifiedLine};
use brickpub_document::meta::{Directive, GroupMeta};

/// A frozen copy of accumulated content, used by buffered exchange and
/// step finalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub lines: Vec<String>,
    pub index: Vec<Where>,
}

impl ContentSnapshot {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The line-by-line buffer of assembly content
#[derive(Debug, Clone, Default)]
pub struct ContentAccumulator {
    lines: Vec<String>,
    index: Vec<Where>,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one content line with its source position
    pub fn append(&mut self, line: impl Into<String>, loc: Where) {
        self.lines.push(line.into());
        self.index.push(loc);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn index(&self) -> &[Where] {
        &self.index
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.index.clear();
    }

    /// Freeze the current content
    pub fn snapshot(&self) -> ContentSnapshot {
        ContentSnapshot {
            lines: self.lines.clone(),
            index: self.index.clone(),
        }
    }

    /// Replace the current content from a snapshot
    pub fn restore(&mut self, snapshot: &ContentSnapshot) {
        self.lines = snapshot.lines.clone();
        self.index = snapshot.index.clone();
    }

    /// Remove every line belonging to the named group
    ///
    /// Understands both grouping syntaxes: a flat marker line that claims
    /// the single following content line, and a begin/end pair that
    /// brackets a region. Nested bracketed groups with other names are
    /// skipped over, not dismembered. Returns the number of lines removed.
    pub fn remove_group(&mut self, name: &str) -> usize {
        self.filter_region(name, true)
    }

    /// Remove every part placement with the given identifier
    pub fn remove_part(&mut self, id: &str) -> usize {
        let target = id.to_ascii_lowercase();
        self.filter_lines(|line, loc| {
            matches!(
                classify(line, loc),
                Ok(ClassifiedLine::Part(part)) if part.normalized_part() == target
            )
        })
    }

    /// Remove the bracketed region declaring the given name
    pub fn remove_name(&mut self, name: &str) -> usize {
        self.filter_region(name, false)
    }

    /// Shared region filter; `flat_markers` extends matching to the flat
    /// one-line grouping syntax
    fn filter_region(&mut self, name: &str, flat_markers: bool) -> usize {
        let aligned = self.check_alignment();
        let before = self.lines.len();

        let mut kept_lines = Vec::with_capacity(before);
        let mut kept_index = Vec::with_capacity(self.index.len());
        let mut depth = 0usize;
        let mut skip_from_depth: Option<usize> = None;
        let mut skip_next_content = false;

        for (i, line) in self.lines.iter().enumerate() {
            let loc = self
                .index
                .get(i)
                .cloned()
                .unwrap_or_else(|| Where::new("", 0, i));
            let group = match classify(line, &loc) {
                Ok(ClassifiedLine::Meta(Directive::Group(group))) => Some(group),
                _ => None,
            };

            let mut drop_line = skip_from_depth.is_some();
            match group {
                Some(GroupMeta::Begin { name: opened }) => {
                    depth += 1;
                    if skip_from_depth.is_none() && opened == name {
                        skip_from_depth = Some(depth);
                        drop_line = true;
                    }
                }
                Some(GroupMeta::End) => {
                    if skip_from_depth == Some(depth) {
                        skip_from_depth = None;
                        drop_line = true;
                    }
                    depth = depth.saturating_sub(1);
                }
                Some(GroupMeta::Belongs { name: owner }) => {
                    if flat_markers && skip_from_depth.is_none() && owner == name {
                        skip_next_content = true;
                        drop_line = true;
                    }
                }
                None => {
                    if skip_next_content {
                        skip_next_content = false;
                        drop_line = true;
                    }
                }
            }

            if !drop_line {
                kept_lines.push(line.clone());
                if aligned {
                    kept_index.push(loc);
                }
            }
        }

        let removed = before - kept_lines.len();
        self.lines = kept_lines;
        if aligned {
            self.index = kept_index;
        }
        if removed > 0 {
            debug!(name, removed, "group removal filtered accumulated content");
        }
        removed
    }

    fn filter_lines<F>(&mut self, mut matches: F) -> usize
    where
        F: FnMut(&str, &Where) -> bool,
    {
        let aligned = self.check_alignment();
        let before = self.lines.len();

        let mut kept_lines = Vec::with_capacity(before);
        let mut kept_index = Vec::with_capacity(self.index.len());
        for (i, line) in self.lines.iter().enumerate() {
            let loc = self
                .index
                .get(i)
                .cloned()
                .unwrap_or_else(|| Where::new("", 0, i));
            if !matches(line, &loc) {
                kept_lines.push(line.clone());
                if aligned {
                    kept_index.push(loc);
                }
            }
        }

        let removed = before - kept_lines.len();
        self.lines = kept_lines;
        if aligned {
            self.index = kept_index;
        }
        removed
    }

    /// Verify the content/index arrays are in lockstep
    ///
    /// A mismatch indicates a supplier bug; removal still completes on the
    /// content alone and the index array is left unfiltered.
    fn check_alignment(&self) -> bool {
        if self.lines.len() == self.index.len() {
            return true;
        }
        warn!(
            lines = self.lines.len(),
            index = self.index.len(),
            "content and index arrays diverged; index will not be filtered"
        );
        false
    }
}
