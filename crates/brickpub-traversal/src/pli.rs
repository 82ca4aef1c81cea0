//! Parts-list accumulation
//!
//! Collects the parts added during a step for the step's parts list, and
//! merges step lists into a document-wide inventory for bill-of-materials
//! pages. Entries key on the normalized part identifier plus colour code;
//! a PLI SUB window replaces the actual parts with a single substitute
//! entry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use brickpub_core::constants::CURRENT_COLOR_CODE;
use brickpub_core::data::Where;

/// One parts-list line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PliEntry {
    /// Normalized part identifier.
    pub part: String,
    /// Colour code as written in the document.
    pub color: u32,
    /// How many of this part and colour were added.
    pub count: usize,
    /// Position of the first occurrence.
    pub first_seen: Where,
    /// Display annotation, if one was resolved.
    pub annotation: Option<String>,
}

/// Accumulates parts for one step or one whole document
#[derive(Debug, Clone, Default)]
pub struct PliAccumulator {
    entries: HashMap<(String, u32), PliEntry>,
    substitute: Option<(String, u32)>,
}

impl PliAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one part occurrence
    pub fn add(&mut self, part: &str, color: u32, loc: &Where) {
        let part = part.to_ascii_lowercase();
        trace!(part = %part, color, "part counted");
        self.entries
            .entry((part.clone(), color))
            .and_modify(|e| e.count += 1)
            .or_insert(PliEntry {
                part,
                color,
                count: 1,
                first_seen: loc.clone(),
                annotation: None,
            });
    }

    /// Open a substitute window
    ///
    /// The substitute is counted once, immediately; the actual parts that
    /// follow inside the window are suppressed by the caller's scope
    /// check.
    pub fn begin_substitute(&mut self, part: &str, color: Option<u32>, loc: &Where) {
        let color = color.unwrap_or(CURRENT_COLOR_CODE);
        self.substitute = Some((part.to_ascii_lowercase(), color));
        self.add(part, color, loc);
    }

    /// Close the substitute window
    pub fn end_substitute(&mut self) {
        self.substitute = None;
    }

    pub fn is_substituting(&self) -> bool {
        self.substitute.is_some()
    }

    /// Attach an annotation to an already-counted entry
    pub fn annotate(&mut self, part: &str, color: u32, text: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(&(part.to_ascii_lowercase(), color)) {
            entry.annotation = Some(text.into());
        }
    }

    /// Fold another accumulation into this one
    pub fn merge(&mut self, other: &PliAccumulator) {
        for entry in other.entries.values() {
            self.entries
                .entry((entry.part.clone(), entry.color))
                .and_modify(|e| e.count += entry.count)
                .or_insert_with(|| entry.clone());
        }
    }

    /// Entries sorted by part identifier then colour
    pub fn entries(&self) -> Vec<&PliEntry> {
        let mut all: Vec<&PliEntry> = self.entries.values().collect();
        all.sort_by(|a, b| a.part.cmp(&b.part).then(a.color.cmp(&b.color)));
        all
    }

    /// Number of distinct part/colour line items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total pieces across all line items
    pub fn total_parts(&self) -> usize {
        self.entries.values().map(|e| e.count).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.substitute = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: usize) -> Where {
        Where::new("m.ldr", 0, line)
    }

    #[test]
    fn test_counts_by_part_and_color() {
        let mut pli = PliAccumulator::new();
        pli.add("3001.dat", 4, &at(0));
        pli.add("3001.DAT", 4, &at(1));
        pli.add("3001.dat", 14, &at(2));

        assert_eq!(pli.len(), 2);
        assert_eq!(pli.total_parts(), 3);
        let entries = pli.entries();
        assert_eq!(entries[0].color, 4);
        assert_eq!(entries[0].count, 2);
        assert_eq!(entries[0].first_seen, at(0));
    }

    #[test]
    fn test_entries_sorted_by_part_then_color() {
        let mut pli = PliAccumulator::new();
        pli.add("3622.dat", 0, &at(0));
        pli.add("3001.dat", 14, &at(1));
        pli.add("3001.dat", 4, &at(2));

        let order: Vec<(String, u32)> = pli
            .entries()
            .iter()
            .map(|e| (e.part.clone(), e.color))
            .collect();
        assert_eq!(
            order,
            vec![
                ("3001.dat".to_string(), 4),
                ("3001.dat".to_string(), 14),
                ("3622.dat".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_substitute_window_counts_substitute_once() {
        let mut pli = PliAccumulator::new();
        pli.begin_substitute("981.dat", Some(4), &at(3));
        assert!(pli.is_substituting());
        pli.end_substitute();
        assert!(!pli.is_substituting());

        assert_eq!(pli.len(), 1);
        let entries = pli.entries();
        assert_eq!(entries[0].part, "981.dat");
        assert_eq!(entries[0].count, 1);
    }

    #[test]
    fn test_substitute_without_color_uses_placeholder() {
        let mut pli = PliAccumulator::new();
        pli.begin_substitute("981.dat", None, &at(0));
        assert_eq!(pli.entries()[0].color, CURRENT_COLOR_CODE);
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut bom = PliAccumulator::new();
        bom.add("3001.dat", 4, &at(0));

        let mut step = PliAccumulator::new();
        step.add("3001.dat", 4, &at(5));
        step.add("3005.dat", 14, &at(6));

        bom.merge(&step);
        assert_eq!(bom.len(), 2);
        assert_eq!(bom.total_parts(), 3);
    }

    #[test]
    fn test_annotation_attaches_to_entry() {
        let mut pli = PliAccumulator::new();
        pli.add("3001.dat", 4, &at(0));
        pli.annotate("3001.dat", 4, "2 x 4");
        assert_eq!(pli.entries()[0].annotation.as_deref(), Some("2 x 4"));
    }
}
