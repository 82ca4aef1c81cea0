//! Edit history for model documents
//!
//! Every edit is recorded as a [`LineChange`] carrying enough content to
//! run it backwards. Changes group into batches so a directive insertion
//! that touches several lines undoes as one unit. The history hands back
//! inverse batches; the caller applies them through the document so
//! revision tracking and events fire as usual.

use brickpub_core::data::Where;
use brickpub_core::error::DocumentError;

use crate::document::Document;

/// Default number of undoable batches kept
pub const DEFAULT_UNDO_DEPTH: usize = 200;

/// One reversible line edit
#[derive(Debug, Clone, PartialEq)]
pub enum LineChange {
    /// A line was replaced.
    Replace {
        /// Position of the line.
        loc: Where,
        /// Content before the edit.
        old: String,
        /// Content after the edit.
        new: String,
    },
    /// Lines were inserted.
    Insert {
        /// Position of the first inserted line.
        loc: Where,
        /// The inserted content.
        lines: Vec<String>,
    },
    /// Lines were deleted.
    Delete {
        /// Position of the first deleted line.
        loc: Where,
        /// The removed content, kept for restoration.
        lines: Vec<String>,
    },
}

impl LineChange {
    /// The change that exactly reverses this one
    pub fn inverse(&self) -> LineChange {
        match self {
            LineChange::Replace { loc, old, new } => LineChange::Replace {
                loc: loc.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            LineChange::Insert { loc, lines } => LineChange::Delete {
                loc: loc.clone(),
                lines: lines.clone(),
            },
            LineChange::Delete { loc, lines } => LineChange::Insert {
                loc: loc.clone(),
                lines: lines.clone(),
            },
        }
    }

    /// Run this change against a document
    ///
    /// # Errors
    /// Fails when the position no longer exists in the document.
    pub fn apply(&self, document: &mut Document) -> Result<(), DocumentError> {
        match self {
            LineChange::Replace { loc, new, .. } => document.replace_line(loc, new.clone()),
            LineChange::Insert { loc, lines } => document.insert_lines(loc, lines.clone()),
            LineChange::Delete { loc, lines } => {
                document.delete_lines(loc, lines.len()).map(|_| ())
            }
        }
    }
}

/// An ordered group of changes that undo and redo as one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBatch {
    changes: Vec<LineChange>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: LineChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The batch that reverses this one, inverses in reverse order
    pub fn inverse(&self) -> EditBatch {
        EditBatch {
            changes: self.changes.iter().rev().map(LineChange::inverse).collect(),
        }
    }

    /// Run every change in order
    ///
    /// # Errors
    /// Stops at the first change whose position no longer exists.
    pub fn apply(&self, document: &mut Document) -> Result<(), DocumentError> {
        for change in &self.changes {
            change.apply(document)?;
        }
        Ok(())
    }
}

/// Undo/redo stacks over edit batches
#[derive(Debug, Default)]
pub struct EditHistory {
    undo_stack: Vec<EditBatch>,
    redo_stack: Vec<EditBatch>,
    max_depth: usize,
    current_batch: Option<EditBatch>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_UNDO_DEPTH)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth,
            current_batch: None,
        }
    }

    /// Record an applied change
    ///
    /// Joins the open batch when one is active, otherwise forms a batch of
    /// its own. Recording discards any redoable history.
    pub fn record(&mut self, change: LineChange) {
        if let Some(batch) = self.current_batch.as_mut() {
            batch.push(change);
            return;
        }
        let mut batch = EditBatch::new();
        batch.push(change);
        self.push_batch(batch);
    }

    fn push_batch(&mut self, batch: EditBatch) {
        self.redo_stack.clear();
        self.undo_stack.push(batch);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
    }

    /// Start grouping subsequent changes into one batch
    pub fn begin_batch(&mut self) {
        if self.current_batch.is_none() {
            self.current_batch = Some(EditBatch::new());
        }
    }

    /// Close the open batch and commit it if it holds any changes
    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.is_empty() {
                self.push_batch(batch);
            }
        }
    }

    /// Take the next undo step
    ///
    /// Returns the inverse batch for the caller to apply, and moves the
    /// original onto the redo stack.
    pub fn undo(&mut self) -> Option<EditBatch> {
        let batch = self.undo_stack.pop()?;
        let inverse = batch.inverse();
        self.redo_stack.push(batch);
        Some(inverse)
    }

    /// Take the next redo step
    ///
    /// Returns the original batch for the caller to apply, and moves it
    /// back onto the undo stack.
    pub fn redo(&mut self) -> Option<EditBatch> {
        let batch = self.redo_stack.pop()?;
        self.undo_stack.push(batch.clone());
        Some(batch)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickpub_core::message::MessageDispatcher;

    fn document() -> Document {
        Document::from_text(
            "m.ldr",
            "1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n",
            &MessageDispatcher::new(),
        )
    }

    fn at(line: usize) -> Where {
        Where::new("m.ldr", 0, line)
    }

    #[test]
    fn test_replace_round_trip() {
        let mut doc = document();
        let mut history = EditHistory::new();

        let change = LineChange::Replace {
            loc: at(1),
            old: "0 STEP".to_string(),
            new: "0 ROTSTEP 0 45 0".to_string(),
        };
        change.apply(&mut doc).expect("apply");
        history.record(change);
        assert_eq!(doc.line(&at(1)), Some("0 ROTSTEP 0 45 0"));

        let inverse = history.undo().expect("undo available");
        inverse.apply(&mut doc).expect("undo applies");
        assert_eq!(doc.line(&at(1)), Some("0 STEP"));

        let redo = history.redo().expect("redo available");
        redo.apply(&mut doc).expect("redo applies");
        assert_eq!(doc.line(&at(1)), Some("0 ROTSTEP 0 45 0"));
    }

    #[test]
    fn test_insert_undoes_as_delete() {
        let mut doc = document();
        let mut history = EditHistory::new();

        let change = LineChange::Insert {
            loc: at(1),
            lines: vec!["0 CALLOUT BEGIN".to_string(), "0 CALLOUT END".to_string()],
        };
        change.apply(&mut doc).expect("apply");
        history.record(change);
        assert_eq!(doc.top_model().len(), 4);

        history.undo().expect("undo").apply(&mut doc).expect("apply undo");
        assert_eq!(doc.top_model().len(), 2);
        assert_eq!(doc.line(&at(1)), Some("0 STEP"));
    }

    #[test]
    fn test_batch_undoes_as_one_unit() {
        let mut doc = document();
        let mut history = EditHistory::new();

        history.begin_batch();
        for (line, text) in [(1, "0 BUILD_MOD BEGIN \"fix\""), (2, "0 BUILD_MOD END")] {
            let change = LineChange::Insert {
                loc: at(line),
                lines: vec![text.to_string()],
            };
            change.apply(&mut doc).expect("apply");
            history.record(change);
        }
        history.end_batch();

        assert_eq!(doc.top_model().len(), 4);
        assert_eq!(history.undo_count(), 1);

        history.undo().expect("undo").apply(&mut doc).expect("apply undo");
        assert_eq!(doc.top_model().len(), 2);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut history = EditHistory::new();
        history.record(LineChange::Replace {
            loc: at(0),
            old: "a".to_string(),
            new: "b".to_string(),
        });
        history.undo().expect("undo");
        assert!(history.can_redo());

        history.record(LineChange::Replace {
            loc: at(0),
            old: "a".to_string(),
            new: "c".to_string(),
        });
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_trims_oldest() {
        let mut history = EditHistory::with_depth(2);
        for i in 0..3 {
            history.record(LineChange::Replace {
                loc: at(0),
                old: format!("v{}", i),
                new: format!("v{}", i + 1),
            });
        }
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn test_empty_batch_is_dropped() {
        let mut history = EditHistory::new();
        history.begin_batch();
        history.end_batch();
        assert!(!history.can_undo());
    }
}
