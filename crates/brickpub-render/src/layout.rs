//! Page layout consumers
//!
//! Traversal hands every completed page to a layout consumer as it
//! closes. Visual placement is out of scope for this crate; what lives
//! here is the recording consumer that tooling and tests use to inspect
//! pagination without holding the page trees themselves.

use brickpub_traversal::{LayoutConsumer, Page};

/// Flat summary of one completed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Page number in final order.
    pub number: usize,
    /// Step numbers on the page, in document order.
    pub steps: Vec<usize>,
    /// Callouts attached across the page's steps.
    pub callouts: usize,
    /// Inserts placed on the page.
    pub inserts: usize,
    /// Whether the page is a front or back cover.
    pub cover: bool,
}

/// Layout consumer that keeps a record of every page it sees
#[derive(Debug, Default)]
pub struct RecordingLayout {
    pages: Vec<PageRecord>,
}

impl RecordingLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in completion order
    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page numbers in completion order
    pub fn numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|page| page.number).collect()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

impl LayoutConsumer for RecordingLayout {
    fn page_complete(&mut self, page: &Page) {
        self.pages.push(PageRecord {
            number: page.number,
            steps: page.steps().map(|step| step.number).collect(),
            callouts: page.steps().map(|step| step.callouts.len()).sum(),
            inserts: page.inserts.len(),
            cover: page.is_cover(),
        });
    }
}
