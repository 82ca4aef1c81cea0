//! Page, range, and step tree
//!
//! The output of one draw: a page holds one or more ranges, a range holds
//! steps or reserved space, and a step owns its frozen content, its parts
//! list, and any callouts. The tree is rebuilt on every draw; nothing in
//! it survives a redraw.
//!
//! Steps pass through a strict lifecycle inside one draw: not started
//! until content appears, open while accumulating, closed exactly once at
//! a step boundary. [`StepBuilder::close`] consumes the builder, so a
//! closed step cannot reopen.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use brickpub_core::data::{RotStep, Where};
use brickpub_document::meta::InsertMeta;

use crate::accumulator::ContentSnapshot;
use crate::pli::{PliAccumulator, PliEntry};

/// Which cover a cover page is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverKind {
    Front,
    Back,
}

/// One finished step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Continuous step number.
    pub number: usize,
    /// First line of the step.
    pub top: Where,
    /// The boundary line that closed the step.
    pub bottom: Where,
    /// The whole assembly as of this step.
    pub content: ContentSnapshot,
    /// Parts added during this step alone.
    pub parts_added: usize,
    /// Viewing rotation in force, if any.
    pub rotation: Option<RotStep>,
    /// Set when the step was synthesized without new parts, for example
    /// by a buffer retrieve or a build-modification action.
    pub special_case: bool,
    /// Parts list for this step.
    pub parts_list: Vec<PliEntry>,
    /// Called-out sub-assemblies anchored to this step.
    pub callouts: Vec<Callout>,
    /// Rendered image path once the renderer has run.
    pub image: Option<PathBuf>,
}

/// Reserved page space standing in for a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveSpace {
    /// Fraction of page height reserved.
    pub fraction: f32,
    /// Position of the RESERVE directive.
    pub loc: Where,
}

/// A step or a reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeEntry {
    Step(Step),
    Reserve(ReserveSpace),
}

/// Ordered steps that render together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRange {
    pub entries: Vec<RangeEntry>,
}

impl StepRange {
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.entries.iter().filter_map(|e| match e {
            RangeEntry::Step(step) => Some(step),
            RangeEntry::Reserve(_) => None,
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A page-level insert directive and where it appeared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInsert {
    pub meta: InsertMeta,
    pub loc: Where,
}

/// The top-level renderable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// One-based page number.
    pub number: usize,
    /// First line of the page.
    pub top: Where,
    /// Line after the last line of the page.
    pub bottom: Where,
    /// Step ranges, one unless the page groups steps with dividers.
    pub ranges: Vec<StepRange>,
    /// Page-level inserts in document order.
    pub inserts: Vec<PageInsert>,
    /// Set when the page is a cover.
    pub cover: Option<CoverKind>,
    /// How many times this page's submodel is placed in its parent.
    pub instances: usize,
}

impl Page {
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.ranges.iter().flat_map(StepRange::steps)
    }

    pub fn step_count(&self) -> usize {
        self.ranges.iter().map(StepRange::step_count).sum()
    }

    pub fn is_cover(&self) -> bool {
        self.cover.is_some()
    }
}

/// A called-out sub-assembly, structured like a page but not paginated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callout {
    /// Position of the CALLOUT BEGIN.
    pub anchor: Where,
    pub ranges: Vec<StepRange>,
    /// How many times the called-out assembly is placed.
    pub instances: usize,
}

impl Callout {
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.ranges.iter().flat_map(StepRange::steps)
    }

    pub fn step_count(&self) -> usize {
        self.ranges.iter().map(StepRange::step_count).sum()
    }
}

/// Step lifecycle within one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// No content seen since the last boundary.
    NotStarted,
    /// Accumulating content.
    Open,
}

/// Accumulates one step until its boundary
#[derive(Debug, Clone)]
pub struct StepBuilder {
    number: usize,
    top: Where,
    phase: StepPhase,
    parts_added: usize,
    rotation: Option<RotStep>,
    special_case: bool,
    parts_list: PliAccumulator,
    callouts: Vec<Callout>,
}

impl StepBuilder {
    pub fn new(number: usize, top: Where) -> Self {
        Self {
            number,
            top,
            phase: StepPhase::NotStarted,
            parts_added: 0,
            rotation: None,
            special_case: false,
            parts_list: PliAccumulator::new(),
            callouts: Vec::new(),
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// Whether any content has opened the step
    pub fn is_started(&self) -> bool {
        self.phase == StepPhase::Open
    }

    /// Move to the open phase; no-op if already open
    pub fn open(&mut self) {
        self.phase = StepPhase::Open;
    }

    /// Count one part added in this step
    pub fn add_part(&mut self) {
        self.open();
        self.parts_added += 1;
    }

    pub fn parts_added(&self) -> usize {
        self.parts_added
    }

    /// Mark the step content-bearing without parts
    pub fn mark_special(&mut self) {
        self.open();
        self.special_case = true;
    }

    pub fn set_rotation(&mut self, rotation: RotStep) {
        self.rotation = Some(rotation);
    }

    pub fn add_callout(&mut self, callout: Callout) {
        self.open();
        self.callouts.push(callout);
    }

    pub fn parts_list(&self) -> &PliAccumulator {
        &self.parts_list
    }

    pub fn parts_list_mut(&mut self) -> &mut PliAccumulator {
        &mut self.parts_list
    }

    /// Close the step at its boundary, freezing the content
    ///
    /// Consumes the builder; a new builder starts the next step.
    pub fn close(self, bottom: Where, content: ContentSnapshot) -> Step {
        Step {
            number: self.number,
            top: self.top,
            bottom,
            content,
            parts_added: self.parts_added,
            rotation: self.rotation,
            special_case: self.special_case,
            parts_list: self.parts_list.entries().into_iter().cloned().collect(),
            callouts: self.callouts,
            image: None,
        }
    }
}

/// Accumulates one page until its boundary
#[derive(Debug)]
pub struct PageBuilder {
    number: usize,
    top: Where,
    ranges: Vec<StepRange>,
    inserts: Vec<PageInsert>,
    cover: Option<CoverKind>,
    instances: usize,
}

impl PageBuilder {
    pub fn new(number: usize, top: Where) -> Self {
        Self {
            number,
            top,
            ranges: Vec::new(),
            inserts: Vec::new(),
            cover: None,
            instances: 1,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    fn current_range(&mut self) -> &mut StepRange {
        if self.ranges.is_empty() {
            self.ranges.push(StepRange::default());
        }
        let last = self.ranges.len() - 1;
        &mut self.ranges[last]
    }

    pub fn push_step(&mut self, step: Step) {
        self.current_range().entries.push(RangeEntry::Step(step));
    }

    pub fn push_reserve(&mut self, reserve: ReserveSpace) {
        self.current_range().entries.push(RangeEntry::Reserve(reserve));
    }

    /// Start a new range at a step-group divider
    pub fn begin_range(&mut self) {
        if self.ranges.is_empty() {
            self.ranges.push(StepRange::default());
        }
        self.ranges.push(StepRange::default());
    }

    pub fn add_insert(&mut self, insert: PageInsert) {
        self.inserts.push(insert);
    }

    pub fn set_cover(&mut self, cover: CoverKind) {
        self.cover = Some(cover);
    }

    pub fn set_instances(&mut self, instances: usize) {
        self.instances = instances.max(1);
    }

    pub fn step_count(&self) -> usize {
        self.ranges.iter().map(StepRange::step_count).sum()
    }

    /// Whether anything has landed on the page yet
    ///
    /// A boundary with nothing on the page closes no page; this is what
    /// lets a cover or insert close alone at the next STEP while bare
    /// consecutive boundaries collapse.
    pub fn has_content(&self) -> bool {
        self.cover.is_some()
            || !self.inserts.is_empty()
            || self.ranges.iter().any(|r| !r.entries.is_empty())
    }

    /// Finish the page at its boundary
    pub fn finish(self, bottom: Where) -> Page {
        Page {
            number: self.number,
            top: self.top,
            bottom,
            ranges: self.ranges,
            inserts: self.inserts,
            cover: self.cover,
            instances: self.instances,
        }
    }
}
