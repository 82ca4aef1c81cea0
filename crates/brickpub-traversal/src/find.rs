//! Counting sweep
//!
//! One light pass over the whole document per request: pages are
//! counted and their opening positions recorded, submodels are entered
//! once at their first reference, and the build-modification registry
//! is brought up to date. The walk state is snapshotted at every page
//! boundary; when the page just closed is the requested one, the sweep
//! re-walks only that region through [`crate::draw`] to produce the
//! page tree, then keeps counting to the end so the page total is
//! always current.
//!
//! Content accounting here mirrors the draw pass line for line. The
//! sweep never snapshots step content and never touches the renderer
//! for pages it does not materialize, which is what keeps a full count
//! cheap on large documents.

use std::collections::HashSet;

use tracing::{debug, trace};

use brickpub_core::data::Where;
use brickpub_core::message::{MessageBucket, MessageLevel, UserMessage};
use brickpub_document::line::{classify, ClassifiedLine, PartLine};
use brickpub_document::Submodel;

use crate::annotations::AnnotationCache;
use crate::buildmod::BuildModRegistry;
use crate::context::{
    LayoutConsumer, ModelCall, ModelFrame, ModelStack, StepImager, TraversalContext,
};
use crate::draw::{consecutive_refs, count_part, Materializer};
use crate::interpret::{interpret, Effect, PassMode, WalkState};
use crate::page::Page;
use crate::pli::PliAccumulator;
use crate::signal::TraverseRc;

/// Everything one sweep of the document produces
#[derive(Debug)]
pub struct SweepResult {
    /// How the sweep ended; `Continue` is a clean full count.
    pub rc: TraverseRc,
    /// Total pages counted.
    pub pages: usize,
    /// Opening position of each page in order, plus the end-of-document
    /// marker as the final entry.
    pub top_of_pages: Vec<Where>,
    /// The materialized target page, when one was requested and found.
    pub page: Option<Page>,
    /// Document-wide parts tally.
    pub bom: PliAccumulator,
}

/// Count every page of the document, materializing `target` if given
///
/// The registry is authoritative during the sweep: modification
/// history, piece counts, and display pages are recorded here and only
/// read back during materialization. A sweep with `target: None` is a
/// pure count.
pub fn sweep(
    ctx: &TraversalContext<'_>,
    registry: &mut BuildModRegistry,
    annotations: &mut AnnotationCache,
    imager: &dyn StepImager,
    layout: &mut dyn LayoutConsumer,
    target: Option<usize>,
) -> SweepResult {
    let top = ctx.document.top_model();
    registry.begin_walk();
    let mut sweep = Sweep {
        registry,
        annotations,
        imager,
        layout,
        target,
        pages: 0,
        top_of_pages: Vec::new(),
        page: None,
        visited: HashSet::new(),
        bom: PliAccumulator::default(),
        stack: ModelStack::new(),
    };
    sweep.visited.insert(top.name().to_ascii_lowercase());
    sweep.stack.push(ModelFrame {
        model_name: top.name().to_string(),
        line_number: 0,
        step_number: 1,
    });

    let rc = match sweep.walk_model(ctx, &ModelCall::root()) {
        TraverseRc::Continue => {
            sweep
                .top_of_pages
                .push(Where::new(top.name(), 0, top.len()));
            match target {
                Some(wanted) if wanted > sweep.pages => TraverseRc::RangeError { page: wanted },
                _ => TraverseRc::Continue,
            }
        }
        rc => rc,
    };
    debug!(pages = sweep.pages, rc = %rc, "sweep finished");

    SweepResult {
        rc,
        pages: sweep.pages,
        top_of_pages: sweep.top_of_pages,
        page: sweep.page,
        bom: sweep.bom,
    }
}

/// Per-page accounting between two boundaries
///
/// Holds the state snapshot taken when the page opened, which becomes
/// the draw pass's starting point if this page turns out to be the
/// target.
struct PageScan {
    saved: WalkState,
    has_steps: bool,
    has_inserts: bool,
    has_cover: bool,
    has_reserves: bool,
}

impl PageScan {
    fn begin(state: &WalkState) -> Self {
        Self {
            saved: state.clone(),
            has_steps: false,
            has_inserts: false,
            has_cover: false,
            has_reserves: false,
        }
    }

    fn reset(&mut self, state: &WalkState) {
        *self = Self::begin(state);
    }

    /// Whether a boundary here closes a page at all
    fn has_content(&self) -> bool {
        self.has_steps || self.has_inserts || self.has_cover || self.has_reserves
    }
}

struct Sweep<'s> {
    registry: &'s mut BuildModRegistry,
    annotations: &'s mut AnnotationCache,
    imager: &'s dyn StepImager,
    layout: &'s mut dyn LayoutConsumer,
    target: Option<usize>,
    pages: usize,
    top_of_pages: Vec<Where>,
    page: Option<Page>,
    visited: HashSet<String>,
    bom: PliAccumulator,
    stack: ModelStack,
}

impl Sweep<'_> {
    /// Walk one model from its first line
    fn walk_model(&mut self, ctx: &TraversalContext<'_>, call: &ModelCall) -> TraverseRc {
        let Some(submodel) = ctx.document.submodel_at(call.model_index) else {
            return TraverseRc::Continue;
        };
        trace!(model = submodel.name(), depth = self.stack.depth(), "walking model");
        let mut state = WalkState::start(submodel.name(), call.model_index);
        let mut scan = PageScan::begin(&state);

        for number in 0..submodel.len() {
            if ctx.abort_raised() {
                return TraverseRc::AbortProcess;
            }
            let loc = Where::new(submodel.name(), call.model_index, number);
            let Some(raw) = submodel.line(number) else {
                break;
            };

            match classify(raw, &loc) {
                Ok(ClassifiedLine::Blank) => {}
                Ok(ClassifiedLine::Part(part)) => {
                    let rc = self.content_part(ctx, call, &mut state, submodel, &part, raw, &loc);
                    if rc != TraverseRc::Continue {
                        return rc;
                    }
                }
                Ok(ClassifiedLine::Primitive(_)) => {
                    if !state.csi_suppressed() {
                        state.accumulator.append(raw, loc.clone());
                        state.step.open();
                    }
                }
                Ok(ClassifiedLine::Meta(directive)) => {
                    let effect = match interpret(
                        ctx,
                        call,
                        &mut state,
                        self.registry,
                        PassMode::Find,
                        &directive,
                        &loc,
                    ) {
                        Ok(effect) => effect,
                        Err(e) => {
                            ctx.messages.dispatch(UserMessage::at(
                                MessageBucket::Parse,
                                MessageLevel::Error,
                                loc.clone(),
                                e.to_string(),
                            ));
                            return TraverseRc::InvalidLine { loc };
                        }
                    };
                    let rc = self.apply_effect(ctx, call, &mut state, &mut scan, effect, raw, &loc);
                    if rc != TraverseRc::Continue {
                        return rc;
                    }
                }
                Err(e) => {
                    ctx.messages.dispatch(UserMessage::at(
                        MessageBucket::Parse,
                        MessageLevel::Warning,
                        loc.clone(),
                        e.to_string(),
                    ));
                }
            }
        }

        self.close_model(ctx, call, &mut state, &mut scan, submodel)
    }

    /// Handle one part line in the counting pass
    ///
    /// Submodels are entered at their first reference anywhere in the
    /// document so their pages number ahead of the page that places
    /// them. References inside a callout window never descend here; the
    /// draw pass builds the callout when the page is materialized.
    #[allow(clippy::too_many_arguments)]
    fn content_part(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        submodel: &Submodel,
        part: &PartLine,
        raw: &str,
        loc: &Where,
    ) -> TraverseRc {
        let id = part.normalized_part();

        if state.in_callout_window() && ctx.is_submodel(&id) {
            if let Some((counted, color)) = count_part(ctx, call, state, part, loc) {
                self.bom.add(&counted, color, loc);
            }
            return TraverseRc::Continue;
        }

        if !state.csi_suppressed() {
            state.accumulator.append(raw, loc.clone());
        }
        if !state.mods_csi_ignored() {
            state.step.add_part();
        }
        if let Some((counted, color)) = count_part(ctx, call, state, part, loc) {
            self.bom.add(&counted, color, loc);
        }

        if ctx.is_submodel(&id) {
            let key = id.to_ascii_lowercase();
            if self.stack.contains(&id) {
                ctx.messages.dispatch(UserMessage::at(
                    MessageBucket::Parse,
                    MessageLevel::Warning,
                    loc.clone(),
                    format!("Circular reference to {} via {}", id, self.stack.describe()),
                ));
            } else if !self.visited.contains(&key) {
                self.visited.insert(key);
                let Some(model_index) = ctx.document.index_of(&id) else {
                    return TraverseRc::Continue;
                };
                let instances = consecutive_refs(submodel, loc.line_number, part);
                let nested = call.nested(model_index, call.effective_color(part.color), instances);
                self.stack.push(ModelFrame {
                    model_name: id.clone(),
                    line_number: loc.line_number,
                    step_number: state.step.number(),
                });
                let rc = self.walk_model(ctx, &nested);
                self.stack.pop();
                match rc {
                    TraverseRc::Continue => {}
                    // A broken submodel spoils its own pages, not ours.
                    TraverseRc::InvalidLine { .. } | TraverseRc::RangeError { .. } => {}
                    rc => return rc,
                }
            }
        }
        TraverseRc::Continue
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_effect(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        scan: &mut PageScan,
        effect: Effect,
        raw: &str,
        loc: &Where,
    ) -> TraverseRc {
        // Page-level directives never act inside a callout window; the
        // draw pass discards them the same way.
        if state.in_callout_window()
            && matches!(
                effect,
                Effect::PageBreak
                    | Effect::CoverPage { .. }
                    | Effect::Insert(_)
                    | Effect::Reserve { .. }
            )
        {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::Insert,
                MessageLevel::Warning,
                loc.clone(),
                "Page directive ignored inside a callout".to_string(),
            ));
            return TraverseRc::Continue;
        }

        match effect {
            Effect::None
            | Effect::GroupBegin
            | Effect::GroupDivider
            | Effect::CalloutBegin
            | Effect::CalloutEnd => TraverseRc::Continue,
            Effect::RawContent => {
                if !state.csi_suppressed() {
                    state.accumulator.append(raw, loc.clone());
                }
                TraverseRc::Continue
            }
            Effect::StepBoundary | Effect::GroupEnd => {
                if state.close_step(loc, false).is_some() {
                    scan.has_steps = true;
                }
                if state.group.is_none()
                    && !call.in_callout
                    && !state.in_callout_window()
                    && scan.has_content()
                {
                    return self.page_boundary(ctx, call, state, scan, loc);
                }
                TraverseRc::Continue
            }
            Effect::PageBreak => {
                if state.group.is_some() {
                    ctx.messages.dispatch(UserMessage::at(
                        MessageBucket::Insert,
                        MessageLevel::Warning,
                        loc.clone(),
                        "INSERT PAGE inside a step group ignored".to_string(),
                    ));
                    return TraverseRc::Continue;
                }
                scan.has_inserts = true;
                self.page_boundary(ctx, call, state, scan, loc)
            }
            Effect::CoverPage { .. } => {
                scan.has_cover = true;
                TraverseRc::Continue
            }
            Effect::Insert(_) => {
                scan.has_inserts = true;
                TraverseRc::Continue
            }
            Effect::Reserve { .. } => {
                scan.has_reserves = true;
                TraverseRc::Continue
            }
            Effect::ModBegan { key } => {
                self.registry.record_display_page(&key, self.pages + 1);
                TraverseRc::Continue
            }
            Effect::Diverged { key, step } => TraverseRc::BuildModAction { key, step },
        }
    }

    /// Count the page that just closed at `loc`, materializing it when
    /// it is the target
    fn page_boundary(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        scan: &mut PageScan,
        loc: &Where,
    ) -> TraverseRc {
        self.pages += 1;
        self.top_of_pages.push(state.page_top.clone());
        trace!(page = self.pages, top = %state.page_top, bottom = %loc, "page counted");

        if self.target == Some(self.pages) {
            let mut materializer = Materializer {
                registry: &mut *self.registry,
                annotations: &mut *self.annotations,
                imager: self.imager,
                stack: &mut self.stack,
            };
            let outcome = materializer.draw_region(ctx, call, scan.saved.clone(), loc, self.pages);
            match outcome.rc {
                TraverseRc::EndOfPage => {
                    if let Some(page) = outcome.page {
                        self.layout.page_complete(&page);
                        self.page = Some(page);
                    }
                }
                rc => return rc,
            }
        }

        state.page_top = Where::new(loc.model_name.clone(), loc.model_index, loc.line_number + 1);
        scan.reset(state);
        TraverseRc::Continue
    }

    /// Close the trailing step and page at end of model
    fn close_model(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        scan: &mut PageScan,
        submodel: &Submodel,
    ) -> TraverseRc {
        let eof = Where::new(submodel.name(), call.model_index, submodel.len());
        if state.close_step(&eof, false).is_some() {
            scan.has_steps = true;
        }
        if !call.in_callout && scan.has_content() {
            let rc = self.page_boundary(ctx, call, state, scan, &eof);
            if rc != TraverseRc::Continue {
                return rc;
            }
        }

        if let Some(group) = &state.group {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::Parse,
                MessageLevel::Warning,
                group.opened_at.clone(),
                "MULTI_STEP BEGIN never closed".to_string(),
            ));
        }
        if let Some(callout) = &state.callout {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::Parse,
                MessageLevel::Warning,
                callout.opened_at.clone(),
                "CALLOUT BEGIN never closed".to_string(),
            ));
        }
        for frame in &state.mod_frames {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::BuildMod,
                MessageLevel::Warning,
                eof.clone(),
                format!("Build modification '{}' never closed", frame.key),
            ));
        }
        for scope in state.scopes.open_scopes() {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::Parse,
                MessageLevel::Warning,
                scope.opened_at.clone(),
                format!("{} never closed", scope.kind.construct()),
            ));
        }
        TraverseRc::Continue
    }
}
