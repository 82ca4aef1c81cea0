//! Page materialization
//!
//! Re-walks one counted page region from the walk state saved at its
//! top, assembling the step and range tree, attaching callouts, and
//! invoking the step imager once per closed step. The counting sweep
//! hands over the region bounds and the saved state; nothing here
//! renumbers pages or touches the registry's modification history.
//!
//! A page is only produced when its region completes normally. Any
//! interrupt from inside the region, including from a nested callout
//! walk, discards the partial tree and surfaces the return code.

use tracing::{debug, error, trace};

use brickpub_core::data::Where;
use brickpub_core::emit;
use brickpub_core::{AppEvent, RenderEvent};
use brickpub_core::message::{MessageBucket, MessageLevel, UserMessage};
use brickpub_document::line::{classify, ClassifiedLine, PartLine};
use brickpub_document::meta::InsertMeta;
use brickpub_document::Submodel;

use crate::annotations::{derive_annotation, AnnotationCache};
use crate::buildmod::BuildModRegistry;
use crate::context::{
    ModelCall, ModelFrame, ModelStack, StepImager, StepRequest, TraversalContext,
};
use crate::interpret::{interpret, Effect, PassMode, WalkState};
use crate::page::{
    Callout, CoverKind, Page, PageBuilder, PageInsert, ReserveSpace, Step, StepRange,
};
use crate::signal::TraverseRc;

/// Result of materializing one page region
#[derive(Debug)]
pub struct RegionOutcome {
    /// How the region ended.
    pub rc: TraverseRc,
    /// The finished page, present only on a normal end.
    pub page: Option<Page>,
}

impl RegionOutcome {
    fn interrupted(rc: TraverseRc) -> Self {
        Self { rc, page: None }
    }
}

/// What one interpreted directive means for the region in progress
enum RegionFlow {
    Continue,
    PageDone,
    Interrupt(TraverseRc),
}

/// Draw-pass driver for a single page region
///
/// Borrows the sweep's registry and annotation cache so modification
/// actions and cached annotations read identically in both passes.
pub(crate) struct Materializer<'s> {
    pub registry: &'s mut BuildModRegistry,
    pub annotations: &'s mut AnnotationCache,
    pub imager: &'s dyn StepImager,
    pub stack: &'s mut ModelStack,
}

impl Materializer<'_> {
    /// Materialize the page whose region runs from the saved state's
    /// page top through `bottom`
    ///
    /// `state` is the snapshot taken when the previous page closed, so
    /// scopes, buffers, accumulated content, and modification branches
    /// resume exactly where the counting pass left them.
    pub fn draw_region(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        mut state: WalkState,
        bottom: &Where,
        page_number: usize,
    ) -> RegionOutcome {
        let Some(submodel) = ctx.document.submodel_at(call.model_index) else {
            return RegionOutcome::interrupted(TraverseRc::RangeError { page: page_number });
        };
        debug!(
            page = page_number,
            model = submodel.name(),
            from = state.page_top.line_number,
            to = bottom.line_number,
            "drawing page region"
        );

        let mut page = PageBuilder::new(page_number, state.page_top.clone());
        page.set_instances(call.instances);

        let mut number = state.page_top.line_number;
        while number < submodel.len() && number <= bottom.line_number {
            if ctx.abort_raised() {
                return RegionOutcome::interrupted(TraverseRc::AbortProcess);
            }
            let loc = Where::new(submodel.name(), call.model_index, number);
            let Some(raw) = submodel.line(number) else {
                break;
            };

            match classify(raw, &loc) {
                Ok(ClassifiedLine::Blank) => {}
                Ok(ClassifiedLine::Part(part)) => {
                    if let Some(rc) =
                        self.part_line(ctx, call, &mut state, submodel, &part, raw, &loc)
                    {
                        return RegionOutcome::interrupted(rc);
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
                        PassMode::Draw,
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
                            return RegionOutcome::interrupted(TraverseRc::InvalidLine { loc });
                        }
                    };
                    match self.region_effect(ctx, call, &mut state, &mut page, effect, raw, &loc) {
                        RegionFlow::Continue => {}
                        RegionFlow::PageDone => {
                            let after = Where::new(
                                submodel.name(),
                                call.model_index,
                                loc.line_number + 1,
                            );
                            return RegionOutcome {
                                rc: TraverseRc::EndOfPage,
                                page: Some(page.finish(after)),
                            };
                        }
                        RegionFlow::Interrupt(rc) => return RegionOutcome::interrupted(rc),
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
            number += 1;
        }

        // The region ran off the end of the model; close at end of file.
        let eof = Where::new(submodel.name(), call.model_index, submodel.len());
        match self.finish_step(ctx, &mut state, &eof) {
            Ok(Some(step)) => page.push_step(step),
            Ok(None) => {}
            Err(rc) => return RegionOutcome::interrupted(rc),
        }
        RegionOutcome {
            rc: TraverseRc::EndOfPage,
            page: Some(page.finish(eof)),
        }
    }

    fn region_effect(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        page: &mut PageBuilder,
        effect: Effect,
        raw: &str,
        loc: &Where,
    ) -> RegionFlow {
        match effect {
            Effect::None
            | Effect::ModBegan { .. }
            | Effect::GroupBegin
            | Effect::CalloutBegin
            | Effect::CalloutEnd => RegionFlow::Continue,
            Effect::RawContent => {
                if !state.csi_suppressed() {
                    state.accumulator.append(raw, loc.clone());
                }
                RegionFlow::Continue
            }
            Effect::StepBoundary | Effect::GroupEnd => {
                match self.finish_step(ctx, state, loc) {
                    Ok(Some(step)) => page.push_step(step),
                    Ok(None) => {}
                    Err(rc) => return RegionFlow::Interrupt(rc),
                }
                if state.group.is_none() && !call.in_callout && page.has_content() {
                    RegionFlow::PageDone
                } else {
                    RegionFlow::Continue
                }
            }
            Effect::GroupDivider => {
                page.begin_range();
                RegionFlow::Continue
            }
            Effect::PageBreak => {
                page.add_insert(PageInsert {
                    meta: InsertMeta::Page,
                    loc: loc.clone(),
                });
                RegionFlow::PageDone
            }
            Effect::CoverPage { front } => {
                page.set_cover(if front {
                    CoverKind::Front
                } else {
                    CoverKind::Back
                });
                page.add_insert(PageInsert {
                    meta: InsertMeta::CoverPage { front },
                    loc: loc.clone(),
                });
                RegionFlow::Continue
            }
            Effect::Insert(meta) => {
                page.add_insert(PageInsert {
                    meta,
                    loc: loc.clone(),
                });
                RegionFlow::Continue
            }
            Effect::Reserve { fraction } => {
                page.push_reserve(ReserveSpace {
                    fraction,
                    loc: loc.clone(),
                });
                RegionFlow::Continue
            }
            Effect::Diverged { key, step } => {
                RegionFlow::Interrupt(TraverseRc::BuildModAction { key, step })
            }
        }
    }

    /// Handle one part line in the draw pass
    ///
    /// Submodel references inside a callout window build a [`Callout`]
    /// on the open step instead of assembly content; everything else is
    /// assembly content plus parts-list accounting. The draw pass never
    /// descends for ordinary submodel references, their pages were
    /// already counted and the renderer resolves the reference.
    fn part_line(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &mut WalkState,
        submodel: &Submodel,
        part: &PartLine,
        raw: &str,
        loc: &Where,
    ) -> Option<TraverseRc> {
        let id = part.normalized_part();

        if state.in_callout_window() && ctx.is_submodel(&id) {
            if !state.mods_csi_ignored() && first_of_run(submodel, loc.line_number, part) {
                let instances = consecutive_refs(submodel, loc.line_number, part);
                match self.draw_callout(ctx, call, state, part, &id, instances, loc) {
                    Ok(Some(callout)) => state.step.add_callout(callout),
                    Ok(None) => {}
                    Err(rc) => return Some(rc),
                }
            }
            let _ = count_part(ctx, call, state, part, loc);
            return None;
        }

        if !state.csi_suppressed() {
            state.accumulator.append(raw, loc.clone());
        }
        if !state.mods_csi_ignored() {
            state.step.add_part();
        }
        let _ = count_part(ctx, call, state, part, loc);
        None
    }

    /// Build the callout for one run of identical submodel references
    fn draw_callout(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        state: &WalkState,
        part: &PartLine,
        id: &str,
        instances: usize,
        anchor: &Where,
    ) -> Result<Option<Callout>, TraverseRc> {
        let Some(model_index) = ctx.document.index_of(id) else {
            return Ok(None);
        };
        if self.stack.contains(id) {
            ctx.messages.dispatch(UserMessage::at(
                MessageBucket::Parse,
                MessageLevel::Warning,
                anchor.clone(),
                format!("Circular reference to {} via {}", id, self.stack.describe()),
            ));
            return Ok(None);
        }

        self.stack.push(ModelFrame {
            model_name: id.to_string(),
            line_number: anchor.line_number,
            step_number: state.step.number(),
        });
        let mut nested = call.nested(model_index, call.effective_color(part.color), instances);
        nested.in_callout = true;
        let result = self.walk_callout(ctx, &nested, anchor);
        self.stack.pop();
        result.map(Some)
    }

    /// Walk a called-out submodel in full, collecting its step ranges
    ///
    /// The called-out assembly is drawn whole: every step of the
    /// submodel lands in the callout, with dividers opening new ranges.
    /// References it makes to further submodels stay as content unless
    /// they sit inside their own callout window, which nests.
    fn walk_callout(
        &mut self,
        ctx: &TraversalContext<'_>,
        call: &ModelCall,
        anchor: &Where,
    ) -> Result<Callout, TraverseRc> {
        let Some(submodel) = ctx.document.submodel_at(call.model_index) else {
            return Ok(Callout {
                anchor: anchor.clone(),
                ranges: Vec::new(),
                instances: call.instances,
            });
        };
        trace!(model = submodel.name(), at = %anchor, "drawing callout");

        let mut state = WalkState::start(submodel.name(), call.model_index);
        let mut ranges = vec![StepRange::default()];

        for number in 0..submodel.len() {
            if ctx.abort_raised() {
                return Err(TraverseRc::AbortProcess);
            }
            let loc = Where::new(submodel.name(), call.model_index, number);
            let Some(raw) = submodel.line(number) else {
                break;
            };

            match classify(raw, &loc) {
                Ok(ClassifiedLine::Blank) => {}
                Ok(ClassifiedLine::Part(part)) => {
                    if let Some(rc) =
                        self.part_line(ctx, call, &mut state, submodel, &part, raw, &loc)
                    {
                        return Err(rc);
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
                        PassMode::Draw,
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
                            return Err(TraverseRc::InvalidLine { loc });
                        }
                    };
                    match effect {
                        Effect::StepBoundary | Effect::GroupEnd => {
                            match self.finish_step(ctx, &mut state, &loc) {
                                Ok(Some(step)) => push_range_step(&mut ranges, step),
                                Ok(None) => {}
                                Err(rc) => return Err(rc),
                            }
                        }
                        Effect::GroupDivider => ranges.push(StepRange::default()),
                        Effect::RawContent => {
                            if !state.csi_suppressed() {
                                state.accumulator.append(raw, loc.clone());
                            }
                        }
                        Effect::Diverged { key, step } => {
                            return Err(TraverseRc::BuildModAction { key, step });
                        }
                        Effect::PageBreak
                        | Effect::CoverPage { .. }
                        | Effect::Insert(_)
                        | Effect::Reserve { .. } => {
                            ctx.messages.dispatch(UserMessage::at(
                                MessageBucket::Insert,
                                MessageLevel::Warning,
                                loc.clone(),
                                "Page directive ignored inside a callout".to_string(),
                            ));
                        }
                        Effect::None
                        | Effect::ModBegan { .. }
                        | Effect::GroupBegin
                        | Effect::CalloutBegin
                        | Effect::CalloutEnd => {}
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

        let eof = Where::new(submodel.name(), call.model_index, submodel.len());
        match self.finish_step(ctx, &mut state, &eof) {
            Ok(Some(step)) => push_range_step(&mut ranges, step),
            Ok(None) => {}
            Err(rc) => return Err(rc),
        }
        ranges.retain(|r| !r.is_empty());

        Ok(Callout {
            anchor: anchor.clone(),
            ranges,
            instances: call.instances,
        })
    }

    /// Close the open step at a boundary, annotate and image it
    ///
    /// Annotation text staged here was not cached when the sweep began,
    /// so the step cannot carry it yet; the region reports
    /// [`TraverseRc::CsiAnnotation`] and the caller refreshes the cache
    /// before restarting. Imaging failures are reported and the step is
    /// kept without an image.
    fn finish_step(
        &mut self,
        ctx: &TraversalContext<'_>,
        state: &mut WalkState,
        bottom: &Where,
    ) -> Result<Option<Step>, TraverseRc> {
        self.annotate_parts(ctx, state);
        if self.annotations.is_stale() {
            debug!(at = %bottom, "annotation cache stale, region abandoned");
            return Err(TraverseRc::CsiAnnotation);
        }

        let Some(mut step) = state.close_step(bottom, true) else {
            return Ok(None);
        };
        self.image_step(&mut step, state);
        Ok(Some(step))
    }

    /// Apply cached annotations to the open step's parts list, staging
    /// derivable text for parts the cache has not seen
    fn annotate_parts(&mut self, ctx: &TraversalContext<'_>, state: &mut WalkState) {
        let mut found: Vec<(String, u32, String)> = Vec::new();
        for entry in state.step.parts_list().entries() {
            match self.annotations.annotation(&entry.part) {
                Some(text) => found.push((entry.part.clone(), entry.color, text.to_string())),
                None => {
                    if let Some(description) = ctx.catalog.description(&entry.part) {
                        if let Some(text) = derive_annotation(&description) {
                            self.annotations.stage(&entry.part, text);
                        }
                    }
                }
            }
        }
        for (part, color, text) in found {
            state.step.parts_list_mut().annotate(&part, color, text);
        }
    }

    fn image_step(&self, step: &mut Step, state: &WalkState) {
        let request = StepRequest {
            model_name: &step.top.model_name,
            step_number: step.number,
            lines: &step.content.lines,
            rotation: step.rotation,
            camera: state.camera,
        };
        match self.imager.image_step(&request) {
            Ok(image) => {
                if let Some(path) = &image {
                    trace!(step = step.number, path = %path.display(), "step imaged");
                    let _ = emit!(AppEvent::Render(RenderEvent::StepRendered {
                        path: path.clone(),
                    }));
                }
                step.image = image;
            }
            Err(e) => {
                error!(step = step.number, error = %e, "step image failed");
                let _ = emit!(AppEvent::Render(RenderEvent::RenderFailed {
                    reason: e.to_string(),
                }));
            }
        }
    }
}

fn push_range_step(ranges: &mut Vec<StepRange>, step: Step) {
    if let Some(last) = ranges.last_mut() {
        last.entries.push(crate::page::RangeEntry::Step(step));
    }
}

/// Count one placed part into the open step's parts list
///
/// Ghosted parts, excluded catalogue entries, and suppressed scopes are
/// skipped and report `None`; substitutions and context colour
/// resolution apply before the tally, and the resolved identity comes
/// back so callers can mirror the count elsewhere.
pub(crate) fn count_part(
    ctx: &TraversalContext<'_>,
    call: &ModelCall,
    state: &mut WalkState,
    part: &PartLine,
    loc: &Where,
) -> Option<(String, u32)> {
    if part.ghost || state.pli_suppressed() {
        return None;
    }
    let id = part.normalized_part();
    if ctx.catalog.is_excluded(&id) {
        return None;
    }
    let resolved = ctx.substitutions.substitute(&id).unwrap_or(id);
    let color = call.effective_color(part.color);
    state.step.parts_list_mut().add(&resolved, color, loc);
    Some((resolved, color))
}

/// Whether the reference at `line` opens a run of identical references
pub(crate) fn first_of_run(submodel: &Submodel, line: usize, part: &PartLine) -> bool {
    if line == 0 {
        return true;
    }
    let Some(raw) = submodel.line(line - 1) else {
        return true;
    };
    let probe = Where::new(submodel.name(), 0, line - 1);
    match classify(raw, &probe) {
        Ok(ClassifiedLine::Part(prev)) => !same_reference(&prev, part),
        _ => true,
    }
}

/// Count the strictly consecutive references identical to the one at
/// `from`, including it
pub(crate) fn consecutive_refs(submodel: &Submodel, from: usize, part: &PartLine) -> usize {
    let mut count = 1;
    let mut line = from + 1;
    while let Some(raw) = submodel.line(line) {
        let probe = Where::new(submodel.name(), 0, line);
        match classify(raw, &probe) {
            Ok(ClassifiedLine::Part(next)) if same_reference(&next, part) => count += 1,
            _ => break,
        }
        line += 1;
    }
    count
}

fn same_reference(a: &PartLine, b: &PartLine) -> bool {
    a.color == b.color && a.normalized_part() == b.normalized_part()
}
