//! Directive interpreter
//!
//! Applies one parsed directive to the mutable walk state and reports an
//! [`Effect`] for the pass driver to act on. Side effects stay confined
//! to the walk state and the build-modification registry; page and step
//! construction is the driver's business.
//!
//! Authoring mistakes are recoverable wherever continuing is safe: the
//! offending directive is reported and skipped. A `CALLOUT END` without
//! its `BEGIN`, or a nested `BEGIN` of an already-open suppression
//! scope, abandons the current traversal call instead, because content
//! attribution past that point would be wrong.

use tracing::{debug, trace};

use brickpub_core::constants::{CAMERA_FOV_MAX, CAMERA_FOV_MIN};
use brickpub_core::data::{RotStepKind, Where};
use brickpub_core::message::{MessageBucket, MessageLevel, UserMessage};
use brickpub_core::ParseError;
use brickpub_document::line::{classify, ClassifiedLine};
use brickpub_document::meta::{
    BufferOp, BuildModMeta, CalloutMeta, CameraMeta, Directive, InsertMeta, MultiStepMeta,
    PartGroupMeta, PliMeta, RemoveMeta, SynthMeta,
};

use crate::accumulator::ContentAccumulator;
use crate::buffers::BufferStore;
use crate::buildmod::{BuildModAction, BuildModRegistry};
use crate::context::{CameraView, ModelCall, TraversalContext};
use crate::page::StepBuilder;
use crate::scopes::{ScopeKind, ScopeStack};

/// Which side of an open build modification the cursor is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModBranch {
    /// Between BEGIN and END_MOD.
    Modified,
    /// Between END_MOD and END.
    Original,
}

/// Gating frame for one open build modification
///
/// The assembly image renders the modified block under Apply and the
/// original block under Remove. The parts list counts the original
/// block under either action and never the modified block, so the two
/// suppression rules disagree exactly in the Apply branch.
#[derive(Debug, Clone)]
pub struct ModFrame {
    pub key: String,
    pub action: BuildModAction,
    pub branch: ModBranch,
}

impl ModFrame {
    fn csi_ignored(&self) -> bool {
        match self.branch {
            ModBranch::Modified => self.action == BuildModAction::Remove,
            ModBranch::Original => self.action == BuildModAction::Apply,
        }
    }

    fn pli_ignored(&self) -> bool {
        self.branch == ModBranch::Modified
    }
}

/// Open step-group window
#[derive(Debug, Clone)]
pub struct GroupState {
    pub opened_at: Where,
}

/// Open callout window
#[derive(Debug, Clone)]
pub struct CalloutState {
    pub opened_at: Where,
}

/// Whether the sweep is scanning lightly or materializing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Counting pages; registry writes are authoritative.
    Find,
    /// Re-walking an already-counted page region; the registry is read
    /// only, since the light scan recorded everything.
    Draw,
}

/// Mutable state carried through one submodel walk
///
/// Cloned once per page boundary so the materializing pass can restart
/// from the exact state the page opened with.
#[derive(Debug, Clone)]
pub struct WalkState {
    /// Growing assembly content since the walk began.
    pub accumulator: ContentAccumulator,
    /// Buffered-exchange snapshots.
    pub buffers: BufferStore,
    /// Open suppression scopes.
    pub scopes: ScopeStack,
    /// Open build-modification gating frames, innermost last.
    pub mod_frames: Vec<ModFrame>,
    /// The step currently accumulating.
    pub step: StepBuilder,
    /// Viewing rotation in force, until ROTSTEP END.
    pub rotation: Option<brickpub_core::data::RotStep>,
    /// Camera settings in force.
    pub camera: CameraView,
    /// Set by NOSTEP; the next boundary closes nothing.
    pub no_step: bool,
    /// Open step group, if any.
    pub group: Option<GroupState>,
    /// Open callout window, if any.
    pub callout: Option<CalloutState>,
    /// Where the page currently accumulating opened.
    pub page_top: Where,
}

impl WalkState {
    /// Fresh state positioned at the top of a submodel
    pub fn start(model_name: &str, model_index: usize) -> Self {
        let top = Where::new(model_name, model_index, 0);
        Self {
            accumulator: ContentAccumulator::new(),
            buffers: BufferStore::new(),
            scopes: ScopeStack::new(),
            mod_frames: Vec::new(),
            step: StepBuilder::new(1, top.clone()),
            rotation: None,
            camera: CameraView::default(),
            no_step: false,
            group: None,
            callout: None,
            page_top: top,
        }
    }

    /// Whether an open build-modification branch suppresses assembly content
    pub fn mods_csi_ignored(&self) -> bool {
        self.mod_frames.iter().any(ModFrame::csi_ignored)
    }

    /// Whether an open build-modification branch suppresses parts-list accounting
    pub fn mods_pli_ignored(&self) -> bool {
        self.mod_frames.iter().any(ModFrame::pli_ignored)
    }

    /// Whether assembly content is suppressed here
    pub fn csi_suppressed(&self) -> bool {
        self.scopes.assembly_suppressed() || self.mods_csi_ignored()
    }

    /// Whether parts-list accounting is suppressed here
    pub fn pli_suppressed(&self) -> bool {
        self.scopes.parts_list_suppressed() || self.mods_pli_ignored()
    }

    /// Whether the cursor is inside a callout window
    pub fn in_callout_window(&self) -> bool {
        self.callout.is_some()
    }

    /// Close the open step at a boundary
    ///
    /// Returns `None` when the boundary closes nothing: the step never
    /// started, a NOSTEP suppressed it, or the boundary sits inside a
    /// suppressed build-modification branch. The builder resets for the
    /// next step either way, except under NOSTEP, where accumulated
    /// parts carry into the next boundary.
    pub fn close_step(
        &mut self,
        bottom: &Where,
        snapshot_content: bool,
    ) -> Option<crate::page::Step> {
        if self.mods_csi_ignored() {
            return None;
        }
        if self.no_step {
            self.no_step = false;
            trace!(at = %bottom, "boundary suppressed by NOSTEP");
            return None;
        }

        let next_top = Where::new(bottom.model_name.clone(), bottom.model_index, bottom.line_number + 1);
        if !self.step.is_started() {
            self.step = StepBuilder::new(self.step.number(), next_top);
            return None;
        }

        let content = if snapshot_content {
            self.accumulator.snapshot()
        } else {
            crate::accumulator::ContentSnapshot::default()
        };
        let number = self.step.number();
        let mut finished = std::mem::replace(&mut self.step, StepBuilder::new(number + 1, next_top));
        if let Some(rotation) = self.rotation {
            finished.set_rotation(rotation);
        }
        Some(finished.close(bottom.clone(), content))
    }
}

/// What a directive asks the pass driver to do
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Nothing; the directive's effect is already applied.
    None,
    /// The raw line belongs in the accumulated content.
    RawContent,
    /// STEP or ROTSTEP boundary.
    StepBoundary,
    /// INSERT PAGE; the page closes at this line.
    PageBreak,
    /// INSERT COVER_PAGE; the open page becomes a cover.
    CoverPage { front: bool },
    /// MULTI_STEP BEGIN opened a step group.
    GroupBegin,
    /// MULTI_STEP DIVIDER inside an open group.
    GroupDivider,
    /// MULTI_STEP END; the group page closes at this line.
    GroupEnd,
    /// CALLOUT BEGIN opened a callout window.
    CalloutBegin,
    /// CALLOUT END closed the callout window.
    CalloutEnd,
    /// A page-level insert to record.
    Insert(InsertMeta),
    /// Reserved page space standing in for a step.
    Reserve { fraction: f32 },
    /// A build modification began; the light scan records its page.
    ModBegan { key: String },
    /// A recorded build-modification action differs from the directive.
    Diverged { key: String, step: usize },
}

/// Apply one directive to the walk state
///
/// # Errors
/// Returns a parse error only for nesting mistakes that make
/// continuation unsafe; the caller reports it and abandons the current
/// traversal call. Everything else is reported here and recovered.
pub fn interpret(
    ctx: &TraversalContext<'_>,
    call: &ModelCall,
    state: &mut WalkState,
    registry: &mut BuildModRegistry,
    mode: PassMode,
    directive: &Directive,
    loc: &Where,
) -> Result<Effect, ParseError> {
    match directive {
        Directive::Comment { .. } => Ok(Effect::None),

        Directive::Step => Ok(Effect::StepBoundary),

        Directive::RotStep(rot) => {
            state.rotation = if rot.kind == RotStepKind::End {
                None
            } else {
                Some(*rot)
            };
            Ok(Effect::StepBoundary)
        }

        Directive::FileBegin { .. } | Directive::FileEnd => {
            warn_skip(ctx, loc, "FILE directive inside a submodel body ignored");
            Ok(Effect::None)
        }

        Directive::Callout(CalloutMeta::Begin) => {
            if state.callout.is_some() {
                return Err(ParseError::NestedBegin {
                    loc: loc.clone(),
                    construct: "CALLOUT".to_string(),
                });
            }
            state.callout = Some(CalloutState {
                opened_at: loc.clone(),
            });
            Ok(Effect::CalloutBegin)
        }

        Directive::Callout(CalloutMeta::End) => {
            if state.callout.take().is_none() {
                return Err(ParseError::UnmatchedEnd {
                    loc: loc.clone(),
                    construct: "CALLOUT".to_string(),
                });
            }
            Ok(Effect::CalloutEnd)
        }

        Directive::MultiStep(MultiStepMeta::Begin) => {
            if state.group.is_some() {
                warn_skip(ctx, loc, "MULTI_STEP BEGIN inside an open step group ignored");
                return Ok(Effect::None);
            }
            state.group = Some(GroupState {
                opened_at: loc.clone(),
            });
            Ok(Effect::GroupBegin)
        }

        Directive::MultiStep(MultiStepMeta::Divider) => {
            if state.group.is_none() {
                warn_skip(ctx, loc, "MULTI_STEP DIVIDER outside a step group ignored");
                return Ok(Effect::None);
            }
            Ok(Effect::GroupDivider)
        }

        Directive::MultiStep(MultiStepMeta::End) => {
            if state.group.take().is_none() {
                warn_skip(ctx, loc, "MULTI_STEP END without BEGIN ignored");
                return Ok(Effect::None);
            }
            Ok(Effect::GroupEnd)
        }

        Directive::BuildMod(meta) => build_mod(ctx, state, registry, mode, meta, loc),

        Directive::PartGroup(PartGroupMeta::BeginIgnore) => {
            state.scopes.open(ScopeKind::PartIgnore, loc)?;
            Ok(Effect::None)
        }

        Directive::PartGroup(PartGroupMeta::End) => {
            if let Err(e) = state.scopes.close(ScopeKind::PartIgnore, loc) {
                report_parse(ctx, loc, &e);
            }
            Ok(Effect::None)
        }

        Directive::Pli(PliMeta::BeginIgnore) => {
            state.scopes.open(ScopeKind::PliIgnore, loc)?;
            Ok(Effect::None)
        }

        Directive::Pli(PliMeta::BeginSub { part, color }) => {
            state.scopes.open(ScopeKind::PliSubstitute, loc)?;
            if !state.mods_pli_ignored() {
                let resolved = color.map(|c| call.effective_color(c));
                state.step.parts_list_mut().begin_substitute(part, resolved, loc);
            }
            Ok(Effect::None)
        }

        Directive::Pli(PliMeta::End) => match state.scopes.close(ScopeKind::PliIgnore, loc) {
            Ok(scope) => {
                if scope.kind == ScopeKind::PliSubstitute {
                    state.step.parts_list_mut().end_substitute();
                }
                Ok(Effect::None)
            }
            Err(e) => {
                report_parse(ctx, loc, &e);
                Ok(Effect::None)
            }
        },

        Directive::Synth(SynthMeta::Begin) => {
            state.scopes.open(ScopeKind::Synth, loc)?;
            Ok(Effect::None)
        }

        Directive::Synth(SynthMeta::End) => {
            if let Err(e) = state.scopes.close(ScopeKind::Synth, loc) {
                report_parse(ctx, loc, &e);
            }
            Ok(Effect::None)
        }

        Directive::Insert(meta) => {
            if state.mods_csi_ignored() {
                return Ok(Effect::None);
            }
            match meta {
                InsertMeta::Page => Ok(Effect::PageBreak),
                InsertMeta::CoverPage { front } => Ok(Effect::CoverPage { front: *front }),
                other => Ok(Effect::Insert(other.clone())),
            }
        }

        Directive::Remove(meta) => {
            if state.mods_csi_ignored() || state.scopes.assembly_suppressed() {
                return Ok(Effect::None);
            }
            let removed = match meta {
                RemoveMeta::Group { name } => state.accumulator.remove_group(name),
                RemoveMeta::Part { id } => state.accumulator.remove_part(id),
                RemoveMeta::Name { pattern } => state.accumulator.remove_name(pattern),
            };
            debug!(at = %loc, removed, "scripted removal");
            Ok(Effect::None)
        }

        Directive::Reserve { fraction } => {
            if state.mods_csi_ignored() {
                return Ok(Effect::None);
            }
            Ok(Effect::Reserve {
                fraction: *fraction,
            })
        }

        Directive::NoStep => {
            state.no_step = true;
            Ok(Effect::None)
        }

        Directive::Include { file } => {
            include_file(ctx, call, state, registry, mode, file, loc);
            Ok(Effect::None)
        }

        Directive::Camera(meta) => {
            camera(ctx, state, meta, loc);
            Ok(Effect::None)
        }

        Directive::BufferExchange { buffer, op } => {
            if state.mods_csi_ignored() {
                return Ok(Effect::None);
            }
            match op {
                BufferOp::Store => {
                    state.buffers.store(*buffer, state.accumulator.snapshot());
                }
                BufferOp::Retrieve => match state.buffers.retrieve(*buffer) {
                    Some(snapshot) => {
                        let snapshot = snapshot.clone();
                        state.accumulator.restore(&snapshot);
                        // A restored state is content even without new parts
                        state.step.mark_special();
                    }
                    None => {
                        ctx.messages.dispatch(UserMessage::at(
                            MessageBucket::Parse,
                            MessageLevel::Warning,
                            loc.clone(),
                            format!("Buffer {} retrieved before any store", buffer),
                        ));
                    }
                },
            }
            Ok(Effect::None)
        }

        Directive::Group(_) => Ok(Effect::RawContent),
    }
}

fn build_mod(
    ctx: &TraversalContext<'_>,
    state: &mut WalkState,
    registry: &mut BuildModRegistry,
    mode: PassMode,
    meta: &BuildModMeta,
    loc: &Where,
) -> Result<Effect, ParseError> {
    match meta {
        BuildModMeta::Begin { key } => {
            let step = state.step.number();
            if mode == PassMode::Find {
                let level = registry.begin_modification(key, loc, step);
                registry.record_piece_count(key, state.step.parts_added());
                trace!(key = %key, level, "build modification opened");
            }
            let action = registry.action_or(key, step, BuildModAction::Apply);
            state.mod_frames.push(ModFrame {
                key: key.clone(),
                action,
                branch: ModBranch::Modified,
            });
            Ok(Effect::ModBegan { key: key.clone() })
        }

        BuildModMeta::EndMod => {
            if mode == PassMode::Find {
                if let Err(e) = registry.transition_end_mod(loc) {
                    report_build_mod(ctx, loc, &e);
                }
            }
            match state.mod_frames.last_mut() {
                Some(frame) => frame.branch = ModBranch::Original,
                // The counting pass already reported this through the
                // registry transition.
                None if mode == PassMode::Draw => {
                    report_build_mod_text(ctx, loc, "BUILD_MOD END_MOD without BEGIN");
                }
                None => {}
            }
            Ok(Effect::None)
        }

        BuildModMeta::End => {
            if mode == PassMode::Find {
                if let Err(e) = registry.transition_end(loc) {
                    report_build_mod(ctx, loc, &e);
                }
            }
            if state.mod_frames.pop().is_none() && mode == PassMode::Draw {
                report_build_mod_text(ctx, loc, "BUILD_MOD END without BEGIN");
            }
            Ok(Effect::None)
        }

        BuildModMeta::Apply { key } | BuildModMeta::Remove { key } => {
            let action = if matches!(meta, BuildModMeta::Apply { .. }) {
                BuildModAction::Apply
            } else {
                BuildModAction::Remove
            };
            let step = state.step.number();
            match registry.action_at(key, step) {
                None => {
                    if mode == PassMode::Find {
                        registry.set_action(key, step, action);
                    }
                    state.step.mark_special();
                    Ok(Effect::None)
                }
                Some(existing) if existing == action => {
                    state.step.mark_special();
                    Ok(Effect::None)
                }
                Some(existing) => {
                    debug!(
                        key = %key,
                        step,
                        recorded = %existing,
                        directive = %action,
                        "build modification action diverged from history"
                    );
                    Ok(Effect::Diverged {
                        key: key.clone(),
                        step,
                    })
                }
            }
        }
    }
}

fn camera(ctx: &TraversalContext<'_>, state: &mut WalkState, meta: &CameraMeta, loc: &Where) {
    match meta {
        CameraMeta::Fov(fov) => {
            if *fov < CAMERA_FOV_MIN || *fov > CAMERA_FOV_MAX {
                let e = ParseError::OutOfRange {
                    loc: loc.clone(),
                    parameter: "CAMERA_FOV".to_string(),
                    value: f64::from(*fov),
                    min: f64::from(CAMERA_FOV_MIN),
                    max: f64::from(CAMERA_FOV_MAX),
                };
                ctx.messages.dispatch(UserMessage::at(
                    MessageBucket::Configuration,
                    MessageLevel::Warning,
                    loc.clone(),
                    e.to_string(),
                ));
                return;
            }
            state.camera.fov = Some(*fov);
        }
        CameraMeta::Angles { lat, lon } => {
            state.camera.latitude = Some(*lat);
            state.camera.longitude = Some(*lon);
        }
        CameraMeta::Distance(distance) => {
            if *distance <= 0.0 {
                ctx.messages.dispatch(UserMessage::at(
                    MessageBucket::Configuration,
                    MessageLevel::Warning,
                    loc.clone(),
                    format!("Camera distance {} at {} must be positive", distance, loc),
                ));
                return;
            }
            state.camera.distance = Some(*distance);
        }
    }
}

/// Interpret an include file's directives in place
///
/// Geometry inside an include is not content of the including model;
/// nested includes do not expand. Directives apply only where their
/// effect is positionless, so boundaries and inserts are refused.
fn include_file(
    ctx: &TraversalContext<'_>,
    call: &ModelCall,
    state: &mut WalkState,
    registry: &mut BuildModRegistry,
    mode: PassMode,
    file: &str,
    loc: &Where,
) {
    let Some(lines) = ctx.document.include(file) else {
        ctx.messages.dispatch(UserMessage::at(
            MessageBucket::IncludeFile,
            MessageLevel::Warning,
            loc.clone(),
            format!("Include file {} is not loaded", file),
        ));
        return;
    };
    let lines = lines.to_vec();
    debug!(file = %file, lines = lines.len(), "interpreting include");

    for (number, raw) in lines.iter().enumerate() {
        let iloc = Where::new(file, loc.model_index, number);
        match classify(raw, &iloc) {
            Ok(ClassifiedLine::Blank) => {}
            Ok(ClassifiedLine::Part(_)) | Ok(ClassifiedLine::Primitive(_)) => {
                ctx.messages.dispatch(UserMessage::at(
                    MessageBucket::Parse,
                    MessageLevel::Warning,
                    iloc,
                    "Geometry line in include file ignored".to_string(),
                ));
            }
            Ok(ClassifiedLine::Meta(Directive::Include { file: nested })) => {
                ctx.messages.dispatch(UserMessage::at(
                    MessageBucket::IncludeFile,
                    MessageLevel::Warning,
                    iloc,
                    format!("Nested include of {} not expanded", nested),
                ));
            }
            Ok(ClassifiedLine::Meta(directive)) => {
                match interpret(ctx, call, state, registry, mode, &directive, &iloc) {
                    Ok(Effect::None) => {}
                    Ok(_) => {
                        ctx.messages.dispatch(UserMessage::at(
                            MessageBucket::Parse,
                            MessageLevel::Warning,
                            iloc,
                            "Directive with page effect not allowed in include file".to_string(),
                        ));
                    }
                    Err(e) => report_parse(ctx, &iloc, &e),
                }
            }
            Err(e) => report_parse(ctx, &iloc, &e),
        }
    }
}

fn warn_skip(ctx: &TraversalContext<'_>, loc: &Where, text: &str) {
    ctx.messages.dispatch(UserMessage::at(
        MessageBucket::Parse,
        MessageLevel::Warning,
        loc.clone(),
        text.to_string(),
    ));
}

fn report_parse(ctx: &TraversalContext<'_>, loc: &Where, e: &ParseError) {
    ctx.messages.dispatch(UserMessage::at(
        MessageBucket::Parse,
        MessageLevel::Warning,
        loc.clone(),
        e.to_string(),
    ));
}

fn report_build_mod(ctx: &TraversalContext<'_>, loc: &Where, e: &brickpub_core::BuildModError) {
    ctx.messages.dispatch(UserMessage::at(
        MessageBucket::BuildMod,
        MessageLevel::Warning,
        loc.clone(),
        e.to_string(),
    ));
}

fn report_build_mod_text(ctx: &TraversalContext<'_>, loc: &Where, text: &str) {
    ctx.messages.dispatch(UserMessage::at(
        MessageBucket::BuildMod,
        MessageLevel::Warning,
        loc.clone(),
        text.to_string(),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickpub_core::message::MessageDispatcher;
    use brickpub_core::service::{MemoryPartCatalog, NoSubstitution, StaticColorTable};
    use brickpub_document::Document;

    fn at(line: usize) -> Where {
        Where::new("main.ldr", 0, line)
    }

    struct Fixture {
        document: Document,
        colors: StaticColorTable,
        catalog: MemoryPartCatalog,
        substitutions: NoSubstitution,
        messages: MessageDispatcher,
    }

    impl Fixture {
        fn new(text: &str) -> Self {
            let messages = MessageDispatcher::new();
            Self {
                document: Document::from_text("main.ldr", text, &messages),
                colors: StaticColorTable::new(),
                catalog: MemoryPartCatalog::new(),
                substitutions: NoSubstitution,
                messages,
            }
        }

        fn ctx(&self) -> TraversalContext<'_> {
            TraversalContext {
                document: &self.document,
                colors: &self.colors,
                catalog: &self.catalog,
                substitutions: &self.substitutions,
                messages: &self.messages,
                abort: brickpub_core::process::AbortFlag::new(),
            }
        }
    }

    fn run(
        fixture: &Fixture,
        state: &mut WalkState,
        registry: &mut BuildModRegistry,
        directive: Directive,
        line: usize,
    ) -> Effect {
        interpret(
            &fixture.ctx(),
            &ModelCall::root(),
            state,
            registry,
            PassMode::Find,
            &directive,
            &at(line),
        )
        .expect("directive should interpret")
    }

    #[test]
    fn test_step_directive_is_a_boundary() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        let effect = run(&fixture, &mut state, &mut registry, Directive::Step, 0);
        assert_eq!(effect, Effect::StepBoundary);
    }

    #[test]
    fn test_close_step_requires_content() {
        let mut state = WalkState::start("main.ldr", 0);
        assert!(state.close_step(&at(0), true).is_none());

        state.step.add_part();
        let step = state.close_step(&at(1), true).expect("closed step");
        assert_eq!(step.number, 1);
        assert_eq!(step.parts_added, 1);
        assert_eq!(state.step.number(), 2);
    }

    #[test]
    fn test_no_step_suppresses_one_boundary() {
        let mut state = WalkState::start("main.ldr", 0);
        state.step.add_part();
        state.no_step = true;

        assert!(state.close_step(&at(1), true).is_none());
        assert!(!state.no_step);
        // Parts carry into the next boundary
        let step = state.close_step(&at(2), true).expect("closed step");
        assert_eq!(step.parts_added, 1);
    }

    #[test]
    fn test_apply_branch_gating() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();

        let effect = run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BuildMod(BuildModMeta::Begin { key: "mod1".into() }),
            0,
        );
        assert_eq!(effect, Effect::ModBegan { key: "mod1".into() });

        // Default action Apply: modified block renders, parts list skips it
        assert!(!state.csi_suppressed());
        assert!(state.pli_suppressed());

        run(&fixture, &mut state, &mut registry, Directive::BuildMod(BuildModMeta::EndMod), 2);
        // Original block: assembly suppressed, parts list counts it
        assert!(state.csi_suppressed());
        assert!(!state.pli_suppressed());

        run(&fixture, &mut state, &mut registry, Directive::BuildMod(BuildModMeta::End), 4);
        assert!(!state.csi_suppressed());
        assert!(!state.pli_suppressed());
    }

    #[test]
    fn test_remove_branch_gating() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        registry.set_action("mod1", 1, BuildModAction::Remove);

        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BuildMod(BuildModMeta::Begin { key: "mod1".into() }),
            0,
        );
        // Remove: modified block suppressed everywhere
        assert!(state.csi_suppressed());
        assert!(state.pli_suppressed());

        run(&fixture, &mut state, &mut registry, Directive::BuildMod(BuildModMeta::EndMod), 2);
        // Original block renders and counts
        assert!(!state.csi_suppressed());
        assert!(!state.pli_suppressed());
    }

    #[test]
    fn test_action_divergence_is_signalled() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        registry.set_action("mod1", 1, BuildModAction::Apply);

        let effect = run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BuildMod(BuildModMeta::Remove { key: "mod1".into() }),
            3,
        );
        assert_eq!(
            effect,
            Effect::Diverged {
                key: "mod1".into(),
                step: 1
            }
        );
    }

    #[test]
    fn test_action_directive_records_when_unseen() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();

        let effect = run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BuildMod(BuildModMeta::Remove { key: "mod9".into() }),
            3,
        );
        assert_eq!(effect, Effect::None);
        assert_eq!(
            registry.action_at("mod9", 1),
            Some(BuildModAction::Remove)
        );
        assert!(state.step.is_started());
    }

    #[test]
    fn test_unmatched_callout_end_aborts() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();

        let result = interpret(
            &fixture.ctx(),
            &ModelCall::root(),
            &mut state,
            &mut registry,
            PassMode::Find,
            &Directive::Callout(CalloutMeta::End),
            &at(0),
        );
        assert!(matches!(result, Err(ParseError::UnmatchedEnd { .. })));
    }

    #[test]
    fn test_buffer_retrieve_before_store_warns() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        fixture.messages.begin_session();

        let effect = run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BufferExchange {
                buffer: 'A',
                op: BufferOp::Retrieve,
            },
            0,
        );
        assert_eq!(effect, Effect::None);
        assert_eq!(fixture.messages.count(MessageBucket::Parse), 1);
        assert!(!state.step.is_started());
    }

    #[test]
    fn test_buffer_round_trip_marks_special() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();

        state.accumulator.append("1 16 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat", at(0));
        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BufferExchange {
                buffer: 'A',
                op: BufferOp::Store,
            },
            1,
        );
        state.accumulator.clear();

        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::BufferExchange {
                buffer: 'A',
                op: BufferOp::Retrieve,
            },
            2,
        );
        assert_eq!(state.accumulator.len(), 1);
        assert!(state.step.is_started());
    }

    #[test]
    fn test_camera_fov_out_of_range_not_applied() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        fixture.messages.begin_session();

        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::Camera(CameraMeta::Fov(720.0)),
            0,
        );
        assert_eq!(state.camera.fov, None);
        assert_eq!(fixture.messages.count(MessageBucket::Configuration), 1);

        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::Camera(CameraMeta::Fov(30.0)),
            1,
        );
        assert_eq!(state.camera.fov, Some(30.0));
    }

    #[test]
    fn test_rotstep_end_clears_rotation() {
        let fixture = Fixture::new("0 STEP\n");
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();

        let rot = brickpub_core::data::RotStep::new(0.0, 90.0, 0.0, RotStepKind::Relative);
        let effect = run(&fixture, &mut state, &mut registry, Directive::RotStep(rot), 0);
        assert_eq!(effect, Effect::StepBoundary);
        assert_eq!(state.rotation, Some(rot));

        run(
            &fixture,
            &mut state,
            &mut registry,
            Directive::RotStep(brickpub_core::data::RotStep::reset()),
            1,
        );
        assert_eq!(state.rotation, None);
    }

    #[test]
    fn test_include_applies_settings_only() {
        let fixture = Fixture::new("0 STEP\n");
        let mut document = Document::from_text("main.ldr", "0 STEP\n", &fixture.messages);
        document.register_include(
            "settings.ldr",
            vec![
                "0 !PUB CAMERA_FOV 25".to_string(),
                "1 16 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat".to_string(),
                "0 STEP".to_string(),
            ],
        );
        let ctx = TraversalContext {
            document: &document,
            colors: &fixture.colors,
            catalog: &fixture.catalog,
            substitutions: &fixture.substitutions,
            messages: &fixture.messages,
            abort: brickpub_core::process::AbortFlag::new(),
        };
        let mut state = WalkState::start("main.ldr", 0);
        let mut registry = BuildModRegistry::new();
        fixture.messages.begin_session();

        let effect = interpret(
            &ctx,
            &ModelCall::root(),
            &mut state,
            &mut registry,
            PassMode::Find,
            &Directive::Include {
                file: "settings.ldr".to_string(),
            },
            &at(0),
        )
        .expect("include should interpret");

        assert_eq!(effect, Effect::None);
        assert_eq!(state.camera.fov, Some(25.0));
        // One warning for the geometry line, one for the STEP
        assert_eq!(fixture.messages.count(MessageBucket::Parse), 2);
    }
}
