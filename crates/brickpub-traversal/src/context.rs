//! Traversal call context and recursion bookkeeping
//!
//! Every traversal entry point takes an immutable [`TraversalContext`]
//! naming the document and the external collaborator services, plus a
//! per-call [`ModelCall`] describing which submodel is being walked and
//! under what parent flags. Mutable pass state lives elsewhere and is
//! threaded separately, so recursive calls cannot communicate through
//! hidden shared fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use brickpub_core::data::{RotStep, Where};
use brickpub_core::message::MessageDispatcher;
use brickpub_core::process::AbortFlag;
use brickpub_core::service::{ColorTable, PartCatalog, PartSubstitution};
use brickpub_core::{constants::CURRENT_COLOR_CODE, RenderError};
use brickpub_document::Document;

use crate::page::Page;

/// Immutable context shared by every call in one traversal
pub struct TraversalContext<'a> {
    /// The document being traversed.
    pub document: &'a Document,
    /// Colour lookups for parts-list entries.
    pub colors: &'a dyn ColorTable,
    /// Part descriptions and exclusion checks.
    pub catalog: &'a dyn PartCatalog,
    /// Part substitution lookups.
    pub substitutions: &'a dyn PartSubstitution,
    /// Sink for user-visible diagnostics.
    pub messages: &'a MessageDispatcher,
    /// Cooperative cancellation, polled once per loop iteration.
    pub abort: AbortFlag,
}

impl TraversalContext<'_> {
    /// Whether an identifier names a submodel of this document
    pub fn is_submodel(&self, id: &str) -> bool {
        self.document.is_submodel(id)
    }

    /// Whether cancellation has been requested
    pub fn abort_raised(&self) -> bool {
        self.abort.is_raised()
    }
}

/// Arguments for one submodel walk
#[derive(Debug, Clone)]
pub struct ModelCall {
    /// Index of the submodel being walked.
    pub model_index: usize,
    /// Colour inherited from the referencing line; placeholder colours
    /// inside the submodel resolve to this.
    pub context_color: u32,
    /// How many consecutive placements this walk stands for.
    pub instances: usize,
    /// Set when any enclosing frame is a callout.
    pub in_callout: bool,
    /// Set when the referencing line sat inside an open step group.
    pub in_step_group: bool,
}

impl ModelCall {
    /// The call for the document's top model
    pub fn root() -> Self {
        Self {
            model_index: 0,
            context_color: CURRENT_COLOR_CODE,
            instances: 1,
            in_callout: false,
            in_step_group: false,
        }
    }

    /// A nested call for a referenced submodel
    pub fn nested(&self, model_index: usize, context_color: u32, instances: usize) -> Self {
        Self {
            model_index,
            context_color,
            instances,
            in_callout: self.in_callout,
            in_step_group: self.in_step_group,
        }
    }

    /// Resolve a placeholder colour against the referencing line
    pub fn effective_color(&self, color: u32) -> u32 {
        if color == CURRENT_COLOR_CODE || color == brickpub_core::constants::COMPLEMENT_COLOR_CODE {
            self.context_color
        } else {
            color
        }
    }
}

/// One frame of the recursion call chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFrame {
    /// Name of the submodel being walked.
    pub model_name: String,
    /// Line in the parent that referenced it.
    pub line_number: usize,
    /// Step number of the parent at the reference.
    pub step_number: usize,
}

/// Call chain of nested submodel walks
///
/// Pushed on recursive entry and popped on return. Used for circular
/// reference detection and for diagnostics naming the full chain.
#[derive(Debug, Clone, Default)]
pub struct ModelStack {
    frames: Vec<ModelFrame>,
}

impl ModelStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ModelFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ModelFrame> {
        self.frames.pop()
    }

    /// Whether a submodel is already on the chain, case-insensitively
    pub fn contains(&self, model_name: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.model_name.eq_ignore_ascii_case(model_name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The innermost frame
    pub fn current(&self) -> Option<&ModelFrame> {
        self.frames.last()
    }

    /// The chain as `a.ldr -> b.ldr -> c.ldr` for diagnostics
    pub fn describe(&self) -> String {
        self.frames
            .iter()
            .map(|f| f.model_name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Navigation cursor and counted-page index
///
/// Owned by the navigator; traversal sweeps produce replacements rather
/// than mutating it in place, so readers always see a completed
/// snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigatorState {
    /// One-based page currently displayed; zero before the first draw.
    pub display_page: usize,
    /// Total counted pages; zero before the first count.
    pub max_pages: usize,
    /// Start positions of counted pages, plus a trailing end-of-file
    /// marker after a completed count.
    pub top_of_pages: Vec<Where>,
    /// Set when a build-modification change invalidated counts at or
    /// after the current page and a forward recount is pending.
    pub build_mod_jump_forward: bool,
    /// Document revision the counts were taken against.
    pub revision: u64,
}

impl NavigatorState {
    /// Start position of a one-based page, if counted
    pub fn top_of_page(&self, page: usize) -> Option<&Where> {
        if page == 0 {
            return None;
        }
        self.top_of_pages.get(page - 1)
    }
}

/// Camera settings in force for a step image
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    /// Field of view in degrees.
    pub fov: Option<f32>,
    /// Viewing latitude in degrees.
    pub latitude: Option<f32>,
    /// Viewing longitude in degrees.
    pub longitude: Option<f32>,
    /// Camera distance factor.
    pub distance: Option<f32>,
}

impl CameraView {
    /// This view with unset fields filled from `defaults`
    ///
    /// Document directives always win; the defaults only cover what no
    /// directive has set.
    pub fn with_defaults(self, defaults: CameraView) -> CameraView {
        CameraView {
            fov: self.fov.or(defaults.fov),
            latitude: self.latitude.or(defaults.latitude),
            longitude: self.longitude.or(defaults.longitude),
            distance: self.distance.or(defaults.distance),
        }
    }
}

/// Everything the external renderer needs for one step image
#[derive(Debug)]
pub struct StepRequest<'a> {
    /// Submodel the step belongs to.
    pub model_name: &'a str,
    /// Continuous step number.
    pub step_number: usize,
    /// Accumulated assembly content as of this step.
    pub lines: &'a [String],
    /// Step rotation in force, if any.
    pub rotation: Option<RotStep>,
    /// Camera settings in force.
    pub camera: CameraView,
}

/// External renderer bridge, invoked at most once per closed step
///
/// `Ok(None)` means the imager produced nothing and nothing went wrong;
/// an error is logged by the caller and the step is left without an
/// image. Neither outcome stops the traversal.
pub trait StepImager: Send + Sync {
    /// Produce an image for one step
    ///
    /// # Errors
    /// Returns a render error when the image could not be produced.
    fn image_step(&self, request: &StepRequest<'_>) -> Result<Option<PathBuf>, RenderError>;
}

/// Imager that renders nothing, used for counting sweeps
#[derive(Debug, Clone, Copy, Default)]
pub struct NullImager;

impl StepImager for NullImager {
    fn image_step(&self, _request: &StepRequest<'_>) -> Result<Option<PathBuf>, RenderError> {
        Ok(None)
    }
}

/// Receives each completed page for visual placement
pub trait LayoutConsumer: Send {
    /// Called once per page, after the page tree is final
    fn page_complete(&mut self, page: &Page);
}

/// Layout consumer that discards pages
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLayout;

impl LayoutConsumer for NullLayout {
    fn page_complete(&mut self, _page: &Page) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_stack_detects_cycles() {
        let mut stack = ModelStack::new();
        stack.push(ModelFrame {
            model_name: "main.ldr".into(),
            line_number: 0,
            step_number: 1,
        });
        stack.push(ModelFrame {
            model_name: "wing.ldr".into(),
            line_number: 4,
            step_number: 2,
        });

        assert!(stack.contains("WING.LDR"));
        assert!(!stack.contains("tail.ldr"));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.describe(), "main.ldr -> wing.ldr");

        let frame = stack.pop().expect("frame");
        assert_eq!(frame.model_name, "wing.ldr");
        assert!(!stack.contains("wing.ldr"));
    }

    #[test]
    fn test_effective_color_resolves_placeholders() {
        let call = ModelCall {
            context_color: 4,
            ..ModelCall::root()
        };
        assert_eq!(call.effective_color(16), 4);
        assert_eq!(call.effective_color(24), 4);
        assert_eq!(call.effective_color(14), 14);
    }

    #[test]
    fn test_nested_call_carries_parent_flags() {
        let mut root = ModelCall::root();
        root.in_callout = true;
        let nested = root.nested(2, 7, 3);
        assert!(nested.in_callout);
        assert_eq!(nested.model_index, 2);
        assert_eq!(nested.context_color, 7);
        assert_eq!(nested.instances, 3);
    }

    #[test]
    fn test_top_of_page_lookup() {
        let state = NavigatorState {
            max_pages: 2,
            top_of_pages: vec![
                Where::new("main.ldr", 0, 0),
                Where::new("main.ldr", 0, 3),
                Where::new("main.ldr", 0, 5),
            ],
            ..NavigatorState::default()
        };
        assert!(state.top_of_page(0).is_none());
        assert_eq!(state.top_of_page(1), Some(&Where::new("main.ldr", 0, 0)));
        assert_eq!(state.top_of_page(2), Some(&Where::new("main.ldr", 0, 3)));
    }

    #[test]
    fn test_camera_defaults_fill_only_unset_fields() {
        let directive = CameraView {
            fov: Some(0.7),
            ..CameraView::default()
        };
        let defaults = CameraView {
            fov: Some(25.0),
            latitude: Some(23.0),
            longitude: Some(45.0),
            distance: None,
        };
        let merged = directive.with_defaults(defaults);
        assert_eq!(merged.fov, Some(0.7));
        assert_eq!(merged.latitude, Some(23.0));
        assert_eq!(merged.longitude, Some(45.0));
        assert_eq!(merged.distance, None);
    }
}
