//! # BrickPub Traversal
//!
//! The stateful interpreter behind page counting and page display.
//! A document is never paginated up front; every request walks the
//! model from the top, replaying steps, groups, callouts, buffer
//! exchanges, and build modifications, and materializes exactly the
//! page asked for.
//!
//! ## Two passes
//!
//! - **Find** ([`find::sweep`]): a light pass that counts pages and
//!   records where each one starts. The walk state is snapshotted at
//!   every page boundary, so reaching a target page costs one clone
//!   and a short re-walk instead of a second full traversal.
//! - **Draw** ([`draw`]): replays one page region from its snapshot,
//!   building the page with its steps, part lists, callouts, and
//!   rendered step images.
//!
//! ## Entry point
//!
//! [`Navigator`] owns the document and all derived state, runs the
//! passes, and absorbs the interrupts that ask for a restart (build
//! modification divergence, stale part annotations).

pub mod accumulator;
pub mod annotations;
pub mod buffers;
pub mod buildmod;
pub mod context;
pub mod draw;
pub mod find;
pub mod interpret;
pub mod navigator;
pub mod page;
pub mod pli;
pub mod scopes;
pub mod signal;

pub use accumulator::{ContentAccumulator, ContentSnapshot};
pub use annotations::{derive_annotation, AnnotationCache};
pub use buffers::BufferStore;
pub use buildmod::{
    BuildModAction, BuildModAttributes, BuildModPhase, BuildModRegistry, BuildModification,
};
pub use context::{
    CameraView, LayoutConsumer, ModelCall, ModelStack, NavigatorState, NullImager, NullLayout,
    StepImager, StepRequest, TraversalContext,
};
pub use draw::RegionOutcome;
pub use find::{sweep, SweepResult};
pub use interpret::{interpret, Effect, PassMode, WalkState};
pub use navigator::{count_pages_background, Navigator, NavigatorError};
pub use page::{Callout, CoverKind, Page, PageInsert, RangeEntry, ReserveSpace, Step, StepRange};
pub use pli::{PliAccumulator, PliEntry};
pub use scopes::{Scope, ScopeKind, ScopeStack};
pub use signal::TraverseRc;
