//! # BrickPub
//!
//! A building-instruction authoring engine for LDraw models. Documents
//! are parsed into submodels, traversed into numbered pages and steps,
//! and turned into step images through an external renderer.
//!
//! ## Architecture
//!
//! BrickPub is organized as a workspace with multiple crates:
//!
//! 1. **brickpub-core** - Shared data types, events, diagnostics, services
//! 2. **brickpub-document** - Document model: submodels, lines, edits
//! 3. **brickpub-traversal** - Two-pass traversal and page synthesis
//! 4. **brickpub-render** - Working files and the external renderer bridge
//! 5. **brickpub-settings** - Configuration persistence
//! 6. **brickpub** - Main binary that ties the crates together
//!
//! ## Features
//!
//! - **Stateful traversal**: pages and steps derived by interpreting the
//!   document in order, never by guessing at line positions
//! - **Build modifications**: versioned part swaps with a per-step action
//!   history that survives recounts
//! - **Submodels and callouts**: recursive walks with cycle detection,
//!   instance consolidation, and callout attachment
//! - **Write-if-changed working files**: renderer inputs only touch the
//!   disk when their content hash moved
//! - **External rendering**: any command-line tool can produce the step
//!   images; a failed image never fails the page

// Re-export the working surface for main.rs and embedders
pub use brickpub_core::{
    event_bus, AppEvent, BuildModError, ColorTable, DocumentError, Error, EventBus,
    MessageBucket, MessageDispatcher, MessageLevel, MessageRouting, NavigationEvent, ParseError,
    ProcessState, ProcessTracker, RenderError, RenderEvent, Result, RotStep, RotStepKind,
    SettingsError, StaticColorTable, UserMessage, Where,
};

pub use brickpub_document::Document;

pub use brickpub_traversal::{
    count_pages_background, BuildModAction, BuildModRegistry, CameraView, Navigator,
    NavigatorError, NavigatorState, Page, PliAccumulator, PliEntry, Step, StepImager, TraverseRc,
};

pub use brickpub_render::{
    CommandLineRenderer, FadeOptions, NullRenderer, RecordingLayout, RenderImager, Renderer,
    WorkFileWriter, WriteReport,
};

pub use brickpub_settings::{Config, RenderSettings, SettingsPersistence};

/// Crate version as compiled
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Date the binary was built, stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Install the default tracing subscriber
///
/// Pretty-prints to stderr at INFO and above; `RUST_LOG` overrides the
/// filter per module.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
