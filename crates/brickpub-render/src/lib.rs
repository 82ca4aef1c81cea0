//! Working files and renderer bridging for BrickPub
//!
//! The traversal produces page trees and step content; turning that
//! content into pictures is this crate's job. It keeps a working
//! directory of per-submodel and per-step LDraw files, rewrites fade
//! and highlight colour variants, and drives an external renderer
//! executable, one image per step.
//!
//! Everything here is built around not repeating work: files are only
//! rewritten when their content hash moved, and images are only
//! re-rendered when their working file was.

pub mod fade;
pub mod layout;
pub mod renderer;
pub mod workfile;

pub use fade::{fade_contents, highlight_contents, FadeOptions, FADE_COLOR_CODE};
pub use layout::{PageRecord, RecordingLayout};
pub use renderer::{
    CommandLineRenderer, NullRenderer, RenderImager, RenderRequest, Renderer,
};
pub use workfile::{WorkFileVariant, WorkFileWriter, WriteReport};
