//! # BrickPub Document
//!
//! The model document layer: line classification for the model format,
//! directive parsing, multi-model document storage with case-insensitive
//! submodel lookup, file loading with include preloading, and reversible
//! line edits.

pub mod document;
pub mod line;
pub mod meta;
pub mod reader;
pub mod undo;

pub use document::{Document, Submodel};

pub use line::{classify, expected_fields, ClassifiedLine, PartLine, PrimitiveLine};

pub use meta::{
    parse_directive, BufferOp, BuildModMeta, CalloutMeta, CameraMeta, Directive, GroupMeta,
    InsertMeta, MultiStepMeta, PartGroupMeta, PliMeta, RemoveMeta, SynthMeta,
};

pub use reader::{preload_includes, FileCheck, ModelFileReader, MODEL_EXTENSIONS};

pub use undo::{EditBatch, EditHistory, LineChange, DEFAULT_UNDO_DEPTH};
