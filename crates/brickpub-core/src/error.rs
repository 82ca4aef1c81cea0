//! Error handling for BrickPub
//!
//! Each layer gets its own `thiserror` enum:
//! - [`DocumentError`]: loading, submodel lookup, line editing
//! - [`ParseError`]: malformed lines, bad directive nesting, range violations
//! - [`BuildModError`]: authoring mistakes in BUILD_MOD constructs
//! - [`RenderError`]: working files, external renderer invocation
//! - [`SettingsError`]: configuration load/save/validation
//!
//! [`Error`] wraps them all for functions that can fail across layers.

use thiserror::Error;

use crate::data::Where;

/// Document error type
///
/// Represents errors related to loading and editing the model description:
/// missing files, unknown submodels, and out-of-range line references.
#[derive(Error, Debug, Clone)]
pub enum DocumentError {
    /// The model file does not exist
    #[error("Model file not found: {path}")]
    FileNotFound {
        /// The path that was requested.
        path: String,
    },

    /// The path exists but is not a regular file
    #[error("Path is not a file: {path}")]
    NotAFile {
        /// The offending path.
        path: String,
    },

    /// Reading the model file failed
    #[error("Failed to read {path}: {reason}")]
    ReadFailure {
        /// The path being read.
        path: String,
        /// The underlying I/O failure.
        reason: String,
    },

    /// A submodel name was referenced but never declared
    #[error("Unknown submodel: {name}")]
    UnknownSubmodel {
        /// The submodel name that could not be resolved.
        name: String,
    },

    /// A line reference points past the end of its submodel
    #[error("Line {loc} out of range (submodel has {len} lines)")]
    LineOutOfRange {
        /// The out-of-range position.
        loc: Where,
        /// The submodel's actual line count.
        len: usize,
    },

    /// The document has no content after loading
    #[error("Document is empty")]
    EmptyDocument,
}

/// Parse error type
///
/// Represents structural problems in individual model lines and directives.
/// Every variant carries the offending [`Where`] so messages can point at
/// the exact source position.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    /// A geometry line had the wrong number of fields
    #[error("Malformed type-{kind} line at {loc}: expected {expected} fields, found {actual}")]
    BadFieldCount {
        /// The offending position.
        loc: Where,
        /// The line kind (1..=5).
        kind: u8,
        /// The field count the kind requires.
        expected: usize,
        /// The field count actually present.
        actual: usize,
    },

    /// A numeric field failed to parse
    #[error("Bad number '{value}' in field {field} at {loc}")]
    BadNumber {
        /// The offending position.
        loc: Where,
        /// Zero-based index of the field.
        field: usize,
        /// The raw text that failed to parse.
        value: String,
    },

    /// An END directive appeared without its matching BEGIN
    #[error("{construct} END without matching BEGIN at {loc}")]
    UnmatchedEnd {
        /// The offending position.
        loc: Where,
        /// The construct name (CALLOUT, MULTI_STEP, PLI, ...).
        construct: String,
    },

    /// A BEGIN directive appeared while the same construct was already open
    #[error("Nested {construct} BEGIN without END at {loc}")]
    NestedBegin {
        /// The offending position.
        loc: Where,
        /// The construct name.
        construct: String,
    },

    /// A directive was missing a required argument
    #[error("Directive {directive} at {loc} is missing an argument")]
    MissingArgument {
        /// The offending position.
        loc: Where,
        /// The directive keyword.
        directive: String,
    },

    /// A directive argument was present but unusable
    #[error("Bad argument '{value}' for {directive} at {loc}: {reason}")]
    BadArgument {
        /// The offending position.
        loc: Where,
        /// The directive keyword.
        directive: String,
        /// The raw argument text.
        value: String,
        /// Why the argument was rejected.
        reason: String,
    },

    /// A numeric directive parameter was outside its allowed range
    #[error("{parameter} {value} at {loc} outside allowed range {min}..={max}")]
    OutOfRange {
        /// The offending position.
        loc: Where,
        /// The parameter name (for example CAMERA_FOV).
        parameter: String,
        /// The rejected value.
        value: f64,
        /// Lower bound of the allowed range.
        min: f64,
        /// Upper bound of the allowed range.
        max: f64,
    },
}

impl ParseError {
    /// The source position this error points at.
    pub fn location(&self) -> &Where {
        match self {
            ParseError::BadFieldCount { loc, .. }
            | ParseError::BadNumber { loc, .. }
            | ParseError::UnmatchedEnd { loc, .. }
            | ParseError::NestedBegin { loc, .. }
            | ParseError::MissingArgument { loc, .. }
            | ParseError::BadArgument { loc, .. }
            | ParseError::OutOfRange { loc, .. } => loc,
        }
    }
}

/// Build-modification error type
///
/// These indicate authoring mistakes in the document's BUILD_MOD constructs,
/// not engine bugs. Traversal continues in a best-effort state after
/// reporting them.
#[derive(Error, Debug, Clone)]
pub enum BuildModError {
    /// BUILD_MOD END appeared with no modification open
    #[error("BUILD_MOD END without open modification at {loc}")]
    EndWithoutBegin {
        /// The offending position.
        loc: Where,
    },

    /// BUILD_MOD END_MOD appeared with no modification open
    #[error("BUILD_MOD END_MOD without open modification at {loc}")]
    EndModWithoutBegin {
        /// The offending position.
        loc: Where,
    },

    /// Directive phases arrived out of order for a key
    #[error("Build modification '{key}': {phase} recorded out of order at {loc}")]
    PhaseOutOfOrder {
        /// The modification key.
        key: String,
        /// The phase that arrived unexpectedly (BEGIN/END_MOD/END).
        phase: String,
        /// The offending position.
        loc: Where,
    },
}

/// Render error type
///
/// Represents errors from working-file production and external renderer
/// invocation. Renderer failures are non-fatal to traversal; callers log
/// them and leave the affected image blank.
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// The renderer process could not be started
    #[error("Failed to launch renderer '{program}': {reason}")]
    LaunchFailed {
        /// The executable that failed to start.
        program: String,
        /// The launch failure reason.
        reason: String,
    },

    /// The renderer ran but reported failure for an image
    #[error("Renderer failed for {image}: {reason}")]
    RenderFailed {
        /// The image path that was requested.
        image: String,
        /// Exit status or stderr excerpt.
        reason: String,
    },

    /// A working file could not be produced
    #[error("Failed to write working file {path}: {reason}")]
    WorkFileFailure {
        /// The working-file path.
        path: String,
        /// The underlying failure.
        reason: String,
    },
}

/// Settings error type
///
/// Represents configuration load/save/validation failures.
#[derive(Error, Debug, Clone)]
pub enum SettingsError {
    /// The configuration file could not be read
    #[error("Failed to load settings from {path}: {reason}")]
    LoadFailed {
        /// The configuration path.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// The configuration file could not be written
    #[error("Failed to save settings to {path}: {reason}")]
    SaveFailed {
        /// The configuration path.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// A setting value failed validation
    #[error("Invalid setting {setting}: {reason}")]
    InvalidValue {
        /// The setting name.
        setting: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No platform configuration directory could be determined
    #[error("No configuration directory available")]
    NoConfigDir,
}

/// Crate-wide error type
///
/// Wraps the per-layer errors so fallible public functions can return one
/// type. Layer errors convert in through `From`, which lets `?` cross
/// layer boundaries without explicit mapping.
#[derive(Error, Debug)]
pub enum Error {
    /// Document error
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Build-modification error
    #[error(transparent)]
    BuildMod(#[from] BuildModError),

    /// Render error
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Settings error
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// I/O failure not attributable to a layer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a plain message in [`Error::Other`].
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Check if this is a document error
    pub fn is_document_error(&self) -> bool {
        matches!(self, Error::Document(_))
    }

    /// Check if this is a build-modification error
    pub fn is_build_mod_error(&self) -> bool {
        matches!(self, Error::BuildMod(_))
    }

    /// Check if this is a render error
    pub fn is_render_error(&self) -> bool {
        matches!(self, Error::Render(_))
    }

    /// Check if this is a range/domain error, which never interrupts the
    /// pipeline
    pub fn is_range_error(&self) -> bool {
        matches!(self, Error::Parse(ParseError::OutOfRange { .. }))
    }
}

/// Result alias with [`Error`] as the failure type
pub type Result<T> = std::result::Result<T, Error>;
