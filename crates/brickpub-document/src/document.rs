//! In-memory model document
//!
//! A document is an ordered list of submodels, each holding its source
//! lines verbatim. Multi-model files are split on `0 FILE` / `0 NOFILE`
//! boundaries at load time; a plain single-model file becomes a document
//! with one submodel named after the file. Submodel lookup is
//! case-insensitive, matching how part references name subfiles.
//!
//! Edits go through [`Document::replace_line`], [`Document::insert_lines`],
//! and [`Document::delete_lines`] so the revision counter, the per-submodel
//! changed flags, and the event bus all stay in sync.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use brickpub_core::data::Where;
use brickpub_core::emit;
use brickpub_core::error::DocumentError;
use brickpub_core::event_bus::{AppEvent, DocumentEvent};
use brickpub_core::message::{MessageBucket, MessageDispatcher, MessageLevel, UserMessage};

/// One named block of model lines
#[derive(Debug, Clone)]
pub struct Submodel {
    name: String,
    lines: Vec<String>,
    /// True until the work-file writer records this submodel as written.
    changed: bool,
}

impl Submodel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
            changed: true,
        }
    }

    /// Declared submodel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All source lines, in order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// One source line by zero-based number
    pub fn line(&self, number: usize) -> Option<&str> {
        self.lines.get(number).map(String::as_str)
    }

    /// Number of source lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the submodel has no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the submodel changed since it was last written out
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// The full text of the submodel, one trailing newline per line
    pub fn contents(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// A loaded model document
#[derive(Debug, Clone, Default)]
pub struct Document {
    path: Option<PathBuf>,
    submodels: Vec<Submodel>,
    /// Lowercased submodel name to position in `submodels`.
    index: HashMap<String, usize>,
    /// Lowercased include-file name to its preloaded lines.
    includes: HashMap<String, Vec<String>>,
    revision: u64,
    modified: bool,
}

impl Document {
    /// Parse document text into submodels
    ///
    /// `name` names the single submodel when the text has no `0 FILE`
    /// sections. Structural problems that do not prevent loading, such as
    /// a duplicated submodel name, are reported through `messages` and the
    /// offending section is dropped.
    pub fn from_text(name: &str, text: &str, messages: &MessageDispatcher) -> Self {
        let mut document = if is_multi_model(text) {
            Self::split_multi_model(text, messages)
        } else {
            let mut submodel = Submodel::new(name);
            submodel.lines = text.lines().map(str::to_string).collect();
            let mut document = Document::default();
            document.push_submodel(submodel);
            document
        };

        if document.submodels.is_empty() {
            document.push_submodel(Submodel::new(name));
        }
        debug!(
            submodels = document.submodels.len(),
            top = %document.top_model().name(),
            "document parsed"
        );
        document
    }

    fn split_multi_model(text: &str, messages: &MessageDispatcher) -> Self {
        let mut document = Document::default();
        let mut current: Option<Submodel> = None;
        let mut prelude_lines = 0usize;

        for raw in text.lines() {
            if let Some(name) = file_header(raw) {
                if let Some(finished) = current.take() {
                    document.push_submodel(finished);
                }
                if document.index.contains_key(&name.to_ascii_lowercase()) {
                    messages.dispatch(UserMessage::global(
                        MessageBucket::Parse,
                        MessageLevel::Warning,
                        format!("Duplicate submodel {} ignored", name),
                    ));
                    // The duplicated section is skipped entirely
                    current = None;
                } else {
                    current = Some(Submodel::new(name));
                }
            } else if is_file_footer(raw) {
                if let Some(finished) = current.take() {
                    document.push_submodel(finished);
                }
            } else if let Some(submodel) = current.as_mut() {
                submodel.lines.push(raw.to_string());
            } else if !raw.trim().is_empty() {
                prelude_lines += 1;
            }
        }
        if let Some(finished) = current.take() {
            document.push_submodel(finished);
        }

        if prelude_lines > 0 {
            messages.dispatch(UserMessage::global(
                MessageBucket::Parse,
                MessageLevel::Info,
                format!(
                    "{} lines outside any FILE section were ignored",
                    prelude_lines
                ),
            ));
        }
        document
    }

    fn push_submodel(&mut self, submodel: Submodel) {
        let key = submodel.name.to_ascii_lowercase();
        trace!(name = %submodel.name, lines = submodel.lines.len(), "submodel registered");
        self.index.insert(key, self.submodels.len());
        self.submodels.push(submodel);
    }

    /// Path the document was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// The first submodel, which is the build target
    ///
    /// # Panics
    /// Never panics: construction guarantees at least one submodel.
    pub fn top_model(&self) -> &Submodel {
        &self.submodels[0]
    }

    /// Look up a submodel by name, case-insensitively
    pub fn submodel(&self, name: &str) -> Option<&Submodel> {
        self.index_of(name).map(|i| &self.submodels[i])
    }

    /// A submodel by position
    pub fn submodel_at(&self, index: usize) -> Option<&Submodel> {
        self.submodels.get(index)
    }

    /// Position of a named submodel, case-insensitively
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Whether a part reference names a submodel of this document
    pub fn is_submodel(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// All submodels in declaration order
    pub fn submodels(&self) -> impl Iterator<Item = &Submodel> {
        self.submodels.iter()
    }

    pub fn submodel_count(&self) -> usize {
        self.submodels.len()
    }

    /// The source line a position points at
    pub fn line(&self, loc: &Where) -> Option<&str> {
        self.submodels
            .get(loc.model_index)
            .and_then(|s| s.line(loc.line_number))
    }

    /// Line count of the submodel at `model_index`, zero if out of range
    pub fn line_count(&self, model_index: usize) -> usize {
        self.submodels.get(model_index).map_or(0, Submodel::len)
    }

    /// Monotonic counter bumped by every edit
    ///
    /// Traversal results captured at one revision are stale once the
    /// revision moves on.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the document has edits not yet saved to its source path
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn submodel_mut(&mut self, loc: &Where) -> Result<&mut Submodel, DocumentError> {
        self.submodels
            .get_mut(loc.model_index)
            .ok_or_else(|| DocumentError::UnknownSubmodel {
                name: loc.model_name.clone(),
            })
    }

    fn touch(&mut self, loc: &Where) {
        self.revision += 1;
        if let Some(submodel) = self.submodels.get_mut(loc.model_index) {
            submodel.changed = true;
        }
        if !self.modified {
            self.modified = true;
            let _ = emit!(AppEvent::Document(DocumentEvent::ModifiedChanged {
                modified: true
            }));
        }
    }

    /// Replace one line
    ///
    /// # Errors
    /// Fails when the position names an unknown submodel or a line past
    /// the end of it.
    pub fn replace_line(&mut self, loc: &Where, text: impl Into<String>) -> Result<(), DocumentError> {
        let submodel = self.submodel_mut(loc)?;
        let len = submodel.len();
        let slot = submodel
            .lines
            .get_mut(loc.line_number)
            .ok_or(DocumentError::LineOutOfRange {
                loc: loc.clone(),
                len,
            })?;
        *slot = text.into();
        self.touch(loc);
        let _ = emit!(AppEvent::Document(DocumentEvent::LineChanged {
            loc: loc.clone()
        }));
        Ok(())
    }

    /// Insert lines so the first lands at the given position
    ///
    /// Inserting at the line count appends.
    ///
    /// # Errors
    /// Fails when the position names an unknown submodel or a line past
    /// the end of it.
    pub fn insert_lines(&mut self, loc: &Where, lines: Vec<String>) -> Result<(), DocumentError> {
        let count = lines.len();
        let submodel = self.submodel_mut(loc)?;
        if loc.line_number > submodel.len() {
            return Err(DocumentError::LineOutOfRange {
                loc: loc.clone(),
                len: submodel.len(),
            });
        }
        submodel
            .lines
            .splice(loc.line_number..loc.line_number, lines);
        self.touch(loc);
        let _ = emit!(AppEvent::Document(DocumentEvent::LinesInserted {
            loc: loc.clone(),
            count
        }));
        Ok(())
    }

    /// Delete up to `count` lines starting at the given position
    ///
    /// Returns how many lines were actually removed, which is fewer than
    /// `count` when the range runs past the end of the submodel.
    ///
    /// # Errors
    /// Fails when the position names an unknown submodel or a line past
    /// the end of it.
    pub fn delete_lines(&mut self, loc: &Where, count: usize) -> Result<usize, DocumentError> {
        let submodel = self.submodel_mut(loc)?;
        if loc.line_number >= submodel.len() {
            return Err(DocumentError::LineOutOfRange {
                loc: loc.clone(),
                len: submodel.len(),
            });
        }
        let end = (loc.line_number + count).min(submodel.len());
        let removed = end - loc.line_number;
        submodel.lines.drain(loc.line_number..end);
        self.touch(loc);
        let _ = emit!(AppEvent::Document(DocumentEvent::LinesDeleted {
            loc: loc.clone(),
            count: removed
        }));
        Ok(removed)
    }

    /// Record that a submodel's work file is current
    pub fn mark_written(&mut self, model_index: usize) {
        if let Some(submodel) = self.submodels.get_mut(model_index) {
            submodel.changed = false;
        }
    }

    /// Record that the document was saved to its source path
    pub fn clear_modified(&mut self) {
        if let Some(path) = &self.path {
            let _ = emit!(AppEvent::Document(DocumentEvent::Saved {
                path: path.clone()
            }));
        }
        if self.modified {
            self.modified = false;
            let _ = emit!(AppEvent::Document(DocumentEvent::ModifiedChanged {
                modified: false
            }));
        }
    }

    /// Cache the lines of an include file under its name
    pub fn register_include(&mut self, name: &str, lines: Vec<String>) {
        self.includes.insert(name.to_ascii_lowercase(), lines);
    }

    /// Preloaded lines of an include file, if registered
    pub fn include(&self, name: &str) -> Option<&[String]> {
        self.includes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}

/// Whether the text is a multi-model file
fn is_multi_model(text: &str) -> bool {
    text.lines().any(|line| file_header(line).is_some())
}

/// The directive body when a line is kind 0, with the digit stripped
fn meta_body(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('0')?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// The declared name when a line is a `0 FILE` header
fn file_header(line: &str) -> Option<&str> {
    let body = meta_body(line)?;
    if body.len() > 4
        && body[..4].eq_ignore_ascii_case("FILE")
        && body[4..].starts_with(char::is_whitespace)
    {
        let name = body[4..].trim();
        if !name.is_empty() {
            return Some(name);
        }
    }
    None
}

fn is_file_footer(line: &str) -> bool {
    meta_body(line).is_some_and(|body| body.trim_end().eq_ignore_ascii_case("NOFILE"))
}
