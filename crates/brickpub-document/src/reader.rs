//! Model file loading
//!
//! Wraps filesystem access for model documents: path validation up front,
//! tolerant text decoding, and include-file preloading so traversal never
//! touches the disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use brickpub_core::data::Where;
use brickpub_core::emit;
use brickpub_core::error::DocumentError;
use brickpub_core::event_bus::{AppEvent, DocumentEvent};
use brickpub_core::message::{MessageBucket, MessageDispatcher, MessageLevel, UserMessage};

use crate::document::Document;
use crate::line::{self, ClassifiedLine};
use crate::meta::Directive;

/// Extensions this tool recognizes as model files
pub const MODEL_EXTENSIONS: [&str; 3] = ["ldr", "mpd", "dat"];

/// Size above which a model file is suspicious
const LARGE_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// Pre-flight check result for a model file
#[derive(Debug, Clone, Default)]
pub struct FileCheck {
    /// Human-readable problems found, empty when the file looks usable.
    pub issues: Vec<String>,
}

impl FileCheck {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Reads model files from disk
#[derive(Debug, Clone)]
pub struct ModelFileReader {
    path: PathBuf,
}

impl ModelFileReader {
    /// Create a reader for a model file
    ///
    /// # Errors
    /// Fails when the path does not exist or is not a regular file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        if !path.exists() {
            return Err(DocumentError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        if !path.is_file() {
            return Err(DocumentError::NotAFile {
                path: path.display().to_string(),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file without reading its content
    pub fn validate(&self) -> FileCheck {
        let mut check = FileCheck::default();
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) if MODEL_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)) => {}
            Some(ext) => check
                .issues
                .push(format!("Unexpected model file extension .{}", ext)),
            None => check.issues.push("File has no extension".to_string()),
        }
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() == 0 => check.issues.push("File is empty".to_string()),
            Ok(meta) if meta.len() > LARGE_FILE_BYTES => check.issues.push(format!(
                "File is unusually large ({} MB)",
                meta.len() / (1024 * 1024)
            )),
            Ok(_) => {}
            Err(e) => check.issues.push(format!("Cannot read metadata: {}", e)),
        }
        check
    }

    /// Read and decode the whole file
    ///
    /// # Errors
    /// Fails when the file cannot be read.
    pub fn read_all(&self) -> Result<String, DocumentError> {
        let bytes = fs::read(&self.path).map_err(|e| DocumentError::ReadFailure {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        if bytes.len() as u64 > LARGE_FILE_BYTES {
            warn!(
                path = %self.path.display(),
                mb = bytes.len() / (1024 * 1024),
                "model file is unusually large"
            );
        }
        Ok(decode(bytes))
    }

    /// Load the file into a document
    ///
    /// Splits multi-model content, preloads include files from the model's
    /// directory, and announces the open on the event bus. Load-time
    /// problems that do not prevent loading go through `messages`.
    ///
    /// # Errors
    /// Fails when the file cannot be read or holds no content.
    pub fn load(&self, messages: &MessageDispatcher) -> Result<Document, DocumentError> {
        let started = Instant::now();
        let text = self.read_all()?;
        if text.trim().is_empty() {
            return Err(DocumentError::EmptyDocument);
        }

        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("model.ldr");
        let mut document = Document::from_text(name, &text, messages);
        document.set_path(&self.path);

        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        preload_includes(&mut document, base, messages);

        debug!(
            path = %self.path.display(),
            submodels = document.submodel_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        let _ = emit!(AppEvent::Document(DocumentEvent::Opened {
            path: self.path.clone(),
            submodels: document.submodel_count(),
        }));
        Ok(document)
    }
}

/// Decode model file bytes, stripping a UTF-8 BOM and falling back to
/// Latin-1 for files written by older editors
fn decode(bytes: Vec<u8>) -> String {
    let bytes = match bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        Some(stripped) => stripped.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!("file is not UTF-8, decoding as Latin-1");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}

/// Load every file named by an INCLUDE directive into the document's
/// include cache
///
/// A missing include file is reported and left unregistered; traversal
/// treats the directive as inert when the lookup later fails.
pub fn preload_includes(document: &mut Document, base: &Path, messages: &MessageDispatcher) {
    let mut wanted: Vec<(String, Where)> = Vec::new();
    for (model_index, submodel) in document.submodels().enumerate() {
        for (line_number, raw) in submodel.lines().iter().enumerate() {
            // Cheap filter before full classification
            if !raw.to_ascii_uppercase().contains("INCLUDE") {
                continue;
            }
            let loc = Where::new(submodel.name(), model_index, line_number);
            if let Ok(ClassifiedLine::Meta(Directive::Include { file })) = line::classify(raw, &loc)
            {
                wanted.push((file, loc));
            }
        }
    }

    for (file, loc) in wanted {
        if document.include(&file).is_some() {
            continue;
        }
        let path = base.join(&file);
        match fs::read(&path) {
            Ok(bytes) => {
                let lines: Vec<String> = decode(bytes).lines().map(str::to_string).collect();
                debug!(file = %file, lines = lines.len(), "include file preloaded");
                document.register_include(&file, lines);
            }
            Err(_) => {
                messages.dispatch(UserMessage::at(
                    MessageBucket::IncludeFile,
                    MessageLevel::Error,
                    loc,
                    format!("Include file not found: {}", file),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_model(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("create model file");
        file.write_all(content).expect("write model file");
        path
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let err = ModelFileReader::new("/nonexistent/model.ldr").unwrap_err();
        assert!(matches!(err, DocumentError::FileNotFound { .. }));
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ModelFileReader::new(dir.path()).unwrap_err();
        assert!(matches!(err, DocumentError::NotAFile { .. }));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_model(dir.path(), "empty.ldr", b"  \n\n");
        let err = ModelFileReader::new(path)
            .expect("reader")
            .load(&MessageDispatcher::new())
            .unwrap_err();
        assert!(matches!(err, DocumentError::EmptyDocument));
    }

    #[test]
    fn test_load_names_document_after_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_model(
            dir.path(),
            "tower.ldr",
            b"1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n",
        );
        let doc = ModelFileReader::new(&path)
            .expect("reader")
            .load(&MessageDispatcher::new())
            .expect("load");
        assert_eq!(doc.top_model().name(), "tower.ldr");
        assert_eq!(doc.path(), Some(path.as_path()));
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut content = vec![0xEF, 0xBB, 0xBF];
        content.extend_from_slice(b"0 STEP\n");
        let path = write_model(dir.path(), "bom.ldr", &content);
        let doc = ModelFileReader::new(path)
            .expect("reader")
            .load(&MessageDispatcher::new())
            .expect("load");
        assert_eq!(doc.top_model().line(0), Some("0 STEP"));
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        // "0 Modèle" with Latin-1 0xE8 for the accented e
        let path = write_model(dir.path(), "accent.ldr", b"0 Mod\xe8le\n0 STEP\n");
        let doc = ModelFileReader::new(path)
            .expect("reader")
            .load(&MessageDispatcher::new())
            .expect("load");
        assert_eq!(doc.top_model().line(0), Some("0 Modèle"));
    }

    #[test]
    fn test_includes_are_preloaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_model(dir.path(), "colors.ldr", b"0 CAMERA_FOV 25\n");
        let path = write_model(
            dir.path(),
            "main.ldr",
            b"0 INCLUDE colors.ldr\n0 STEP\n",
        );
        let doc = ModelFileReader::new(path)
            .expect("reader")
            .load(&MessageDispatcher::new())
            .expect("load");
        assert_eq!(
            doc.include("colors.ldr"),
            Some(&["0 CAMERA_FOV 25".to_string()][..])
        );
    }

    #[test]
    fn test_missing_include_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_model(dir.path(), "main.ldr", b"0 INCLUDE absent.ldr\n0 STEP\n");
        let messages = MessageDispatcher::new();
        let doc = ModelFileReader::new(path)
            .expect("reader")
            .load(&messages)
            .expect("load");
        assert!(doc.include("absent.ldr").is_none());
        assert_eq!(messages.count(MessageBucket::IncludeFile), 1);
    }

    #[test]
    fn test_validate_flags_wrong_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_model(dir.path(), "model.txt", b"0 STEP\n");
        let check = ModelFileReader::new(path).expect("reader").validate();
        assert!(!check.is_ok());
        assert!(check.issues[0].contains(".txt"));

        let good = write_model(dir.path(), "model.mpd", b"0 FILE a.ldr\n0 NOFILE\n");
        assert!(ModelFileReader::new(good).expect("reader").validate().is_ok());
    }
}
