//! Working files for the external renderer
//!
//! The renderer reads plain LDraw files, not the in-memory document, so
//! changed submodels are flushed to a working directory before images
//! are ordered. Writes are keyed on a content hash: matching content
//! leaves the file untouched, which preserves timestamps and keeps
//! renderer caches warm across redraws of the same pages.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use brickpub_core::emit;
use brickpub_core::{AppEvent, ColorTable, RenderError, RenderEvent};
use brickpub_document::Document;

use crate::fade::{fade_contents, highlight_contents, FadeOptions};

/// Which copy of a submodel a working file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkFileVariant {
    /// The submodel as authored.
    Normal,
    /// Geometry recoloured to the fade colour.
    Fade,
    /// Geometry recoloured to the highlight colour.
    Highlight,
}

impl WorkFileVariant {
    fn suffix(self) -> &'static str {
        match self {
            WorkFileVariant::Normal => "",
            WorkFileVariant::Fade => "-fade",
            WorkFileVariant::Highlight => "-highlight",
        }
    }
}

/// Counts from one working-file flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Files whose bytes changed on disk.
    pub written: usize,
    /// Files skipped because their content matched the last write.
    pub unchanged: usize,
}

/// Writes submodel working files, skipping unchanged content
///
/// The writer remembers the hash of everything it has put on disk.
/// Writing the same content again is a no-op, and a file left behind by
/// an earlier run is absorbed rather than rewritten when its bytes
/// already match.
pub struct WorkFileWriter {
    dir: PathBuf,
    hashes: HashMap<PathBuf, u64>,
}

impl WorkFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            hashes: HashMap::new(),
        }
    }

    /// Directory the working files land in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a submodel variant is written to
    ///
    /// Path separators in submodel names are flattened so nested names
    /// cannot escape the working directory.
    pub fn path_for(&self, model_name: &str, variant: WorkFileVariant) -> PathBuf {
        self.dir.join(work_file_name(model_name, variant))
    }

    /// Write one file unless its content matches the last write
    ///
    /// Returns whether bytes hit the disk.
    ///
    /// # Errors
    /// Returns a render error when the directory or file cannot be
    /// written.
    pub fn write_if_changed(&mut self, path: &Path, contents: &str) -> Result<bool, RenderError> {
        let hash = content_hash(contents);
        if self.hashes.get(path) == Some(&hash) {
            debug!(path = %path.display(), "content hash unchanged, skipping write");
            return Ok(false);
        }
        let wrote = write_file(path, contents)?;
        self.hashes.insert(path.to_path_buf(), hash);
        Ok(wrote)
    }

    /// Flush every changed submodel to the working directory
    ///
    /// Each changed submodel yields its normal file plus whichever fade
    /// and highlight variants the options ask for, one blocking task per
    /// file. Submodels are marked clean on the document only when the
    /// whole flush succeeded, so a failed flush is retried in full.
    ///
    /// # Errors
    /// Returns the first write failure after every task has finished.
    pub async fn write_document(
        &mut self,
        document: &mut Document,
        colors: &dyn ColorTable,
        options: &FadeOptions,
    ) -> Result<WriteReport, RenderError> {
        let mut jobs: Vec<(usize, PathBuf, String)> = Vec::new();
        for (index, submodel) in document.submodels().enumerate() {
            if !submodel.is_changed() {
                continue;
            }
            jobs.push((
                index,
                self.path_for(submodel.name(), WorkFileVariant::Normal),
                submodel.contents(),
            ));
            if options.fade {
                jobs.push((
                    index,
                    self.path_for(submodel.name(), WorkFileVariant::Fade),
                    fade_contents(colors, submodel.lines(), options),
                ));
            }
            if options.highlight {
                jobs.push((
                    index,
                    self.path_for(submodel.name(), WorkFileVariant::Highlight),
                    highlight_contents(submodel.lines(), options),
                ));
            }
        }

        let mut set = JoinSet::new();
        for (index, path, contents) in jobs {
            let known = self.hashes.get(&path).copied();
            set.spawn_blocking(move || {
                let hash = content_hash(&contents);
                if known == Some(hash) {
                    return (index, path, hash, Ok(false));
                }
                let outcome = write_file(&path, &contents);
                (index, path, hash, outcome)
            });
        }

        let mut report = WriteReport::default();
        let mut failed: Option<RenderError> = None;
        let mut flushed: Vec<usize> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, path, hash, outcome) = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(error = %join_error, "working-file task lost");
                    failed.get_or_insert(RenderError::WorkFileFailure {
                        path: self.dir.display().to_string(),
                        reason: join_error.to_string(),
                    });
                    continue;
                }
            };
            match outcome {
                Ok(true) => {
                    report.written += 1;
                    self.hashes.insert(path, hash);
                    flushed.push(index);
                }
                Ok(false) => {
                    report.unchanged += 1;
                    self.hashes.insert(path, hash);
                    flushed.push(index);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "working file not written");
                    failed.get_or_insert(error);
                }
            }
        }

        if let Some(error) = failed {
            return Err(error);
        }
        flushed.sort_unstable();
        flushed.dedup();
        for index in flushed {
            document.mark_written(index);
        }
        debug!(
            written = report.written,
            unchanged = report.unchanged,
            "working files flushed"
        );
        let _ = emit!(AppEvent::Render(RenderEvent::WorkFilesWritten {
            written: report.written,
            unchanged: report.unchanged,
        }));
        Ok(report)
    }
}

/// Write `contents` to `path` unless the file already holds them
fn write_file(path: &Path, contents: &str) -> Result<bool, RenderError> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == contents {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| work_file_failure(path, &e))?;
    }
    std::fs::write(path, contents).map_err(|e| work_file_failure(path, &e))?;
    Ok(true)
}

fn work_file_failure(path: &Path, error: &std::io::Error) -> RenderError {
    RenderError::WorkFileFailure {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn content_hash(contents: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    contents.hash(&mut hasher);
    hasher.finish()
}

fn work_file_name(model_name: &str, variant: WorkFileVariant) -> String {
    let flat: String = model_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    match flat.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}{}.{extension}", variant.suffix()),
        None => format!("{flat}{}.ldr", variant.suffix()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names_keep_the_extension() {
        let writer = WorkFileWriter::new("/tmp/work");
        assert_eq!(
            writer.path_for("main.ldr", WorkFileVariant::Normal),
            PathBuf::from("/tmp/work/main.ldr")
        );
        assert_eq!(
            writer.path_for("main.ldr", WorkFileVariant::Fade),
            PathBuf::from("/tmp/work/main-fade.ldr")
        );
        assert_eq!(
            writer.path_for("wing", WorkFileVariant::Highlight),
            PathBuf::from("/tmp/work/wing-highlight.ldr")
        );
    }

    #[test]
    fn test_nested_names_flatten_into_the_directory() {
        let writer = WorkFileWriter::new("/tmp/work");
        assert_eq!(
            writer.path_for("parts/wing.ldr", WorkFileVariant::Normal),
            PathBuf::from("/tmp/work/parts_wing.ldr")
        );
    }

    #[test]
    fn test_rewriting_identical_content_skips_the_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WorkFileWriter::new(dir.path());
        let path = writer.path_for("main.ldr", WorkFileVariant::Normal);

        assert!(writer.write_if_changed(&path, "0 FILE main.ldr\n").unwrap());
        assert!(!writer.write_if_changed(&path, "0 FILE main.ldr\n").unwrap());
        assert!(writer.write_if_changed(&path, "0 FILE main.ldr\n0 STEP\n").unwrap());
    }

    #[test]
    fn test_existing_matching_file_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.ldr");
        std::fs::write(&path, "0 FILE main.ldr\n").unwrap();

        let mut writer = WorkFileWriter::new(dir.path());
        assert!(!writer.write_if_changed(&path, "0 FILE main.ldr\n").unwrap());
    }
}
