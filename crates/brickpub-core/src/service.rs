//! External collaborator services
//!
//! The traversal core treats part identification, part substitution, and the
//! colour/material table as lookup services behind small traits. This module
//! defines those traits plus the stock implementations the application
//! ships with:
//! - [`StaticColorTable`]: the built-in LDraw core colours
//! - [`ArchivePartCatalog`]: a part catalog indexed from an LDraw library
//!   archive (`complete.zip`)
//! - [`MemoryPartCatalog`]: an in-memory catalog for tests and fixtures

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use zip::ZipArchive;

use crate::constants::{COMPLEMENT_COLOR_CODE, CURRENT_COLOR_CODE};
use crate::error::{DocumentError, Result};

/// One entry of the colour/material table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorEntry {
    /// LDraw colour code
    pub code: u32,
    /// Colour name, for example "Red"
    pub name: String,
    /// Face colour as 0xRRGGBB
    pub value: u32,
    /// Edge colour as 0xRRGGBB
    pub edge: u32,
    /// Opacity, 255 = opaque
    pub alpha: u8,
}

impl ColorEntry {
    /// Create a fully-opaque colour entry
    pub fn opaque(code: u32, name: impl Into<String>, value: u32, edge: u32) -> Self {
        Self {
            code,
            name: name.into(),
            value,
            edge,
            alpha: 255,
        }
    }
}

/// Colour/material lookup service
///
/// Resolving codes 16 and 24 is the caller's job (they inherit from
/// context); implementations only answer concrete codes.
pub trait ColorTable: Send + Sync {
    /// Look up a colour entry by code
    fn entry(&self, code: u32) -> Option<ColorEntry>;

    /// Look up a colour name by code
    fn name(&self, code: u32) -> Option<String> {
        self.entry(code).map(|e| e.name)
    }

    /// Whether a code is one of the context-inherited placeholders
    fn is_placeholder(&self, code: u32) -> bool {
        code == CURRENT_COLOR_CODE || code == COMPLEMENT_COLOR_CODE
    }
}

/// Part identity lookup service
///
/// Answers whether a part identifier names a real library part, whether it
/// is a sub-part primitive, and whether it is excluded from parts lists.
pub trait PartCatalog: Send + Sync {
    /// Whether the identifier names a known library part
    fn is_part(&self, id: &str) -> bool;

    /// Whether the identifier names a library primitive (sub-part geometry)
    fn is_primitive(&self, _id: &str) -> bool {
        false
    }

    /// Human-readable description of a part, if known
    fn description(&self, id: &str) -> Option<String>;

    /// Whether the part is excluded from parts-list accumulation
    fn is_excluded(&self, _id: &str) -> bool {
        false
    }
}

/// Part substitution lookup service
///
/// Used by PLI SUB directives and the parts-list accumulator to swap one
/// part identifier for a display substitute.
pub trait PartSubstitution: Send + Sync {
    /// The substitute identifier to display instead of `id`, if any
    fn substitute(&self, id: &str) -> Option<String>;
}

/// No-substitution implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubstitution;

impl PartSubstitution for NoSubstitution {
    fn substitute(&self, _id: &str) -> Option<String> {
        None
    }
}

/// The built-in LDraw core colour table
///
/// Covers the codes instruction documents use most; anything else resolves
/// to `None` and callers fall back to rendering the raw code.
#[derive(Debug, Clone, Default)]
pub struct StaticColorTable;

impl StaticColorTable {
    /// Create the built-in table
    pub fn new() -> Self {
        Self
    }

    fn builtin(code: u32) -> Option<(&'static str, u32, u32)> {
        let entry = match code {
            0 => ("Black", 0x05131D, 0x595959),
            1 => ("Blue", 0x0055BF, 0x333333),
            2 => ("Green", 0x237841, 0x333333),
            3 => ("Dark_Turquoise", 0x008F9B, 0x333333),
            4 => ("Red", 0xC91A09, 0x333333),
            5 => ("Dark_Pink", 0xC870A0, 0x333333),
            6 => ("Brown", 0x583927, 0x1E1E1E),
            7 => ("Light_Gray", 0x9BA19D, 0x333333),
            8 => ("Dark_Gray", 0x6D6E5C, 0x333333),
            9 => ("Light_Blue", 0xB4D2E3, 0x333333),
            10 => ("Bright_Green", 0x4B9F4A, 0x333333),
            11 => ("Light_Turquoise", 0x55A5AF, 0x333333),
            12 => ("Salmon", 0xF2705E, 0x333333),
            13 => ("Pink", 0xFC97AC, 0x333333),
            14 => ("Yellow", 0xF2CD37, 0x333333),
            15 => ("White", 0xFFFFFF, 0x333333),
            17 => ("Light_Green", 0xC2DAB8, 0x333333),
            18 => ("Light_Yellow", 0xFBE696, 0x333333),
            19 => ("Tan", 0xE4CD9E, 0x333333),
            20 => ("Light_Violet", 0xC9CAE2, 0x333333),
            22 => ("Purple", 0x81007B, 0x333333),
            25 => ("Orange", 0xFE8A18, 0x333333),
            26 => ("Magenta", 0x923978, 0x333333),
            27 => ("Lime", 0xBBE90B, 0x333333),
            28 => ("Dark_Tan", 0x958A73, 0x333333),
            70 => ("Reddish_Brown", 0x582A12, 0x1E1E1E),
            71 => ("Light_Bluish_Gray", 0xA0A5A9, 0x333333),
            72 => ("Dark_Bluish_Gray", 0x6C6E68, 0x333333),
            _ => return None,
        };
        Some(entry)
    }
}

impl ColorTable for StaticColorTable {
    fn entry(&self, code: u32) -> Option<ColorEntry> {
        Self::builtin(code).map(|(name, value, edge)| ColorEntry::opaque(code, name, value, edge))
    }
}

/// Part catalog indexed from an LDraw library archive
///
/// The LDraw part library is distributed as a zip archive with parts under
/// `parts/` and primitives under `p/`. Each part file's first line is a
/// `0 <description>` comment, which becomes the catalog description.
#[derive(Debug, Clone)]
pub struct ArchivePartCatalog {
    parts: HashMap<String, String>,
    primitives: HashSet<String>,
    excluded: HashSet<String>,
}

impl ArchivePartCatalog {
    /// Index a part catalog from an LDraw library archive
    ///
    /// # Errors
    /// Returns a document error if the archive cannot be opened or read.
    pub fn from_archive(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DocumentError::ReadFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut archive = ZipArchive::new(file).map_err(|e| DocumentError::ReadFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut parts = HashMap::new();
        let mut primitives = HashSet::new();

        for index in 0..archive.len() {
            let entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable archive entry {}: {}", index, e);
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_ascii_lowercase();
            let Some(file_name) = Self::catalog_key(&entry_name) else {
                continue;
            };

            if entry_name.contains("/p/") || entry_name.starts_with("p/") {
                primitives.insert(file_name);
            } else if entry_name.contains("/parts/") || entry_name.starts_with("parts/") {
                let description = BufReader::new(entry)
                    .lines()
                    .next()
                    .and_then(|line| line.ok())
                    .map(|line| line.trim_start_matches('0').trim().to_string())
                    .unwrap_or_default();
                parts.insert(file_name, description);
            }
        }

        tracing::info!(
            "Indexed {} parts and {} primitives from {}",
            parts.len(),
            primitives.len(),
            path.display()
        );

        Ok(Self {
            parts,
            primitives,
            excluded: HashSet::new(),
        })
    }

    /// Mark part identifiers as excluded from parts-list accumulation
    pub fn with_exclusions<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.excluded
            .extend(ids.into_iter().map(|id| id.into().to_ascii_lowercase()));
        self
    }

    /// Number of indexed parts
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    fn catalog_key(entry_name: &str) -> Option<String> {
        let file_name = entry_name.rsplit('/').next()?;
        if file_name.ends_with(".dat") || file_name.ends_with(".ldr") {
            Some(file_name.to_string())
        } else {
            None
        }
    }
}

impl PartCatalog for ArchivePartCatalog {
    fn is_part(&self, id: &str) -> bool {
        self.parts.contains_key(&id.to_ascii_lowercase())
    }

    fn is_primitive(&self, id: &str) -> bool {
        self.primitives.contains(&id.to_ascii_lowercase())
    }

    fn description(&self, id: &str) -> Option<String> {
        self.parts.get(&id.to_ascii_lowercase()).cloned()
    }

    fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(&id.to_ascii_lowercase())
    }
}

/// In-memory part catalog for tests and fixtures
#[derive(Debug, Clone, Default)]
pub struct MemoryPartCatalog {
    parts: HashMap<String, String>,
    excluded: HashSet<String>,
}

impl MemoryPartCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part with a description
    pub fn with_part(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.parts
            .insert(id.into().to_ascii_lowercase(), description.into());
        self
    }

    /// Add a part excluded from parts lists
    pub fn with_excluded(mut self, id: impl Into<String>) -> Self {
        let id = id.into().to_ascii_lowercase();
        self.parts.insert(id.clone(), String::new());
        self.excluded.insert(id);
        self
    }
}

impl PartCatalog for MemoryPartCatalog {
    fn is_part(&self, id: &str) -> bool {
        self.parts.contains_key(&id.to_ascii_lowercase())
    }

    fn description(&self, id: &str) -> Option<String> {
        self.parts.get(&id.to_ascii_lowercase()).cloned()
    }

    fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(&id.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_color_table_core_codes() {
        let table = StaticColorTable::new();
        let red = table.entry(4).expect("code 4 is built in");
        assert_eq!(red.name, "Red");
        assert_eq!(red.alpha, 255);
        assert!(table.is_placeholder(16));
        assert!(table.is_placeholder(24));
        assert!(!table.is_placeholder(4));
    }

    #[test]
    fn test_memory_catalog_lookup_is_case_insensitive() {
        let catalog = MemoryPartCatalog::new().with_part("3001.dat", "Brick 2 x 4");
        assert!(catalog.is_part("3001.DAT"));
        assert_eq!(catalog.description("3001.dat").as_deref(), Some("Brick 2 x 4"));
        assert!(!catalog.is_part("missing.dat"));
    }

    #[test]
    fn test_memory_catalog_exclusions() {
        let catalog = MemoryPartCatalog::new().with_excluded("arrow.dat");
        assert!(catalog.is_part("arrow.dat"));
        assert!(catalog.is_excluded("Arrow.DAT"));
    }

    #[test]
    fn test_archive_catalog_from_zip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive_path = dir.path().join("library.zip");
        let file = File::create(&archive_path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::SimpleFileOptions = Default::default();
        writer.start_file("ldraw/parts/3001.dat", options).unwrap();
        writer.write_all(b"0 Brick 2 x 4\n1 16 0 0 0\n").unwrap();
        writer.start_file("ldraw/p/stud.dat", options).unwrap();
        writer.write_all(b"0 Stud\n").unwrap();
        writer.finish().unwrap();

        let catalog = ArchivePartCatalog::from_archive(&archive_path).expect("index archive");
        assert_eq!(catalog.part_count(), 1);
        assert!(catalog.is_part("3001.dat"));
        assert!(catalog.is_primitive("stud.dat"));
        assert_eq!(catalog.description("3001.dat").as_deref(), Some("Brick 2 x 4"));
    }
}
