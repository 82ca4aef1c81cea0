//! Data models for document coordinates and page-level metadata
//!
//! This module provides:
//! - The [`Where`] coordinate: the universal `(submodel, line)` position
//!   reference used by every other component
//! - Rotation-step records carried by ROTSTEP directives
//! - Page sizing metadata

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A stable position reference into the document: a named submodel plus a
/// zero-based line number within it.
///
/// `Where` is the universal coordinate system for steps, pages, callouts,
/// and build modifications. It stays valid until the referenced submodel is
/// structurally edited at or before the line; re-deriving positions after an
/// edit is the editor's responsibility, not this type's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Where {
    /// Name of the submodel this position refers to
    pub model_name: String,
    /// Index of the submodel in document order
    pub model_index: usize,
    /// Zero-based line number within the submodel
    pub line_number: usize,
}

impl Where {
    /// Create a position reference
    pub fn new(model_name: impl Into<String>, model_index: usize, line_number: usize) -> Self {
        Self {
            model_name: model_name.into(),
            model_index,
            line_number,
        }
    }

    /// The same submodel, one line further down
    pub fn next(&self) -> Self {
        self.with_line(self.line_number + 1)
    }

    /// The same submodel at a different line
    pub fn with_line(&self, line_number: usize) -> Self {
        Self {
            model_name: self.model_name.clone(),
            model_index: self.model_index,
            line_number,
        }
    }

    /// Whether two positions reference the same submodel
    pub fn same_model(&self, other: &Where) -> bool {
        self.model_index == other.model_index
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_name, self.line_number + 1)
    }
}

impl PartialOrd for Where {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Where {
    /// Orders first by submodel document position, then by line number.
    /// Comparisons are primarily meaningful within one submodel; the
    /// cross-submodel ordering exists so positions can key sorted
    /// collections deterministically.
    fn cmp(&self, other: &Self) -> Ordering {
        self.model_index
            .cmp(&other.model_index)
            .then(self.line_number.cmp(&other.line_number))
    }
}

/// How a rotation step combines with the current viewing rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotStepKind {
    /// Rotation relative to the default view
    Relative,
    /// Rotation replacing the current view outright
    Absolute,
    /// Rotation added onto the current view
    Additive,
    /// Reset to the default view
    End,
}

impl fmt::Display for RotStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotStepKind::Relative => write!(f, "REL"),
            RotStepKind::Absolute => write!(f, "ABS"),
            RotStepKind::Additive => write!(f, "ADD"),
            RotStepKind::End => write!(f, "END"),
        }
    }
}

/// Viewing rotation recorded by a ROTSTEP directive
///
/// Carried onto the step that the directive terminates so the renderer can
/// picture the assembly from the requested angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotStep {
    /// Rotation about the X axis, in degrees
    pub x: f64,
    /// Rotation about the Y axis, in degrees
    pub y: f64,
    /// Rotation about the Z axis, in degrees
    pub z: f64,
    /// How the rotation combines with the current view
    pub kind: RotStepKind,
}

impl RotStep {
    /// Create a rotation step
    pub fn new(x: f64, y: f64, z: f64, kind: RotStepKind) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "RotStep angles must be finite: x={x}, y={y}, z={z}"
        );
        Self { x, y, z, kind }
    }

    /// The identity rotation (ROTSTEP END)
    pub fn reset() -> Self {
        Self::new(0.0, 0.0, 0.0, RotStepKind::End)
    }

    /// Whether this rotation leaves the default view unchanged
    pub fn is_identity(&self) -> bool {
        self.kind == RotStepKind::End || (self.x == 0.0 && self.y == 0.0 && self.z == 0.0)
    }
}

impl Default for RotStep {
    fn default() -> Self {
        Self::reset()
    }
}

impl fmt::Display for RotStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ROTSTEP {} {} {} {}", self.x, self.y, self.z, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_ordering_within_model() {
        let a = Where::new("main.ldr", 0, 3);
        let b = Where::new("main.ldr", 0, 7);
        assert!(a < b);
        assert!(a.same_model(&b));
        assert_eq!(a.next().line_number, 4);
    }

    #[test]
    fn test_where_display_is_one_based() {
        let w = Where::new("engine.ldr", 2, 0);
        assert_eq!(w.to_string(), "engine.ldr:1");
    }

    #[test]
    fn test_rotstep_identity() {
        assert!(RotStep::reset().is_identity());
        assert!(!RotStep::new(0.0, 90.0, 0.0, RotStepKind::Relative).is_identity());
    }
}
