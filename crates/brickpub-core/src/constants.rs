//! Shared constants used across the BrickPub crates.

/// LDraw colour code meaning "inherit the current colour from the caller".
pub const CURRENT_COLOR_CODE: u32 = 16;

/// LDraw colour code meaning "inherit the complement (edge) colour".
pub const COMPLEMENT_COLOR_CODE: u32 = 24;

/// Number of whitespace-separated fields in a type-1 (part placement) line.
pub const PART_LINE_FIELDS: usize = 15;

/// Number of fields in a type-2 (edge line) line.
pub const EDGE_LINE_FIELDS: usize = 8;

/// Number of fields in a type-3 (triangle) line.
pub const TRIANGLE_LINE_FIELDS: usize = 11;

/// Number of fields in a type-4 (quad) line.
pub const QUAD_LINE_FIELDS: usize = 14;

/// Number of fields in a type-5 (optional line) line.
pub const OPTIONAL_LINE_FIELDS: usize = 14;

/// Maximum number of restarts the navigator grants a single page draw when
/// build-modification actions or assembly annotations request a rewrite.
pub const MAX_DRAW_RESTARTS: u32 = 8;

/// Smallest accepted camera field-of-view, in degrees.
pub const CAMERA_FOV_MIN: f32 = 0.01;

/// Largest accepted camera field-of-view, in degrees.
pub const CAMERA_FOV_MAX: f32 = 360.0;

/// Default step image width, in pixels.
pub const DEFAULT_IMAGE_WIDTH: u32 = 800;

/// Default step image height, in pixels.
pub const DEFAULT_IMAGE_HEIGHT: u32 = 600;

/// LDraw colour code faded parts take when no other is configured.
pub const DEFAULT_FADE_COLOR: u32 = 8;

/// Default fade opacity, in percent.
pub const DEFAULT_FADE_OPACITY: u8 = 50;

/// LDraw colour code highlighted parts take when no other is configured.
pub const DEFAULT_HIGHLIGHT_COLOR: u32 = 14;
