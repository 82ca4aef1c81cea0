//! Model line classification
//!
//! Every content line is one of six kinds, selected by its first field:
//! kind 0 is a directive (or comment), kind 1 places a part or submodel,
//! kinds 2 through 5 are drawing primitives (line, triangle, quad,
//! optional line). Geometry parameters of kinds 2-5 are validated but not
//! retained; page synthesis only needs the kind and colour.

use brickpub_core::constants::{
    EDGE_LINE_FIELDS, OPTIONAL_LINE_FIELDS, PART_LINE_FIELDS, QUAD_LINE_FIELDS,
    TRIANGLE_LINE_FIELDS,
};
use brickpub_core::data::Where;
use brickpub_core::error::ParseError;

use crate::meta::{self, Directive};

/// A kind-1 part placement line
#[derive(Debug, Clone, PartialEq)]
pub struct PartLine {
    /// Colour code; 16 and 24 inherit from context.
    pub color: u32,
    /// Position and 3x3 rotation, in LDraw field order (x y z a..i).
    pub transform: [f64; 12],
    /// Part or submodel identifier, as written.
    pub part: String,
    /// Whether the line was wrapped in a GHOST directive.
    pub ghost: bool,
}

impl PartLine {
    /// The identifier normalized for catalog and submodel lookup
    pub fn normalized_part(&self) -> String {
        self.part.to_ascii_lowercase()
    }
}

/// A kind-2 through kind-5 drawing primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveLine {
    /// The line kind (2..=5).
    pub kind: u8,
    /// Colour code; 16 and 24 inherit from context.
    pub color: u32,
}

/// One classified content line
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedLine {
    /// Empty or whitespace-only line.
    Blank,
    /// Kind-0 directive or comment.
    Meta(Directive),
    /// Kind-1 part placement.
    Part(PartLine),
    /// Kind-2..5 drawing primitive.
    Primitive(PrimitiveLine),
}

/// Classify one raw content line
///
/// Kind-0 lines are handed to the directive parser; unknown directives
/// come back as comments, never as errors. A `0 GHOST` prefix wraps a
/// part line and classifies as that part line with its ghost flag set.
///
/// # Errors
/// Returns a parse error for a malformed field count, an unparseable
/// number, or a recognized directive with bad arguments.
pub fn classify(raw: &str, loc: &Where) -> Result<ClassifiedLine, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(ClassifiedLine::Blank);
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields[0] {
        "0" => {
            // GHOST wraps the remainder, which must itself classify
            if fields.len() > 1 && fields[1].eq_ignore_ascii_case("GHOST") {
                let inner = trimmed[trimmed.find(fields[1]).unwrap_or(0) + fields[1].len()..].trim();
                return match classify(inner, loc)? {
                    ClassifiedLine::Part(mut part) => {
                        part.ghost = true;
                        Ok(ClassifiedLine::Part(part))
                    }
                    other => Ok(other),
                };
            }
            let rest = trimmed[1..].trim_start();
            meta::parse_directive(rest, loc).map(ClassifiedLine::Meta)
        }
        "1" => parse_part_line(&fields, loc).map(ClassifiedLine::Part),
        "2" | "3" | "4" | "5" => parse_primitive(&fields, loc).map(ClassifiedLine::Primitive),
        other => {
            // Not a recognized kind digit; real documents contain stray
            // text occasionally, so treat it as a comment
            tracing::trace!("Unrecognized line kind '{}' at {}", other, loc);
            Ok(ClassifiedLine::Meta(Directive::Comment {
                text: trimmed.to_string(),
            }))
        }
    }
}

/// The exact field count a line kind requires
pub fn expected_fields(kind: u8) -> usize {
    match kind {
        1 => PART_LINE_FIELDS,
        2 => EDGE_LINE_FIELDS,
        3 => TRIANGLE_LINE_FIELDS,
        4 => QUAD_LINE_FIELDS,
        _ => OPTIONAL_LINE_FIELDS,
    }
}

fn parse_part_line(fields: &[&str], loc: &Where) -> Result<PartLine, ParseError> {
    if fields.len() != PART_LINE_FIELDS {
        return Err(ParseError::BadFieldCount {
            loc: loc.clone(),
            kind: 1,
            expected: PART_LINE_FIELDS,
            actual: fields.len(),
        });
    }

    let color = parse_color(fields[1], 1, loc)?;
    let mut transform = [0.0f64; 12];
    for (offset, slot) in transform.iter_mut().enumerate() {
        *slot = parse_number(fields[2 + offset], 2 + offset, loc)?;
    }

    Ok(PartLine {
        color,
        transform,
        part: fields[14].to_string(),
        ghost: false,
    })
}

fn parse_primitive(fields: &[&str], loc: &Where) -> Result<PrimitiveLine, ParseError> {
    // First field is a known single digit here
    let kind: u8 = fields[0].parse().unwrap_or(0);
    let expected = expected_fields(kind);
    if fields.len() != expected {
        return Err(ParseError::BadFieldCount {
            loc: loc.clone(),
            kind,
            expected,
            actual: fields.len(),
        });
    }

    let color = parse_color(fields[1], 1, loc)?;
    for (index, field) in fields.iter().enumerate().skip(2) {
        parse_number(field, index, loc)?;
    }

    Ok(PrimitiveLine { kind, color })
}

/// Parse a colour code field
///
/// Accepts plain decimal codes and `0x`-prefixed direct colours.
pub fn parse_color(text: &str, field: usize, loc: &Where) -> Result<u32, ParseError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u32>().ok()
    };
    parsed.ok_or_else(|| ParseError::BadNumber {
        loc: loc.clone(),
        field,
        value: text.to_string(),
    })
}

fn parse_number(text: &str, field: usize, loc: &Where) -> Result<f64, ParseError> {
    text.parse::<f64>().map_err(|_| ParseError::BadNumber {
        loc: loc.clone(),
        field,
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: usize) -> Where {
        Where::new("main.ldr", 0, line)
    }

    #[test]
    fn test_classify_part_line() {
        let line = "1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";
        match classify(line, &at(0)).expect("valid part line") {
            ClassifiedLine::Part(part) => {
                assert_eq!(part.color, 16);
                assert_eq!(part.part, "3001.dat");
                assert_eq!(part.transform[0], 0.0);
                assert_eq!(part.transform[3], 1.0);
                assert!(!part.ghost);
            }
            other => panic!("expected part, got {:?}", other),
        }
    }

    #[test]
    fn test_part_line_field_count_enforced() {
        let short = "1 16 0 0 0 1 0 0 0 1 0 0 0 3001.dat";
        match classify(short, &at(3)) {
            Err(ParseError::BadFieldCount {
                kind,
                expected,
                actual,
                loc,
            }) => {
                assert_eq!(kind, 1);
                assert_eq!(expected, 15);
                assert_eq!(actual, 14);
                assert_eq!(loc.line_number, 3);
            }
            other => panic!("expected field-count error, got {:?}", other),
        }
    }

    #[test]
    fn test_primitive_field_counts() {
        let edge = "2 24 0 0 0 1 1 1";
        assert!(matches!(
            classify(edge, &at(0)),
            Ok(ClassifiedLine::Primitive(PrimitiveLine { kind: 2, color: 24 }))
        ));

        let triangle = "3 16 0 0 0 1 0 0 0 1 0";
        assert!(matches!(
            classify(triangle, &at(0)),
            Ok(ClassifiedLine::Primitive(PrimitiveLine { kind: 3, .. }))
        ));

        let quad = "4 16 0 0 0 1 0 0 1 1 0 0 1 0";
        assert!(matches!(
            classify(quad, &at(0)),
            Ok(ClassifiedLine::Primitive(PrimitiveLine { kind: 4, .. }))
        ));

        let optional = "5 24 0 0 0 1 0 0 0 1 0 1 1 1";
        assert!(matches!(
            classify(optional, &at(0)),
            Ok(ClassifiedLine::Primitive(PrimitiveLine { kind: 5, .. }))
        ));

        let bad_quad = "4 16 0 0 0 1 0 0 1 1 0 0 1";
        assert!(matches!(
            classify(bad_quad, &at(0)),
            Err(ParseError::BadFieldCount {
                kind: 4,
                expected: 14,
                actual: 13,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_number_reported() {
        let line = "1 16 0 zero 0 1 0 0 0 1 0 0 0 1 3001.dat";
        match classify(line, &at(0)) {
            Err(ParseError::BadNumber { field, value, .. }) => {
                assert_eq!(field, 3);
                assert_eq!(value, "zero");
            }
            other => panic!("expected bad number, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_color_accepted() {
        let line = "1 0x2F05131D 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";
        match classify(line, &at(0)).expect("direct colour is valid") {
            ClassifiedLine::Part(part) => assert_eq!(part.color, 0x2F05131D),
            other => panic!("expected part, got {:?}", other),
        }
    }

    #[test]
    fn test_ghost_wraps_part_line() {
        let line = "0 GHOST 1 4 0 0 0 1 0 0 0 1 0 0 0 1 3024.dat";
        match classify(line, &at(0)).expect("ghosted part line") {
            ClassifiedLine::Part(part) => {
                assert!(part.ghost);
                assert_eq!(part.color, 4);
                assert_eq!(part.part, "3024.dat");
            }
            other => panic!("expected part, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(classify("   ", &at(0)).unwrap(), ClassifiedLine::Blank);
        assert_eq!(classify("", &at(0)).unwrap(), ClassifiedLine::Blank);

        match classify("0 // author note", &at(0)).unwrap() {
            ClassifiedLine::Meta(Directive::Comment { text }) => {
                assert_eq!(text, "// author note");
            }
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn test_step_directive_classifies_as_meta() {
        assert!(matches!(
            classify("0 STEP", &at(0)).unwrap(),
            ClassifiedLine::Meta(Directive::Step)
        ));
    }
}
