//! Kind-0 directive parsing
//!
//! A kind-0 line is either a comment or a directive. Directives come in
//! three families:
//! - core model-format keywords (STEP, ROTSTEP, FILE/NOFILE, BUFEXCHG,
//!   SYNTH), written bare;
//! - this tool's publishing keywords (CALLOUT, MULTI_STEP, BUILD_MOD,
//!   PLI, PART, INSERT, REMOVE, RESERVE, NOSTEP, INCLUDE, camera metas),
//!   written bare or behind a `!PUB`/`PUB` prefix;
//! - third-party editor keywords this tool understands for grouping
//!   (`MLCAD BTG`, `!LEOCAD GROUP BEGIN/END`).
//!
//! Anything unrecognized is a comment, never an error. A recognized
//! directive with missing or unusable arguments is an error; the caller
//! reports it and skips the line.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use brickpub_core::data::{RotStep, RotStepKind, Where};
use brickpub_core::error::ParseError;

/// One parsed kind-0 line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// Comment or unrecognized directive, kept verbatim.
    Comment {
        /// Text after the kind digit.
        text: String,
    },
    /// End of the current step.
    Step,
    /// Viewing rotation for subsequent steps.
    RotStep(RotStep),
    /// Start of a named submodel in a multi-model document.
    FileBegin {
        /// Declared submodel name.
        name: String,
    },
    /// Explicit end of the current submodel.
    FileEnd,
    /// Callout scope delimiters.
    Callout(CalloutMeta),
    /// Step-group scope delimiters.
    MultiStep(MultiStepMeta),
    /// Build-modification directives.
    BuildMod(BuildModMeta),
    /// Assembly-suppression scope (parts hidden from the assembly image).
    PartGroup(PartGroupMeta),
    /// Parts-list control directives.
    Pli(PliMeta),
    /// Flexible-part synthesis scope.
    Synth(SynthMeta),
    /// Page content insertion.
    Insert(InsertMeta),
    /// Content removal by group, part, or name pattern.
    Remove(RemoveMeta),
    /// Reserve a fraction of the page for later content.
    Reserve {
        /// Fraction of page height, 0 to 1.
        fraction: f32,
    },
    /// Suppress the implicit step at end of submodel.
    NoStep,
    /// Pull directives from a side file.
    Include {
        /// Include file name.
        file: String,
    },
    /// Camera adjustment for subsequent step images.
    Camera(CameraMeta),
    /// Content snapshot/restore.
    BufferExchange {
        /// Buffer name, a single letter.
        buffer: char,
        /// Store or retrieve.
        op: BufferOp,
    },
    /// Editor grouping metadata consumed by REMOVE GROUP.
    Group(GroupMeta),
}

/// CALLOUT sub-keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalloutMeta {
    /// Open a callout scope.
    Begin,
    /// Close the callout scope.
    End,
}

/// MULTI_STEP sub-keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiStepMeta {
    /// Open a step group.
    Begin,
    /// Start a new range within the group.
    Divider,
    /// Close the step group.
    End,
}

/// BUILD_MOD sub-keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildModMeta {
    /// Open a modification; the modified block follows.
    Begin {
        /// Registry key for the modification.
        key: String,
    },
    /// End of the modified block; the original block follows.
    EndMod,
    /// End of the original block.
    End,
    /// Activate a previously declared modification.
    Apply {
        /// Registry key.
        key: String,
    },
    /// Deactivate a previously declared modification.
    Remove {
        /// Registry key.
        key: String,
    },
}

/// PART scope sub-keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartGroupMeta {
    /// Parts until END are excluded from the assembly image.
    BeginIgnore,
    /// Close the scope.
    End,
}

/// PLI control sub-keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PliMeta {
    /// Parts until END are excluded from the parts list.
    BeginIgnore,
    /// Parts until END appear in the parts list as a substitute.
    BeginSub {
        /// Substitute part identifier.
        part: String,
        /// Substitute colour, if given.
        color: Option<u32>,
    },
    /// Close the scope.
    End,
}

/// SYNTH scope sub-keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynthMeta {
    /// Open a synthesized-part scope.
    Begin,
    /// Close the scope.
    End,
}

/// INSERT payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertMeta {
    /// Force a page break.
    Page,
    /// Insert a cover page.
    CoverPage {
        /// Front cover when true, back cover when false.
        front: bool,
    },
    /// Insert a bill-of-materials page.
    Bom,
    /// Insert a text block.
    Text {
        /// The text content.
        text: String,
    },
    /// Insert a rendering of the whole model.
    Model {
        /// Optional display scale.
        scale: Option<f32>,
    },
    /// Insert an image file.
    Picture {
        /// Image file name.
        file: String,
        /// Optional display scale.
        scale: Option<f32>,
    },
}

/// REMOVE payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoveMeta {
    /// Remove lines belonging to a named editor group.
    Group {
        /// The group name.
        name: String,
    },
    /// Remove part placements with the given identifier.
    Part {
        /// The part identifier.
        id: String,
    },
    /// Remove the bracketed region naming this identifier.
    Name {
        /// The name the bracketed region declares.
        pattern: String,
    },
}

/// Camera adjustments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CameraMeta {
    /// Field of view in degrees.
    Fov(f32),
    /// Latitude/longitude viewing angles in degrees.
    Angles {
        /// Latitude.
        lat: f32,
        /// Longitude.
        lon: f32,
    },
    /// Camera distance factor.
    Distance(f32),
}

/// BUFEXCHG operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferOp {
    /// Snapshot accumulated content into the buffer.
    Store,
    /// Replace accumulated content from the buffer.
    Retrieve,
}

/// Grouping metadata from third-party editors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupMeta {
    /// The next content line belongs to this group.
    Belongs {
        /// The group name.
        name: String,
    },
    /// Open a nested group scope.
    Begin {
        /// The group name.
        name: String,
    },
    /// Close the group scope.
    End,
}

fn quoted_regex() -> &'static Regex {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    QUOTED.get_or_init(|| Regex::new(r#""([^"]*)""#).expect("invalid regex pattern"))
}

/// First quoted string in `rest`, or the first whitespace token
fn quoted_or_token(rest: &str) -> Option<String> {
    if let Some(captures) = quoted_regex().captures(rest) {
        return Some(captures[1].to_string());
    }
    rest.split_whitespace().next().map(|t| t.to_string())
}

/// Everything after the first `skip` whitespace tokens
fn tail_after(text: &str, skip: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..skip {
        match rest.find(char::is_whitespace) {
            Some(pos) => rest = rest[pos..].trim_start(),
            None => return "",
        }
    }
    rest
}

/// Parse the content of a kind-0 line (everything after the leading `0`)
///
/// # Errors
/// Returns a parse error only for a recognized directive with missing or
/// unusable arguments; unknown keywords classify as comments.
pub fn parse_directive(rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let Some(&keyword) = tokens.first() else {
        return Ok(Directive::Comment {
            text: String::new(),
        });
    };

    match keyword.to_ascii_uppercase().as_str() {
        "STEP" => Ok(Directive::Step),
        "ROTSTEP" => parse_rotstep(&tokens[1..], loc),
        "FILE" => {
            let name = tail_after(rest, 1);
            if name.is_empty() {
                return Err(ParseError::MissingArgument {
                    loc: loc.clone(),
                    directive: "FILE".to_string(),
                });
            }
            Ok(Directive::FileBegin {
                name: name.to_string(),
            })
        }
        "NOFILE" => Ok(Directive::FileEnd),
        "BUFEXCHG" => parse_bufexchg(&tokens[1..], loc),
        "SYNTH" => match tokens.get(1).map(|t| t.to_ascii_uppercase()) {
            Some(ref t) if t == "BEGIN" => Ok(Directive::Synth(SynthMeta::Begin)),
            Some(ref t) if t == "END" => Ok(Directive::Synth(SynthMeta::End)),
            _ => Ok(comment(rest)),
        },
        "MLCAD" => match tokens.get(1).map(|t| t.to_ascii_uppercase()) {
            Some(ref t) if t == "BTG" => {
                let name = tail_after(rest, 2);
                if name.is_empty() {
                    return Err(ParseError::MissingArgument {
                        loc: loc.clone(),
                        directive: "MLCAD BTG".to_string(),
                    });
                }
                Ok(Directive::Group(GroupMeta::Belongs {
                    name: name.to_string(),
                }))
            }
            _ => Ok(comment(rest)),
        },
        "!LEOCAD" | "LEOCAD" => parse_leocad(&tokens[1..], rest, loc),
        "!PUB" | "PUB" => parse_tool_meta(&tokens[1..], tail_after(rest, 1), loc),
        // Tool keywords are also accepted without the prefix
        "CALLOUT" | "MULTI_STEP" | "BUILD_MOD" | "PART" | "PLI" | "INSERT" | "REMOVE"
        | "RESERVE" | "NOSTEP" | "INCLUDE" | "CAMERA_FOV" | "CAMERA_ANGLES"
        | "CAMERA_DISTANCE" => parse_tool_meta(&tokens, rest, loc),
        _ => Ok(comment(rest)),
    }
}

fn comment(rest: &str) -> Directive {
    Directive::Comment {
        text: rest.trim().to_string(),
    }
}

fn parse_rotstep(args: &[&str], loc: &Where) -> Result<Directive, ParseError> {
    if args.first().map(|t| t.eq_ignore_ascii_case("END")) == Some(true) {
        return Ok(Directive::RotStep(RotStep::reset()));
    }
    if args.len() < 3 {
        return Err(ParseError::MissingArgument {
            loc: loc.clone(),
            directive: "ROTSTEP".to_string(),
        });
    }
    let mut angles = [0.0f64; 3];
    for (slot, arg) in angles.iter_mut().zip(args) {
        *slot = arg.parse().map_err(|_| ParseError::BadArgument {
            loc: loc.clone(),
            directive: "ROTSTEP".to_string(),
            value: arg.to_string(),
            reason: "expected a rotation angle".to_string(),
        })?;
    }
    let kind = match args.get(3).map(|t| t.to_ascii_uppercase()) {
        None => RotStepKind::Relative,
        Some(ref t) if t == "REL" => RotStepKind::Relative,
        Some(ref t) if t == "ABS" => RotStepKind::Absolute,
        Some(ref t) if t == "ADD" => RotStepKind::Additive,
        Some(t) => {
            return Err(ParseError::BadArgument {
                loc: loc.clone(),
                directive: "ROTSTEP".to_string(),
                value: t,
                reason: "expected REL, ABS, or ADD".to_string(),
            });
        }
    };
    Ok(Directive::RotStep(RotStep::new(
        angles[0], angles[1], angles[2], kind,
    )))
}

fn parse_bufexchg(args: &[&str], loc: &Where) -> Result<Directive, ParseError> {
    let (Some(&buffer), Some(&op)) = (args.first(), args.get(1)) else {
        return Err(ParseError::MissingArgument {
            loc: loc.clone(),
            directive: "BUFEXCHG".to_string(),
        });
    };
    let buffer = match buffer.chars().next() {
        Some(c) if buffer.len() == 1 && c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
        _ => {
            return Err(ParseError::BadArgument {
                loc: loc.clone(),
                directive: "BUFEXCHG".to_string(),
                value: buffer.to_string(),
                reason: "buffer name must be a single letter".to_string(),
            });
        }
    };
    let op = match op.to_ascii_uppercase().as_str() {
        "STORE" => BufferOp::Store,
        "RETRIEVE" | "LOAD" => BufferOp::Retrieve,
        other => {
            return Err(ParseError::BadArgument {
                loc: loc.clone(),
                directive: "BUFEXCHG".to_string(),
                value: other.to_string(),
                reason: "expected STORE or RETRIEVE".to_string(),
            });
        }
    };
    Ok(Directive::BufferExchange { buffer, op })
}

fn parse_leocad(args: &[&str], rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    match (
        args.first().map(|t| t.to_ascii_uppercase()),
        args.get(1).map(|t| t.to_ascii_uppercase()),
    ) {
        (Some(ref group), Some(ref begin)) if group == "GROUP" && begin == "BEGIN" => {
            let name = tail_after(rest, 3);
            if name.is_empty() {
                return Err(ParseError::MissingArgument {
                    loc: loc.clone(),
                    directive: "GROUP BEGIN".to_string(),
                });
            }
            Ok(Directive::Group(GroupMeta::Begin {
                name: name.to_string(),
            }))
        }
        (Some(ref group), Some(ref end)) if group == "GROUP" && end == "END" => {
            Ok(Directive::Group(GroupMeta::End))
        }
        _ => Ok(comment(rest)),
    }
}

/// Parse a publishing directive; `tokens[0]` is the keyword, `rest` the
/// raw text starting at that keyword
fn parse_tool_meta(tokens: &[&str], rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    let Some(&keyword) = tokens.first() else {
        return Ok(comment(rest));
    };
    let args = &tokens[1..];

    match keyword.to_ascii_uppercase().as_str() {
        "CALLOUT" => match args.first().map(|t| t.to_ascii_uppercase()) {
            Some(ref t) if t == "BEGIN" => Ok(Directive::Callout(CalloutMeta::Begin)),
            Some(ref t) if t == "END" => Ok(Directive::Callout(CalloutMeta::End)),
            _ => Err(missing(loc, "CALLOUT")),
        },
        "MULTI_STEP" => match args.first().map(|t| t.to_ascii_uppercase()) {
            Some(ref t) if t == "BEGIN" => Ok(Directive::MultiStep(MultiStepMeta::Begin)),
            Some(ref t) if t == "DIVIDER" => Ok(Directive::MultiStep(MultiStepMeta::Divider)),
            Some(ref t) if t == "END" => Ok(Directive::MultiStep(MultiStepMeta::End)),
            _ => Err(missing(loc, "MULTI_STEP")),
        },
        "BUILD_MOD" => parse_build_mod(args, rest, loc),
        "PART" => match args.first().map(|t| t.to_ascii_uppercase()) {
            Some(ref t) if t == "BEGIN" => {
                match args.get(1).map(|t| t.to_ascii_uppercase()) {
                    Some(ref ign) if ign == "IGN" => {
                        Ok(Directive::PartGroup(PartGroupMeta::BeginIgnore))
                    }
                    _ => Err(bad_argument(
                        loc,
                        "PART BEGIN",
                        args.get(1).unwrap_or(&""),
                        "expected IGN",
                    )),
                }
            }
            Some(ref t) if t == "END" => Ok(Directive::PartGroup(PartGroupMeta::End)),
            _ => Err(missing(loc, "PART")),
        },
        "PLI" => parse_pli(args, loc),
        "INSERT" => parse_insert(args, rest, loc),
        "REMOVE" => parse_remove(args, rest, loc),
        "RESERVE" => {
            let Some(&value) = args.first() else {
                return Err(missing(loc, "RESERVE"));
            };
            let fraction: f32 = value.parse().map_err(|_| {
                bad_argument(loc, "RESERVE", value, "expected a fraction of page height")
            })?;
            Ok(Directive::Reserve { fraction })
        }
        "NOSTEP" => Ok(Directive::NoStep),
        "INCLUDE" => {
            let file = tail_after(rest, 1);
            if file.is_empty() {
                return Err(missing(loc, "INCLUDE"));
            }
            Ok(Directive::Include {
                file: file.to_string(),
            })
        }
        "CAMERA_FOV" => {
            let Some(&value) = args.first() else {
                return Err(missing(loc, "CAMERA_FOV"));
            };
            let fov: f32 = value
                .parse()
                .map_err(|_| bad_argument(loc, "CAMERA_FOV", value, "expected degrees"))?;
            Ok(Directive::Camera(CameraMeta::Fov(fov)))
        }
        "CAMERA_ANGLES" => {
            let (Some(&lat), Some(&lon)) = (args.first(), args.get(1)) else {
                return Err(missing(loc, "CAMERA_ANGLES"));
            };
            let lat: f32 = lat
                .parse()
                .map_err(|_| bad_argument(loc, "CAMERA_ANGLES", lat, "expected degrees"))?;
            let lon: f32 = lon
                .parse()
                .map_err(|_| bad_argument(loc, "CAMERA_ANGLES", lon, "expected degrees"))?;
            Ok(Directive::Camera(CameraMeta::Angles { lat, lon }))
        }
        "CAMERA_DISTANCE" => {
            let Some(&value) = args.first() else {
                return Err(missing(loc, "CAMERA_DISTANCE"));
            };
            let distance: f32 = value
                .parse()
                .map_err(|_| bad_argument(loc, "CAMERA_DISTANCE", value, "expected a factor"))?;
            Ok(Directive::Camera(CameraMeta::Distance(distance)))
        }
        _ => Ok(comment(rest)),
    }
}

fn parse_build_mod(args: &[&str], rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    let Some(action) = args.first().map(|t| t.to_ascii_uppercase()) else {
        return Err(missing(loc, "BUILD_MOD"));
    };
    let key_text = tail_after(rest, 2);
    let key = || {
        quoted_or_token(key_text).ok_or_else(|| ParseError::MissingArgument {
            loc: loc.clone(),
            directive: format!("BUILD_MOD {}", action),
        })
    };
    match action.as_str() {
        "BEGIN" => Ok(Directive::BuildMod(BuildModMeta::Begin { key: key()? })),
        "END_MOD" => Ok(Directive::BuildMod(BuildModMeta::EndMod)),
        "END" => Ok(Directive::BuildMod(BuildModMeta::End)),
        "APPLY" => Ok(Directive::BuildMod(BuildModMeta::Apply { key: key()? })),
        "REMOVE" => Ok(Directive::BuildMod(BuildModMeta::Remove { key: key()? })),
        other => Err(bad_argument(
            loc,
            "BUILD_MOD",
            other,
            "expected BEGIN, END_MOD, END, APPLY, or REMOVE",
        )),
    }
}

fn parse_pli(args: &[&str], loc: &Where) -> Result<Directive, ParseError> {
    match args.first().map(|t| t.to_ascii_uppercase()) {
        Some(ref t) if t == "BEGIN" => match args.get(1).map(|t| t.to_ascii_uppercase()) {
            Some(ref mode) if mode == "IGN" => Ok(Directive::Pli(PliMeta::BeginIgnore)),
            Some(ref mode) if mode == "SUB" => {
                let Some(&part) = args.get(2) else {
                    return Err(missing(loc, "PLI BEGIN SUB"));
                };
                let color = match args.get(3) {
                    Some(&value) => Some(crate::line::parse_color(value, 3, loc)?),
                    None => None,
                };
                Ok(Directive::Pli(PliMeta::BeginSub {
                    part: part.to_string(),
                    color,
                }))
            }
            _ => Err(bad_argument(
                loc,
                "PLI BEGIN",
                args.get(1).unwrap_or(&""),
                "expected IGN or SUB",
            )),
        },
        Some(ref t) if t == "END" => Ok(Directive::Pli(PliMeta::End)),
        _ => Err(missing(loc, "PLI")),
    }
}

fn parse_insert(args: &[&str], rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    let Some(what) = args.first().map(|t| t.to_ascii_uppercase()) else {
        return Err(missing(loc, "INSERT"));
    };
    match what.as_str() {
        "PAGE" => Ok(Directive::Insert(InsertMeta::Page)),
        "COVER_PAGE" => {
            let front = match args.get(1).map(|t| t.trim_matches('"').to_ascii_uppercase()) {
                None => true,
                Some(ref side) if side == "FRONT" => true,
                Some(ref side) if side == "BACK" => false,
                Some(side) => {
                    return Err(bad_argument(
                        loc,
                        "INSERT COVER_PAGE",
                        &side,
                        "expected FRONT or BACK",
                    ));
                }
            };
            Ok(Directive::Insert(InsertMeta::CoverPage { front }))
        }
        "BOM" => Ok(Directive::Insert(InsertMeta::Bom)),
        "TEXT" => {
            let payload = tail_after(rest, 2);
            let Some(captures) = quoted_regex().captures(payload) else {
                return Err(missing(loc, "INSERT TEXT"));
            };
            Ok(Directive::Insert(InsertMeta::Text {
                text: captures[1].to_string(),
            }))
        }
        "MODEL" | "DISPLAY_MODEL" => Ok(Directive::Insert(InsertMeta::Model {
            scale: parse_scale(args, loc)?,
        })),
        "PICTURE" => {
            let payload = tail_after(rest, 2);
            let Some(file) = quoted_or_token(payload) else {
                return Err(missing(loc, "INSERT PICTURE"));
            };
            if file.to_ascii_uppercase() == "SCALE" {
                return Err(missing(loc, "INSERT PICTURE"));
            }
            Ok(Directive::Insert(InsertMeta::Picture {
                file,
                scale: parse_scale(args, loc)?,
            }))
        }
        other => Err(bad_argument(
            loc,
            "INSERT",
            other,
            "expected PAGE, COVER_PAGE, BOM, TEXT, MODEL, or PICTURE",
        )),
    }
}

/// Optional `SCALE <factor>` suffix of an INSERT directive
fn parse_scale(args: &[&str], loc: &Where) -> Result<Option<f32>, ParseError> {
    let Some(position) = args.iter().position(|t| t.eq_ignore_ascii_case("SCALE")) else {
        return Ok(None);
    };
    let Some(&value) = args.get(position + 1) else {
        return Err(missing(loc, "SCALE"));
    };
    let scale: f32 = value
        .parse()
        .map_err(|_| bad_argument(loc, "SCALE", value, "expected a factor"))?;
    Ok(Some(scale))
}

fn parse_remove(args: &[&str], rest: &str, loc: &Where) -> Result<Directive, ParseError> {
    let Some(what) = args.first().map(|t| t.to_ascii_uppercase()) else {
        return Err(missing(loc, "REMOVE"));
    };
    let payload = tail_after(rest, 2);
    let argument = quoted_or_token(payload);
    match what.as_str() {
        "GROUP" => {
            let name = argument.ok_or_else(|| missing(loc, "REMOVE GROUP"))?;
            Ok(Directive::Remove(RemoveMeta::Group { name }))
        }
        "PART" => {
            let id = argument.ok_or_else(|| missing(loc, "REMOVE PART"))?;
            Ok(Directive::Remove(RemoveMeta::Part { id }))
        }
        "NAME" => {
            let pattern = argument.ok_or_else(|| missing(loc, "REMOVE NAME"))?;
            Ok(Directive::Remove(RemoveMeta::Name { pattern }))
        }
        other => Err(bad_argument(
            loc,
            "REMOVE",
            other,
            "expected GROUP, PART, or NAME",
        )),
    }
}

fn missing(loc: &Where, directive: &str) -> ParseError {
    ParseError::MissingArgument {
        loc: loc.clone(),
        directive: directive.to_string(),
    }
}

fn bad_argument(loc: &Where, directive: &str, value: &str, reason: &str) -> ParseError {
    ParseError::BadArgument {
        loc: loc.clone(),
        directive: directive.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
