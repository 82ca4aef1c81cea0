//! Fade and highlight colour rewriting
//!
//! The renderer shows previously built parts dimmed and freshly placed
//! parts accented by reading recoloured copies of each submodel. Both
//! variants are plain textual rewrites of the colour field on geometry
//! lines; meta lines pass through untouched, so steps, groups, and
//! directives survive into the variant files.

use brickpub_core::constants::{
    DEFAULT_FADE_COLOR, DEFAULT_FADE_OPACITY, DEFAULT_HIGHLIGHT_COLOR,
};
use brickpub_core::ColorTable;

/// Colour code the fade variant declares when it needs translucency.
///
/// Stock LDraw codes stop far below this, so the declaration cannot
/// shadow a colour the model already uses.
pub const FADE_COLOR_CODE: u32 = 4000;

/// How faded and highlighted copies are produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FadeOptions {
    /// Whether fade variant files are wanted at all.
    pub fade: bool,
    /// Whether highlight variant files are wanted at all.
    pub highlight: bool,
    /// Colour faded parts take.
    pub fade_color: u32,
    /// Opacity of faded parts, in percent; below 100 a translucent
    /// colour is declared in the variant file.
    pub fade_opacity: u8,
    /// Colour highlighted parts take.
    pub highlight_color: u32,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            fade: false,
            highlight: false,
            fade_color: DEFAULT_FADE_COLOR,
            fade_opacity: DEFAULT_FADE_OPACITY,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR,
        }
    }
}

/// Produce the faded copy of a submodel's lines
///
/// Every geometry line is recoloured to the fade colour. When the
/// options ask for partial opacity, the copy opens with a `!COLOUR`
/// declaration deriving a translucent colour from the configured one,
/// and the geometry uses that declared code instead.
pub fn fade_contents(colors: &dyn ColorTable, lines: &[String], options: &FadeOptions) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum::<usize>() + 80);
    let code = match fade_declaration(colors, options) {
        Some(declaration) => {
            text.push_str(&declaration);
            text.push('\n');
            FADE_COLOR_CODE
        }
        None => options.fade_color,
    };
    for line in lines {
        text.push_str(&recolor_line(line, code));
        text.push('\n');
    }
    text
}

/// Produce the highlighted copy of a submodel's lines
///
/// The highlight colour is used as configured; highlights stay opaque.
pub fn highlight_contents(lines: &[String], options: &FadeOptions) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(&recolor_line(line, options.highlight_color));
        text.push('\n');
    }
    text
}

/// The `!COLOUR` line declaring the translucent fade colour, if one is
/// needed
fn fade_declaration(colors: &dyn ColorTable, options: &FadeOptions) -> Option<String> {
    if options.fade_opacity >= 100 {
        return None;
    }
    let (value, edge) = match colors.entry(options.fade_color) {
        Some(entry) => (entry.value, entry.edge),
        None => (0x80_80_80, 0x33_33_33),
    };
    let alpha = (u32::from(options.fade_opacity) * 255 / 100) as u8;
    Some(format!(
        "0 !COLOUR BrickPub_Fade CODE {FADE_COLOR_CODE} VALUE #{value:06X} EDGE #{edge:06X} ALPHA {alpha}"
    ))
}

/// Rewrite the colour field of one line, leaving meta lines alone
fn recolor_line(line: &str, code: u32) -> String {
    let mut fields = line.split_whitespace();
    let Some(kind) = fields.next() else {
        return line.to_string();
    };
    if !matches!(kind, "1" | "2" | "3" | "4" | "5") {
        return line.to_string();
    }
    if fields.next().is_none() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 4);
    out.push_str(kind);
    out.push(' ');
    out.push_str(&code.to_string());
    for field in fields {
        out.push(' ');
        out.push_str(field);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickpub_core::StaticColorTable;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_part_lines_take_the_fade_colour() {
        let colors = StaticColorTable::new();
        let options = FadeOptions {
            fade: true,
            fade_opacity: 100,
            ..FadeOptions::default()
        };
        let content = lines(&["1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"]);
        let faded = fade_contents(&colors, &content, &options);
        assert_eq!(faded, "1 8 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n");
    }

    #[test]
    fn test_meta_lines_survive_recolouring() {
        let colors = StaticColorTable::new();
        let options = FadeOptions {
            fade_opacity: 100,
            ..FadeOptions::default()
        };
        let content = lines(&["0 STEP", "0 !PUB INSERT PAGE", "", "2 24 0 0 0 1 0 0"]);
        let faded = fade_contents(&colors, &content, &options);
        let result: Vec<&str> = faded.lines().collect();
        assert_eq!(result[0], "0 STEP");
        assert_eq!(result[1], "0 !PUB INSERT PAGE");
        assert_eq!(result[2], "");
        assert_eq!(result[3], "2 8 0 0 0 1 0 0");
    }

    #[test]
    fn test_partial_opacity_declares_translucent_colour() {
        let colors = StaticColorTable::new();
        let options = FadeOptions {
            fade_opacity: 50,
            ..FadeOptions::default()
        };
        let content = lines(&["1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"]);
        let faded = fade_contents(&colors, &content, &options);
        let result: Vec<&str> = faded.lines().collect();
        assert!(result[0].starts_with("0 !COLOUR BrickPub_Fade CODE 4000"));
        assert!(result[0].contains("ALPHA 127"));
        assert!(result[1].starts_with("1 4000 "));
    }

    #[test]
    fn test_highlight_recolours_to_the_highlight_colour() {
        let options = FadeOptions::default();
        let content = lines(&[
            "1 1 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat",
            "0 ROTSTEP 0 90 0 REL",
        ]);
        let highlighted = highlight_contents(&content, &options);
        let result: Vec<&str> = highlighted.lines().collect();
        assert_eq!(result[0], "1 14 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat");
        assert_eq!(result[1], "0 ROTSTEP 0 90 0 REL");
    }
}
