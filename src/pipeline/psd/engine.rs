//! Text style extraction from a type layer's `EngineData`.
//!
//! EngineData is a PostScript-like dictionary dump. Only the first style run
//! and paragraph run matter here, so a handful of byte regexes over the raw
//! blob are enough; the first match of each key wins.

use crate::document::Color;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

static RE_FONT_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/FontSize\s+(-?[0-9.]+)").unwrap());
static RE_JUSTIFICATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Justification\s+(-?[0-9]+)").unwrap());
static RE_LEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Leading\s+(-?[0-9.]+)").unwrap());
static RE_TRACKING: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Tracking\s+(-?[0-9.]+)").unwrap());
static RE_FAUX_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"/FauxBold\s+(true|false)").unwrap());
static RE_FAUX_ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/FauxItalic\s+(true|false)").unwrap());
static RE_FILL_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/FillColor\s*<<\s*/Type\s+1\s*/Values\s*\[\s*(-?[0-9.]+)\s+(-?[0-9.]+)\s+(-?[0-9.]+)\s+(-?[0-9.]+)\s*\]",
    )
    .unwrap()
});
static RE_FONT_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Font\s+([0-9]+)").unwrap());
static RE_FONT_SET: Lazy<Regex> = Lazy::new(|| Regex::new(r"/FontSet\s*\[").unwrap());
static RE_NAME_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Name\s*\(").unwrap());

/// Style attributes found in EngineData. `None` means "not present".
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EngineStyle {
    pub font_size: Option<f64>,
    pub justification: Option<i64>,
    pub leading: Option<f64>,
    pub tracking: Option<f64>,
    pub faux_bold: Option<bool>,
    pub faux_italic: Option<bool>,
    pub fill_color: Option<Color>,
    pub font_name: Option<String>,
}

pub(crate) fn parse_engine_data(data: &[u8]) -> EngineStyle {
    EngineStyle {
        font_size: first_number(&RE_FONT_SIZE, data),
        justification: first_capture(&RE_JUSTIFICATION, data).and_then(|s| s.parse().ok()),
        leading: first_number(&RE_LEADING, data),
        tracking: first_number(&RE_TRACKING, data),
        faux_bold: first_capture(&RE_FAUX_BOLD, data).map(|s| s == "true"),
        faux_italic: first_capture(&RE_FAUX_ITALIC, data).map(|s| s == "true"),
        fill_color: fill_color(data),
        font_name: font_name(data),
    }
}

fn first_capture(re: &Regex, data: &[u8]) -> Option<String> {
    let caps = re.captures(data)?;
    let m = caps.get(1)?;
    std::str::from_utf8(m.as_bytes()).ok().map(str::to_owned)
}

fn first_number(re: &Regex, data: &[u8]) -> Option<f64> {
    first_capture(re, data)?.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Values are `[a r g b]` in 0–1.
fn fill_color(data: &[u8]) -> Option<Color> {
    let caps = RE_FILL_COLOR.captures(data)?;
    let mut values = [0f64; 4];
    for (i, slot) in values.iter_mut().enumerate() {
        let text = std::str::from_utf8(caps.get(i + 1)?.as_bytes()).ok()?;
        *slot = text.parse().ok()?;
    }
    let [a, r, g, b] = values;
    Some(Color::from_unit_rgba(r, g, b, a))
}

/// Resolve the first `/Font <index>` against the document's `/FontSet` names.
fn font_name(data: &[u8]) -> Option<String> {
    let index: usize = first_capture(&RE_FONT_INDEX, data)?.parse().ok()?;
    let set_start = RE_FONT_SET.find(data)?.end();
    let names = font_set_names(&data[set_start..]);
    names.into_iter().nth(index).filter(|n| !n.is_empty())
}

fn font_set_names(data: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = data;
    while let Some(m) = RE_NAME_OPEN.find(rest) {
        let (raw, consumed) = read_paren_string(&rest[m.end()..]);
        names.push(decode_engine_string(&raw));
        rest = &rest[m.end() + consumed..];
    }
    names
}

/// Read a backslash-escaped string up to its closing paren.
/// Returns the unescaped bytes and the number of input bytes consumed.
fn read_paren_string(data: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\\' if i + 1 < data.len() => {
                out.push(data[i + 1]);
                i += 2;
            }
            b')' => return (out, i + 1),
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    (out, i)
}

/// EngineData strings are UTF-16BE with a `FE FF` byte-order mark.
pub(crate) fn decode_engine_string(raw: &[u8]) -> String {
    match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}
