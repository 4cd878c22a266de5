//! Parsed source document: the layer tree decoded from a PSD/PSB file.
//!
//! Everything here is immutable once the parser returns it. A layer's variant
//! and its payload live in one closed enum ([`LayerKind`]) so that "children
//! only on groups" and "at most one payload, matching the variant" are
//! enforced by the type system rather than checked at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name given to layers that carry neither a Pascal nor a unicode name.
pub const DEFAULT_LAYER_NAME: &str = "Unnamed Layer";

// ── Document ─────────────────────────────────────────────────────────────

/// A decoded PSD/PSB document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    /// Source file name without the `.psd`/`.psb` extension.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub bit_depth: u16,
    /// Top-level layers, in stacking order from bottom to top.
    pub layers: Vec<ParsedLayer>,
}

impl ParsedDocument {
    /// Count every layer in the tree, groups included.
    pub fn layer_count(&self) -> usize {
        fn count(layers: &[ParsedLayer]) -> usize {
            layers
                .iter()
                .map(|l| 1 + l.children().map_or(0, count))
                .sum()
        }
        count(&self.layers)
    }
}

/// PSD colour mode as stored in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Bitmap,
    Grayscale,
    Indexed,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "CMYK")]
    Cmyk,
    Multichannel,
    Duotone,
    Lab,
    Other(u16),
}

impl ColorMode {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ColorMode::Bitmap,
            1 => ColorMode::Grayscale,
            2 => ColorMode::Indexed,
            3 => ColorMode::Rgb,
            4 => ColorMode::Cmyk,
            7 => ColorMode::Multichannel,
            8 => ColorMode::Duotone,
            9 => ColorMode::Lab,
            other => ColorMode::Other(other),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Bitmap => f.write_str("Bitmap"),
            ColorMode::Grayscale => f.write_str("Grayscale"),
            ColorMode::Indexed => f.write_str("Indexed"),
            ColorMode::Rgb => f.write_str("RGB"),
            ColorMode::Cmyk => f.write_str("CMYK"),
            ColorMode::Multichannel => f.write_str("Multichannel"),
            ColorMode::Duotone => f.write_str("Duotone"),
            ColorMode::Lab => f.write_str("Lab"),
            ColorMode::Other(code) => write!(f, "{code}"),
        }
    }
}

// ── Layers ───────────────────────────────────────────────────────────────

/// Axis-aligned layer bounds in document pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Finite on every edge and not inverted. Zero-area bounds are valid.
    pub fn is_valid(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.right >= self.left
            && self.bottom >= self.top
    }
}

/// One node of the source layer tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLayer {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
    pub bounds: Bounds,
    pub visible: bool,
    /// Layer opacity in `[0, 1]`.
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<String>,
}

impl ParsedLayer {
    /// A visible, fully opaque layer with a fresh id.
    pub fn new(name: impl Into<String>, kind: LayerKind, bounds: Bounds) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            name: if name.is_empty() {
                DEFAULT_LAYER_NAME.to_string()
            } else {
                name
            },
            kind,
            bounds,
            visible: true,
            opacity: 1.0,
            blend_mode: None,
        }
    }

    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_blend_mode(mut self, mode: impl Into<String>) -> Self {
        self.blend_mode = Some(mode.into());
        self
    }

    /// Children when this layer is a group.
    pub fn children(&self) -> Option<&[ParsedLayer]> {
        match &self.kind {
            LayerKind::Group { children } => Some(children),
            _ => None,
        }
    }
}

/// Layer variant together with the payload that variant may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayerKind {
    Group {
        children: Vec<ParsedLayer>,
    },
    Text {
        #[serde(rename = "textData", skip_serializing_if = "Option::is_none")]
        text: Option<TextData>,
    },
    Shape {
        #[serde(rename = "shapeData", skip_serializing_if = "Option::is_none")]
        shape: Option<ShapeData>,
    },
    Image {
        #[serde(rename = "imageData", skip_serializing_if = "Option::is_none")]
        image: Option<ImageData>,
    },
    SmartObject {
        #[serde(rename = "imageData", skip_serializing_if = "Option::is_none")]
        image: Option<ImageData>,
    },
    Adjustment,
    Unknown {
        #[serde(rename = "imageData", skip_serializing_if = "Option::is_none")]
        image: Option<ImageData>,
    },
}

impl LayerKind {
    /// Lower-camel variant name, used as the feature name of flattened layers.
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Group { .. } => "group",
            LayerKind::Text { .. } => "text",
            LayerKind::Shape { .. } => "shape",
            LayerKind::Image { .. } => "image",
            LayerKind::SmartObject { .. } => "smartObject",
            LayerKind::Adjustment => "adjustment",
            LayerKind::Unknown { .. } => "unknown",
        }
    }

    /// Pixel payload of the raster variants.
    pub fn image_data(&self) -> Option<&ImageData> {
        match self {
            LayerKind::Image { image }
            | LayerKind::SmartObject { image }
            | LayerKind::Unknown { image } => image.as_ref(),
            _ => None,
        }
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
    Justified,
}

impl TextAlignment {
    /// Map a PSD `Justification` code. Unknown codes fall back to left.
    pub fn from_psd_code(code: i64) -> Self {
        match code {
            1 => TextAlignment::Right,
            2 => TextAlignment::Center,
            3 => TextAlignment::Justified,
            _ => TextAlignment::Left,
        }
    }
}

/// Styled text content of a text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    pub content: String,
    pub font_size: f64,
    pub font_family: String,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub color: Color,
    pub alignment: TextAlignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size: 12.0,
            font_family: "Arial".to_string(),
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            color: Color::BLACK,
            alignment: TextAlignment::Left,
            line_height: None,
            letter_spacing: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeType {
    Rectangle,
    RoundedRectangle,
    Ellipse,
    Path,
}

/// Vector shape description, reduced to what the bounding box can express.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeData {
    pub shape_type: ShapeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

impl Default for ShapeData {
    fn default() -> Self {
        Self {
            shape_type: ShapeType::Path,
            corner_radius: None,
        }
    }
}

/// 8-bit RGB colour with a fractional alpha.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Alpha in `[0, 1]`.
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 1.0,
    };

    /// Build from 0–1 float components (as stored in EngineData).
    pub fn from_unit_rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        fn channel(v: f64) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        Self {
            r: channel(r),
            g: channel(g),
            b: channel(b),
            a: if a.is_finite() { a.clamp(0.0, 1.0) } else { 1.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
}

/// Decoded RGBA pixels of a raster layer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Row-major RGBA, `width * height * 4` bytes.
    #[serde(skip_serializing, default)]
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("buffer", &format_args!("<{} bytes>", self.buffer.len()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mode_names() {
        assert_eq!(ColorMode::from_code(3).to_string(), "RGB");
        assert_eq!(ColorMode::from_code(4).to_string(), "CMYK");
        assert_eq!(ColorMode::from_code(42).to_string(), "42");
    }

    #[test]
    fn empty_name_defaults() {
        let layer = ParsedLayer::new("", LayerKind::Adjustment, Bounds::default());
        assert_eq!(layer.name, DEFAULT_LAYER_NAME);
    }

    #[test]
    fn bounds_validity() {
        assert!(Bounds::new(0.0, 0.0, 10.0, 10.0).is_valid());
        assert!(Bounds::new(5.0, 5.0, 5.0, 5.0).is_valid());
        assert!(!Bounds::new(10.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!Bounds::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn unit_color_rounds() {
        let c = Color::from_unit_rgba(1.0, 0.5, 0.0, 0.25);
        assert_eq!((c.r, c.g, c.b), (255, 128, 0));
        assert_eq!(c.a, 0.25);
    }

    #[test]
    fn layer_count_descends_into_groups() {
        let child = ParsedLayer::new("a", LayerKind::Adjustment, Bounds::default());
        let group = ParsedLayer::new(
            "g",
            LayerKind::Group {
                children: vec![child.clone(), child],
            },
            Bounds::default(),
        );
        let doc = ParsedDocument {
            name: "doc".into(),
            width: 1,
            height: 1,
            color_mode: ColorMode::Rgb,
            bit_depth: 8,
            layers: vec![group],
        };
        assert_eq!(doc.layer_count(), 3);
    }

    #[test]
    fn layer_json_carries_type_tag() {
        let layer = ParsedLayer::new(
            "Title",
            LayerKind::Text {
                text: Some(TextData::default()),
            },
            Bounds::default(),
        );
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["textData"]["fontFamily"], "Arial");
    }
}
