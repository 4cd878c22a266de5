//! Target scene graph: Figma-style nodes produced by the converter.
//!
//! A [`SceneNode`] serialises to the JSON shape the design-tool side expects:
//! `{"type": "FRAME" | "TEXT" | "RECTANGLE" | "IMAGE", "name": …, …}` with the
//! type-specific property block next to the common fields.

use crate::document::{Bounds, Color};
use serde::{Deserialize, Serialize};

// ── Nodes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub name: String,
    pub bounds: Bounds,
    pub visible: bool,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<String>,
    #[serde(flatten)]
    pub kind: SceneNodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SceneNodeKind {
    #[serde(rename_all = "camelCase")]
    Frame {
        children: Vec<SceneNode>,
        frame_properties: FrameProperties,
    },
    #[serde(rename_all = "camelCase")]
    Text { text_properties: TextProperties },
    #[serde(rename_all = "camelCase")]
    Rectangle { shape_properties: ShapeProperties },
    #[serde(rename_all = "camelCase")]
    Image { image_properties: ImageProperties },
}

impl SceneNode {
    /// `"FRAME"`, `"TEXT"`, `"RECTANGLE"` or `"IMAGE"`.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SceneNodeKind::Frame { .. } => "FRAME",
            SceneNodeKind::Text { .. } => "TEXT",
            SceneNodeKind::Rectangle { .. } => "RECTANGLE",
            SceneNodeKind::Image { .. } => "IMAGE",
        }
    }

    pub fn children(&self) -> &[SceneNode] {
        match &self.kind {
            SceneNodeKind::Frame { children, .. } => children,
            _ => &[],
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(SceneNode::node_count).sum::<usize>()
    }
}

// ── Property blocks ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutMode {
    None,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameProperties {
    pub layout_mode: LayoutMode,
    pub clips_content: bool,
}

impl Default for FrameProperties {
    fn default() -> Self {
        Self {
            layout_mode: LayoutMode::None,
            clips_content: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontName {
    pub family: String,
    pub style: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextAlignHorizontal {
    Left,
    Center,
    Right,
    Justified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionUnit {
    Pixels,
    Percent,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub value: f64,
    pub unit: DimensionUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProperties {
    pub characters: String,
    pub font_size: f64,
    pub font_name: FontName,
    pub fills: Vec<Paint>,
    pub text_align_horizontal: TextAlignHorizontal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeProperties {
    pub fills: Vec<Paint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    /// Path of the exported PNG.
    pub image_ref: String,
    pub fills: Vec<Paint>,
}

// ── Paints & colours ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleMode {
    Fill,
    Fit,
    Crop,
    Tile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Paint {
    Solid {
        color: NormalizedColor,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        scale_mode: ScaleMode,
        image_hash: String,
    },
}

impl Paint {
    pub fn solid(r: f64, g: f64, b: f64, a: f64) -> Self {
        Paint::Solid {
            color: NormalizedColor { r, g, b, a },
        }
    }
}

/// Colour with every channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl From<Color> for NormalizedColor {
    fn from(c: Color) -> Self {
        Self {
            r: f64::from(c.r) / 255.0,
            g: f64::from(c.g) / 255.0,
            b: f64::from(c.b) / 255.0,
            a: c.a,
        }
    }
}

impl From<NormalizedColor> for Color {
    fn from(c: NormalizedColor) -> Self {
        Color::from_unit_rgba(c.r, c.g, c.b, c.a)
    }
}
