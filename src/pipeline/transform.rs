//! Layer tree → scene tree conversion.
//!
//! Walks a [`ParsedDocument`] pre-order and emits one [`SceneNode`] per
//! convertible layer under a single root frame sized to the document.
//! Everything that cannot be represented natively is *flattened* into a
//! placeholder rectangle and recorded in [`ConversionMetrics`], so the output
//! tree always mirrors the source structure.
//!
//! Failures are scoped to one layer: a [`LayerConversionError`] drops that
//! layer (and its subtree) with a warning, and an [`ExportError`] downgrades
//! a raster layer to its no-data placeholder. Neither aborts the document.

use super::export::{RasterExporter, RawImage};
use crate::document::{
    Bounds, FontStyle, FontWeight, ImageData, LayerKind, ParsedDocument, ParsedLayer, ShapeData,
    TextAlignment, TextData,
};
use crate::error::LayerConversionError;
use crate::scene::{
    Dimension, DimensionUnit, FontName, FrameProperties, ImageProperties, Paint, ScaleMode,
    SceneNode, SceneNodeKind, ShapeProperties, TextAlignHorizontal, TextProperties,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SHAPE_FILL: (f64, f64, f64, f64) = (0.5, 0.5, 0.5, 1.0);
const NO_DATA_FILL: (f64, f64, f64, f64) = (0.9, 0.9, 0.9, 0.3);
const FLATTENED_FILL: (f64, f64, f64, f64) = (0.9, 0.9, 0.9, 0.5);

// ── Metrics ──────────────────────────────────────────────────────────────

/// A layer (or part of one) the target format cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedFeature {
    pub layer_name: String,
    pub feature: String,
    pub reason: String,
}

/// Counters accumulated during one conversion.
///
/// `editable_layers + flattened_layers == total_layers - failed`, where
/// `failed` is the number of layers dropped with a warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetrics {
    pub total_layers: usize,
    pub editable_layers: usize,
    pub flattened_layers: usize,
    pub unsupported_features: Vec<UnsupportedFeature>,
    pub warnings: Vec<String>,
}

impl ConversionMetrics {
    /// Layers dropped from the output because they failed to convert.
    pub fn failed_layers(&self) -> usize {
        self.total_layers
            .saturating_sub(self.editable_layers + self.flattened_layers)
    }
}

/// Scene tree (always exactly one root frame) plus the metrics that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    pub nodes: Vec<SceneNode>,
    pub metrics: ConversionMetrics,
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Convert a parsed document into a scene tree.
///
/// Synchronous and CPU-bound (PNG encoding happens inside `exporter`).
/// Deterministic for a given document apart from exported file names.
pub fn convert_document(doc: &ParsedDocument, exporter: &dyn RasterExporter) -> ConversionOutput {
    info!("Converting '{}' ({} layers)", doc.name, doc.layer_count());
    let mut metrics = ConversionMetrics::default();
    let children = convert_layers(&doc.layers, exporter, &mut metrics);

    let root = SceneNode {
        name: doc.name.clone(),
        bounds: Bounds::new(0.0, 0.0, f64::from(doc.width), f64::from(doc.height)),
        visible: true,
        opacity: 1.0,
        blend_mode: None,
        kind: SceneNodeKind::Frame {
            children,
            frame_properties: FrameProperties::default(),
        },
    };

    info!(
        "Converted '{}': {} layers, {} editable, {} flattened, {} warnings",
        doc.name,
        metrics.total_layers,
        metrics.editable_layers,
        metrics.flattened_layers,
        metrics.warnings.len()
    );
    ConversionOutput {
        nodes: vec![root],
        metrics,
    }
}

fn convert_layers(
    layers: &[ParsedLayer],
    exporter: &dyn RasterExporter,
    metrics: &mut ConversionMetrics,
) -> Vec<SceneNode> {
    layers
        .iter()
        .filter_map(|layer| convert_layer(layer, exporter, metrics))
        .collect()
}

fn convert_layer(
    layer: &ParsedLayer,
    exporter: &dyn RasterExporter,
    metrics: &mut ConversionMetrics,
) -> Option<SceneNode> {
    metrics.total_layers += 1;
    match try_convert_layer(layer, exporter, metrics) {
        Ok(node) => Some(node),
        Err(e) => {
            warn!("Failed to convert layer '{}': {}", layer.name, e);
            metrics
                .warnings
                .push(format!("Failed to convert layer: {}", layer.name));
            None
        }
    }
}

/// Validation runs before any counter moves, so a failed layer leaves no trace
/// in the metrics besides `total_layers` and the warning.
fn try_convert_layer(
    layer: &ParsedLayer,
    exporter: &dyn RasterExporter,
    metrics: &mut ConversionMetrics,
) -> Result<SceneNode, LayerConversionError> {
    validate_layer(layer)?;
    let node = match &layer.kind {
        LayerKind::Group { children } => {
            let children = convert_layers(children, exporter, metrics);
            metrics.editable_layers += 1;
            scene_node(
                layer,
                layer.name.clone(),
                SceneNodeKind::Frame {
                    children,
                    frame_properties: FrameProperties::default(),
                },
            )
        }
        LayerKind::Text { text: Some(text) } => {
            let properties = text_properties(layer, text)?;
            metrics.editable_layers += 1;
            scene_node(
                layer,
                layer.name.clone(),
                SceneNodeKind::Text {
                    text_properties: properties,
                },
            )
        }
        LayerKind::Text { text: None } => flatten(layer, metrics, "Text layer missing text data"),
        LayerKind::Shape { shape } => {
            metrics.editable_layers += 1;
            shape_node(layer, shape.as_ref())
        }
        LayerKind::Image { image }
        | LayerKind::SmartObject { image }
        | LayerKind::Unknown { image } => raster_node(layer, image.as_ref(), exporter, metrics),
        LayerKind::Adjustment => flatten(layer, metrics, "Adjustment layers are not supported"),
    };
    Ok(node)
}

fn validate_layer(layer: &ParsedLayer) -> Result<(), LayerConversionError> {
    let b = layer.bounds;
    if !b.is_valid() {
        return Err(LayerConversionError::InvalidBounds {
            layer: layer.name.clone(),
            left: b.left,
            top: b.top,
            right: b.right,
            bottom: b.bottom,
        });
    }
    if !(0.0..=1.0).contains(&layer.opacity) {
        return Err(LayerConversionError::InvalidOpacity {
            layer: layer.name.clone(),
            opacity: layer.opacity,
        });
    }
    Ok(())
}

// ── Per-variant rules ────────────────────────────────────────────────────

fn scene_node(layer: &ParsedLayer, name: String, kind: SceneNodeKind) -> SceneNode {
    SceneNode {
        name,
        bounds: layer.bounds,
        visible: layer.visible,
        opacity: layer.opacity,
        blend_mode: layer.blend_mode.clone(),
        kind,
    }
}

fn rectangle(layer: &ParsedLayer, name: String, fill: (f64, f64, f64, f64), corner_radius: Option<f64>) -> SceneNode {
    let (r, g, b, a) = fill;
    scene_node(
        layer,
        name,
        SceneNodeKind::Rectangle {
            shape_properties: ShapeProperties {
                fills: vec![Paint::solid(r, g, b, a)],
                corner_radius,
            },
        },
    )
}

fn text_properties(layer: &ParsedLayer, text: &TextData) -> Result<TextProperties, LayerConversionError> {
    if !text.font_size.is_finite() || text.font_size <= 0.0 {
        return Err(LayerConversionError::InvalidFontSize {
            layer: layer.name.clone(),
            size: text.font_size,
        });
    }
    Ok(TextProperties {
        characters: text.content.clone(),
        font_size: text.font_size,
        font_name: FontName {
            family: text.font_family.clone(),
            style: font_style_name(text.font_weight, text.font_style).to_string(),
        },
        fills: vec![Paint::Solid {
            color: text.color.into(),
        }],
        text_align_horizontal: match text.alignment {
            TextAlignment::Left => TextAlignHorizontal::Left,
            TextAlignment::Center => TextAlignHorizontal::Center,
            TextAlignment::Right => TextAlignHorizontal::Right,
            TextAlignment::Justified => TextAlignHorizontal::Justified,
        },
        line_height: text
            .line_height
            .filter(|v| *v != 0.0)
            .map(|value| Dimension {
                value,
                unit: DimensionUnit::Pixels,
            }),
        letter_spacing: text
            .letter_spacing
            .filter(|v| *v != 0.0)
            .map(|value| Dimension {
                value,
                unit: DimensionUnit::Percent,
            }),
    })
}

/// Font style name as the design tool spells it.
pub fn font_style_name(weight: FontWeight, style: FontStyle) -> &'static str {
    match (weight, style) {
        (FontWeight::Bold, FontStyle::Italic) => "Bold Italic",
        (FontWeight::Bold, FontStyle::Normal) => "Bold",
        (FontWeight::Normal, FontStyle::Italic) => "Italic",
        (FontWeight::Normal, FontStyle::Normal) => "Regular",
    }
}

fn shape_node(layer: &ParsedLayer, shape: Option<&ShapeData>) -> SceneNode {
    rectangle(
        layer,
        layer.name.clone(),
        SHAPE_FILL,
        shape.and_then(|s| s.corner_radius),
    )
}

fn raster_node(
    layer: &ParsedLayer,
    image: Option<&ImageData>,
    exporter: &dyn RasterExporter,
    metrics: &mut ConversionMetrics,
) -> SceneNode {
    let Some(image) = image else {
        debug!("Raster layer '{}' has no pixel data", layer.name);
        return no_data_placeholder(layer, metrics);
    };

    let raw = RawImage {
        width: image.width,
        height: image.height,
        pixels: &image.buffer,
    };
    let exported = match exporter.export(&raw, &layer.name) {
        Ok(Some(exported)) => exported,
        Ok(None) => {
            debug!("Raster layer '{}' exported nothing", layer.name);
            return no_data_placeholder(layer, metrics);
        }
        Err(e) => {
            warn!("Failed to export image for layer '{}': {}", layer.name, e);
            metrics
                .warnings
                .push(format!("Failed to export image for layer: {}", layer.name));
            return no_data_placeholder(layer, metrics);
        }
    };

    let image_ref = exported.file_path.to_string_lossy().into_owned();
    debug!(
        "Converted {} '{}' ({}x{}) → {}",
        layer.kind.type_name(),
        layer.name,
        image.width,
        image.height,
        image_ref
    );
    metrics.editable_layers += 1;
    scene_node(
        layer,
        layer.name.clone(),
        SceneNodeKind::Image {
            image_properties: ImageProperties {
                fills: vec![Paint::Image {
                    scale_mode: ScaleMode::Fill,
                    image_hash: image_ref.clone(),
                }],
                image_ref,
            },
        },
    )
}

fn no_data_placeholder(layer: &ParsedLayer, metrics: &mut ConversionMetrics) -> SceneNode {
    metrics.flattened_layers += 1;
    metrics.unsupported_features.push(UnsupportedFeature {
        layer_name: layer.name.clone(),
        feature: "Raster Image".to_string(),
        reason: "No pixel data available".to_string(),
    });
    rectangle(layer, format!("{} (No Data)", layer.name), NO_DATA_FILL, None)
}

/// Replace `layer` with a placeholder rectangle and record why.
fn flatten(layer: &ParsedLayer, metrics: &mut ConversionMetrics, reason: &str) -> SceneNode {
    metrics.flattened_layers += 1;
    metrics.unsupported_features.push(UnsupportedFeature {
        layer_name: layer.name.clone(),
        feature: layer.kind.type_name().to_string(),
        reason: reason.to_string(),
    });
    rectangle(layer, format!("{} (Flattened)", layer.name), FLATTENED_FILL, None)
}
