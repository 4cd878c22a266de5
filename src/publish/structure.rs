//! Offline publisher: writes a Figma-style file document as JSON.
//!
//! The file mirrors the shape of the REST API's `GET /files/:key` payload
//! (`document` → pages → nodes with `absoluteBoundingBox`) so it can be fed to
//! a plugin or importer that creates the real file.

use super::{file_url, PublishedArtifact, Publisher, ROOT_NODE_ID};
use crate::error::PublishError;
use crate::scene::{Paint, SceneNode, SceneNodeKind, ScaleMode, TextAlignHorizontal};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const KEY_LEN: usize = 22;

// ── File document ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStructure {
    pub name: String,
    pub last_modified: String,
    pub version: String,
    pub document: StructureNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_family: String,
    pub font_style: String,
    pub font_size: f64,
    pub text_align_horizontal: TextAlignHorizontal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height_px: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
}

/// Fill as the file format spells it: image fills reference `imageRef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructurePaint {
    Solid {
        color: crate::scene::NormalizedColor,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        scale_mode: ScaleMode,
        image_ref: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<StructureNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clips_content: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<TextStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fills: Option<Vec<StructurePaint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

impl FileStructure {
    /// Build the document for `nodes`. Top-level ids are `1:i`; children
    /// extend their parent's id (`1:1:2`, …). Ids are 1-based.
    pub fn build(name: &str, nodes: &[SceneNode]) -> Self {
        let children = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| structure_node(node, format!("1:{}", i + 1)))
            .collect();
        Self {
            name: name.to_string(),
            last_modified: Utc::now().to_rfc3339(),
            version: "1.0".to_string(),
            document: StructureNode {
                id: "0:0".to_string(),
                name: "Document".to_string(),
                node_type: "DOCUMENT".to_string(),
                visible: None,
                opacity: None,
                absolute_bounding_box: None,
                children: Some(children),
                clips_content: None,
                characters: None,
                style: None,
                fills: None,
                corner_radius: None,
            },
        }
    }
}

fn structure_paints(paints: &[Paint]) -> Vec<StructurePaint> {
    paints
        .iter()
        .map(|p| match p {
            Paint::Solid { color } => StructurePaint::Solid { color: *color },
            Paint::Image {
                scale_mode,
                image_hash,
            } => StructurePaint::Image {
                scale_mode: *scale_mode,
                image_ref: image_hash.clone(),
            },
        })
        .collect()
}

fn structure_node(node: &SceneNode, id: String) -> StructureNode {
    let b = node.bounds;
    let mut out = StructureNode {
        id,
        name: node.name.clone(),
        node_type: node.type_name().to_string(),
        visible: Some(node.visible),
        opacity: Some(node.opacity),
        absolute_bounding_box: Some(BoundingBox {
            x: b.left,
            y: b.top,
            width: b.width(),
            height: b.height(),
        }),
        children: None,
        clips_content: None,
        characters: None,
        style: None,
        fills: None,
        corner_radius: None,
    };

    match &node.kind {
        SceneNodeKind::Frame {
            children,
            frame_properties,
        } => {
            out.children = Some(
                children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| structure_node(child, format!("{}:{}", out.id, i + 1)))
                    .collect(),
            );
            out.clips_content = Some(frame_properties.clips_content);
        }
        SceneNodeKind::Text { text_properties: t } => {
            out.characters = Some(t.characters.clone());
            out.style = Some(TextStyle {
                font_family: t.font_name.family.clone(),
                font_style: t.font_name.style.clone(),
                font_size: t.font_size,
                text_align_horizontal: t.text_align_horizontal,
                line_height_px: t.line_height.map(|d| d.value),
                letter_spacing: t.letter_spacing.map(|d| d.value),
            });
            out.fills = Some(structure_paints(&t.fills));
        }
        SceneNodeKind::Rectangle { shape_properties } => {
            out.fills = Some(structure_paints(&shape_properties.fills));
            out.corner_radius = Some(shape_properties.corner_radius.unwrap_or(0.0));
        }
        // Files have no IMAGE node type; images are rectangles with an image fill.
        SceneNodeKind::Image { image_properties } => {
            out.node_type = "RECTANGLE".to_string();
            out.fills = Some(vec![StructurePaint::Image {
                scale_mode: ScaleMode::Fill,
                image_ref: image_properties.image_ref.clone(),
            }]);
            out.corner_radius = Some(0.0);
        }
    }
    out
}

// ── Publisher ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StructurePublisher {
    output_dir: PathBuf,
}

impl StructurePublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path the structure for `key` is written to.
    pub fn structure_path(&self, key: &str) -> PathBuf {
        self.output_dir.join(format!("figma-structure-{key}.json"))
    }
}

#[async_trait]
impl Publisher for StructurePublisher {
    async fn publish(&self, document_name: &str, nodes: &[SceneNode]) -> Result<PublishedArtifact, PublishError> {
        let key = generate_file_key();
        let structure = FileStructure::build(document_name, nodes);
        let json = serde_json::to_vec_pretty(&structure)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| PublishError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        // Write-then-rename so readers never observe a half-written file.
        let path = self.structure_path(&key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| PublishError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| PublishError::Io {
                path: path.clone(),
                source,
            })?;

        debug!("Structure file: {} bytes", json.len());
        info!("Saved file structure to {}", path.display());
        Ok(PublishedArtifact {
            artifact_url: file_url(&key, document_name),
            artifact_id: key,
            root_node_id: Some(ROOT_NODE_ID.to_string()),
        })
    }
}

/// 22 alphanumeric characters, like real design-file keys.
pub(crate) fn generate_file_key() -> String {
    let mut random = Uuid::new_v4().into_bytes().to_vec();
    random.extend_from_slice(Uuid::new_v4().as_bytes());
    random
        .iter()
        .take(KEY_LEN)
        .map(|b| char::from(KEY_ALPHABET[usize::from(*b) % KEY_ALPHABET.len()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Bounds;
    use crate::scene::{
        FontName, FrameProperties, ImageProperties, ShapeProperties, TextProperties,
    };

    fn node(name: &str, kind: SceneNodeKind) -> SceneNode {
        SceneNode {
            name: name.into(),
            bounds: Bounds::new(10.0, 20.0, 110.0, 70.0),
            visible: true,
            opacity: 0.5,
            blend_mode: None,
            kind,
        }
    }

    fn sample_tree() -> Vec<SceneNode> {
        let text = node(
            "Title",
            SceneNodeKind::Text {
                text_properties: TextProperties {
                    characters: "Hello".into(),
                    font_size: 24.0,
                    font_name: FontName {
                        family: "Arial".into(),
                        style: "Regular".into(),
                    },
                    fills: vec![Paint::solid(0.0, 0.0, 0.0, 1.0)],
                    text_align_horizontal: TextAlignHorizontal::Left,
                    line_height: None,
                    letter_spacing: None,
                },
            },
        );
        let image = node(
            "Photo",
            SceneNodeKind::Image {
                image_properties: ImageProperties {
                    image_ref: "/exports/photo.png".into(),
                    fills: vec![],
                },
            },
        );
        let rect = node(
            "Box",
            SceneNodeKind::Rectangle {
                shape_properties: ShapeProperties {
                    fills: vec![Paint::solid(0.5, 0.5, 0.5, 1.0)],
                    corner_radius: None,
                },
            },
        );
        let group = node(
            "Group",
            SceneNodeKind::Frame {
                children: vec![rect],
                frame_properties: FrameProperties::default(),
            },
        );
        vec![node(
            "Root",
            SceneNodeKind::Frame {
                children: vec![text, image, group],
                frame_properties: FrameProperties::default(),
            },
        )]
    }

    #[test]
    fn key_shape() {
        let key = generate_file_key();
        assert_eq!(key.len(), 22);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_file_key());
    }

    #[test]
    fn ids_follow_tree_position() {
        let s = FileStructure::build("Design", &sample_tree());
        assert_eq!(s.document.node_type, "DOCUMENT");
        let root = &s.document.children.as_ref().unwrap()[0];
        assert_eq!(root.id, "1:1");
        let kids = root.children.as_ref().unwrap();
        let ids: Vec<_> = kids.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, ["1:1:1", "1:1:2", "1:1:3"]);
        assert_eq!(kids[2].children.as_ref().unwrap()[0].id, "1:1:3:1");
    }

    #[test]
    fn bounding_box_and_image_as_rectangle() {
        let s = FileStructure::build("Design", &sample_tree());
        let kids = s.document.children.as_ref().unwrap()[0].children.clone().unwrap();
        assert_eq!(
            kids[0].absolute_bounding_box,
            Some(BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 50.0
            })
        );
        assert_eq!(kids[0].characters.as_deref(), Some("Hello"));
        assert_eq!(kids[1].node_type, "RECTANGLE");
        let json = serde_json::to_value(&kids[1]).unwrap();
        assert_eq!(json["fills"][0]["type"], "IMAGE");
        assert_eq!(json["fills"][0]["imageRef"], "/exports/photo.png");
    }

    #[tokio::test]
    async fn publish_writes_structure_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = StructurePublisher::new(dir.path().join("out"));
        let artifact = publisher.publish("My Design", &sample_tree()).await.unwrap();

        assert_eq!(artifact.artifact_id.len(), 22);
        assert_eq!(artifact.root_node_id.as_deref(), Some("0:1"));
        assert_eq!(
            artifact.artifact_url,
            format!("https://www.figma.com/file/{}/My%20Design", artifact.artifact_id)
        );

        let path = publisher.structure_path(&artifact.artifact_id);
        let written: FileStructure =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.name, "My Design");
        assert!(!path.with_extension("json.tmp").exists());
    }
}
