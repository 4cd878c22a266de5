//! Publishers: turn a converted scene tree into an addressable artifact.
//!
//! | Publisher | Artifact |
//! |-----------|----------|
//! | [`StructurePublisher`] | Figma-style file document written as JSON next to the uploads |
//! | [`FigmaRestPublisher`] | File created in the first project of a Figma team via the REST API |
//!
//! The orchestrator holds an `Arc<dyn Publisher>` and never retries a failed
//! publish; any [`PublishError`] fails the job.

mod rest;
mod structure;

pub use rest::FigmaRestPublisher;
pub use structure::{FileStructure, StructureNode, StructurePublisher};

use crate::config::ConversionConfig;
use crate::error::PublishError;
use crate::scene::SceneNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Public web location of design files.
pub const FIGMA_WEB_BASE: &str = "https://www.figma.com/file/";

/// Node id of the first page in a design file.
pub const ROOT_NODE_ID: &str = "0:1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub artifact_id: String,
    pub artifact_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, document_name: &str, nodes: &[SceneNode]) -> Result<PublishedArtifact, PublishError>;
}

/// REST publisher when both a token and a team id are configured, otherwise
/// the structure-file publisher.
pub fn publisher_from_config(config: &ConversionConfig) -> Result<Arc<dyn Publisher>, PublishError> {
    match (&config.figma_access_token, &config.figma_team_id) {
        (Some(token), Some(team)) if !token.is_empty() && !team.is_empty() => {
            info!("Publishing to the Figma REST API (team {})", team);
            Ok(Arc::new(FigmaRestPublisher::new(
                token,
                team,
                &config.figma_api_base,
                config.api_timeout_secs,
            )?))
        }
        _ => {
            info!(
                "Publishing structure files to {}",
                config.output_dir.display()
            );
            Ok(Arc::new(StructurePublisher::new(&config.output_dir)))
        }
    }
}

/// `https://www.figma.com/file/<key>/<percent-encoded name>`.
pub fn file_url(key: &str, name: &str) -> String {
    match reqwest::Url::parse(FIGMA_WEB_BASE) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(key).push(name);
            }
            url.to_string()
        }
        Err(_) => format!("{FIGMA_WEB_BASE}{key}/{name}"),
    }
}
