//! Job-less conversion entry points.
//!
//! These run the same parse and convert stages as the orchestrator, but
//! synchronously from the caller's point of view and without a job, a
//! staged copy or a publisher. Use them for previews and tooling; use
//! [`crate::orchestrator::Orchestrator`] when results must be published.

use crate::config::ConversionConfig;
use crate::document::ParsedDocument;
use crate::error::{ParseError, Psd2FigmaError};
use crate::pipeline::export::PngExporter;
use crate::pipeline::psd;
use crate::pipeline::transform::{convert_document, ConversionMetrics, ConversionOutput};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Parse a PSD/PSB file without converting it.
///
/// Decoded pixel buffers are kept in the returned document.
pub async fn inspect(path: impl AsRef<Path>) -> Result<ParsedDocument, Psd2FigmaError> {
    let path = path.as_ref();
    let bytes = read_source(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tokio::task::spawn_blocking(move || psd::parse_document(&bytes, &name))
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("Parse task panicked: {}", e)))?
        .map_err(Psd2FigmaError::from)
}

/// Parse and convert a file into a scene tree, exporting raster layers to
/// `config.export_dir`.
pub async fn convert_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Psd2FigmaError> {
    let doc = Arc::new(inspect(path).await?);
    let exporter = PngExporter::new(&config.export_dir);
    let output = tokio::task::spawn_blocking(move || convert_document(&doc, &exporter))
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("Convert task panicked: {}", e)))?;
    Ok(output)
}

/// Convert a file and write the scene tree as JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionMetrics, Psd2FigmaError> {
    let output = convert_file(input, config).await?;
    let path = output_path.as_ref();
    let json = serde_json::to_vec_pretty(&output.nodes)
        .map_err(|e| Psd2FigmaError::Internal(format!("scene serialisation: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", parent.display(), e)))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", tmp_path.display(), e)))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Psd2FigmaError::Internal(format!("{}: {}", path.display(), e)))?;

    info!("Wrote scene tree to {}", path.display());
    Ok(output.metrics)
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Psd2FigmaError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Psd2FigmaError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(path, config))
}

async fn read_source(path: &Path) -> Result<Vec<u8>, Psd2FigmaError> {
    tokio::fs::read(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Psd2FigmaError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ParseError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
            .into()
        }
    })
}
