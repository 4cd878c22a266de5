//! Raster export: RGBA layer pixels → standalone PNG files on disk.
//!
//! The converter only sees the [`RasterExporter`] trait, so tests can count
//! or fail exports without touching the file system.

use crate::document::ImageFormat;
use crate::error::ExportError;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static RE_UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]").unwrap());

/// Borrowed RGBA pixels of one layer.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, `width * height * 4` bytes.
    pub pixels: &'a [u8],
}

/// A PNG written by an exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedImage {
    pub file_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

pub trait RasterExporter: Send + Sync {
    /// Write `image` somewhere addressable.
    ///
    /// `Ok(None)` means there was nothing to write (zero size or empty buffer).
    fn export(&self, image: &RawImage<'_>, layer_name: &str) -> Result<Option<ExportedImage>, ExportError>;
}

/// Writes `<sanitized>_<unix-millis>_<seq>.png` files into one directory.
#[derive(Debug)]
pub struct PngExporter {
    dir: PathBuf,
    seq: AtomicU64,
}

impl PngExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, layer_name: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}.png", sanitize_file_stem(layer_name), millis, seq)
    }
}

impl RasterExporter for PngExporter {
    fn export(&self, image: &RawImage<'_>, layer_name: &str) -> Result<Option<ExportedImage>, ExportError> {
        if image.width == 0 || image.height == 0 || image.pixels.is_empty() {
            debug!("Nothing to export for layer '{}'", layer_name);
            return Ok(None);
        }
        let expected = image.width as usize * image.height as usize * 4;
        if image.pixels.len() != expected {
            return Err(ExportError::BufferSize {
                layer: layer_name.to_string(),
                expected,
                actual: image.pixels.len(),
            });
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            image.pixels,
            image.width,
            image.height,
            ExtendedColorType::Rgba8,
        )?;

        std::fs::create_dir_all(&self.dir).map_err(|source| ExportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(self.file_name(layer_name));
        std::fs::write(&path, &png).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(
            "Exported '{}' → {} ({}x{}, {} bytes)",
            layer_name,
            path.display(),
            image.width,
            image.height,
            png.len()
        );
        Ok(Some(ExportedImage {
            file_path: path,
            width: image.width,
            height: image.height,
            format: ImageFormat::Png,
        }))
    }
}

/// Lowercase, with every character outside `[a-z0-9]` replaced by `_`.
pub fn sanitize_file_stem(name: &str) -> String {
    RE_UNSAFE_FILE_CHARS.replace_all(name, "_").to_lowercase()
}
