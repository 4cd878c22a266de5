//! PSD/PSB decoding: bytes → [`ParsedDocument`].
//!
//! ## File layout
//!
//! ```text
//! header (26 bytes) ─ colour mode data ─ image resources ─ layer & mask info ─ merged image
//! ```
//!
//! Only the header and the layer & mask section are interpreted; the other
//! sections are skipped by length. PSB ("large document", version 2) widens
//! several length fields from 4 to 8 bytes, which [`reader::Reader::length`]
//! handles via the `large` flag threaded through every call.
//!
//! The parser is pure and synchronous. Callers on an async runtime run it in
//! `spawn_blocking` (see [`crate::orchestrator`]).

mod descriptor;
mod engine;
mod layer;
mod reader;

use crate::document::{ColorMode, ParsedDocument};
use crate::error::ParseError;
use reader::Reader;
use std::path::Path;
use tracing::{debug, info};

/// File signature at offset 0.
pub const PSD_SIGNATURE: &[u8; 4] = b"8BPS";

/// Decode a PSD/PSB byte stream.
///
/// `name` becomes the document name after stripping a `.psd`/`.psb` extension.
pub fn parse_document(bytes: &[u8], name: &str) -> Result<ParsedDocument, ParseError> {
    let mut r = Reader::new(bytes);

    // ── Header ──────────────────────────────────────────────────────────
    r.enter("file header");
    let signature = r.array::<4>()?;
    if &signature != PSD_SIGNATURE {
        return Err(ParseError::NotAPsd { magic: signature });
    }
    let version = r.u16()?;
    let large = match version {
        1 => false,
        2 => true,
        other => return Err(ParseError::UnsupportedVersion(other)),
    };
    r.skip(6)?;
    let channels = r.u16()?;
    let height = r.u32()?;
    let width = r.u32()?;
    let bit_depth = r.u16()?;
    let color_mode = ColorMode::from_code(r.u16()?);
    debug!(
        "PSD header: {}x{} px, {} channels, {}-bit {}, {}",
        width,
        height,
        channels,
        bit_depth,
        color_mode,
        if large { "PSB" } else { "PSD" }
    );

    // ── Sections ────────────────────────────────────────────────────────
    r.section(false, "colour mode data")?;
    r.section(false, "image resources")?;

    let layers = if r.is_empty() {
        Vec::new()
    } else {
        let mut section = r.section(large, "layer and mask info")?;
        read_layer_and_mask(&mut section, large, bit_depth)?
    };

    let doc = ParsedDocument {
        name: document_name(name),
        width,
        height,
        color_mode,
        bit_depth,
        layers,
    };
    info!(
        "Parsed '{}': {}x{}, {} layers",
        doc.name,
        doc.width,
        doc.height,
        doc.layer_count()
    );
    Ok(doc)
}

/// Read and decode a PSD file from disk.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_document(&bytes, &name)
}

fn read_layer_and_mask(
    section: &mut Reader<'_>,
    large: bool,
    depth: u16,
) -> Result<Vec<crate::document::ParsedLayer>, ParseError> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    let mut info = section.section(large, "layer info")?;
    if !info.is_empty() {
        return layer::read_layer_info(&mut info, large, depth);
    }

    // 16/32-bit documents keep their layers in an `Lr16`/`Lr32` block after
    // the global mask instead of in the layer info section.
    if section.is_empty() {
        return Ok(Vec::new());
    }
    section.section(false, "global layer mask info")?;
    for (key, mut block) in layer::read_tagged_blocks(section, large)? {
        if matches!(&key, b"Lr16" | b"Lr32" | b"Layr") {
            return layer::read_layer_info(&mut block, large, depth);
        }
    }
    Ok(Vec::new())
}

/// Strip a trailing `.psd`/`.psb` (any case) from a file name.
pub fn document_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".psd") || lower.ends_with(".psb") {
        file_name[..file_name.len() - 4].to_string()
    } else {
        file_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u16) -> Vec<u8> {
        let mut out = b"8BPS".to_vec();
        out.extend(version.to_be_bytes());
        out.extend([0u8; 6]);
        out.extend(3u16.to_be_bytes());
        out.extend(600u32.to_be_bytes());
        out.extend(800u32.to_be_bytes());
        out.extend(8u16.to_be_bytes());
        out.extend(3u16.to_be_bytes());
        out
    }

    #[test]
    fn rejects_wrong_signature() {
        let err = parse_document(b"%PDF-1.7 and more bytes here", "x.psd").unwrap_err();
        assert!(matches!(err, ParseError::NotAPsd { magic } if &magic == b"%PDF"));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = parse_document(&header(3), "x.psd").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion(3)));
    }

    #[test]
    fn truncated_header_is_an_error() {
        let bytes = header(1);
        let err = parse_document(&bytes[..10], "x.psd").unwrap_err();
        assert!(matches!(err, ParseError::Truncated { context: "file header", .. }));
    }

    #[test]
    fn header_only_document_has_no_layers() {
        let mut bytes = header(1);
        bytes.extend(0u32.to_be_bytes()); // colour mode data
        bytes.extend(0u32.to_be_bytes()); // image resources
        bytes.extend(0u32.to_be_bytes()); // layer & mask info
        let doc = parse_document(&bytes, "Poster.PSD").unwrap();
        assert_eq!(doc.name, "Poster");
        assert_eq!((doc.width, doc.height), (800, 600));
        assert_eq!(doc.color_mode, ColorMode::Rgb);
        assert_eq!(doc.bit_depth, 8);
        assert!(doc.layers.is_empty());
    }

    #[test]
    fn missing_layer_section_is_tolerated() {
        let mut bytes = header(2);
        bytes.extend(0u32.to_be_bytes());
        bytes.extend(0u32.to_be_bytes());
        let doc = parse_document(&bytes, "big.psb").unwrap();
        assert_eq!(doc.name, "big");
        assert!(doc.layers.is_empty());
    }

    #[test]
    fn document_name_strips_known_extensions_only() {
        assert_eq!(document_name("a.psd"), "a");
        assert_eq!(document_name("b.PSB"), "b");
        assert_eq!(document_name("c.png"), "c.png");
        assert_eq!(document_name("psd"), "psd");
    }
}
