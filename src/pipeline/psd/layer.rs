//! Layer records, tagged blocks, channel image data and group nesting.
//!
//! Records are stored bottom-to-top and groups are flat: a "bounding section
//! divider" record (`lsct` type 3) opens a group and the folder record
//! (type 1 or 2) that follows its children closes it and carries the group's
//! own name and properties.

use super::descriptor::{read_descriptor, Descriptor};
use super::engine::parse_engine_data;
use super::reader::Reader;
use crate::document::{
    Bounds, FontStyle, FontWeight, ImageData, ImageFormat, LayerKind, ParsedLayer, ShapeData,
    ShapeType, TextAlignment, TextData, DEFAULT_LAYER_NAME,
};
use crate::error::ParseError;
use tracing::{debug, warn};

/// Tagged-block keys whose length field is 8 bytes wide in PSB files.
const LARGE_LENGTH_KEYS: [&[u8; 4]; 13] = [
    b"LMsk", b"Lr16", b"Lr32", b"Layr", b"Mt16", b"Mt32", b"Mtrn", b"Alph", b"FMsk", b"lnk2",
    b"FEid", b"FXid", b"PxSD",
];

const PLACED_KEYS: [&[u8; 4]; 3] = [b"SoLd", b"PlLd", b"SoLE"];

const ADJUSTMENT_KEYS: [&[u8; 4]; 17] = [
    b"levl", b"curv", b"brit", b"blnc", b"hue2", b"hue ", b"selc", b"thrs", b"nvrt", b"post",
    b"mixr", b"grdm", b"phfl", b"expA", b"vibA", b"clrL", b"blwh",
];

const VECTOR_KEYS: [&[u8; 4]; 4] = [b"vmsk", b"vsms", b"vscg", b"vstk"];

/// Flag bit set on hidden layers.
const FLAG_HIDDEN: u8 = 0x02;

// ── Records ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct ChannelInfo {
    id: i16,
    length: usize,
}

/// Section divider kinds from `lsct`/`lsdk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Divider {
    /// Folder record: closes a group, carries its name.
    Folder,
    /// Hidden end-of-group marker: opens a group (in bottom-to-top order).
    Bounding,
}

#[derive(Debug, Default)]
struct Features {
    unicode_name: Option<String>,
    divider: Option<Divider>,
    has_text: bool,
    text: Option<TextData>,
    placed: bool,
    adjustment: bool,
    vector: bool,
    origination: Option<ShapeData>,
    payload_error: Option<String>,
}

#[derive(Debug)]
struct LayerRecord {
    name: String,
    top: i32,
    left: i32,
    bottom: i32,
    right: i32,
    channels: Vec<ChannelInfo>,
    blend_key: [u8; 4],
    opacity: u8,
    flags: u8,
    features: Features,
    image: Option<ImageData>,
}

/// Leaf classification, in precedence order after "has children".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafClass {
    Text,
    SmartObject,
    Adjustment,
    Shape,
    Image,
    Unknown,
}

impl LayerRecord {
    fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    fn has_pixel_channels(&self) -> bool {
        self.width() > 0
            && self.height() > 0
            && self.channels.iter().any(|c| c.id >= 0 && c.length > 2)
    }

    fn leaf_class(&self) -> LeafClass {
        let f = &self.features;
        if f.has_text {
            LeafClass::Text
        } else if f.placed {
            LeafClass::SmartObject
        } else if f.adjustment {
            LeafClass::Adjustment
        } else if f.vector {
            LeafClass::Shape
        } else if self.has_pixel_channels() {
            LeafClass::Image
        } else {
            LeafClass::Unknown
        }
    }

    fn needs_pixels(&self) -> bool {
        self.features.divider.is_none()
            && matches!(
                self.leaf_class(),
                LeafClass::SmartObject | LeafClass::Image | LeafClass::Unknown
            )
    }

    fn display_name(&self) -> String {
        let name = self
            .features
            .unicode_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name);
        if name.is_empty() {
            DEFAULT_LAYER_NAME.to_string()
        } else {
            name.to_string()
        }
    }

    fn into_layer(self, children: Option<Vec<ParsedLayer>>) -> ParsedLayer {
        let kind = match children {
            Some(children) if !children.is_empty() => LayerKind::Group { children },
            _ => self.leaf_kind(),
        };
        let name = self.display_name();
        debug!("Layer '{}' → {}", name, kind.type_name());
        ParsedLayer::new(
            name,
            kind,
            Bounds::new(
                f64::from(self.left),
                f64::from(self.top),
                f64::from(self.right),
                f64::from(self.bottom),
            ),
        )
        .with_visibility(self.flags & FLAG_HIDDEN == 0)
        .with_opacity(f64::from(self.opacity) / 255.0)
        .with_blend_mode(blend_mode_name(&self.blend_key))
    }

    fn leaf_kind(&self) -> LayerKind {
        match self.leaf_class() {
            LeafClass::Text => LayerKind::Text {
                text: self.features.text.clone(),
            },
            LeafClass::SmartObject => LayerKind::SmartObject {
                image: self.image.clone(),
            },
            LeafClass::Adjustment => LayerKind::Adjustment,
            LeafClass::Shape => LayerKind::Shape {
                shape: Some(self.features.origination.unwrap_or_default()),
            },
            LeafClass::Image => LayerKind::Image {
                image: self.image.clone(),
            },
            LeafClass::Unknown => LayerKind::Unknown {
                image: self.image.clone(),
            },
        }
    }
}

/// Map a 4-byte blend-mode key to its name. Unknown keys pass through.
pub(crate) fn blend_mode_name(key: &[u8; 4]) -> String {
    let name = match key {
        b"pass" => "pass through",
        b"norm" => "normal",
        b"diss" => "dissolve",
        b"dark" => "darken",
        b"mul " => "multiply",
        b"idiv" => "color burn",
        b"lbrn" => "linear burn",
        b"dkCl" => "darker color",
        b"lite" => "lighten",
        b"scrn" => "screen",
        b"div " => "color dodge",
        b"lddg" => "linear dodge",
        b"lgCl" => "lighter color",
        b"over" => "overlay",
        b"sLit" => "soft light",
        b"hLit" => "hard light",
        b"vLit" => "vivid light",
        b"lLit" => "linear light",
        b"pLit" => "pin light",
        b"hMix" => "hard mix",
        b"diff" => "difference",
        b"smud" => "exclusion",
        b"fsub" => "subtract",
        b"fdiv" => "divide",
        b"hue " => "hue",
        b"sat " => "saturation",
        b"colr" => "color",
        b"lum " => "luminosity",
        other => return String::from_utf8_lossy(other).trim().to_string(),
    };
    name.to_string()
}

// ── Layer info section ───────────────────────────────────────────────────

/// Decode a layer info block (count, records, channel data) into a layer tree.
pub(crate) fn read_layer_info(
    r: &mut Reader<'_>,
    large: bool,
    depth: u16,
) -> Result<Vec<ParsedLayer>, ParseError> {
    if r.is_empty() {
        return Ok(Vec::new());
    }
    r.enter("layer count");
    // Negative counts flag a merged-alpha first channel; the magnitude is the count.
    let count = usize::from(r.i16()?.unsigned_abs());
    debug!("Layer records: {}", count);

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(read_record(r, large)?);
    }

    read_channel_data(r, &mut records, large, depth);
    Ok(build_tree(records))
}

fn read_record(r: &mut Reader<'_>, large: bool) -> Result<LayerRecord, ParseError> {
    r.enter("layer record");
    let top = r.i32()?;
    let left = r.i32()?;
    let bottom = r.i32()?;
    let right = r.i32()?;

    let channel_count = usize::from(r.u16()?);
    let mut channels = Vec::with_capacity(channel_count);
    for _ in 0..channel_count {
        let id = r.i16()?;
        let length = r.length(large)?;
        channels.push(ChannelInfo { id, length });
    }

    let signature = r.array::<4>()?;
    if &signature != b"8BIM" {
        return Err(ParseError::Malformed(format!(
            "layer record signature {:?} is not '8BIM'",
            String::from_utf8_lossy(&signature)
        )));
    }
    let blend_key = r.array::<4>()?;
    let opacity = r.u8()?;
    let _clipping = r.u8()?;
    let flags = r.u8()?;
    let _filler = r.u8()?;

    // The extra data is length-prefixed, so `r` is past this layer either way
    // and damage inside it only costs this layer.
    let mut extra = r.section(false, "layer extra data")?;
    let mut name = String::new();
    let mut features = Features::default();
    if let Err(e) = read_extra_data(&mut extra, large, &mut name, &mut features) {
        debug!("Layer '{}': unreadable extra data: {}", name, e);
        features.payload_error = Some(e.to_string());
    }

    Ok(LayerRecord {
        name,
        top,
        left,
        bottom,
        right,
        channels,
        blend_key,
        opacity,
        flags,
        features,
        image: None,
    })
}

/// Mask data, blending ranges, Pascal name and tagged blocks of one record.
///
/// `name` is filled as soon as it is read so a later failure can still name the layer.
fn read_extra_data(
    extra: &mut Reader<'_>,
    large: bool,
    name: &mut String,
    features: &mut Features,
) -> Result<(), ParseError> {
    extra.section(false, "layer mask data")?;
    extra.section(false, "layer blending ranges")?;
    extra.enter("layer name");
    *name = extra.pascal_string(4)?;

    for (key, mut block) in read_tagged_blocks(extra, large)? {
        if let Err(e) = apply_block(features, &key, &mut block) {
            debug!(
                "Layer '{}': failed to read '{}' block: {}",
                name,
                String::from_utf8_lossy(&key),
                e
            );
            features.payload_error = Some(e.to_string());
        }
    }
    Ok(())
}

/// Split a run of `8BIM`/`8B64` tagged blocks into `(key, body)` pairs.
///
/// Some writers pad blocks to even or 4-byte boundaries without counting the
/// padding in the length, so up to three stray bytes between blocks are skipped.
pub(crate) fn read_tagged_blocks<'a>(
    r: &mut Reader<'a>,
    large: bool,
) -> Result<Vec<([u8; 4], Reader<'a>)>, ParseError> {
    let mut blocks = Vec::new();
    loop {
        let mut skipped = 0;
        while r.remaining() >= 12 && !is_block_signature(r.peek::<4>()) && skipped < 3 {
            r.skip(1)?;
            skipped += 1;
        }
        if r.remaining() < 12 || !is_block_signature(r.peek::<4>()) {
            break;
        }
        r.enter("tagged block");
        r.skip(4)?;
        let key = r.array::<4>()?;
        let long = large && LARGE_LENGTH_KEYS.contains(&&key);
        let len = r.length(long)?;
        let body = r.sub(len, "tagged block")?;
        blocks.push((key, body));
    }
    Ok(blocks)
}

fn is_block_signature(sig: Option<[u8; 4]>) -> bool {
    matches!(sig, Some(s) if &s == b"8BIM" || &s == b"8B64")
}

fn apply_block(features: &mut Features, key: &[u8; 4], block: &mut Reader<'_>) -> Result<(), ParseError> {
    match key {
        b"luni" => {
            block.enter("unicode layer name");
            features.unicode_name = Some(block.unicode_string()?);
        }
        b"lsct" | b"lsdk" => {
            block.enter("section divider");
            features.divider = match block.u32()? {
                1 | 2 => Some(Divider::Folder),
                3 => Some(Divider::Bounding),
                _ => None,
            };
        }
        b"TySh" => {
            features.has_text = true;
            features.text = read_type_tool(block)?;
        }
        b"vogk" => {
            features.origination = read_origination(block)?;
        }
        k if PLACED_KEYS.contains(&k) => features.placed = true,
        k if ADJUSTMENT_KEYS.contains(&k) => features.adjustment = true,
        k if VECTOR_KEYS.contains(&k) => features.vector = true,
        _ => {}
    }
    Ok(())
}

// ── Text ─────────────────────────────────────────────────────────────────

/// Decode a `TySh` block. `Ok(None)` when the descriptor carries no text.
fn read_type_tool(r: &mut Reader<'_>) -> Result<Option<TextData>, ParseError> {
    r.enter("type tool");
    let _version = r.u16()?;
    r.skip(6 * 8)?; // xx xy yx yy tx ty
    let _text_version = r.u16()?;
    let _descriptor_version = r.u32()?;
    r.enter("text descriptor");
    let descriptor = read_descriptor(r)?;
    Ok(text_from_descriptor(&descriptor))
}

fn text_from_descriptor(d: &Descriptor) -> Option<TextData> {
    let content = d.text("Txt ")?.replace("\r\n", "\n").replace('\r', "\n");
    let style = d.raw("EngineData").map(parse_engine_data).unwrap_or_default();
    let defaults = TextData::default();

    let font_family = style.font_name.unwrap_or(defaults.font_family);
    let bold = style.faux_bold == Some(true) || font_family.contains("Bold");
    let italic = style.faux_italic == Some(true) || font_family.contains("Italic");

    Some(TextData {
        content,
        font_size: style.font_size.unwrap_or(defaults.font_size),
        font_weight: if bold { FontWeight::Bold } else { FontWeight::Normal },
        font_style: if italic { FontStyle::Italic } else { FontStyle::Normal },
        font_family,
        color: style.fill_color.unwrap_or(defaults.color),
        alignment: style
            .justification
            .map(TextAlignment::from_psd_code)
            .unwrap_or_default(),
        line_height: style.leading.filter(|v| *v > 0.0),
        letter_spacing: style.tracking.filter(|v| *v != 0.0),
    })
}

// ── Vector origination ───────────────────────────────────────────────────

fn read_origination(r: &mut Reader<'_>) -> Result<Option<ShapeData>, ParseError> {
    r.enter("vector origination data");
    let _version = r.u32()?;
    let _descriptor_version = r.u32()?;
    let descriptor = read_descriptor(r)?;

    let Some(origin) = descriptor
        .list("keyDescriptorList")
        .and_then(|items| items.first())
        .and_then(|v| v.as_object())
    else {
        return Ok(None);
    };

    let shape_type = match origin.number("keyOriginType").map(|v| v as i64) {
        Some(1) => ShapeType::Rectangle,
        Some(2) => ShapeType::RoundedRectangle,
        Some(5) => ShapeType::Ellipse,
        _ => ShapeType::Path,
    };
    let corner_radius = origin.object("keyOriginRRectRadii").and_then(|radii| {
        ["topLeft", "topRight", "bottomRight", "bottomLeft"]
            .iter()
            .find_map(|k| radii.number(k))
    });

    Ok(Some(ShapeData {
        shape_type,
        corner_radius,
    }))
}

// ── Channel image data ───────────────────────────────────────────────────

fn read_channel_data(r: &mut Reader<'_>, records: &mut [LayerRecord], large: bool, depth: u16) {
    r.enter("channel image data");
    for record in records.iter_mut() {
        let mut planes: Vec<(i16, &[u8])> = Vec::with_capacity(record.channels.len());
        for channel in &record.channels {
            match r.take(channel.length) {
                Ok(bytes) => planes.push((channel.id, bytes)),
                Err(e) => {
                    warn!("Channel image data ends early, pixels unavailable: {}", e);
                    return;
                }
            }
        }
        if depth != 8 || !record.needs_pixels() {
            continue;
        }
        let (Ok(width), Ok(height)) = (u32::try_from(record.width()), u32::try_from(record.height()))
        else {
            continue;
        };
        record.image = decode_rgba(&planes, width, height, large);
        if record.image.is_none() {
            debug!("Layer '{}': pixel data not decodable", record.display_name());
        }
    }
}

/// Assemble an RGBA buffer from decoded R, G, B and optional alpha planes.
fn decode_rgba(planes: &[(i16, &[u8])], width: u32, height: u32, large: bool) -> Option<ImageData> {
    if width == 0 || height == 0 {
        return None;
    }
    let plane = |id: i16| {
        planes
            .iter()
            .find(|(cid, _)| *cid == id)
            .and_then(|(_, data)| decode_channel(data, width as usize, height as usize, large))
    };
    let red = plane(0)?;
    let green = plane(1)?;
    let blue = plane(2)?;
    let alpha = plane(-1);

    let pixels = width as usize * height as usize;
    let mut buffer = Vec::with_capacity(pixels * 4);
    for i in 0..pixels {
        buffer.push(red[i]);
        buffer.push(green[i]);
        buffer.push(blue[i]);
        buffer.push(alpha.as_ref().map_or(255, |a| a[i]));
    }
    Some(ImageData {
        buffer,
        width,
        height,
        format: ImageFormat::Png,
    })
}

/// Decode one 8-bit channel (compression word + body) into `width * height` bytes.
fn decode_channel(data: &[u8], width: usize, height: usize, large: bool) -> Option<Vec<u8>> {
    let mut r = Reader::new(data);
    let compression = r.u16().ok()?;
    let expected = width.checked_mul(height)?;
    match compression {
        0 => r.take(expected).ok().map(<[u8]>::to_vec),
        1 => {
            let mut counts = Vec::with_capacity(height);
            for _ in 0..height {
                let count = if large { r.u32().ok()? as usize } else { usize::from(r.u16().ok()?) };
                counts.push(count);
            }
            let mut out = Vec::with_capacity(expected);
            for count in counts {
                let row = r.take(count).ok()?;
                out.extend(unpack_bits(row, width)?);
            }
            Some(out)
        }
        // ZIP variants are not decoded.
        _ => None,
    }
}

/// PackBits run-length decoding of one row.
pub(crate) fn unpack_bits(src: &[u8], expected: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < src.len() && out.len() < expected {
        let header = src[i] as i8;
        i += 1;
        if header >= 0 {
            let n = header as usize + 1;
            out.extend_from_slice(src.get(i..i + n)?);
            i += n;
        } else if header != -128 {
            let n = 1 - header as isize;
            let value = *src.get(i)?;
            i += 1;
            out.extend(std::iter::repeat(value).take(n as usize));
        }
    }
    if out.len() < expected {
        return None;
    }
    out.truncate(expected);
    Some(out)
}

// ── Group nesting ────────────────────────────────────────────────────────

fn build_tree(records: Vec<LayerRecord>) -> Vec<ParsedLayer> {
    let mut current: Vec<ParsedLayer> = Vec::new();
    let mut parents: Vec<Vec<ParsedLayer>> = Vec::new();

    for record in records {
        match record.features.divider {
            Some(Divider::Bounding) => parents.push(std::mem::take(&mut current)),
            Some(Divider::Folder) => {
                let children = match parents.pop() {
                    Some(parent) => std::mem::replace(&mut current, parent),
                    None => Vec::new(),
                };
                current.push(record.into_layer(Some(children)));
            }
            None => {
                if let Some(err) = &record.features.payload_error {
                    warn!("Skipping layer '{}': {}", record.display_name(), err);
                    continue;
                }
                current.push(record.into_layer(None));
            }
        }
    }

    // Unclosed groups: keep their layers at the enclosing level.
    while let Some(mut parent) = parents.pop() {
        parent.append(&mut current);
        current = parent;
    }
    current
}
