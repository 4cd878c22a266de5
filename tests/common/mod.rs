//! PSD fixture writer for integration tests.
//!
//! Assembles real PSD/PSB byte streams: header, empty colour-mode and
//! image-resource sections, and a layer & mask section with layer records,
//! tagged blocks and per-channel image data. Records are written in file
//! order (bottom-to-top), so groups are `group_open()` … children …
//! `group_close(name)`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Route library logs to the test harness. `RUST_LOG=psd2figma=debug` shows
/// per-layer skip reasons for a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Primitive encoders ───────────────────────────────────────────────────

fn unicode(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().chain(std::iter::once(0)).collect();
    let mut out = (units.len() as u32).to_be_bytes().to_vec();
    for u in units {
        out.extend_from_slice(&u.to_be_bytes());
    }
    out
}

fn key(k: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if k.len() == 4 {
        out.extend_from_slice(&0u32.to_be_bytes());
    } else {
        out.extend_from_slice(&(k.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(k.as_bytes());
    out
}

fn pascal_padded(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let len = bytes.len().min(255);
    let mut out = vec![len as u8];
    out.extend_from_slice(&bytes[..len]);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

// ── Descriptors ──────────────────────────────────────────────────────────

/// One typed descriptor value, already encoded with its OSType.
pub struct Item(Vec<u8>);

pub fn text(s: &str) -> Item {
    let mut b = b"TEXT".to_vec();
    b.extend(unicode(s));
    Item(b)
}

pub fn long(v: i32) -> Item {
    let mut b = b"long".to_vec();
    b.extend_from_slice(&v.to_be_bytes());
    Item(b)
}

pub fn double(v: f64) -> Item {
    let mut b = b"doub".to_vec();
    b.extend_from_slice(&v.to_be_bytes());
    Item(b)
}

pub fn unit_float(unit: &str, v: f64) -> Item {
    let mut b = b"UntF".to_vec();
    b.extend_from_slice(unit.as_bytes());
    b.extend_from_slice(&v.to_be_bytes());
    Item(b)
}

pub fn raw_data(data: &[u8]) -> Item {
    let mut b = b"tdta".to_vec();
    b.extend_from_slice(&(data.len() as u32).to_be_bytes());
    b.extend_from_slice(data);
    Item(b)
}

pub fn object(class_id: &str, items: Vec<(&str, Item)>) -> Item {
    let mut b = b"Objc".to_vec();
    b.extend(descriptor(class_id, items));
    Item(b)
}

pub fn list(values: Vec<Item>) -> Item {
    let mut b = b"VlLs".to_vec();
    b.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for v in values {
        b.extend(v.0);
    }
    Item(b)
}

pub fn descriptor(class_id: &str, items: Vec<(&str, Item)>) -> Vec<u8> {
    let mut b = unicode("");
    b.extend(key(class_id));
    b.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for (k, v) in items {
        b.extend(key(k));
        b.extend(v.0);
    }
    b
}

// ── Tagged block bodies ──────────────────────────────────────────────────

/// Style of the first run of a type layer.
#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font: String,
    pub size: f64,
    /// `[a, r, g, b]` in 0–1.
    pub fill: [f64; 4],
    pub justification: i32,
    pub leading: Option<f64>,
    pub tracking: Option<f64>,
    pub faux_bold: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: "ArialMT".into(),
            size: 24.0,
            fill: [1.0, 0.0, 0.0, 0.0],
            justification: 0,
            leading: None,
            tracking: None,
            faux_bold: false,
        }
    }
}

/// EngineData string literal: UTF-16BE with BOM, parens and backslashes escaped.
fn engine_string(s: &str) -> Vec<u8> {
    let mut raw = vec![0xFE, 0xFF];
    for u in s.encode_utf16() {
        raw.extend_from_slice(&u.to_be_bytes());
    }
    let mut out = b"(".to_vec();
    for b in raw {
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b')');
    out
}

pub fn engine_data(style: &TextStyle) -> Vec<u8> {
    let mut e = Vec::new();
    e.extend_from_slice(b"\n\n<<\n\t/EngineDict\n\t<<\n\t\t/ParagraphRun\n\t\t<<\n\t\t\t/RunArray [\n\t\t\t<<\n\t\t\t\t/ParagraphSheet\n\t\t\t\t<<\n\t\t\t\t\t/Properties\n\t\t\t\t\t<<\n");
    e.extend_from_slice(format!("\t\t\t\t\t\t/Justification {}\n", style.justification).as_bytes());
    e.extend_from_slice(b"\t\t\t\t\t>>\n\t\t\t\t>>\n\t\t\t>>\n\t\t\t]\n\t\t>>\n\t\t/StyleRun\n\t\t<<\n\t\t\t/RunArray [\n\t\t\t<<\n\t\t\t\t/StyleSheet\n\t\t\t\t<<\n\t\t\t\t\t/StyleSheetData\n\t\t\t\t\t<<\n");
    e.extend_from_slice(b"\t\t\t\t\t\t/Font 0\n");
    e.extend_from_slice(format!("\t\t\t\t\t\t/FontSize {:.1}\n", style.size).as_bytes());
    e.extend_from_slice(format!("\t\t\t\t\t\t/FauxBold {}\n", style.faux_bold).as_bytes());
    if let Some(leading) = style.leading {
        e.extend_from_slice(format!("\t\t\t\t\t\t/Leading {:.1}\n", leading).as_bytes());
    }
    if let Some(tracking) = style.tracking {
        e.extend_from_slice(format!("\t\t\t\t\t\t/Tracking {}\n", tracking).as_bytes());
    }
    let [a, r, g, b] = style.fill;
    e.extend_from_slice(
        format!("\t\t\t\t\t\t/FillColor\n\t\t\t\t\t\t<<\n\t\t\t\t\t\t\t/Type 1\n\t\t\t\t\t\t\t/Values [ {a:.5} {r:.5} {g:.5} {b:.5} ]\n\t\t\t\t\t\t>>\n")
            .as_bytes(),
    );
    e.extend_from_slice(b"\t\t\t\t\t>>\n\t\t\t\t>>\n\t\t\t>>\n\t\t\t]\n\t\t>>\n\t>>\n\t/ResourceDict\n\t<<\n\t\t/FontSet [\n\t\t<<\n\t\t\t/Name ");
    e.extend(engine_string(&style.font));
    e.extend_from_slice(b"\n\t\t\t/Type 1\n\t\t>>\n\t\t<<\n\t\t\t/Name ");
    e.extend(engine_string("AdobeInvisFont"));
    e.extend_from_slice(b"\n\t\t>>\n\t\t]\n\t>>\n>>");
    e
}

/// `TySh` body: version, transform, text descriptor.
pub fn type_tool(content: &str, style: &TextStyle) -> Vec<u8> {
    let mut b = 1u16.to_be_bytes().to_vec();
    for v in [1.0f64, 0.0, 0.0, 1.0, 10.0, 40.0] {
        b.extend_from_slice(&v.to_be_bytes());
    }
    b.extend_from_slice(&50u16.to_be_bytes());
    b.extend_from_slice(&16u32.to_be_bytes());
    b.extend(descriptor(
        "TxLr",
        vec![
            ("Txt ", text(&content.replace('\n', "\r"))),
            ("textGridding", long(0)),
            ("EngineData", raw_data(&engine_data(style))),
        ],
    ));
    b
}

/// `TySh` body whose descriptor carries no `Txt ` item.
pub fn type_tool_without_text() -> Vec<u8> {
    let mut b = 1u16.to_be_bytes().to_vec();
    b.extend_from_slice(&[0; 48]);
    b.extend_from_slice(&50u16.to_be_bytes());
    b.extend_from_slice(&16u32.to_be_bytes());
    b.extend(descriptor("TxLr", vec![("textGridding", long(0))]));
    b
}

/// `vogk` body describing a live shape of `origin_type` (1 rect, 2 rounded, 5 ellipse).
pub fn vector_origination(origin_type: i32, radius: Option<f64>) -> Vec<u8> {
    let mut items = vec![("keyOriginType", long(origin_type))];
    if let Some(r) = radius {
        items.push((
            "keyOriginRRectRadii",
            object(
                "radii",
                vec![
                    ("unitValueQuadVersion", long(1)),
                    ("topRight", unit_float("#Pxl", r)),
                    ("topLeft", unit_float("#Pxl", r)),
                    ("bottomLeft", unit_float("#Pxl", r)),
                    ("bottomRight", unit_float("#Pxl", r)),
                ],
            ),
        ));
    }
    let mut b = 1u32.to_be_bytes().to_vec();
    b.extend_from_slice(&16u32.to_be_bytes());
    b.extend(descriptor(
        "null",
        vec![("keyDescriptorList", list(vec![object("null", items)]))],
    ));
    b
}

/// Minimal `vmsk` body: version and flags, no path records.
pub fn vector_mask() -> Vec<u8> {
    let mut b = 3u32.to_be_bytes().to_vec();
    b.extend_from_slice(&0u32.to_be_bytes());
    b
}

/// Section divider body: 1/2 folder, 3 bounding marker.
pub fn section_divider(kind: u32) -> Vec<u8> {
    kind.to_be_bytes().to_vec()
}

pub fn unicode_name(name: &str) -> Vec<u8> {
    unicode(name)
}

// ── Channel data ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Raw,
    Rle,
}

/// PackBits encoding of one row, using repeat runs where possible.
fn pack_bits(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < row.len() {
        let value = row[i];
        let mut run = 1;
        while i + run < row.len() && row[i + run] == value && run < 128 {
            run += 1;
        }
        if run == 1 {
            out.push(0);
        } else {
            out.push((1 - run as i16) as i8 as u8);
        }
        out.push(value);
        i += run;
    }
    out
}

fn encode_plane(plane: &[u8], width: usize, height: usize, compression: Compression, large: bool) -> Vec<u8> {
    match compression {
        Compression::Raw => {
            let mut b = 0u16.to_be_bytes().to_vec();
            b.extend_from_slice(plane);
            b
        }
        Compression::Rle => {
            let rows: Vec<Vec<u8>> = plane.chunks(width.max(1)).take(height).map(pack_bits).collect();
            let mut b = 1u16.to_be_bytes().to_vec();
            for row in &rows {
                if large {
                    b.extend_from_slice(&(row.len() as u32).to_be_bytes());
                } else {
                    b.extend_from_slice(&(row.len() as u16).to_be_bytes());
                }
            }
            for row in rows {
                b.extend(row);
            }
            b
        }
    }
}

// ── Layers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub name: String,
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub blend: [u8; 4],
    pub opacity: u8,
    pub flags: u8,
    pub blocks: Vec<([u8; 4], Vec<u8>)>,
    /// RGBA pixels, `width * height * 4`, plus how to store them.
    pub pixels: Option<(Vec<u8>, Compression, bool)>,
}

impl LayerSpec {
    /// `(left, top, right, bottom)`
    pub fn new(name: &str, bounds: (i32, i32, i32, i32)) -> Self {
        let (left, top, right, bottom) = bounds;
        Self {
            name: name.into(),
            top,
            left,
            bottom,
            right,
            blend: *b"norm",
            opacity: 255,
            flags: 0,
            blocks: Vec::new(),
            pixels: None,
        }
    }

    pub fn block(mut self, key: &[u8; 4], body: Vec<u8>) -> Self {
        self.blocks.push((*key, body));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.flags |= 0x02;
        self
    }

    pub fn opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn blend(mut self, key: &[u8; 4]) -> Self {
        self.blend = *key;
        self
    }

    /// Store RGBA pixels; with `alpha == false` only R, G and B are written.
    pub fn pixels(mut self, rgba: Vec<u8>, compression: Compression, alpha: bool) -> Self {
        self.pixels = Some((rgba, compression, alpha));
        self
    }

    fn width(&self) -> usize {
        (self.right - self.left).max(0) as usize
    }

    fn height(&self) -> usize {
        (self.bottom - self.top).max(0) as usize
    }

    /// Encoded `(channel id, body)` pairs.
    fn channels(&self, large: bool) -> Vec<(i16, Vec<u8>)> {
        let Some((rgba, compression, alpha)) = &self.pixels else {
            return Vec::new();
        };
        let (w, h) = (self.width(), self.height());
        let plane = |offset: usize| -> Vec<u8> { rgba.iter().skip(offset).step_by(4).copied().collect() };
        let mut ids: Vec<(i16, usize)> = Vec::new();
        if *alpha {
            ids.push((-1, 3));
        }
        ids.extend([(0, 0), (1, 1), (2, 2)]);
        ids.into_iter()
            .map(|(id, offset)| (id, encode_plane(&plane(offset), w, h, *compression, large)))
            .collect()
    }

    fn record(&self, large: bool, channels: &[(i16, Vec<u8>)]) -> Vec<u8> {
        let mut b = Vec::new();
        for v in [self.top, self.left, self.bottom, self.right] {
            b.extend_from_slice(&v.to_be_bytes());
        }
        b.extend_from_slice(&(channels.len() as u16).to_be_bytes());
        for (id, body) in channels {
            b.extend_from_slice(&id.to_be_bytes());
            if large {
                b.extend_from_slice(&(body.len() as u64).to_be_bytes());
            } else {
                b.extend_from_slice(&(body.len() as u32).to_be_bytes());
            }
        }
        b.extend_from_slice(b"8BIM");
        b.extend_from_slice(&self.blend);
        b.push(self.opacity);
        b.push(0);
        b.push(self.flags);
        b.push(0);

        let mut extra = Vec::new();
        extra.extend_from_slice(&0u32.to_be_bytes());
        extra.extend_from_slice(&0u32.to_be_bytes());
        extra.extend(pascal_padded(&self.name));
        for (k, body) in &self.blocks {
            extra.extend_from_slice(b"8BIM");
            extra.extend_from_slice(k);
            extra.extend_from_slice(&(body.len() as u32).to_be_bytes());
            extra.extend_from_slice(body);
        }
        b.extend_from_slice(&(extra.len() as u32).to_be_bytes());
        b.extend(extra);
        b
    }
}

// ── Layer shortcuts ──────────────────────────────────────────────────────

pub fn text_layer(name: &str, bounds: (i32, i32, i32, i32), content: &str, style: &TextStyle) -> LayerSpec {
    LayerSpec::new(name, bounds).block(b"TySh", type_tool(content, style))
}

pub fn shape_layer(name: &str, bounds: (i32, i32, i32, i32), origin_type: i32, radius: Option<f64>) -> LayerSpec {
    LayerSpec::new(name, bounds)
        .block(b"vmsk", vector_mask())
        .block(b"vogk", vector_origination(origin_type, radius))
}

pub fn adjustment_layer(name: &str, key: &[u8; 4]) -> LayerSpec {
    LayerSpec::new(name, (0, 0, 0, 0)).block(key, vec![0, 1, 0, 0])
}

/// Solid-colour raster layer.
pub fn image_layer(name: &str, bounds: (i32, i32, i32, i32), rgba: [u8; 4], compression: Compression) -> LayerSpec {
    let layer = LayerSpec::new(name, bounds);
    let count = layer.width() * layer.height();
    let pixels = rgba.iter().copied().cycle().take(count * 4).collect();
    layer.pixels(pixels, compression, true)
}

/// Hidden bounding-section marker that opens a group.
pub fn group_open() -> LayerSpec {
    LayerSpec::new("</Layer group>", (0, 0, 0, 0)).block(b"lsct", section_divider(3))
}

/// Folder record that closes a group and names it.
pub fn group_close(name: &str) -> LayerSpec {
    LayerSpec::new(name, (0, 0, 0, 0))
        .blend(b"pass")
        .block(b"lsct", section_divider(1))
        .block(b"luni", unicode_name(name))
}

// ── Documents ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PsdBuilder {
    pub width: u32,
    pub height: u32,
    pub depth: u16,
    pub large: bool,
    pub layers: Vec<LayerSpec>,
}

impl PsdBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 8,
            large: false,
            layers: Vec::new(),
        }
    }

    /// Write a PSB (version 2) instead of a PSD.
    pub fn large(mut self) -> Self {
        self.large = true;
        self
    }

    pub fn depth(mut self, depth: u16) -> Self {
        self.depth = depth;
        self
    }

    pub fn layer(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }

    fn length(&self, out: &mut Vec<u8>, len: usize) {
        if self.large {
            out.extend_from_slice(&(len as u64).to_be_bytes());
        } else {
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"8BPS");
        out.extend_from_slice(&(if self.large { 2u16 } else { 1u16 }).to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.depth.to_be_bytes());
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // colour mode data
        out.extend_from_slice(&0u32.to_be_bytes()); // image resources

        let mut info = Vec::new();
        if !self.layers.is_empty() {
            info.extend_from_slice(&(self.layers.len() as i16).to_be_bytes());
            let channels: Vec<Vec<(i16, Vec<u8>)>> =
                self.layers.iter().map(|l| l.channels(self.large)).collect();
            for (layer, ch) in self.layers.iter().zip(&channels) {
                info.extend(layer.record(self.large, ch));
            }
            for ch in &channels {
                for (_, body) in ch {
                    info.extend_from_slice(body);
                }
            }
            if info.len() % 2 == 1 {
                info.push(0);
            }
        }

        let mut section = Vec::new();
        self.length(&mut section, info.len());
        section.extend(info);
        section.extend_from_slice(&0u32.to_be_bytes()); // global layer mask

        self.length(&mut out, section.len());
        out.extend(section);
        out.extend_from_slice(&0u16.to_be_bytes()); // merged image: raw, empty
        out
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).expect("write fixture");
        path
    }
}
