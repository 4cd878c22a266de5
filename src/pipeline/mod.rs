//! Pipeline stages for PSD-to-scene conversion.
//!
//! Each submodule implements one transformation step and is testable on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ psd ──▶ transform ──▶ (publish)
//! (stage)   (parse)  (scene tree)
//!                      │
//!                      └──▶ export (PNG per raster layer)
//! ```
//!
//! 1. [`input`]    : validate a user-supplied file and copy it into `upload_dir`
//! 2. [`psd`]      : decode the PSD/PSB byte stream into a [`crate::document::ParsedDocument`];
//!    pure and CPU-bound, so callers run it in `spawn_blocking`
//! 3. [`transform`]: map the layer tree to [`crate::scene::SceneNode`]s, flattening
//!    what cannot be expressed and counting every decision
//! 4. [`export`]   : write raster layer pixels as PNG; called from `transform`

pub mod export;
pub mod input;
pub mod psd;
pub mod transform;
