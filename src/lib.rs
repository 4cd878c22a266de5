//! # psd2figma
//!
//! Convert layered Photoshop documents (PSD/PSB) into Figma-style scene
//! graphs and publish them as design files.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PSD
//!  │
//!  ├─ 1. Stage     validate and copy the upload
//!  ├─ 2. Parse     header + layer records + tagged blocks (CPU-bound, spawn_blocking)
//!  ├─ 3. Convert   layer tree → scene nodes, rasters → PNG, unsupported → flattened
//!  ├─ 4. Publish   structure file on disk, or a file via the Figma REST API
//!  └─ 5. Report    layer counts, flattened features, warnings, timing
//! ```
//!
//! Jobs move `pending → parsing → converting → publishing → completed`
//! (or `failed` from any non-terminal state) and are tracked in an in-memory
//! [`JobStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use psd2figma::{ConversionConfig, JobStore, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().upload_dir("./uploads").build()?;
//!     let orchestrator = Arc::new(Orchestrator::from_config(Arc::new(JobStore::new()), config)?);
//!     let job = orchestrator.submit("landing.psd".as_ref()).await?;
//!     let view = orchestrator.process_job(job.id).await?;
//!     println!("{}: {}", view.status, view.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `psd2figma` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! psd2figma = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod scene;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert_file, convert_sync, convert_to_file, inspect};
pub use document::{LayerKind, ParsedDocument, ParsedLayer};
pub use error::{ExportError, LayerConversionError, ParseError, Psd2FigmaError, PublishError};
pub use job::{ConversionError, ConversionJob, ConversionResult, JobStatus, JobStatusView, JobStore};
pub use orchestrator::Orchestrator;
pub use pipeline::transform::{ConversionMetrics, ConversionOutput, UnsupportedFeature};
pub use publish::{FigmaRestPublisher, PublishedArtifact, Publisher, StructurePublisher};
pub use report::{build_report, format_report, ConversionReport};
pub use scene::{SceneNode, SceneNodeKind};
