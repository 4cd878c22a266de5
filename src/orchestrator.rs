//! Job orchestration: drive one job through parse → convert → publish.
//!
//! ## Concurrency model
//!
//! One tokio task per job, stages strictly sequential inside it. Parsing and
//! conversion are CPU-bound and run on the blocking pool via
//! `spawn_blocking`; file I/O and publishing are async. Jobs share nothing
//! but the [`JobStore`], whose per-entry locking makes each status move
//! atomic.
//!
//! A failing stage is never retried. Its error is recorded on the job as a
//! [`crate::job::ConversionError`] and the job ends `failed`. Either way the staged
//! upload is deleted afterwards on a best-effort basis.

use crate::config::ConversionConfig;
use crate::error::{ParseError, Psd2FigmaError};
use crate::job::{ConversionJob, ConversionResult, JobStatus, JobStatusView, JobStore};
use crate::pipeline::export::{PngExporter, RasterExporter};
use crate::pipeline::{input, psd, transform};
use crate::publish::{publisher_from_config, Publisher};
use crate::report::build_report;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    store: Arc<JobStore>,
    publisher: Arc<dyn Publisher>,
    exporter: Arc<dyn RasterExporter>,
    config: ConversionConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        publisher: Arc<dyn Publisher>,
        exporter: Arc<dyn RasterExporter>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            exporter,
            config,
        }
    }

    /// Wire the default collaborators: a [`PngExporter`] on `export_dir` and
    /// whichever publisher the credentials select.
    pub fn from_config(store: Arc<JobStore>, config: ConversionConfig) -> Result<Self, Psd2FigmaError> {
        let publisher = publisher_from_config(&config)?;
        let exporter: Arc<dyn RasterExporter> = Arc::new(PngExporter::new(&config.export_dir));
        Ok(Self::new(store, publisher, exporter, config))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Stage `path` into the upload directory and register a `pending` job for it.
    pub async fn submit(&self, path: &Path) -> Result<ConversionJob, Psd2FigmaError> {
        let staged = input::stage_upload(path, &self.config).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.store.create_job(file_name, staged))
    }

    /// Move a `pending` job to `parsing` and run the rest of it in the background.
    ///
    /// Returns as soon as the task is spawned. The handle carries no outcome;
    /// poll [`Orchestrator::job_status`] for that.
    pub fn start_job(self: &Arc<Self>, id: Uuid) -> Result<JoinHandle<()>, Psd2FigmaError> {
        self.store.update_status(id, JobStatus::Parsing)?;
        info!("Started job {}", id);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run(id).await }))
    }

    /// Same pipeline as [`Orchestrator::start_job`], awaited inline.
    ///
    /// Errors only when the job cannot be started; stage failures are
    /// recorded on the job and visible in the returned view.
    pub async fn process_job(&self, id: Uuid) -> Result<JobStatusView, Psd2FigmaError> {
        self.store.update_status(id, JobStatus::Parsing)?;
        info!("Processing job {}", id);
        self.run(id).await;
        self.job_status(id)
    }

    pub fn job_status(&self, id: Uuid) -> Result<JobStatusView, Psd2FigmaError> {
        self.store
            .get_job(id)
            .map(|job| JobStatusView::from(&job))
            .ok_or(Psd2FigmaError::JobNotFound { id })
    }

    /// Final result of a finished job.
    ///
    /// Failed jobs yield `success: false`, the recorded error and an empty report.
    pub fn fetch_result(&self, id: Uuid) -> Result<ConversionResult, Psd2FigmaError> {
        let job = self.store.get_job(id).ok_or(Psd2FigmaError::JobNotFound { id })?;
        match job.status {
            JobStatus::Completed => job.result.ok_or_else(|| {
                Psd2FigmaError::Internal(format!("job {id} completed without a result"))
            }),
            JobStatus::Failed => Ok(match job.result {
                Some(result) if job.error.is_none() => result,
                _ => ConversionResult::failure(job.error),
            }),
            status => Err(Psd2FigmaError::InvalidState {
                id,
                status,
                action: "fetching the result",
                expected: "completed or failed",
            }),
        }
    }

    /// Drop jobs older than `job_ttl_secs`.
    pub fn purge_expired(&self) -> usize {
        self.store.remove_expired(self.config.job_ttl())
    }

    async fn run(&self, id: Uuid) {
        let Some(job) = self.store.get_job(id) else {
            error!("Job {} vanished before it could run", id);
            return;
        };
        let started = Instant::now();

        match self.execute(&job, started).await {
            Ok(result) => {
                if let Err(e) = self.store.attach_result(id, result) {
                    error!("Job {}: could not record result: {}", id, e);
                } else {
                    info!("Job {} completed in {}ms", id, started.elapsed().as_millis());
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", id, e);
                if let Err(store_err) = self.store.attach_error(id, e.to_conversion_error()) {
                    error!("Job {}: could not record failure: {}", id, store_err);
                }
            }
        }

        cleanup_upload(&job.file_path).await;
    }

    async fn execute(&self, job: &ConversionJob, started: Instant) -> Result<ConversionResult, Psd2FigmaError> {
        let id = job.id;

        // ── Parse ────────────────────────────────────────────────────────
        let bytes = tokio::fs::read(&job.file_path)
            .await
            .map_err(|source| ParseError::Unreadable {
                path: job.file_path.clone(),
                source,
            })?;
        debug!("Job {}: read {} bytes", id, bytes.len());
        let file_name = job.file_name.clone();
        let doc = tokio::task::spawn_blocking(move || psd::parse_document(&bytes, &file_name))
            .await
            .map_err(|e| Psd2FigmaError::Internal(format!("Parse task panicked: {}", e)))??;
        let doc = Arc::new(doc);
        self.store.attach_parsed_data(id, Arc::clone(&doc))?;

        // ── Convert ──────────────────────────────────────────────────────
        self.store.update_status(id, JobStatus::Converting)?;
        let exporter = Arc::clone(&self.exporter);
        let source = Arc::clone(&doc);
        let output = tokio::task::spawn_blocking(move || transform::convert_document(&source, exporter.as_ref()))
            .await
            .map_err(|e| Psd2FigmaError::Internal(format!("Convert task panicked: {}", e)))?;

        // ── Publish ──────────────────────────────────────────────────────
        self.store.update_status(id, JobStatus::Publishing)?;
        let artifact = self.publisher.publish(&doc.name, &output.nodes).await?;
        info!("Job {}: published {}", id, artifact.artifact_url);

        let report = build_report(&output.metrics, started.elapsed().as_millis() as u64);
        Ok(ConversionResult {
            success: true,
            artifact_url: Some(artifact.artifact_url),
            artifact_key: Some(artifact.artifact_id),
            root_node_id: artifact.root_node_id,
            report,
            error: None,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("jobs", &self.store.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn cleanup_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed upload {}", path.display()),
        Err(e) => warn!("Could not remove upload {}: {}", path.display(), e),
    }
}
