//! Conversion jobs and the in-memory store that tracks them.
//!
//! A job moves strictly forward through
//!
//! ```text
//! pending → parsing → converting → publishing → completed
//!     └─────────┴──────────┴────────────┴──────→ failed
//! ```
//!
//! and [`JobStatus::can_transition_to`] is the single source of truth for
//! which moves are legal. The store applies every mutation inside one
//! `DashMap` entry lock, so a check-then-set such as "start only if pending"
//! is atomic with respect to other tasks touching the same job.

use crate::document::ParsedDocument;
use crate::error::Psd2FigmaError;
use crate::report::ConversionReport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

// ── Status ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Parsing,
    Converting,
    Publishing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn allowed_transitions(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Pending => &[Parsing, Failed],
            Parsing => &[Converting, Failed],
            Converting => &[Publishing, Failed],
            Publishing => &[Completed, Failed],
            Completed | Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Parsing => "parsing",
            JobStatus::Converting => "converting",
            JobStatus::Publishing => "publishing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// User-facing progress message.
    pub fn message(self) -> &'static str {
        match self {
            JobStatus::Pending => "Job is pending",
            JobStatus::Parsing => "Parsing…",
            JobStatus::Converting => "Converting…",
            JobStatus::Publishing => "Creating output file…",
            JobStatus::Completed => "Conversion completed successfully",
            JobStatus::Failed => "Conversion failed",
        }
    }

    /// What a job must currently be for a move into `self` to be legal.
    fn required_predecessor(self) -> &'static str {
        match self {
            JobStatus::Pending => "a new job",
            JobStatus::Parsing => "pending",
            JobStatus::Converting => "parsing",
            JobStatus::Publishing => "converting",
            JobStatus::Completed => "publishing",
            JobStatus::Failed => "not yet finished",
        }
    }

    fn entering(self) -> &'static str {
        match self {
            JobStatus::Pending => "entering pending",
            JobStatus::Parsing => "entering parsing",
            JobStatus::Converting => "entering converting",
            JobStatus::Publishing => "entering publishing",
            JobStatus::Completed => "entering completed",
            JobStatus::Failed => "entering failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "parsing" => Ok(JobStatus::Parsing),
            "converting" => Ok(JobStatus::Converting),
            "publishing" => Ok(JobStatus::Publishing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Progress message for a raw status string, as read back from serialised jobs.
pub fn status_message(raw: &str) -> &'static str {
    raw.parse::<JobStatus>()
        .map(JobStatus::message)
        .unwrap_or("Unknown status")
}

// ── Records ──────────────────────────────────────────────────────────────

/// Structured error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionError {
    pub code: String,
    /// Always safe to show to an end user.
    pub message: String,
    /// Raw diagnostic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
    pub report: ConversionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionError>,
}

impl ConversionResult {
    /// Result projected for a failed job: no artifact, empty report.
    pub fn failure(error: Option<ConversionError>) -> Self {
        Self {
            success: false,
            artifact_url: None,
            artifact_key: None,
            root_node_id: None,
            report: ConversionReport::default(),
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub file_name: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Kept in memory only; large pixel buffers never go over the wire.
    #[serde(skip)]
    pub parsed_data: Option<Arc<ParsedDocument>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionError>,
}

/// What a status poll returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionError>,
}

impl From<&ConversionJob> for JobStatusView {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            message: job.status.message().to_string(),
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Process-wide job registry. Share it as `Arc<JobStore>`.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<Uuid, ConversionJob>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` job and return a snapshot of it.
    pub fn create_job(&self, file_name: impl Into<String>, file_path: impl Into<PathBuf>) -> ConversionJob {
        let now = Utc::now();
        let job = ConversionJob {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            file_name: file_name.into(),
            file_path: file_path.into(),
            created_at: now,
            updated_at: now,
            parsed_data: None,
            result: None,
            error: None,
        };
        debug!("Created job {} for '{}'", job.id, job.file_name);
        self.jobs.insert(job.id, job.clone());
        job
    }

    /// Snapshot of a job.
    pub fn get_job(&self, id: Uuid) -> Option<ConversionJob> {
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    pub fn update_status(&self, id: Uuid, status: JobStatus) -> Result<(), Psd2FigmaError> {
        self.with_job(id, |job| transition(job, status))
    }

    pub fn attach_parsed_data(&self, id: Uuid, doc: Arc<ParsedDocument>) -> Result<(), Psd2FigmaError> {
        self.with_job(id, |job| {
            job.parsed_data = Some(doc);
            Ok(())
        })
    }

    /// Store the final result; the job becomes `completed` or `failed` to match.
    pub fn attach_result(&self, id: Uuid, result: ConversionResult) -> Result<(), Psd2FigmaError> {
        self.with_job(id, |job| {
            let next = if result.success {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            transition(job, next)?;
            job.result = Some(result);
            Ok(())
        })
    }

    /// Record a failure; the job becomes `failed`.
    pub fn attach_error(&self, id: Uuid, error: ConversionError) -> Result<(), Psd2FigmaError> {
        self.with_job(id, |job| {
            transition(job, JobStatus::Failed)?;
            job.error = Some(error);
            Ok(())
        })
    }

    pub fn delete_job(&self, id: Uuid) -> Option<ConversionJob> {
        self.jobs.remove(&id).map(|(_, job)| job)
    }

    /// Drop jobs not updated within `max_age`. Returns how many were removed.
    pub fn remove_expired(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.updated_at >= cutoff);
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            debug!("Removed {} expired jobs", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run `f` under the entry lock and bump `updated_at` on success.
    fn with_job<F>(&self, id: Uuid, f: F) -> Result<(), Psd2FigmaError>
    where
        F: FnOnce(&mut ConversionJob) -> Result<(), Psd2FigmaError>,
    {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or(Psd2FigmaError::JobNotFound { id })?;
        f(&mut entry)?;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

fn transition(job: &mut ConversionJob, next: JobStatus) -> Result<(), Psd2FigmaError> {
    if !job.status.can_transition_to(next) {
        return Err(Psd2FigmaError::InvalidState {
            id: job.id,
            status: job.status,
            action: next.entering(),
            expected: next.required_predecessor(),
        });
    }
    debug!("Job {}: {} → {}", job.id, job.status, next);
    job.status = next;
    Ok(())
}
