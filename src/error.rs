//! Error types for the psd2figma library.
//!
//! Errors fall into two groups that reflect two failure scopes:
//!
//! * **Fatal**: [`Psd2FigmaError`] and the stage errors it wraps
//!   ([`ParseError`], [`PublishError`]). A job that hits one of these ends in
//!   the `failed` state; a request that hits one (unknown job id, wrong state)
//!   is rejected.
//!
//! * **Local**: [`LayerConversionError`] and [`ExportError`]. These are
//!   scoped to a single layer. The converter catches them, records a warning
//!   or an unsupported-feature entry in the metrics, and carries on with the
//!   sibling layers. They never escape [`crate::pipeline::transform`].

use crate::job::{ConversionError, JobStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the psd2figma library.
#[derive(Debug, Error)]
pub enum Psd2FigmaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PSD file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input exists but is not acceptable (wrong extension, unreadable).
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// The input exceeds the configured upload limit.
    #[error("File '{path}' is {size} bytes, which exceeds the {max} byte limit")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// The source document could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The publish collaborator failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    // ── Request errors ────────────────────────────────────────────────────
    /// The caller referenced a job id the store does not know.
    #[error("Job not found: {id}")]
    JobNotFound { id: Uuid },

    /// The caller asked for something the job's current state does not allow.
    #[error("Job {id} is {status}; {action} requires {expected}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        action: &'static str,
        expected: &'static str,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (I/O outside a stage, panicked task).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fallback shown to users when nothing more specific is known.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred during conversion";

static RE_PERMISSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)permission denied|access is denied").unwrap());
static RE_MISSING_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)no such file|not found|cannot find").unwrap());
static RE_OUT_OF_MEMORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)out of memory|memory allocation|capacity overflow").unwrap());
static RE_PANICKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)panicked|task .* cancelled").unwrap());

impl Psd2FigmaError {
    /// Stable machine-readable code recorded on failed jobs.
    pub fn code(&self) -> &'static str {
        match self {
            Psd2FigmaError::Parse(_) => "PARSE_FAILED",
            Psd2FigmaError::Publish(_) => "PUBLISH_FAILED",
            Psd2FigmaError::JobNotFound { .. } => "JOB_NOT_FOUND",
            Psd2FigmaError::InvalidState { .. } => "INVALID_STATE",
            Psd2FigmaError::FileNotFound { .. }
            | Psd2FigmaError::InvalidInput { .. }
            | Psd2FigmaError::FileTooLarge { .. } => "INVALID_INPUT",
            Psd2FigmaError::InvalidConfig(_) | Psd2FigmaError::Internal(_) => "CONVERSION_FAILED",
        }
    }

    /// Human-readable message safe to show to an end user.
    ///
    /// Raw internal messages are matched against known patterns; anything
    /// unrecognised becomes [`GENERIC_FAILURE_MESSAGE`] so a stack trace or
    /// debug dump is never the only thing a user sees.
    pub fn user_message(&self) -> String {
        match self {
            Psd2FigmaError::FileNotFound { .. } => {
                "The uploaded file could not be found. Please upload it again.".to_string()
            }
            Psd2FigmaError::InvalidInput { reason, .. } => format!("The file was rejected: {reason}."),
            Psd2FigmaError::FileTooLarge { max, .. } => format!(
                "The file is too large. The maximum size is {} MB.",
                max / (1024 * 1024)
            ),
            Psd2FigmaError::Parse(e) => e.user_message(),
            Psd2FigmaError::Publish(e) => e.user_message(),
            Psd2FigmaError::JobNotFound { .. } => {
                "This conversion job no longer exists. Please start a new conversion.".to_string()
            }
            Psd2FigmaError::InvalidState { status, .. } => {
                format!("This conversion is already {status}.")
            }
            Psd2FigmaError::InvalidConfig(_) => {
                "The converter is not configured correctly. Please contact support.".to_string()
            }
            Psd2FigmaError::Internal(msg) => friendly_internal_message(msg),
        }
    }

    /// Build the structured error recorded on a failed job.
    pub fn to_conversion_error(&self) -> ConversionError {
        ConversionError {
            code: self.code().to_string(),
            message: self.user_message(),
            details: Some(self.to_string()),
        }
    }
}

fn friendly_internal_message(raw: &str) -> String {
    let msg = if RE_PERMISSION.is_match(raw) {
        "The converter does not have permission to read or write a working file."
    } else if RE_MISSING_FILE.is_match(raw) {
        "A working file disappeared during conversion. Please try again."
    } else if RE_OUT_OF_MEMORY.is_match(raw) {
        "The document is too large to convert with the available memory."
    } else if RE_PANICKED.is_match(raw) {
        "The converter stopped unexpectedly while processing this document."
    } else {
        GENERIC_FAILURE_MESSAGE
    };
    msg.to_string()
}

/// Failure to decode a PSD/PSB byte stream. Fatal to the job.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The first four bytes are not the `8BPS` signature.
    #[error("Not a PSD document: expected signature '8BPS', found {magic:?}")]
    NotAPsd { magic: [u8; 4] },

    /// Version is neither 1 (PSD) nor 2 (PSB).
    #[error("Unsupported PSD version {0}")]
    UnsupportedVersion(u16),

    /// A section ended before a required field could be read.
    #[error("Truncated PSD: needed {needed} bytes for {context} at offset {offset}")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
    },

    /// A structural field holds an impossible value.
    #[error("Malformed PSD: {0}")]
    Malformed(String),

    /// The source file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    fn user_message(&self) -> String {
        match self {
            ParseError::NotAPsd { .. } | ParseError::UnsupportedVersion(_) => {
                "The file is not a Photoshop document this converter can read.".to_string()
            }
            ParseError::Truncated { .. } | ParseError::Malformed(_) => {
                "The Photoshop document appears to be damaged or incomplete.".to_string()
            }
            ParseError::Unreadable { .. } => {
                "The uploaded file could not be read. Please upload it again.".to_string()
            }
        }
    }
}

/// Failure of the publish collaborator. Fatal to the job; never retried.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Network-level failure (DNS, TLS, timeout, connection reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The target rejected the credentials (HTTP 401/403).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The target resource (team, project) does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Writing the generated artifact failed.
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scene could not be serialised.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    fn user_message(&self) -> String {
        match self {
            PublishError::Transport(_) => {
                "Could not reach the design service. Check your connection and try again.".to_string()
            }
            PublishError::Auth(_) => {
                "The design service rejected the access token. Check FIGMA_ACCESS_TOKEN.".to_string()
            }
            PublishError::NotFound(_) => {
                "The design team or project could not be found. Check FIGMA_TEAM_ID.".to_string()
            }
            PublishError::Api { .. } => "The design service returned an error.".to_string(),
            PublishError::Io { .. } | PublishError::Serialization(_) => {
                "The output file could not be written.".to_string()
            }
        }
    }
}

/// A single layer could not be converted. Recovered inside the converter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayerConversionError {
    /// Bounds are non-finite or inverted.
    #[error("Layer '{layer}': invalid bounds ({left}, {top}, {right}, {bottom})")]
    InvalidBounds {
        layer: String,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
    },

    /// Opacity is outside `[0, 1]` or not a number.
    #[error("Layer '{layer}': invalid opacity {opacity}")]
    InvalidOpacity { layer: String, opacity: f64 },

    /// Text payload carries a font size that cannot be rendered.
    #[error("Layer '{layer}': invalid font size {size}")]
    InvalidFontSize { layer: String, size: f64 },
}

/// Raster export failed. Recovered inside the converter (placeholder instead).
#[derive(Debug, Error)]
pub enum ExportError {
    /// Pixel buffer length does not match `width * height * 4`.
    #[error("Pixel buffer for '{layer}' has {actual} bytes, expected {expected}")]
    BufferSize {
        layer: String,
        expected: usize,
        actual: usize,
    },

    /// Directory creation or file write failed.
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_names_signature() {
        let e = ParseError::NotAPsd { magic: *b"%PDF" };
        assert!(e.to_string().contains("8BPS"), "got: {e}");
    }

    #[test]
    fn truncated_display_mentions_offset() {
        let e = ParseError::Truncated {
            context: "layer record",
            offset: 120,
            needed: 4,
        };
        let msg = e.to_string();
        assert!(msg.contains("layer record"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn codes_follow_stage() {
        let parse: Psd2FigmaError = ParseError::UnsupportedVersion(7).into();
        assert_eq!(parse.code(), "PARSE_FAILED");
        let publish: Psd2FigmaError = PublishError::Auth("bad token".into()).into();
        assert_eq!(publish.code(), "PUBLISH_FAILED");
        assert_eq!(Psd2FigmaError::Internal("x".into()).code(), "CONVERSION_FAILED");
    }

    #[test]
    fn internal_messages_never_leak_raw_text() {
        let e = Psd2FigmaError::Internal("thread 'main' at src/foo.rs:12:5 weird state 0x7f".into());
        assert_eq!(e.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn internal_messages_match_known_patterns() {
        let e = Psd2FigmaError::Internal("Permission denied (os error 13)".into());
        assert!(e.user_message().contains("permission"));

        let e = Psd2FigmaError::Internal("Parse task panicked: index out of bounds".into());
        assert!(e.user_message().contains("stopped unexpectedly"));
    }

    #[test]
    fn conversion_error_keeps_raw_details() {
        let e: Psd2FigmaError = PublishError::NotFound("team 42".into()).into();
        let record = e.to_conversion_error();
        assert_eq!(record.code, "PUBLISH_FAILED");
        assert!(record.message.contains("FIGMA_TEAM_ID"));
        assert!(record.details.unwrap_or_default().contains("team 42"));
    }

    #[test]
    fn invalid_state_display() {
        let e = Psd2FigmaError::InvalidState {
            id: Uuid::nil(),
            status: JobStatus::Converting,
            action: "fetching the result",
            expected: "completed or failed",
        };
        let msg = e.to_string();
        assert!(msg.contains("converting"), "got: {msg}");
        assert!(msg.contains("completed or failed"));
    }
}
