//! Configuration for PSD conversion jobs.
//!
//! Every knob lives in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. Callers set only what they care about and
//! rely on the documented defaults for the rest; [`ConversionConfigBuilder::build`]
//! rejects combinations that cannot work.

use crate::error::Psd2FigmaError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Figma REST API root.
pub const DEFAULT_FIGMA_API_BASE: &str = "https://api.figma.com/v1";

/// Configuration for staging, converting and publishing PSD documents.
///
/// # Example
/// ```rust
/// use psd2figma::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .upload_dir("/var/lib/psd2figma")
///     .max_file_size(50 * 1024 * 1024)
///     .build()
///     .unwrap();
/// assert!(config.export_dir.ends_with("exported"));
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Where staged uploads are copied. Default: `./uploads`.
    pub upload_dir: PathBuf,

    /// Where raster layers are exported as PNG. Default: `<upload_dir>/exported`.
    pub export_dir: PathBuf,

    /// Where the structure publisher writes `figma-structure-<key>.json`.
    /// Default: `upload_dir`.
    pub output_dir: PathBuf,

    /// Largest accepted input in bytes. Default: 100 MiB.
    pub max_file_size: u64,

    /// Personal access token for the REST publisher.
    pub figma_access_token: Option<String>,

    /// Team whose first project receives created files.
    pub figma_team_id: Option<String>,

    /// REST API root. Default: [`DEFAULT_FIGMA_API_BASE`].
    pub figma_api_base: String,

    /// Per-request timeout for the REST publisher in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Interval between status polls in the CLI, in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// How long the CLI waits for a job before giving up polling. Default: 300.
    ///
    /// The job itself keeps running; only the wait is bounded.
    pub poll_timeout_secs: u64,

    /// Jobs untouched for longer than this are dropped by
    /// [`crate::job::JobStore::remove_expired`]. Default: 3600.
    pub job_ttl_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let upload_dir = PathBuf::from("./uploads");
        Self {
            export_dir: upload_dir.join("exported"),
            output_dir: upload_dir.clone(),
            upload_dir,
            max_file_size: 100 * 1024 * 1024,
            figma_access_token: None,
            figma_team_id: None,
            figma_api_base: DEFAULT_FIGMA_API_BASE.to_string(),
            api_timeout_secs: 30,
            poll_interval_ms: 2000,
            poll_timeout_secs: 300,
            job_ttl_secs: 3600,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("upload_dir", &self.upload_dir)
            .field("export_dir", &self.export_dir)
            .field("output_dir", &self.output_dir)
            .field("max_file_size", &self.max_file_size)
            .field(
                "figma_access_token",
                &self.figma_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("figma_team_id", &self.figma_team_id)
            .field("figma_api_base", &self.figma_api_base)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("job_ttl_secs", &self.job_ttl_secs)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
            export_dir_set: false,
            output_dir_set: false,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    /// Both REST credentials are present.
    pub fn has_rest_credentials(&self) -> bool {
        matches!(
            (&self.figma_access_token, &self.figma_team_id),
            (Some(t), Some(id)) if !t.is_empty() && !id.is_empty()
        )
    }
}

/// Builder for [`ConversionConfig`].
///
/// `export_dir` and `output_dir` follow `upload_dir` unless set explicitly.
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
    export_dir_set: bool,
    output_dir_set: bool,
}

impl ConversionConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.export_dir = dir.into();
        self.export_dir_set = true;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self.output_dir_set = true;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn figma_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.figma_access_token = Some(token.into());
        self
    }

    pub fn figma_team_id(mut self, team: impl Into<String>) -> Self {
        self.config.figma_team_id = Some(team.into());
        self
    }

    pub fn figma_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.figma_api_base = base.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.poll_timeout_secs = secs;
        self
    }

    pub fn job_ttl_secs(mut self, secs: u64) -> Self {
        self.config.job_ttl_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ConversionConfig, Psd2FigmaError> {
        if !self.export_dir_set {
            self.config.export_dir = self.config.upload_dir.join("exported");
        }
        if !self.output_dir_set {
            self.config.output_dir = self.config.upload_dir.clone();
        }

        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(Psd2FigmaError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.poll_interval_ms < 50 {
            return Err(Psd2FigmaError::InvalidConfig(format!(
                "poll_interval_ms must be ≥ 50, got {}",
                c.poll_interval_ms
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Psd2FigmaError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !c.figma_api_base.starts_with("http://") && !c.figma_api_base.starts_with("https://") {
            return Err(Psd2FigmaError::InvalidConfig(format!(
                "figma_api_base must be an http(s) URL, got '{}'",
                c.figma_api_base
            )));
        }
        Ok(self.config)
    }
}
