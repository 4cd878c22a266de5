//! CLI binary for psd2figma.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, runs one job per input and prints the reports.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use psd2figma::document::ParsedLayer;
use psd2figma::{
    build_report, convert_file, format_report, inspect, ConversionConfig, ConversionResult, JobStatus,
    JobStore, Orchestrator,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Inputs copied into the upload directory at once.
const STAGING_CONCURRENCY: usize = 4;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert and write a structure file next to the uploads
  psd2figma landing.psd

  # Several documents at once, JSON results on stdout
  psd2figma --json hero.psd footer.psb > results.json

  # Create real files in the first project of a Figma team
  FIGMA_ACCESS_TOKEN=figd_... FIGMA_TEAM_ID=1234 psd2figma landing.psd

  # Show the layer tree only (no job, nothing published)
  psd2figma --inspect-only landing.psd

  # Print the converted scene tree without publishing
  psd2figma --scene-only landing.psd > scene.json

PUBLISHERS:
  With both FIGMA_ACCESS_TOKEN and FIGMA_TEAM_ID set, each document becomes an
  empty file named after it in the team's first project. Otherwise a
  Figma-style document is written to <output-dir>/figma-structure-<key>.json.

ENVIRONMENT VARIABLES:
  FIGMA_ACCESS_TOKEN        Personal access token for the REST API
  FIGMA_TEAM_ID             Team whose first project receives new files
  FIGMA_API_BASE            REST API root (default https://api.figma.com/v1)
  PSD2FIGMA_UPLOAD_DIR      Staging directory for uploads (default ./uploads)
  PSD2FIGMA_EXPORT_DIR      PNG directory (default <upload-dir>/exported)
  PSD2FIGMA_OUTPUT_DIR      Structure file directory (default <upload-dir>)
  RUST_LOG                  Overrides the log filter
"#;

/// Convert Photoshop documents into Figma-style scene graphs.
#[derive(Parser, Debug)]
#[command(
    name = "psd2figma",
    version,
    about = "Convert Photoshop documents into Figma-style scene graphs",
    long_about = "Convert layered PSD/PSB documents into Figma-style scene graphs. Text, \
shape, group and raster layers are mapped to editable nodes; everything else is flattened \
into placeholders and listed in the conversion report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// One or more .psd/.psb files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Staging directory for uploaded files.
    #[arg(long, env = "PSD2FIGMA_UPLOAD_DIR", default_value = "./uploads")]
    upload_dir: PathBuf,

    /// Directory for exported PNG layers.
    #[arg(long, env = "PSD2FIGMA_EXPORT_DIR")]
    export_dir: Option<PathBuf>,

    /// Directory for structure files.
    #[arg(long, env = "PSD2FIGMA_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Largest accepted input in bytes.
    #[arg(long, env = "PSD2FIGMA_MAX_FILE_SIZE", default_value_t = 100 * 1024 * 1024)]
    max_file_size: u64,

    /// Figma personal access token.
    #[arg(long, env = "FIGMA_ACCESS_TOKEN", hide_env_values = true)]
    figma_token: Option<String>,

    /// Figma team id.
    #[arg(long, env = "FIGMA_TEAM_ID")]
    figma_team: Option<String>,

    /// Figma REST API root.
    #[arg(long, env = "FIGMA_API_BASE", default_value = psd2figma::config::DEFAULT_FIGMA_API_BASE)]
    figma_api_base: String,

    /// Per-request REST timeout in seconds.
    #[arg(long, env = "PSD2FIGMA_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Status poll interval in milliseconds.
    #[arg(long, env = "PSD2FIGMA_POLL_INTERVAL", default_value_t = 2000)]
    poll_interval: u64,

    /// Stop waiting for jobs after this many seconds.
    #[arg(long, env = "PSD2FIGMA_POLL_TIMEOUT", default_value_t = 300)]
    poll_timeout: u64,

    /// Output structured JSON instead of text reports.
    #[arg(long, env = "PSD2FIGMA_JSON")]
    json: bool,

    /// Print the parsed layer tree only, no conversion.
    #[arg(long, conflicts_with = "scene_only")]
    inspect_only: bool,

    /// Convert and print the scene tree as JSON without publishing.
    #[arg(long)]
    scene_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PSD2FIGMA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PSD2FIGMA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PSD2FIGMA_QUIET")]
    quiet: bool,
}

/// One line of `--json` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobOutcome {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ConversionResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries progress; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only && !cli.scene_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in &cli.inputs {
            let doc = inspect(input)
                .await
                .with_context(|| format!("Failed to inspect {}", input.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&doc).context("Failed to serialise document")?
                );
            } else {
                println!("File:         {}", input.display());
                println!("Name:         {}", doc.name);
                println!("Size:         {}x{}", doc.width, doc.height);
                println!("Colour mode:  {}", doc.color_mode);
                println!("Bit depth:    {}", doc.bit_depth);
                println!("Layers:       {}", doc.layer_count());
                print_layers(&doc.layers, 1);
            }
        }
        return Ok(());
    }

    let config = build_config(&cli)?;

    // ── Scene-only mode ──────────────────────────────────────────────────
    if cli.scene_only {
        for input in &cli.inputs {
            let started = Instant::now();
            let output = convert_file(input, &config)
                .await
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&output.nodes).context("Failed to serialise scene")?
            );
            if !cli.quiet {
                let report = build_report(&output.metrics, started.elapsed().as_millis() as u64);
                eprintln!("{}", format_report(&report));
            }
        }
        return Ok(());
    }

    // ── Jobs ─────────────────────────────────────────────────────────────
    let orchestrator = Arc::new(
        Orchestrator::from_config(Arc::new(JobStore::new()), config.clone())
            .context("Failed to set up the publisher")?,
    );

    // Staging copies files; overlap it, keeping input order.
    let staged: Vec<_> = stream::iter(cli.inputs.iter().map(|input| {
        let orchestrator = Arc::clone(&orchestrator);
        async move { (input, orchestrator.submit(input).await) }
    }))
    .buffered(STAGING_CONCURRENCY)
    .collect()
    .await;

    // One slot per input so output follows input order whichever way a job ended.
    let mut slots: Vec<Option<JobOutcome>> = cli.inputs.iter().map(|_| None).collect();
    let mut running: Vec<(usize, Uuid)> = Vec::new();
    for (slot, (input, submitted)) in staged.into_iter().enumerate() {
        let started = submitted.and_then(|job| orchestrator.start_job(job.id).map(|_| job.id));
        match started {
            Ok(id) => running.push((slot, id)),
            Err(e) => {
                let record = e.to_conversion_error();
                if !cli.json {
                    eprintln!("{} {}  {}", red("✗"), bold(&input.display().to_string()), record.message);
                }
                slots[slot] = Some(JobOutcome {
                    file: input.display().to_string(),
                    job_id: None,
                    status: JobStatus::Failed.to_string(),
                    message: record.message.clone(),
                    result: Some(ConversionResult::failure(Some(record))),
                });
            }
        }
    }

    let ids: Vec<Uuid> = running.iter().map(|(_, id)| *id).collect();
    let finished = wait_for_jobs(&orchestrator, &ids, &config, show_progress).await;
    if !finished && !cli.quiet {
        eprintln!(
            "{} stopped waiting after {}s; unfinished jobs keep running until exit",
            cyan("⚠"),
            config.poll_timeout_secs
        );
    }

    for &(slot, id) in &running {
        let view = orchestrator.job_status(id).context("Job disappeared")?;
        let result = if view.status.is_terminal() {
            Some(orchestrator.fetch_result(id).context("Failed to fetch result")?)
        } else {
            None
        };
        slots[slot] = Some(JobOutcome {
            file: cli.inputs[slot].display().to_string(),
            job_id: Some(id),
            status: view.status.to_string(),
            message: view.message,
            result,
        });
    }
    let outcomes = in_input_order(slots);

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcomes).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| !o.result.as_ref().is_some_and(|r| r.success))
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} conversions did not complete", failed, outcomes.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .upload_dir(&cli.upload_dir)
        .max_file_size(cli.max_file_size)
        .figma_api_base(&cli.figma_api_base)
        .api_timeout_secs(cli.api_timeout)
        .poll_interval_ms(cli.poll_interval)
        .poll_timeout_secs(cli.poll_timeout);
    if let Some(ref dir) = cli.export_dir {
        builder = builder.export_dir(dir);
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref token) = cli.figma_token {
        builder = builder.figma_access_token(token);
    }
    if let Some(ref team) = cli.figma_team {
        builder = builder.figma_team_id(team);
    }
    builder.build().context("Invalid configuration")
}

/// Poll until every job is terminal or `poll_timeout` elapses.
///
/// Returns `false` on timeout. Jobs are never cancelled.
async fn wait_for_jobs(
    orchestrator: &Orchestrator,
    jobs: &[Uuid],
    config: &ConversionConfig,
    show_progress: bool,
) -> bool {
    let bar = if show_progress && !jobs.is_empty() {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let deadline = Instant::now() + config.poll_timeout();
    let done = loop {
        let statuses: Vec<JobStatus> = jobs
            .iter()
            .filter_map(|id| orchestrator.job_status(*id).ok())
            .map(|view| view.status)
            .collect();
        let terminal = statuses.iter().filter(|s| s.is_terminal()).count();

        if let Some(ref bar) = bar {
            let current = statuses
                .iter()
                .find(|s| !s.is_terminal())
                .map(|s| s.message())
                .unwrap_or("Finishing…");
            bar.set_message(format!("{terminal}/{} done  {}", jobs.len(), dim(current)));
        }

        if terminal == statuses.len() {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }
        tokio::time::sleep(config.poll_interval()).await;
    };

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    done
}

/// Drop empty slots, keeping input order.
fn in_input_order(slots: Vec<Option<JobOutcome>>) -> Vec<JobOutcome> {
    slots.into_iter().flatten().collect()
}

fn print_outcome(outcome: &JobOutcome) {
    match &outcome.result {
        Some(result) if result.success => {
            eprintln!("{} {}", green("✔"), bold(&outcome.file));
            println!("{}", format_report(&result.report));
            if let Some(ref url) = result.artifact_url {
                println!("File URL: {}", url);
            }
            println!();
        }
        Some(result) => {
            let message = result
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or(outcome.message.as_str());
            eprintln!("{} {}  {}", red("✘"), bold(&outcome.file), red(message));
        }
        None => {
            eprintln!(
                "{} {}  {}",
                cyan("⚠"),
                bold(&outcome.file),
                dim(&format!("still {}", outcome.status))
            );
        }
    }
}

fn print_layers(layers: &[ParsedLayer], depth: usize) {
    for layer in layers {
        let hidden = if layer.visible { "" } else { " (hidden)" };
        println!(
            "{:indent$}- {} {}{}  {}",
            "",
            layer.name,
            dim(&format!("[{}]", layer.kind.type_name())),
            hidden,
            dim(&format!(
                "{}x{} @ {},{}",
                layer.bounds.width(),
                layer.bounds.height(),
                layer.bounds.left,
                layer.bounds.top
            )),
            indent = depth * 2
        );
        if let Some(children) = layer.children() {
            print_layers(children, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(file: &str, status: JobStatus) -> JobOutcome {
        JobOutcome {
            file: file.into(),
            job_id: None,
            status: status.to_string(),
            message: String::new(),
            result: None,
        }
    }

    #[test]
    fn outcomes_follow_input_order() {
        // a.psd ran; b.psd failed at staging and was recorded first.
        let mut slots: Vec<Option<JobOutcome>> = vec![None, None, None];
        slots[1] = Some(outcome("b.psd", JobStatus::Failed));
        slots[0] = Some(outcome("a.psd", JobStatus::Completed));
        slots[2] = Some(outcome("c.psd", JobStatus::Completed));

        let files: Vec<String> = in_input_order(slots).into_iter().map(|o| o.file).collect();
        assert_eq!(files, ["a.psd", "b.psd", "c.psd"]);
    }

    #[test]
    fn empty_slots_are_skipped() {
        let slots = vec![None, Some(outcome("b.psd", JobStatus::Failed))];
        let outcomes = in_input_order(slots);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].file, "b.psd");
    }
}
