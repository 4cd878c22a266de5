//! Conversion report: metrics plus timing, and its text rendering.

use crate::pipeline::transform::{ConversionMetrics, UnsupportedFeature};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub total_layers: usize,
    pub editable_layers: usize,
    pub flattened_layers: usize,
    pub unsupported_features: Vec<UnsupportedFeature>,
    pub processing_time_ms: u64,
    pub warnings: Vec<String>,
}

/// Reduce converter metrics and the job's wall-clock time into a report.
pub fn build_report(metrics: &ConversionMetrics, elapsed_ms: u64) -> ConversionReport {
    let report = ConversionReport {
        total_layers: metrics.total_layers,
        editable_layers: metrics.editable_layers,
        flattened_layers: metrics.flattened_layers,
        unsupported_features: metrics.unsupported_features.clone(),
        processing_time_ms: elapsed_ms,
        warnings: metrics.warnings.clone(),
    };
    info!(
        total_layers = report.total_layers,
        editable_layers = report.editable_layers,
        flattened_layers = report.flattened_layers,
        unsupported_features = report.unsupported_features.len(),
        processing_time_ms = report.processing_time_ms,
        "Conversion report"
    );
    report
}

/// Human-readable summary, one line per entry. Empty sections are left out.
pub fn format_report(report: &ConversionReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("=== Conversion Report ===".to_string());
    lines.push(String::new());
    lines.push(format!("Total Layers: {}", report.total_layers));
    lines.push(format!("Editable Layers: {}", report.editable_layers));
    lines.push(format!("Flattened Layers: {}", report.flattened_layers));
    lines.push(format!(
        "Processing Time: {:.2}s",
        report.processing_time_ms as f64 / 1000.0
    ));
    lines.push(String::new());

    if !report.unsupported_features.is_empty() {
        lines.push("Unsupported Features:".to_string());
        for (i, f) in report.unsupported_features.iter().enumerate() {
            lines.push(format!("  {}. {}: {}", i + 1, f.layer_name, f.reason));
        }
        lines.push(String::new());
    }

    if !report.warnings.is_empty() {
        lines.push("Warnings:".to_string());
        for (i, w) in report.warnings.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, w));
        }
    }

    lines.join("\n")
}
