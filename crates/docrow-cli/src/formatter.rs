//! Output formatters for migration results.

use clap::ValueEnum;
use docrow_core::{DdlOperation, MigrationOutcome, MigrationReport};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the outcome of a startup pass.
    fn format_outcome(&self, outcome: &MigrationOutcome) -> String;

    /// Format a document migration pass.
    fn format_report(&self, report: &MigrationReport) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Plain text formatter.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_outcome(&self, outcome: &MigrationOutcome) -> String {
        if outcome.is_empty() {
            return format!("Schema is up to date (version {})", outcome.to_version);
        }

        let mut lines = Vec::new();
        let verb = if outcome.dry_run { "would migrate" } else { "migrated" };
        lines.push(format!(
            "Schema {verb} from version {} to {}",
            outcome.from_version, outcome.to_version
        ));

        for op in &outcome.authored {
            lines.push(format!("  authored  {}", describe(op)));
        }
        for op in &outcome.planned {
            lines.push(format!("  planned   {}", describe(op)));
        }
        for table in &outcome.reprojected_tables {
            lines.push(format!("  reproject {table}"));
        }

        lines.join("\n")
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        format!(
            "{} migrated, {} re-projected, {} skipped",
            report.migrated, report.reprojected, report.skipped
        )
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {error}")
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_outcome(&self, outcome: &MigrationOutcome) -> String {
        let ops = |ops: &[DdlOperation]| -> Vec<serde_json::Value> {
            ops.iter()
                .map(|op| {
                    json!({
                        "operation": op.to_string(),
                        "unsafe": op.is_unsafe(),
                        "statements": op.statements(),
                    })
                })
                .collect()
        };

        json!({
            "from_version": outcome.from_version,
            "to_version": outcome.to_version,
            "dry_run": outcome.dry_run,
            "authored": ops(&outcome.authored),
            "planned": ops(&outcome.planned),
            "reprojected_tables": outcome.reprojected_tables,
        })
        .to_string()
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        json!({
            "migrated": report.migrated,
            "reprojected": report.reprojected,
            "skipped": report.skipped,
        })
        .to_string()
    }

    fn format_error(&self, error: &str) -> String {
        json!({ "error": error }).to_string()
    }
}

fn describe(op: &DdlOperation) -> String {
    if op.is_unsafe() {
        format!("{op} [unsafe]")
    } else {
        op.to_string()
    }
}
