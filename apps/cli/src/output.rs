//! Output formatting utilities

use crate::OutputFormat;
use console::style;
use getr_types::{CompletionEvent, DownloadStatus};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Final report for one download
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub id: Uuid,
    pub url: String,
    #[serde(flatten)]
    pub event: CompletionEvent,
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.event.status, &self.event.path) {
            (DownloadStatus::Completed, Some(path)) => write!(
                f,
                "{} {} -> {}",
                style("✓").green().bold(),
                self.url,
                style(path.display()).cyan()
            ),
            (status, _) => write!(
                f,
                "{} {} ({}): {}",
                style("✗").red().bold(),
                self.url,
                status,
                self.event.message.as_deref().unwrap_or("no details")
            ),
        }
    }
}

/// Print output in the specified format
pub fn print_output<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
        }
        OutputFormat::Human => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Format speed as human-readable
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec as f64))
}
