//! Progress bar utilities for CLI downloads

use crate::output::format_speed;
use console::style;
use getr_types::{CompletionEvent, DownloadInfo, DownloadStatus, ProgressEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

const TEMPLATE: &str =
    "{spinner:.green} {prefix:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// Progress bar for a single download, fed from its progress callback
#[derive(Clone)]
pub struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    pub fn update(&self, event: &ProgressEvent) {
        if let Some(total) = event.total_size {
            self.bar.set_length(total);
        }
        self.bar.set_position(event.current_size);
        // Samples carry bytes per millisecond
        self.bar.set_message(format_speed(event.speed.saturating_mul(1000)));
    }
}

/// Manages progress bars for multiple downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<Uuid, ProgressBar>>,
}

impl DownloadProgress {
    /// Bars are drawn only when `visible`; JSON output keeps stdout clean
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };

        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Create a progress bar for a download
    pub fn add_download(&self, download: &DownloadInfo) -> DownloadBar {
        let pb = self.multi.add(ProgressBar::new(download.total_bytes.unwrap_or(0)));
        pb.set_style(
            ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        pb.set_prefix(display_name(download));

        self.bars.lock().insert(download.id, pb.clone());
        DownloadBar { bar: pb }
    }

    /// Finish a bar with the download's terminal outcome
    pub fn finish(&self, id: Uuid, event: &CompletionEvent) {
        let Some(pb) = self.bars.lock().remove(&id) else {
            return;
        };

        match event.status {
            DownloadStatus::Completed => {
                pb.finish_with_message(format!("{} Download complete", style("✓").green().bold()));
            }
            DownloadStatus::Canceled => {
                pb.abandon_with_message(format!("{} Canceled", style("○").dim()));
            }
            _ => {
                pb.abandon_with_message(format!(
                    "{} Failed: {}",
                    style("✗").red().bold(),
                    event.message.as_deref().unwrap_or("Unknown error")
                ));
            }
        }
    }
}

fn display_name(download: &DownloadInfo) -> String {
    download
        .destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| download.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn download() -> DownloadInfo {
        DownloadInfo {
            id: Uuid::new_v4(),
            url: "https://example.com/a.bin".to_string(),
            destination: PathBuf::from("/tmp/a.bin"),
            status: DownloadStatus::Pending,
            bytes_received: 0,
            total_bytes: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[test]
    fn test_bar_follows_progress() {
        let progress = DownloadProgress::new(false);
        let download = download();
        let bar = progress.add_download(&download);

        bar.update(&ProgressEvent {
            value: 50,
            speed: 2,
            current_size: 500,
            total_size: Some(1000),
        });
        assert_eq!(bar.bar.position(), 500);
        assert_eq!(bar.bar.length(), Some(1000));

        progress.finish(download.id, &CompletionEvent::completed(download.destination.clone()));
        assert!(bar.bar.is_finished());
        assert!(progress.bars.lock().is_empty());
    }

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(display_name(&download()), "a.bin");
    }
}
