//! Progress and speed estimation
//!
//! Transports report progress as often as they like. The estimator turns
//! those raw samples into at most one forwarded sample per throttle window,
//! always letting the final sample through.

use getr_types::ProgressEvent;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source in milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Per-download throttling state
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    window_ms: u64,
    /// `None` until the first sample is forwarded
    last_sample_time_ms: Option<u64>,
    /// When the transfer was started; the first sample's speed is measured from here
    started_at_ms: Option<u64>,
    last_sample_bytes: u64,
    last_percent: u8,
}

impl ProgressEstimator {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            last_sample_time_ms: None,
            started_at_ms: None,
            last_sample_bytes: 0,
            last_percent: 0,
        }
    }

    /// Mark the start of the transfer. Ignored once a sample was forwarded.
    pub fn start(&mut self, now_ms: u64) {
        if self.last_sample_time_ms.is_none() {
            self.started_at_ms = Some(now_ms);
        }
    }

    /// Feed one raw sample. Returns the event to forward, if any.
    pub fn sample(
        &mut self,
        now_ms: u64,
        fraction_completed: f64,
        bytes_received: u64,
        total_bytes: Option<u64>,
    ) -> Option<ProgressEvent> {
        let last_time = self.last_sample_time_ms.or(self.started_at_ms).unwrap_or(0);
        let elapsed = now_ms.saturating_sub(last_time);
        let is_final = total_bytes == Some(bytes_received);

        if self.last_sample_time_ms.is_some() && elapsed < self.window_ms && !is_final {
            return None;
        }

        let delta_time = elapsed.max(1);
        let delta_bytes = bytes_received.saturating_sub(self.last_sample_bytes);
        let speed = delta_bytes / delta_time;
        // Percent never goes backwards for a single download
        let percent = percent_of(fraction_completed).max(self.last_percent);

        self.last_sample_time_ms = Some(last_time.max(now_ms));
        self.last_sample_bytes = bytes_received;
        self.last_percent = percent;

        Some(ProgressEvent {
            value: percent,
            speed,
            current_size: bytes_received,
            total_size: total_bytes,
        })
    }

    pub fn last_sample_time_ms(&self) -> Option<u64> {
        self.last_sample_time_ms
    }
}

fn percent_of(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).floor().clamp(0.0, 100.0) as u8
}
