//! Process-wide configuration

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 60;

static TRANSPORT_TIMEOUT_SECS: AtomicU64 = AtomicU64::new(DEFAULT_TRANSPORT_TIMEOUT_SECS);

/// Set the timeout captured by transport tasks created after this call.
/// Downloads that already exist keep the timeout they were created with.
pub fn set_transport_timeout(secs: u64) {
    TRANSPORT_TIMEOUT_SECS.store(secs, Ordering::Relaxed);
}

/// Current process-wide transport timeout
pub fn transport_timeout() -> Duration {
    Duration::from_secs(TRANSPORT_TIMEOUT_SECS.load(Ordering::Relaxed))
}
