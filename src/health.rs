//! Readiness signal and the health probe.
//!
//! | State | Stored value | `/health` |
//! |---|---|---|
//! | not ready | `0` | `503`, empty body |
//! | ready | ready-since, ns since the Unix epoch | `200`, `uptime: <dur>\n` |
//!
//! One word carries both the flag and the timestamp, so a probe can never
//! observe "ready" paired with a stale or missing ready-since.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::StatusCode;

use crate::response::Response;

/// Process-wide readiness, shared by the controller, the supervisor and
/// `main`. Cloning shares the same word.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicI64>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the process ready as of now.
    pub fn mark_ready(&self) {
        self.mark_ready_at(now_nanos());
    }

    /// Marks the process ready as of `since` (ns since the Unix epoch).
    /// A zero timestamp is bumped to 1 so it still reads as ready.
    pub fn mark_ready_at(&self, since: i64) {
        self.0.store(since.max(1), Ordering::Release);
    }

    pub fn mark_not_ready(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready_since().is_some()
    }

    /// Ready-since timestamp in ns since the Unix epoch, or `None`.
    pub fn ready_since(&self) -> Option<i64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            since => Some(since),
        }
    }

    /// Time since the process became ready, or `None` while not ready.
    pub fn uptime(&self) -> Option<Duration> {
        let since = self.ready_since()?;
        let elapsed = now_nanos().saturating_sub(since).max(0);
        Some(Duration::from_nanos(elapsed.unsigned_abs()))
    }

    /// The `/health` response for the current state.
    pub fn probe(&self) -> Response {
        match self.uptime() {
            None => Response::status(StatusCode::SERVICE_UNAVAILABLE),
            Some(uptime) => Response::text(format!("uptime: {uptime:?}\n")),
        }
    }
}

pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
