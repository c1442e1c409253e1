//! Non-fatal error notices for the surrounding application
//!
//! Sinks are fire-and-forget: `notify` must return promptly and never fail.
//! Service-level notices are throttled so an outage produces one toast per
//! window rather than one per failed request.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::identity::Identity;

/// Default window for service-degraded notices (10 minutes).
pub const DEFAULT_SERVICE_NOTICE_WINDOW: Duration = Duration::from_secs(600);

/// A non-fatal condition worth surfacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A whole batch failed at the transport/service level
    ServiceDegraded { reason: String },
    /// One record of a batch could not be decoded or decrypted
    RecordRejected { identity: Identity, reason: String },
}

/// Receiver of [`Notice`]s.
pub trait TelemetrySink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sink that writes notices to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::ServiceDegraded { reason } => {
                warn!(%reason, "Private profile service degraded");
            }
            Notice::RecordRejected { identity, reason } => {
                warn!(%identity, %reason, "Private profile record rejected");
            }
        }
    }
}

/// Sink that records every notice in memory.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn service_degraded_count(&self) -> usize {
        self.notices
            .lock()
            .iter()
            .filter(|n| matches!(n, Notice::ServiceDegraded { .. }))
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.notices
            .lock()
            .iter()
            .filter(|n| matches!(n, Notice::RecordRejected { .. }))
            .count()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Lets at most one notice through per window.
#[derive(Debug)]
pub struct NoticeThrottle {
    window: Duration,
    last_emitted: Mutex<Option<Instant>>,
}

impl NoticeThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a notice may be emitted now; consumes the window if so.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// [`Self::try_acquire`] against an explicit clock reading.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut last = self.last_emitted.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for NoticeThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NOTICE_WINDOW)
    }
}
