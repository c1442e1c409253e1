//! Fetch layer: remote API contract, coordinator and error telemetry

pub mod api;
pub mod coordinator;
pub mod telemetry;

pub use api::{DisclosureApi, DisclosureRecord, InMemoryDisclosureApi, Requester};
pub use coordinator::{FetchCoordinator, PassMode, PassOutcome, PassPhase, PassReport};
pub use telemetry::{
    MemoryTelemetry, Notice, NoticeThrottle, TelemetrySink, TracingTelemetry,
    DEFAULT_SERVICE_NOTICE_WINDOW,
};
