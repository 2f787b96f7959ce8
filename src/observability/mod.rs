//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → /internal/metrics (Prometheus scrape of the proxy itself)
//! ```
//!
//! # Design Decisions
//! - Request ID flows to upstreams as an ordinary header
//! - Metrics are no-ops until a recorder is installed, so tests need no setup

pub mod build_info;
pub mod logging;
pub mod metrics;

pub use build_info::BuildInfo;
