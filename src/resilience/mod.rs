//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call:
//!     → circuit_breaker.rs (admit or fail fast for the target host)
//!     → client call
//!     → circuit_breaker.rs (report success, or failure on error / 5xx)
//!           → window.rs (bucketed outcome counts over the last minute)
//! ```
//!
//! # Design Decisions
//! - Breakers are keyed by hostname, shared across ports and routes
//! - No retries; Prometheus retries on its next scrape
//! - Deadlines are enforced by the proxy pipeline, not here

pub mod circuit_breaker;
pub mod window;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
