//! Outbound client subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline asks for a target:
//!     → cache.rs (get-or-create by host:port, touch last-used)
//!     → factory.rs (first use only: build reqwest client, wrap in layers.rs)
//!
//! Every outbound call:
//!     → MetricsLayer (outcome + latency, labeled host:port)
//!     → CircuitBreakerLayer (admit / reject, report outcome)
//!     → reqwest (H2 over TLS, H2C prior knowledge, or HTTP/1.1)
//!
//! Background:
//!     → sweeper.rs (periodic idle eviction until shutdown)
//! ```
//!
//! # Design Decisions
//! - Evicting only drops the cache's handle; callers holding a clone finish normally
//! - Interceptors are tower layers so they compose in a fixed, visible order
//! - Construction sits behind a trait so the cache can be tested without sockets

pub mod cache;
pub mod factory;
pub mod layers;
pub mod sweeper;

pub use cache::ClientCache;
pub use factory::{ClientFactory, ReqwestClientFactory, UpstreamClient, UpstreamService};
pub use sweeper::IdleSweeper;
