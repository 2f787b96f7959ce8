//! psystrike: a reverse proxy between Prometheus and a Kubernetes cluster.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                        PSYSTRIKE                         │
//!                     │                                                          │
//!   Prometheus        │  ┌─────────┐    ┌──────────┐    ┌─────────────────┐      │
//!   ──────────────────┼─▶│  http   │───▶│  proxy   │───▶│ client cache    │      │
//!   /api/...          │  │ server  │    │ pipeline │    │ (host:port)     │      │
//!   /apiservers/h/p/..│  └─────────┘    └────┬─────┘    └───────┬─────────┘      │
//!   /pods/h/p/...     │                      │                  │                │
//!                     │                      ▼                  ▼                │
//!                     │               ┌────────────┐    ┌─────────────────┐      │
//!   ◀─────────────────┼───────────────│  render    │◀───│ metrics layer   │      │
//!   buffered body     │               │ buffered / │    │ breaker layer   │──────┼──▶ API server (H2)
//!   or watch stream   │               │ streaming  │    │ reqwest         │──────┼──▶ pod (HTTP/1.1)
//!                     │               └────────────┘    └─────────────────┘      │
//!                     │                                                          │
//!                     │  config · observability · resilience · lifecycle         │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod client;
pub mod config;
pub mod http;
pub mod proxy;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyError, ProxyPipeline};
