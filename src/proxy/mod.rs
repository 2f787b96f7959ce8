//! Proxy engine.
//!
//! # Data Flow
//! ```text
//! Inbound request (from http/server.rs)
//!     → request.rs (ProxyRequest: query params, watch, timeoutSeconds)
//!     → pipeline.rs (pick route target and response mode)
//!     → rewrite.rs (outbound path + headers, bearer token on control-plane calls)
//!     → client cache → breaker → upstream
//!     → render.rs (buffered body, or chunk stream bounded by the watch deadline)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Response mode is chosen once per request and never mixed
//! - Upstream statuses pass through untouched; only proxy-side failures
//!   become `ProxyError` responses
//! - No retries at this layer

pub mod error;
pub mod headers;
pub mod pipeline;
pub mod render;
pub mod request;
pub mod rewrite;

pub use error::ProxyError;
pub use pipeline::ProxyPipeline;
pub use render::{ProxyBody, ProxyResponse};
pub use request::{ProxyRequest, QueryParams, ResponseMode};
pub use rewrite::{normalize_prefix, OutboundRequest, RequestRewriter};
