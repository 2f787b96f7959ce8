//! Upstream addressing.

pub mod target;

pub use target::{Protocol, RouteKind, UpstreamTarget};
