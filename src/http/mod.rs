//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (HTTP/1.1 or HTTP/2)
//!     → server.rs (Axum setup, request ID, trace span)
//!     → route match: /api, /apiservers/{host}/{port}, /pods/{host}/{port}
//!     → proxy pipeline
//!     → buffered or streamed response to the scraper
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
