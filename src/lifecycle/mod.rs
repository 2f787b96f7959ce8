//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main
//!
//! Shutdown (shutdown.rs):
//!     trigger → listener stops accepting, sweeper exits
//!             → in-flight requests drain for up to shutdown_grace_secs → exit
//! ```
//!
//! # Design Decisions
//! - Configuration is immutable; there is no reload signal
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
