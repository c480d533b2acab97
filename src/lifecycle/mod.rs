//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscribed task leaves its loop → stop() joins it
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
