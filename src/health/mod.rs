//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer (or check_now)
//!     → Run every tier probe concurrently, each under the probe timeout
//!     → Build a new snapshot (state.rs) from the previous one
//!     → Publish it atomically
//! ```
//!
//! # Design Decisions
//! - Health is observational; breakers and fallback never read it
//! - Readers see whole cycles, never a half-updated snapshot
//! - One background task per monitor, started and stopped explicitly

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthSnapshot, TierHealth};
