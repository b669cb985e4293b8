//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build client, store, gates → Start listener
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → broadcast → stop accepting → drain → snapshot → exit
//!
//! Preflight (preflight.rs):
//!     Check production settings → ping store → OK / FAILED
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store and gates, then the listener
//! - Traffic starts only after the store is initialized

pub mod preflight;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{build_services, Services, StartupError};
