//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a collaborator (limiter, verifier, store):
//!     → timeouts.rs (enforce the external call deadline)
//!     → On timeout or error: the stage fails, the request ends
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Submissions are not idempotent from the limiter's point of view, so
//!   nothing is retried inside a request

pub mod timeouts;

pub use timeouts::{call_with_deadline, StageFailure};
