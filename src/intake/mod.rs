//! Waitlist intake.
//!
//! # Data Flow
//! ```text
//! POST /api/waitlist
//!     → origin.rs (Origin vs Host)
//!     → submission.rs (parse, normalize, bound fields)
//!     → signals.rs (client IP, salted hash)
//!     → security gates (rate limit, bot verification)
//!     → storage upsert
//! ```
//! `pipeline.rs` runs the stages; `error.rs` is the closed failure taxonomy
//! every stage reports through.

pub mod error;
pub mod origin;
pub mod pipeline;
pub mod signals;
pub mod submission;

pub use error::{ErrorClass, IntakeError};
pub use pipeline::{Accepted, IntakePipeline};
