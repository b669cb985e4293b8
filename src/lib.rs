//! Waitlist intake service library.

pub mod config;
pub mod http;
pub mod intake;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod storage;

pub use config::schema::IntakeConfig;
pub use http::HttpServer;
pub use intake::{IntakeError, IntakePipeline};
pub use lifecycle::Shutdown;
