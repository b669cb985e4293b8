//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and gates produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID comes from tower-http and rides on the request span
//! - Raw IPs and emails never appear in events
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
