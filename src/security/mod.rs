//! Anti-abuse gates.
//!
//! # Data Flow
//! ```text
//! Validated submission + client signals:
//!     → rate_limit.rs (fixed window quota per hashed client identity)
//!     → bot_verification.rs (challenge token check)
//!     → Pass to storage
//! ```
//!
//! # Design Decisions
//! - Each gate is Enforced, Disabled or Misconfigured, fixed at startup
//! - An enforced gate whose service fails never degrades to Disabled
//! - Every outbound call runs under the external call deadline

pub mod bot_verification;
pub mod rate_limit;

pub use bot_verification::{BotVerificationGate, BotVerifier, SiteVerifyClient, VerifierError};
pub use rate_limit::{
    FixedWindowLimiter, LimiterError, RateDecision, RateLimitGate, RateLimiter, UpstashLimiter,
};
