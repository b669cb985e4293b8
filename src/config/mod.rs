//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (overlay secrets from the environment)
//!     → validation.rs (semantic checks)
//!     → IntakeConfig (validated, immutable)
//!     → consumed once at startup to build gates and the store
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload, so fail-open and
//!   fail-closed choices cannot drift between requests
//! - All fields have defaults to allow minimal configs
//! - Secrets are wrapped so they never reach logs

pub mod loader;
pub mod schema;
pub mod secret;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AbuseConfig, BotVerificationConfig, BotVerificationMode, IntakeConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, Profile, RateLimitBackend, RateLimitConfig, StorageBackend,
    StorageConfig, SubmissionConfig, TimeoutConfig, UnavailablePolicy,
};
pub use secret::Secret;
