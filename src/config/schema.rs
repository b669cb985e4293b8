//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the intake service.
//! All types derive Serde traits for deserialization from config files.

use serde::Deserialize;

use crate::config::secret::Secret;

/// Root configuration for the waitlist intake service.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IntakeConfig {
    /// Deployment profile. Decides which protections are mandatory.
    pub profile: Profile,

    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Submission field rules.
    pub submission: SubmissionConfig,

    /// Abuse signal configuration (IP hashing).
    pub abuse: AbuseConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Bot verification configuration.
    pub bot_verification: BotVerificationConfig,

    /// Waitlist storage configuration.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl IntakeConfig {
    /// True when running with the production profile.
    pub fn is_production(&self) -> bool {
        self.profile == Profile::Production
    }
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_bytes: 16 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Deadline for each call to an external collaborator
    /// (rate limiter, bot verifier, store) in milliseconds.
    pub external_call_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 15,
            external_call_ms: 5_000,
        }
    }
}

/// Submission field rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Restrict sign-up to these email domains. Empty means any domain.
    pub allowed_email_domains: Vec<String>,

    /// User-facing message returned when the domain is not allowed.
    pub domain_not_allowed_message: String,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            allowed_email_domains: Vec::new(),
            domain_not_allowed_message:
                "Cadastro disponível apenas para e-mails de domínios autorizados.".to_string(),
        }
    }
}

/// Abuse signal configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AbuseConfig {
    /// Salt mixed into client IP hashes. Mandatory in production.
    pub ip_hash_salt: Option<Secret>,
}

/// Backing service for the rate limiter.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackend {
    /// In-process fixed window counters.
    Memory,
    /// Upstash Redis over its REST API.
    #[default]
    Upstash,
    /// No limiter configured.
    None,
}

/// What to do when the limiter backing is not configured.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Proceed unthrottled.
    FailOpen,
    /// Refuse every submission with a configuration error.
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,

    /// Admissions per window per client key.
    pub max_requests: u32,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Key prefix in the backing store.
    pub prefix: String,

    /// Policy when the backing is unconfigured. Unset means the profile default:
    /// fail closed in production, fail open elsewhere.
    pub on_unavailable: Option<UnavailablePolicy>,

    /// Upstash REST endpoint.
    pub upstash_url: Option<String>,

    /// Upstash REST token.
    pub upstash_token: Option<Secret>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::default(),
            max_requests: 5,
            window_secs: 60,
            prefix: "waitlist".to_string(),
            on_unavailable: None,
            upstash_url: None,
            upstash_token: None,
        }
    }
}

impl RateLimitConfig {
    /// Resolve the unavailability policy for a profile.
    pub fn effective_policy(&self, profile: Profile) -> UnavailablePolicy {
        self.on_unavailable.unwrap_or(match profile {
            Profile::Production => UnavailablePolicy::FailClosed,
            Profile::Development => UnavailablePolicy::FailOpen,
        })
    }
}

/// Bot verification mode.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BotVerificationMode {
    #[default]
    Off,
    /// Verify only when the client sent a token.
    Optional,
    /// Every submission must carry a valid token.
    Required,
}

/// Bot verification configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotVerificationConfig {
    pub mode: BotVerificationMode,

    /// Server-side verification secret.
    pub secret: Option<Secret>,

    /// Verification endpoint.
    pub verify_url: String,
}

impl Default for BotVerificationConfig {
    fn default() -> Self {
        Self {
            mode: BotVerificationMode::Off,
            secret: None,
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
        }
    }
}

/// Storage engine selection.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Mongodb,
    Memory,
}

/// Waitlist storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// MongoDB connection string.
    pub mongodb_uri: Option<Secret>,

    /// Database name.
    pub database: String,

    /// Collection holding waitlist records.
    pub collection: String,

    /// JSON snapshot file for the memory backend.
    pub snapshot_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            mongodb_uri: None,
            database: "landing".to_string(),
            collection: "waitlist".to_string(),
            snapshot_path: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
