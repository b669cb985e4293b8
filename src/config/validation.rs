//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (quotas, windows and timeouts > 0)
//! - Check addresses and endpoint URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IntakeConfig → Result<(), Vec<ValidationError>>
//! - Missing secrets are not errors here; they are deployment conditions that
//!   the gates surface per request and `preflight` reports

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{IntakeConfig, RateLimitBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending setting.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    fn new(field: &str, constraint: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            constraint: constraint.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a loaded configuration.
pub fn validate_config(config: &IntakeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.external_call_ms == 0 {
        errors.push(ValidationError::new("timeouts.external_call_ms", "must be > 0"));
    }

    for domain in &config.submission.allowed_email_domains {
        let domain = domain.trim();
        if domain.is_empty() || domain.contains('@') || domain.contains(char::is_whitespace) {
            errors.push(ValidationError::new(
                "submission.allowed_email_domains",
                format!("'{}' is not a bare domain", domain),
            ));
        }
    }

    let rl = &config.rate_limit;
    if rl.backend != RateLimitBackend::None {
        if rl.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be > 0"));
        }
        if rl.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
        }
    }
    if rl.backend == RateLimitBackend::Upstash {
        if let Some(endpoint) = &rl.upstash_url {
            if url::Url::parse(endpoint).is_err() {
                errors.push(ValidationError::new(
                    "rate_limit.upstash_url",
                    format!("'{}' is not a URL", endpoint),
                ));
            }
        }
    }

    if url::Url::parse(&config.bot_verification.verify_url).is_err() {
        errors.push(ValidationError::new(
            "bot_verification.verify_url",
            format!("'{}' is not a URL", config.bot_verification.verify_url),
        ));
    }

    if config.storage.database.trim().is_empty() {
        errors.push(ValidationError::new("storage.database", "must not be empty"));
    }
    if config.storage.collection.trim().is_empty() {
        errors.push(ValidationError::new("storage.collection", "must not be empty"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&IntakeConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = IntakeConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.rate_limit.max_requests = 0;
        config.rate_limit.window_secs = 0;
        config.timeouts.external_call_ms = 0;
        config.submission.allowed_email_domains = vec!["user@example.com".into()];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "timeouts.external_call_ms",
                "submission.allowed_email_domains",
                "rate_limit.max_requests",
                "rate_limit.window_secs",
            ]
        );
    }

    #[test]
    fn test_quota_ignored_without_limiter() {
        let mut config = IntakeConfig::default();
        config.rate_limit.backend = RateLimitBackend::None;
        config.rate_limit.max_requests = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_upstash_url() {
        let mut config = IntakeConfig::default();
        config.rate_limit.upstash_url = Some("eu1 upstash".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "rate_limit.upstash_url");
    }
}
