//! Abuse signals: client identity and IP hashing.
//!
//! The raw client IP never leaves this module except as the rate-limit key
//! fallback and the `remoteip` hint sent to the bot verifier.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::config::{IntakeConfig, Secret};
use crate::intake::error::IntakeError;

/// Edge-provided header, trusted first.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identity signals derived for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSignals {
    pub client_ip: Option<String>,
    pub ip_hash: Option<String>,
}

impl ClientSignals {
    /// Key used for rate limiting: the hash when available, then the raw IP.
    pub fn rate_key(&self) -> &str {
        self.ip_hash
            .as_deref()
            .or(self.client_ip.as_deref())
            .unwrap_or("unknown")
    }
}

/// Resolve the client IP from proxy headers.
///
/// Order: `cf-connecting-ip`, first entry of `x-forwarded-for`, `x-real-ip`.
/// The first non-empty value wins.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header(CF_CONNECTING_IP)
        .or_else(|| {
            header(X_FORWARDED_FOR)
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .or_else(|| header(X_REAL_IP))
        .map(str::to_string)
}

/// Hex SHA-256 of `salt ‖ ip`.
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

/// IP hashing capability, decided once at startup.
#[derive(Debug, Clone)]
pub enum IpHasher {
    /// Salt configured: hash every resolved IP.
    Salted(Secret),
    /// No salt outside production: identities are not hashed.
    Unsalted,
    /// No salt in production: every submission is refused.
    MissingSalt,
}

impl IpHasher {
    pub fn from_config(config: &IntakeConfig) -> Self {
        match &config.abuse.ip_hash_salt {
            Some(salt) => IpHasher::Salted(salt.clone()),
            None if config.is_production() => {
                tracing::error!("IP_HASH_SALT is not set; production submissions will be refused");
                IpHasher::MissingSalt
            }
            None => {
                tracing::warn!("IP_HASH_SALT is not set; client IPs will not be hashed");
                IpHasher::Unsalted
            }
        }
    }

    /// Derive the client signals for a request.
    pub fn collect(&self, headers: &HeaderMap) -> Result<ClientSignals, IntakeError> {
        let salt = match self {
            IpHasher::MissingSalt => {
                return Err(IntakeError::Misconfigured {
                    reason: "ip_hash_salt_missing",
                })
            }
            IpHasher::Salted(salt) => Some(salt),
            IpHasher::Unsalted => None,
        };

        let client_ip = client_ip(headers);
        let ip_hash = match (salt, &client_ip) {
            (Some(salt), Some(ip)) => Some(hash_ip(salt.expose_secret(), ip)),
            _ => None,
        };

        Ok(ClientSignals { client_ip, ip_hash })
    }
}
