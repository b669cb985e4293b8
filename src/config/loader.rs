//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{IntakeConfig, Profile};
use crate::config::secret::Secret;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, overlay process environment
/// secrets, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<IntakeConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => IntakeConfig::default(),
    };

    let config = apply_env_overrides(config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment-provided settings onto a parsed config.
///
/// `lookup` returns the raw value of a variable. Blank values count as unset,
/// and blank secrets that came from the file are cleared as well.
pub fn apply_env_overrides<F>(mut config: IntakeConfig, lookup: F) -> IntakeConfig
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(env) = var("APP_ENV").or_else(|| var("NODE_ENV")) {
        if env.trim().eq_ignore_ascii_case("production") {
            config.profile = Profile::Production;
        }
    }

    if let Some(addr) = var("BIND_ADDRESS") {
        config.listener.bind_address = addr.trim().to_string();
    }

    if let Some(salt) = Secret::non_empty(var("IP_HASH_SALT")) {
        config.abuse.ip_hash_salt = Some(salt);
    }

    if let Some(uri) = Secret::non_empty(var("MONGODB_URI")) {
        config.storage.mongodb_uri = Some(uri);
    }
    if let Some(db) = var("MONGODB_DB") {
        config.storage.database = db.trim().to_string();
    }
    if let Some(collection) = var("MONGODB_WAITLIST_COLLECTION") {
        config.storage.collection = collection.trim().to_string();
    }

    if let Some(url) = var("UPSTASH_REDIS_REST_URL") {
        config.rate_limit.upstash_url = Some(url.trim().to_string());
    }
    if let Some(token) = Secret::non_empty(var("UPSTASH_REDIS_REST_TOKEN")) {
        config.rate_limit.upstash_token = Some(token);
    }

    if let Some(secret) = Secret::non_empty(var("TURNSTILE_SECRET_KEY")) {
        config.bot_verification.secret = Some(secret);
    }

    clear_blank_secrets(&mut config);
    config
}

fn clear_blank_secrets(config: &mut IntakeConfig) {
    fn clear(slot: &mut Option<Secret>) {
        if slot.as_ref().is_some_and(Secret::is_blank) {
            *slot = None;
        }
    }

    clear(&mut config.abuse.ip_hash_salt);
    clear(&mut config.storage.mongodb_uri);
    clear(&mut config.rate_limit.upstash_token);
    clear(&mut config.bot_verification.secret);

    if config
        .rate_limit
        .upstash_url
        .as_deref()
        .is_some_and(|u| u.trim().is_empty())
    {
        config.rate_limit.upstash_url = None;
    }
}
