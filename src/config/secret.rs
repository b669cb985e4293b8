//! Redacting wrapper for secret configuration values.

use std::fmt;

use serde::Deserialize;

/// A configuration secret (salt, token, connection string).
///
/// Debug and Display always print `[REDACTED]`. The value is only reachable
/// through [`expose_secret`](Self::expose_secret).
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret {
    inner: String,
}

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self { inner: value.into() }
    }

    /// Build a secret from an optional raw value, treating blank values as absent.
    ///
    /// The value is kept verbatim; a salt with surrounding whitespace must hash
    /// exactly as configured.
    pub fn non_empty(value: Option<String>) -> Option<Self> {
        value.filter(|v| !v.trim().is_empty()).map(Self::new)
    }

    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    pub fn is_blank(&self) -> bool {
        self.inner.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
