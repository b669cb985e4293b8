//! Intake error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Broad class of an intake failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or invalid input, blocked origin, failed bot check.
    Client,
    /// Quota exceeded; the caller may retry after the window.
    Policy,
    /// The deployment is missing a required secret or service.
    Configuration,
    /// A collaborator (store, limiter) failed or timed out.
    Dependency,
    /// Anything not covered above.
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Client => "client",
            ErrorClass::Policy => "policy",
            ErrorClass::Configuration => "configuration",
            ErrorClass::Dependency => "dependency",
            ErrorClass::Internal => "internal",
        }
    }
}

/// Every way a submission can fail. The `Display` text is safe to return to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("Invalid payload")]
    MalformedPayload,

    #[error("Email too long")]
    EmailTooLong,

    #[error("Invalid email")]
    InvalidEmail,

    /// Carries the localized user-facing message.
    #[error("{message}")]
    EmailDomainNotAllowed { message: String },

    #[error("Invalid payload: '{field}' is too large or not a string")]
    FieldTooLarge { field: &'static str },

    #[error("Forbidden origin")]
    OriginMismatch,

    #[error("Invalid origin")]
    InvalidOrigin,

    #[error("Bot verification failed")]
    BotVerificationFailed,

    #[error("Rate limited")]
    RateLimited,

    /// `reason` is for operators and never leaves the process.
    #[error("Server misconfigured")]
    Misconfigured { reason: &'static str },

    #[error("Database not configured")]
    DbNotConfigured,

    #[error("Database error")]
    Db { detail: String },

    #[error("Rate limiter unavailable")]
    RateLimiterUnavailable { detail: String },

    #[error("Internal error")]
    Internal,
}

impl IntakeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::MalformedPayload => "MALFORMED_PAYLOAD",
            IntakeError::EmailTooLong => "EMAIL_TOO_LONG",
            IntakeError::InvalidEmail => "INVALID_EMAIL",
            IntakeError::EmailDomainNotAllowed { .. } => "EMAIL_DOMAIN_NOT_ALLOWED",
            IntakeError::FieldTooLarge { .. } => "FIELD_TOO_LARGE",
            IntakeError::OriginMismatch | IntakeError::InvalidOrigin => "INVALID_ORIGIN",
            IntakeError::BotVerificationFailed => "BOT_VERIFICATION_FAILED",
            IntakeError::RateLimited => "RATE_LIMITED",
            IntakeError::Misconfigured { .. } => "SERVER_MISCONFIGURED",
            IntakeError::DbNotConfigured => "DB_NOT_CONFIGURED",
            IntakeError::Db { .. } => "DB_ERROR",
            IntakeError::RateLimiterUnavailable { .. } => "RATE_LIMITER_UNAVAILABLE",
            IntakeError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            IntakeError::MalformedPayload
            | IntakeError::EmailTooLong
            | IntakeError::InvalidEmail
            | IntakeError::EmailDomainNotAllowed { .. }
            | IntakeError::FieldTooLarge { .. }
            | IntakeError::OriginMismatch
            | IntakeError::InvalidOrigin
            | IntakeError::BotVerificationFailed => ErrorClass::Client,
            IntakeError::RateLimited => ErrorClass::Policy,
            IntakeError::Misconfigured { .. } | IntakeError::DbNotConfigured => {
                ErrorClass::Configuration
            }
            IntakeError::Db { .. } | IntakeError::RateLimiterUnavailable { .. } => {
                ErrorClass::Dependency
            }
            IntakeError::Internal => ErrorClass::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::OriginMismatch => StatusCode::FORBIDDEN,
            IntakeError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => match self.class() {
                ErrorClass::Client => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}
