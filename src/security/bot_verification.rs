//! Bot verification against a challenge service (Cloudflare Turnstile protocol).

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{BotVerificationMode, IntakeConfig, Secret};
use crate::intake::error::IntakeError;
use crate::resilience::call_with_deadline;

/// Errors talking to the verification service.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("verifier returned HTTP {0}")]
    Status(u16),

    #[error("undecodable verifier response: {0}")]
    Decode(String),
}

/// Server-side check of a client challenge token.
pub trait BotVerifier: Send + Sync {
    /// Returns whether the service accepted the token.
    fn verify<'a>(
        &'a self,
        token: &'a str,
        remote_ip: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, VerifierError>>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// `siteverify` client: form-encoded POST of secret, token and optional IP.
pub struct SiteVerifyClient {
    client: reqwest::Client,
    verify_url: String,
    secret: Secret,
}

impl SiteVerifyClient {
    pub fn new(client: reqwest::Client, verify_url: impl Into<String>, secret: Secret) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
            secret,
        }
    }

    async fn siteverify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, VerifierError> {
        let mut form = vec![
            ("secret", self.secret.expose_secret()),
            ("response", token),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifierError::Status(status.as_u16()));
        }

        let body: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifierError::Decode(e.to_string()))?;

        if !body.success {
            tracing::debug!(error_codes = ?body.error_codes, "Challenge token rejected");
        }
        Ok(body.success)
    }
}

impl BotVerifier for SiteVerifyClient {
    fn verify<'a>(
        &'a self,
        token: &'a str,
        remote_ip: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, VerifierError>> {
        Box::pin(self.siteverify(token, remote_ip))
    }
}

/// Bot verification capability, chosen once at startup.
#[derive(Clone)]
pub enum BotVerificationGate {
    /// Tokens are checked. With `required`, a missing token fails the request.
    Enforced {
        verifier: Arc<dyn BotVerifier>,
        required: bool,
    },
    /// Tokens are ignored.
    Disabled,
    /// Verification is required but no secret is configured.
    Misconfigured,
}

impl std::fmt::Debug for BotVerificationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotVerificationGate::Enforced { required, .. } => {
                write!(f, "Enforced {{ required: {} }}", required)
            }
            BotVerificationGate::Disabled => f.write_str("Disabled"),
            BotVerificationGate::Misconfigured => f.write_str("Misconfigured"),
        }
    }
}

impl BotVerificationGate {
    pub fn from_config(config: &IntakeConfig, client: reqwest::Client) -> Self {
        let bv = &config.bot_verification;
        let verifier = |secret: &Secret| -> Arc<dyn BotVerifier> {
            Arc::new(SiteVerifyClient::new(client.clone(), bv.verify_url.clone(), secret.clone()))
        };

        match (bv.mode, &bv.secret) {
            (BotVerificationMode::Off, _) => BotVerificationGate::Disabled,
            (BotVerificationMode::Optional, Some(secret)) => BotVerificationGate::Enforced {
                verifier: verifier(secret),
                required: false,
            },
            (BotVerificationMode::Optional, None) => {
                tracing::warn!("Bot verification is optional but no secret is set; tokens will be ignored");
                BotVerificationGate::Disabled
            }
            (BotVerificationMode::Required, Some(secret)) => BotVerificationGate::Enforced {
                verifier: verifier(secret),
                required: true,
            },
            (BotVerificationMode::Required, None) => {
                tracing::error!("Bot verification is required but TURNSTILE_SECRET_KEY is not set");
                BotVerificationGate::Misconfigured
            }
        }
    }

    /// Check the submission's token, if this deployment asks for one.
    pub async fn check(
        &self,
        token: Option<&str>,
        remote_ip: Option<&str>,
        deadline: Duration,
    ) -> Result<(), IntakeError> {
        let (verifier, required) = match self {
            BotVerificationGate::Disabled => return Ok(()),
            BotVerificationGate::Misconfigured => {
                return Err(IntakeError::Misconfigured {
                    reason: "bot_verification_secret_missing",
                })
            }
            BotVerificationGate::Enforced { verifier, required } => (verifier, *required),
        };

        let Some(token) = token else {
            if required {
                tracing::warn!("Submission without bot verification token");
                return Err(IntakeError::BotVerificationFailed);
            }
            return Ok(());
        };

        match call_with_deadline("bot_verification", deadline, verifier.verify(token, remote_ip)).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("Bot verification rejected the token");
                Err(IntakeError::BotVerificationFailed)
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "Bot verification service unavailable");
                Err(IntakeError::BotVerificationFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<bool, &'static str>);

    impl BotVerifier for Fixed {
        fn verify<'a>(
            &'a self,
            _token: &'a str,
            _remote_ip: Option<&'a str>,
        ) -> BoxFuture<'a, Result<bool, VerifierError>> {
            let result = self.0.map_err(|e| VerifierError::Transport(e.to_string()));
            Box::pin(async move { result })
        }
    }

    fn enforced(result: Result<bool, &'static str>, required: bool) -> BotVerificationGate {
        BotVerificationGate::Enforced {
            verifier: Arc::new(Fixed(result)),
            required,
        }
    }

    const DEADLINE: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_required_gate() {
        let gate = enforced(Ok(true), true);
        assert!(gate.check(Some("tok"), None, DEADLINE).await.is_ok());
        assert_eq!(
            gate.check(None, None, DEADLINE).await.unwrap_err(),
            IntakeError::BotVerificationFailed
        );

        let gate = enforced(Ok(false), true);
        assert_eq!(
            gate.check(Some("tok"), Some("1.2.3.4"), DEADLINE).await.unwrap_err(),
            IntakeError::BotVerificationFailed
        );
    }

    #[tokio::test]
    async fn test_service_failure_is_client_failure() {
        let gate = enforced(Err("connection refused"), true);
        let err = gate.check(Some("tok"), None, DEADLINE).await.unwrap_err();
        assert_eq!(err.code(), "BOT_VERIFICATION_FAILED");
        assert_eq!(err.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_optional_gate_allows_missing_token() {
        let gate = enforced(Ok(false), false);
        assert!(gate.check(None, None, DEADLINE).await.is_ok());
        assert!(gate.check(Some("tok"), None, DEADLINE).await.is_err());
    }

    #[tokio::test]
    async fn test_misconfigured_is_server_error() {
        let err = BotVerificationGate::Misconfigured
            .check(Some("tok"), None, DEADLINE)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVER_MISCONFIGURED");
        assert!(BotVerificationGate::Disabled.check(None, None, DEADLINE).await.is_ok());
    }

    #[test]
    fn test_gate_selection() {
        let client = reqwest::Client::new();
        let mut config = IntakeConfig::default();
        assert!(matches!(
            BotVerificationGate::from_config(&config, client.clone()),
            BotVerificationGate::Disabled
        ));

        config.bot_verification.mode = BotVerificationMode::Required;
        assert!(matches!(
            BotVerificationGate::from_config(&config, client.clone()),
            BotVerificationGate::Misconfigured
        ));

        config.bot_verification.secret = Some(Secret::new("s"));
        assert!(matches!(
            BotVerificationGate::from_config(&config, client.clone()),
            BotVerificationGate::Enforced { required: true, .. }
        ));

        config.bot_verification.mode = BotVerificationMode::Optional;
        assert!(matches!(
            BotVerificationGate::from_config(&config, client),
            BotVerificationGate::Enforced { required: false, .. }
        ));
    }
}
