//! Submission pipeline.
//!
//! ```text
//! RECEIVED → origin → parse/validate → honeypot → client signals
//!          → rate limit → bot verification → upsert → PERSISTED
//! ```
//!
//! Stages run strictly in order and the first failure ends the request.
//! A filled honeypot ends it early with a success that stores nothing and
//! consumes no rate-limit quota.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::HeaderMap;

use crate::config::IntakeConfig;
use crate::intake::error::{ErrorClass, IntakeError};
use crate::intake::origin::check_origin;
use crate::intake::signals::IpHasher;
use crate::intake::submission::SubmissionValidator;
use crate::observability::metrics;
use crate::resilience::{call_with_deadline, StageFailure};
use crate::security::{BotVerificationGate, RateLimitGate};
use crate::storage::{StoreError, UpsertOutcome, WaitlistStore, WaitlistUpdate};

/// A submission the caller should see as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    Persisted(UpsertOutcome),
    /// Honeypot filled: acknowledged, never stored.
    HoneypotDiscarded,
}

impl Accepted {
    pub fn outcome(&self) -> &'static str {
        match self {
            Accepted::Persisted(outcome) => outcome.as_str(),
            Accepted::HoneypotDiscarded => "honeypot",
        }
    }
}

/// Everything a submission needs, built once at startup and shared.
pub struct IntakePipeline {
    validator: SubmissionValidator,
    ip_hasher: IpHasher,
    rate_limit: RateLimitGate,
    bot_verification: BotVerificationGate,
    store: Arc<dyn WaitlistStore>,
    external_deadline: Duration,
    max_body_bytes: usize,
}

impl IntakePipeline {
    /// Assemble a pipeline from explicit gates and store.
    pub fn new(
        config: &IntakeConfig,
        rate_limit: RateLimitGate,
        bot_verification: BotVerificationGate,
        store: Arc<dyn WaitlistStore>,
    ) -> Self {
        tracing::info!(
            profile = config.profile.as_str(),
            rate_limit = ?rate_limit,
            bot_verification = ?bot_verification,
            store = store.backend_name(),
            "Intake pipeline assembled"
        );

        Self {
            validator: SubmissionValidator::new(&config.submission),
            ip_hasher: IpHasher::from_config(config),
            rate_limit,
            bot_verification,
            store,
            external_deadline: Duration::from_millis(config.timeouts.external_call_ms),
            max_body_bytes: config.listener.max_body_bytes,
        }
    }

    /// Build both gates from config, sharing one outbound HTTP client.
    pub fn from_config(
        config: &IntakeConfig,
        store: Arc<dyn WaitlistStore>,
        client: reqwest::Client,
    ) -> Self {
        let rate_limit = RateLimitGate::from_config(config, client.clone());
        let bot_verification = BotVerificationGate::from_config(config, client);
        Self::new(config, rate_limit, bot_verification, store)
    }

    /// Run one submission through every stage.
    pub async fn submit(&self, headers: &HeaderMap, body: Body) -> Result<Accepted, IntakeError> {
        let result = self.run(headers, body).await;

        match &result {
            Ok(accepted) => metrics::record_submission(accepted.outcome()),
            Err(e) => {
                metrics::record_submission(e.code());
                let class = e.class();
                match class {
                    ErrorClass::Client | ErrorClass::Policy => {
                        tracing::warn!(code = e.code(), class = class.as_str(), "Submission rejected")
                    }
                    ErrorClass::Configuration | ErrorClass::Dependency | ErrorClass::Internal => {
                        tracing::error!(
                            code = e.code(),
                            class = class.as_str(),
                            error = ?e,
                            "Submission failed"
                        )
                    }
                }
            }
        }

        result
    }

    async fn run(&self, headers: &HeaderMap, body: Body) -> Result<Accepted, IntakeError> {
        check_origin(headers)?;

        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| IntakeError::MalformedPayload)?;
        let submission = self.validator.parse(&bytes)?;

        if submission.honeypot_triggered() {
            metrics::record_honeypot();
            tracing::info!("Honeypot filled, discarding submission");
            return Ok(Accepted::HoneypotDiscarded);
        }

        let signals = self.ip_hasher.collect(headers)?;

        self.rate_limit
            .admit(signals.rate_key(), self.external_deadline)
            .await?;

        self.bot_verification
            .check(
                submission.bot_token.as_deref(),
                signals.client_ip.as_deref(),
                self.external_deadline,
            )
            .await?;

        let mut entry = submission.entry;
        entry.ip_hash = signals.ip_hash;
        let update = WaitlistUpdate::from_entry(&entry);

        let outcome = call_with_deadline(
            "store",
            self.external_deadline,
            self.store.upsert(&entry.email, &update),
        )
        .await
        .map_err(store_failure)?;

        tracing::info!(
            email_domain = entry.email.rsplit('@').next().unwrap_or_default(),
            outcome = outcome.as_str(),
            "Waitlist entry stored"
        );

        Ok(Accepted::Persisted(outcome))
    }

    pub fn store(&self) -> &Arc<dyn WaitlistStore> {
        &self.store
    }
}

fn store_failure(failure: StageFailure<StoreError>) -> IntakeError {
    match failure {
        StageFailure::Failed(StoreError::NotConfigured) => IntakeError::DbNotConfigured,
        other => IntakeError::Db {
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Profile, Secret};
    use crate::security::{
        BotVerifier, FixedWindowLimiter, LimiterError, RateDecision, RateLimiter, VerifierError,
    };
    use crate::storage::{MemoryStore, UnconfiguredStore};
    use axum::http::{header, HeaderValue};
    use futures_util::future::BoxFuture;

    /// Store whose backend rejects every write.
    struct BrokenStore;

    impl WaitlistStore for BrokenStore {
        fn upsert<'a>(
            &'a self,
            _email: &'a str,
            _update: &'a WaitlistUpdate,
        ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
            Box::pin(async { Err(StoreError::Backend("connection reset".into())) })
        }

        fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Backend("connection reset".into())) })
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    /// Store that answers long after any sane deadline.
    struct SlowStore;

    impl WaitlistStore for SlowStore {
        fn upsert<'a>(
            &'a self,
            _email: &'a str,
            _update: &'a WaitlistUpdate,
        ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(UpsertOutcome::Inserted)
            })
        }

        fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async { Ok(()) })
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    struct HangingLimiter;

    impl RateLimiter for HangingLimiter {
        fn check_and_increment<'a>(
            &'a self,
            _key: &'a str,
        ) -> BoxFuture<'a, Result<RateDecision, LimiterError>> {
            Box::pin(std::future::pending())
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    struct HangingVerifier;

    impl BotVerifier for HangingVerifier {
        fn verify<'a>(
            &'a self,
            _token: &'a str,
            _remote_ip: Option<&'a str>,
        ) -> BoxFuture<'a, Result<bool, VerifierError>> {
            Box::pin(std::future::pending())
        }
    }

    /// Salted config with a 50 ms deadline on every external call.
    fn fast_deadline_config() -> IntakeConfig {
        let mut config = config();
        config.timeouts.external_call_ms = 50;
        config
    }

    fn config() -> IntakeConfig {
        let mut config = IntakeConfig::default();
        config.abuse.ip_hash_salt = Some(Secret::new("pepper"));
        config
    }

    fn pipeline(config: &IntakeConfig, store: Arc<dyn WaitlistStore>) -> IntakePipeline {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        IntakePipeline::new(
            config,
            RateLimitGate::Enforced(Arc::new(limiter)),
            BotVerificationGate::Disabled,
            store,
        )
    }

    fn headers(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    fn body(json: &str) -> Body {
        Body::from(json.to_string())
    }

    #[tokio::test]
    async fn test_stores_normalized_entry_with_ip_hash() {
        let store = MemoryStore::new(None);
        let pipeline = pipeline(&config(), Arc::new(store.clone()));

        let accepted = pipeline
            .submit(&headers("203.0.113.9"), body(r#"{"email":"  Foo@Example.COM ","name":"Ana"}"#))
            .await
            .unwrap();
        assert_eq!(accepted, Accepted::Persisted(UpsertOutcome::Inserted));

        let record = store.get("foo@example.com").unwrap();
        assert_eq!(record.name.as_deref(), Some("Ana"));
        let hash = record.ip_hash.unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_honeypot_skips_storage_and_quota() {
        let store = MemoryStore::new(None);
        let pipeline = pipeline(&config(), Arc::new(store.clone()));

        for _ in 0..10 {
            let accepted = pipeline
                .submit(&headers("198.51.100.1"), body(r#"{"email":"a@b.co","website":"x"}"#))
                .await
                .unwrap();
            assert_eq!(accepted, Accepted::HoneypotDiscarded);
        }
        assert!(store.is_empty());

        // Quota is untouched, so a real submission from the same client passes.
        assert!(pipeline
            .submit(&headers("198.51.100.1"), body(r#"{"email":"a@b.co"}"#))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_origin_checked_before_payload() {
        let pipeline = pipeline(&config(), Arc::new(MemoryStore::new(None)));
        let mut headers = headers("198.51.100.2");
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        headers.insert(header::HOST, HeaderValue::from_static("launch.example.com"));

        let err = pipeline
            .submit(&headers, body(r#"{"email":"not-an-email"}"#))
            .await
            .unwrap_err();
        assert_eq!(err, IntakeError::OriginMismatch);
        assert_eq!(err.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn test_sixth_request_is_rate_limited() {
        let pipeline = pipeline(&config(), Arc::new(MemoryStore::new(None)));

        for i in 0..5 {
            let json = format!(r#"{{"email":"user{}@b.co"}}"#, i);
            assert!(pipeline.submit(&headers("192.0.2.7"), body(&json)).await.is_ok());
        }
        let err = pipeline
            .submit(&headers("192.0.2.7"), body(r#"{"email":"user5@b.co"}"#))
            .await
            .unwrap_err();
        assert_eq!(err, IntakeError::RateLimited);

        assert!(pipeline
            .submit(&headers("192.0.2.8"), body(r#"{"email":"user5@b.co"}"#))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_salt_in_production_refuses() {
        let mut config = IntakeConfig::default();
        config.profile = Profile::Production;
        let store = MemoryStore::new(None);
        let pipeline = pipeline(&config, Arc::new(store.clone()));

        let err = pipeline
            .submit(&headers("192.0.2.1"), body(r#"{"email":"a@b.co"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVER_MISCONFIGURED");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_store() {
        let pipeline = pipeline(&config(), Arc::new(UnconfiguredStore));
        let err = pipeline
            .submit(&headers("192.0.2.1"), body(r#"{"email":"a@b.co"}"#))
            .await
            .unwrap_err();
        assert_eq!(err, IntakeError::DbNotConfigured);
    }

    #[tokio::test]
    async fn test_oversized_body_is_malformed() {
        let mut config = config();
        config.listener.max_body_bytes = 32;
        let pipeline = pipeline(&config, Arc::new(MemoryStore::new(None)));

        let json = format!(r#"{{"email":"a@b.co","name":"{}"}}"#, "x".repeat(64));
        let err = pipeline.submit(&headers("192.0.2.1"), body(&json)).await.unwrap_err();
        assert_eq!(err, IntakeError::MalformedPayload);
    }

    #[tokio::test]
    async fn test_store_backend_error_is_db_error() {
        let pipeline = pipeline(&fast_deadline_config(), Arc::new(BrokenStore));

        let err = pipeline
            .submit(&headers("192.0.2.20"), body(r#"{"email":"a@b.co"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DB_ERROR");
        assert_eq!(err.status().as_u16(), 500);
        assert_eq!(err.class(), ErrorClass::Dependency);
    }

    #[tokio::test]
    async fn test_slow_store_times_out_as_db_error() {
        let pipeline = pipeline(&fast_deadline_config(), Arc::new(SlowStore));

        let started = std::time::Instant::now();
        let err = pipeline
            .submit(&headers("192.0.2.21"), body(r#"{"email":"a@b.co"}"#))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(err.code(), "DB_ERROR");
        assert_eq!(err.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_hanging_limiter_is_unavailable() {
        let store = MemoryStore::new(None);
        let pipeline = IntakePipeline::new(
            &fast_deadline_config(),
            RateLimitGate::Enforced(Arc::new(HangingLimiter)),
            BotVerificationGate::Disabled,
            Arc::new(store.clone()),
        );

        let err = pipeline
            .submit(&headers("192.0.2.22"), body(r#"{"email":"a@b.co"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITER_UNAVAILABLE");
        assert_eq!(err.status().as_u16(), 500);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_hanging_verifier_fails_verification() {
        let store = MemoryStore::new(None);
        let pipeline = IntakePipeline::new(
            &fast_deadline_config(),
            RateLimitGate::Enforced(Arc::new(FixedWindowLimiter::new(5, Duration::from_secs(60)))),
            BotVerificationGate::Enforced {
                verifier: Arc::new(HangingVerifier),
                required: true,
            },
            Arc::new(store.clone()),
        );

        let err = pipeline
            .submit(
                &headers("192.0.2.23"),
                body(r#"{"email":"a@b.co","turnstileToken":"tok"}"#),
            )
            .await
            .unwrap_err();
        assert_eq!(err, IntakeError::BotVerificationFailed);
        assert_eq!(err.status().as_u16(), 400);
        assert!(store.is_empty());
    }
}
