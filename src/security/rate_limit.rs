//! Fixed-window rate limiting per client identity.
//!
//! Two backings implement [`RateLimiter`]: an in-process window table and
//! Upstash Redis over REST. [`RateLimitGate`] wraps whichever one the config
//! selects, or records that none is available and what the policy is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{IntakeConfig, RateLimitBackend, RateLimitConfig, Secret, UnavailablePolicy};
use crate::intake::error::IntakeError;
use crate::observability::metrics;
use crate::resilience::call_with_deadline;

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Hits recorded for the key in the current window, this one included.
    pub count: u64,
}

/// Errors from a rate limiter backing service.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("limiter returned HTTP {0}")]
    Status(u16),

    #[error("unexpected limiter response: {0}")]
    Protocol(String),
}

/// A fixed-window counter service.
pub trait RateLimiter: Send + Sync {
    /// Count one hit for `key` and report whether it fits the quota.
    fn check_and_increment<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<RateDecision, LimiterError>>;

    /// Short backing name for logs.
    fn name(&self) -> &'static str;
}

struct Window {
    started: Instant,
    count: u64,
}

/// In-process fixed window counters keyed by client identity.
///
/// Each key's window opens on its first hit and resets once `window` has
/// elapsed. Counters live in memory and reset on restart.
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    max_requests: u64,
    window: Duration,
    sweep_threshold: usize,
    last_sweep: Mutex<Instant>,
    sweeps: AtomicU64,
}

/// Expired windows are swept once the table grows past this many keys,
/// at most once per window.
const SWEEP_THRESHOLD: usize = 10_000;

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: u64::from(max_requests),
            window,
            sweep_threshold: SWEEP_THRESHOLD,
            last_sweep: Mutex::new(Instant::now()),
            sweeps: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Drop expired windows. Concurrent callers skip rather than wait.
    fn sweep_expired(&self, now: Instant) {
        if self.windows.len() <= self.sweep_threshold {
            return;
        }
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < self.window {
            return;
        }
        *last = now;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        self.sweep_expired(now);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        entry.count += 1;
        RateDecision {
            allowed: entry.count <= self.max_requests,
            count: entry.count,
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Number of expiry sweeps run so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_and_increment<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<RateDecision, LimiterError>> {
        Box::pin(async move { Ok(self.check(key)) })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// INCR the window key and set its expiry on the first hit.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window = ARGV[1]
local r = redis.call("INCR", key)
if r == 1 then
  redis.call("PEXPIRE", key, window)
end
return r
"#;

#[derive(Debug, Deserialize)]
struct UpstashReply {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Fixed window limiter backed by Upstash Redis through its REST API.
///
/// Windows are aligned to the epoch: the key is `prefix:identifier:index`
/// with `index = now_ms / window_ms`.
pub struct UpstashLimiter {
    client: reqwest::Client,
    endpoint: String,
    token: Secret,
    prefix: String,
    max_requests: u64,
    window_ms: u64,
}

impl UpstashLimiter {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: Secret,
        config: &RateLimitConfig,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
            prefix: config.prefix.clone(),
            max_requests: u64::from(config.max_requests),
            window_ms: config.window_secs.saturating_mul(1000).max(1),
        }
    }

    fn window_key(&self, identifier: &str) -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        format!("{}:{}:{}", self.prefix, identifier, now_ms / self.window_ms)
    }

    async fn incr(&self, identifier: &str) -> Result<RateDecision, LimiterError> {
        let command = serde_json::json!([
            "EVAL",
            FIXED_WINDOW_SCRIPT,
            "1",
            self.window_key(identifier),
            self.window_ms.to_string(),
        ]);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .json(&command)
            .send()
            .await
            .map_err(|e| LimiterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LimiterError::Status(status.as_u16()));
        }

        let reply: UpstashReply = response
            .json()
            .await
            .map_err(|e| LimiterError::Protocol(e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(LimiterError::Protocol(error));
        }

        let count = reply
            .result
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| LimiterError::Protocol(format!("non-integer result {:?}", reply.result)))?;

        Ok(RateDecision {
            allowed: count <= self.max_requests,
            count,
        })
    }
}

impl RateLimiter for UpstashLimiter {
    fn check_and_increment<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<RateDecision, LimiterError>> {
        Box::pin(self.incr(key))
    }

    fn name(&self) -> &'static str {
        "upstash"
    }
}

/// Rate limiting capability, chosen once at startup.
#[derive(Clone)]
pub enum RateLimitGate {
    /// A backing is configured; every submission is counted.
    Enforced(Arc<dyn RateLimiter>),
    /// No backing and the policy is fail-open.
    Disabled,
    /// No backing and the policy is fail-closed.
    Misconfigured,
}

impl std::fmt::Debug for RateLimitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitGate::Enforced(l) => write!(f, "Enforced({})", l.name()),
            RateLimitGate::Disabled => f.write_str("Disabled"),
            RateLimitGate::Misconfigured => f.write_str("Misconfigured"),
        }
    }
}

impl RateLimitGate {
    /// Select the gate for this deployment.
    pub fn from_config(config: &IntakeConfig, client: reqwest::Client) -> Self {
        let rl = &config.rate_limit;

        let limiter: Option<Arc<dyn RateLimiter>> = match rl.backend {
            RateLimitBackend::Memory => Some(Arc::new(FixedWindowLimiter::new(
                rl.max_requests,
                Duration::from_secs(rl.window_secs),
            ))),
            RateLimitBackend::Upstash => match (&rl.upstash_url, &rl.upstash_token) {
                (Some(url), Some(token)) => Some(Arc::new(UpstashLimiter::new(
                    client,
                    url.clone(),
                    token.clone(),
                    rl,
                ))),
                _ => None,
            },
            RateLimitBackend::None => None,
        };

        if let Some(limiter) = limiter {
            tracing::info!(
                backend = limiter.name(),
                max_requests = rl.max_requests,
                window_secs = rl.window_secs,
                "Rate limiting enforced"
            );
            return RateLimitGate::Enforced(limiter);
        }

        match rl.effective_policy(config.profile) {
            UnavailablePolicy::FailOpen => {
                tracing::warn!("RATE_LIMIT_DISABLED: no limiter configured, submissions are unthrottled");
                RateLimitGate::Disabled
            }
            UnavailablePolicy::FailClosed => {
                tracing::error!("No limiter configured and policy is fail-closed; submissions will be refused");
                RateLimitGate::Misconfigured
            }
        }
    }

    /// Admit one submission for `key` or fail the request.
    pub async fn admit(&self, key: &str, deadline: Duration) -> Result<(), IntakeError> {
        let limiter = match self {
            RateLimitGate::Disabled => return Ok(()),
            RateLimitGate::Misconfigured => {
                return Err(IntakeError::Misconfigured {
                    reason: "rate_limiter_unconfigured",
                })
            }
            RateLimitGate::Enforced(limiter) => limiter,
        };

        match call_with_deadline("rate_limit", deadline, limiter.check_and_increment(key)).await {
            Ok(decision) if decision.allowed => Ok(()),
            Ok(decision) => {
                metrics::record_rate_limited(limiter.name());
                tracing::warn!(count = decision.count, "Rate limit exceeded");
                Err(IntakeError::RateLimited)
            }
            Err(failure) => {
                tracing::error!(backend = limiter.name(), error = %failure, "Rate limiter call failed");
                Err(IntakeError::RateLimiterUnavailable {
                    detail: failure.to_string(),
                })
            }
        }
    }
}
