//! Retry policy for network-bound operations
//!
//! `RetryPolicy::execute` runs an async operation up to `max_retries` times
//! with capped exponential backoff and jitter. A `RetryCondition` decides
//! which failures are worth another attempt, and `RetryHook`s observe every
//! failed attempt (audit logging, credential rotation).

use crate::config::RetryConfig;
use crate::crawler::credentials::CredentialPool;
use crate::model::SourceType;
use crate::storage::AuditStore;
use crate::{HarvestError, Result};
use rand::Rng;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule and attempt bound
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_ratio: f64,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            multiplier,
            max_delay,
            jitter_ratio: 0.0,
            attempt_timeout: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter_ratio(config.jitter_ratio)
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Bounds every single attempt; an attempt that runs longer fails with
    /// a retryable `Timeout`
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay after failed attempt `failed_attempt` (1-based), before jitter
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let bound = delay.as_millis() as f64 * self.jitter_ratio;
        let extra = rand::thread_rng().gen_range(0.0..=bound);
        delay + Duration::from_millis(extra as u64)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// a hook refuses to continue, or `max_retries` attempts have been made
    ///
    /// The last error is returned unchanged when attempts run out.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        condition: &RetryCondition,
        hook: &dyn RetryHook,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            hook.before_attempt(attempt);

            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(HarvestError::Timeout {
                        operation: label.to_string(),
                    }),
                },
                None => operation().await,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            hook.on_retry(attempt, &error)?;

            if !condition.is_retryable(&error) {
                return Err(error);
            }

            if attempt >= self.max_retries {
                warn!(
                    "{} failed after {} attempts: {}",
                    label, self.max_retries, error
                );
                return Err(error);
            }

            let delay = self.jittered(self.backoff_delay(attempt));
            warn!(
                "{} attempt {}/{} failed: {}; retrying in {:?}",
                label, attempt, self.max_retries, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Which failures are retried, and which of those signal a rate limit
#[derive(Debug, Clone)]
pub struct RetryCondition {
    retryable_statuses: Vec<u16>,
    rate_limit_statuses: Vec<u16>,
    retry_network_errors: bool,
}

impl Default for RetryCondition {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryCondition {
    pub fn new(retryable_statuses: Vec<u16>, rate_limit_statuses: Vec<u16>) -> Self {
        Self {
            retryable_statuses,
            rate_limit_statuses,
            retry_network_errors: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.retryable_statuses.clone(),
            config.rate_limit_statuses.clone(),
        )
    }

    /// Never retry; every failure is returned after the first attempt
    pub fn never() -> Self {
        Self {
            retryable_statuses: Vec::new(),
            rate_limit_statuses: Vec::new(),
            retry_network_errors: false,
        }
    }

    pub fn is_retryable(&self, error: &HarvestError) -> bool {
        match error.status_code() {
            Some(status) => self.retryable_statuses.contains(&status),
            None => self.retry_network_errors && error.is_transient_network(),
        }
    }

    pub fn is_rate_limited(&self, error: &HarvestError) -> bool {
        error
            .status_code()
            .map(|s| self.rate_limit_statuses.contains(&s))
            .unwrap_or(false)
    }
}

/// Observer fired on every failed attempt, including the last one
///
/// Returning an error stops the retry loop and propagates that error.
pub trait RetryHook: Send + Sync {
    /// Called right before each attempt starts
    fn before_attempt(&self, _attempt: u32) {}

    fn on_retry(&self, attempt: u32, error: &HarvestError) -> Result<()>;
}

impl RetryHook for () {
    fn on_retry(&self, _attempt: u32, _error: &HarvestError) -> Result<()> {
        Ok(())
    }
}

impl<H: RetryHook> RetryHook for Option<H> {
    fn before_attempt(&self, attempt: u32) {
        if let Some(hook) = self {
            hook.before_attempt(attempt);
        }
    }

    fn on_retry(&self, attempt: u32, error: &HarvestError) -> Result<()> {
        match self {
            Some(hook) => hook.on_retry(attempt, error),
            None => Ok(()),
        }
    }
}

impl<A: RetryHook, B: RetryHook> RetryHook for (A, B) {
    fn before_attempt(&self, attempt: u32) {
        self.0.before_attempt(attempt);
        self.1.before_attempt(attempt);
    }

    fn on_retry(&self, attempt: u32, error: &HarvestError) -> Result<()> {
        self.0.on_retry(attempt, error)?;
        self.1.on_retry(attempt, error)
    }
}

/// Writes one audit error row per failed attempt
pub struct ErrorLogHook<'a> {
    audit: &'a dyn AuditStore,
    source: SourceType,
    location: &'a str,
}

impl<'a> ErrorLogHook<'a> {
    pub fn new(audit: &'a dyn AuditStore, source: SourceType, location: &'a str) -> Self {
        Self {
            audit,
            source,
            location,
        }
    }
}

impl RetryHook for ErrorLogHook<'_> {
    fn on_retry(&self, attempt: u32, error: &HarvestError) -> Result<()> {
        let message = format!("attempt {}: {}", attempt, error);
        if let Err(e) = self.audit.log_error(self.source, self.location, &message) {
            warn!("Could not write error log row for {}: {}", self.location, e);
        }
        Ok(())
    }
}

/// Advances the credential pool when an attempt hits a rate limit
///
/// The pool position is noted when each attempt starts, and only that
/// credential is rotated away from.
pub struct CredentialRotation<'a> {
    pool: &'a CredentialPool,
    condition: &'a RetryCondition,
    used: Mutex<Option<usize>>,
}

impl<'a> CredentialRotation<'a> {
    pub fn new(pool: &'a CredentialPool, condition: &'a RetryCondition) -> Self {
        Self {
            pool,
            condition,
            used: Mutex::new(None),
        }
    }
}

impl RetryHook for CredentialRotation<'_> {
    fn before_attempt(&self, _attempt: u32) {
        *self.used.lock().unwrap_or_else(PoisonError::into_inner) = Some(self.pool.position());
    }

    fn on_retry(&self, _attempt: u32, error: &HarvestError) -> Result<()> {
        if self.condition.is_rate_limited(error) {
            let used = self
                .used
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unwrap_or_else(|| self.pool.position());
            self.pool.rotate_from(used)?;
        }
        Ok(())
    }
}
