//! Poll-until-available retrieval of published configuration
//!
//! [`PollFetcher::fetch`] keeps asking the store for a key until a value
//! appears. With the default policy there is no attempt limit and no
//! timeout: a key that is never published blocks the caller forever. Tests
//! and operator tooling bound the wait with a [`CancellationToken`] or
//! `max_attempts` instead.

use crate::common::{parse_duration, BackoffKind, ConfigKey, Error, PollConfig, Result};
use crate::store::client::ConfigStore;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between two attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * 2^(attempt-1)`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given (1-based) failed attempt
    pub fn delay(&self, attempt: u64) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31) as u32;
                initial.saturating_mul(1u32 << shift).min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub backoff: Backoff,
    /// Unbounded when `None`
    pub max_attempts: Option<u64>,
    /// Emit a warning every N failed attempts (0 disables)
    pub warn_every: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            max_attempts: None,
            warn_every: 30,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(interval),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn from_config(config: &PollConfig) -> Result<Self> {
        let interval = parse_duration(&config.interval)?;
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(interval),
            BackoffKind::Exponential => Backoff::Exponential {
                initial: interval,
                max: parse_duration(&config.max_interval)?,
            },
        };
        Ok(Self {
            backoff,
            max_attempts: config.max_attempts,
            warn_every: config.warn_every,
        })
    }
}

/// Blocking retrieval of store entries
pub struct PollFetcher<S> {
    store: S,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<S: ConfigStore> PollFetcher<S> {
    pub fn new(store: S, policy: PollPolicy) -> Self {
        Self {
            store,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort pending and future fetches when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Wait for `key` to be published and return its value.
    ///
    /// Absent keys and retryable store errors are retried; other errors are
    /// returned as-is.
    pub async fn fetch(&self, key: &str) -> Result<Bytes> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.store.get(key) => outcome,
            };

            match outcome {
                Ok(Some(value)) => {
                    tracing::debug!(key, attempt, bytes = value.len(), "fetched");
                    return Ok(value);
                }
                Ok(None) => tracing::debug!(key, attempt, "not published yet"),
                Err(e) if e.is_retryable() => {
                    tracing::debug!(key, attempt, error = %e, "store unavailable")
                }
                Err(e) => return Err(e),
            }

            if let Some(max) = self.policy.max_attempts {
                if attempt >= max {
                    return Err(Error::PollExhausted {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
            }
            if self.policy.warn_every > 0 && attempt % self.policy.warn_every == 0 {
                tracing::warn!(key, attempt, "still waiting for key to be published");
            }

            let delay = self.policy.backoff.delay(attempt);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    pub async fn fetch_key(&self, key: ConfigKey) -> Result<Bytes> {
        self.fetch(&key.to_string()).await
    }

    /// Fetch and decode a JSON document
    pub async fn fetch_json<T: DeserializeOwned>(&self, key: ConfigKey) -> Result<T> {
        let bytes = self.fetch_key(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
