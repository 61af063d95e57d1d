use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::types::{RegistryError, Result};

/// Classification of one read-modify-write attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The attempt committed.
    Success(T),
    /// Another writer won the compare-and-swap; re-running may succeed.
    Conflict(RegistryError),
    /// Anything else; re-running cannot help.
    Fatal(RegistryError),
}

impl<T> From<Result<T>> for Attempt<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(err) if err.is_conflict() => Attempt::Conflict(err),
            Err(err) => Attempt::Fatal(err),
        }
    }
}

/// Bounded retry driver for registry commits.
///
/// Re-runs the whole operation, including its initial read, each time it
/// reports [`RegistryError::Conflict`]. Any other error is returned at once.
#[derive(Clone, Debug)]
pub struct UpdateRetryer {
    retries: u32,
    backoff: Duration,
}

impl UpdateRetryer {
    /// Attempt bound used when none is configured.
    pub const DEFAULT_RETRIES: u32 = 3;

    /// Creates a retryer making at most `retries` attempts.
    ///
    /// Zero is rejected: such a retryer could never produce a result.
    pub fn new(retries: u32) -> Result<Self> {
        if retries == 0 {
            return Err(RegistryError::Configuration(
                "retries must be at least 1".into(),
            ));
        }
        Ok(Self {
            retries,
            backoff: Duration::ZERO,
        })
    }

    /// Sleeps `backoff * attempt` plus up to `backoff` of jitter between
    /// attempts. Zero (the default) retries immediately.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Maximum number of attempts.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Base pause between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Runs `op` until it succeeds, fails with a non-conflict error, or the
    /// attempt bound is reached, in which case the last conflict is returned.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut last_conflict = None;
        for attempt in 1..=self.retries {
            match Attempt::from(op()) {
                Attempt::Success(value) => {
                    if attempt > 1 {
                        debug!(attempt, "registry.retry.converged");
                    }
                    return Ok(value);
                }
                Attempt::Fatal(err) => return Err(err),
                Attempt::Conflict(err) => {
                    warn!(attempt, retries = self.retries, error = %err, "registry.retry.conflict");
                    last_conflict = Some(err);
                    if attempt < self.retries {
                        self.pause(attempt);
                    }
                }
            }
        }
        Err(last_conflict.unwrap_or_else(|| {
            RegistryError::Configuration("retry loop made no attempts".into())
        }))
    }

    fn pause(&self, attempt: u32) {
        if self.backoff.is_zero() {
            return;
        }
        let max_jitter = u64::try_from(self.backoff.as_micros()).unwrap_or(u64::MAX);
        let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..=max_jitter));
        thread::sleep(self.backoff.saturating_mul(attempt).saturating_add(jitter));
    }
}

impl Default for UpdateRetryer {
    fn default() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            backoff: Duration::ZERO,
        }
    }
}
