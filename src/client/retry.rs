use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use rand::Rng;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_MIN_WAIT_SECS: u64 = 2;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 10;

/// The wait before attempt `n + 1` is drawn uniformly from
/// `[min_wait, ceiling(n)]` where `ceiling(n) = clamp(2^(n-1) s, min_wait, max_wait)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_wait: Duration::from_secs(DEFAULT_MIN_WAIT_SECS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Result<Self> {
        if max_attempts == 0 {
            bail!("max attempts must be at least 1");
        }
        if min_wait > max_wait {
            bail!(
                "minimum backoff ({}s) exceeds maximum backoff ({}s)",
                min_wait.as_secs_f64(),
                max_wait.as_secs_f64()
            );
        }

        Ok(Self {
            max_attempts,
            min_wait,
            max_wait,
        })
    }

    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let raw = Duration::from_secs(1_u64 << exponent);
        raw.min(self.max_wait).max(self.min_wait)
    }

    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let floor = whole_millis(self.min_wait);
        let ceiling = whole_millis(self.backoff_ceiling(attempt));
        if ceiling <= floor {
            return self.min_wait;
        }
        Duration::from_millis(rng.gen_range(floor..=ceiling))
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retries exhausted after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

pub fn retry<T, E, F>(policy: &RetryPolicy, op: F) -> Result<T, RetryExhausted<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    retry_with(policy, &mut rand::thread_rng(), thread::sleep, op)
}

/// `op` receives the 1-based attempt number. No sleep follows the final attempt.
pub fn retry_with<T, E, F, R, S>(
    policy: &RetryPolicy,
    rng: &mut R,
    mut sleep: S,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
    R: Rng + ?Sized,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.backoff_delay(attempt, rng);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                sleep(delay);
                attempt += 1;
            }
        }
    }
}
