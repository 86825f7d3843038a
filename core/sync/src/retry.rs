//! Backoff between attempts of a failing sync push.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use keyvault_common::{Error, Result};

/// How long to wait between attempts of a failing push.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Spread each delay over 75% to 125% of its nominal value.
    pub jitter: bool,
}

impl Backoff {
    /// Delay before retry number `retry` (zero-based). The nominal delay
    /// doubles with every retry up to `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);

        if self.jitter {
            nominal.mul_f64(rand::thread_rng().gen_range(0.75..=1.25))
        } else {
            nominal
        }
    }
}

/// Whether a failed push may succeed when attempted again.
pub fn is_transient(err: &Error) -> bool {
    matches!(err, Error::Network(_) | Error::Io(_))
}

/// Run `attempt` until it succeeds, fails permanently or runs out of
/// retries.
///
/// # Errors
/// - The first non-transient error, unchanged
/// - The last transient error once `max_retries` retries failed
pub async fn with_backoff<F, Fut, T>(backoff: &Backoff, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;

    loop {
        match attempt().await {
            Ok(value) => {
                if retries > 0 {
                    debug!(retries, "Push succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) if !is_transient(&err) => return Err(err),
            Err(err) if retries >= backoff.max_retries => {
                warn!(attempts = retries + 1, error = %err, "Push retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = backoff.delay(retries);
                retries += 1;
                warn!(retry = retries, error = %err, delay = ?delay, "Push failed, retrying");
                sleep(delay).await;
            }
        }
    }
}
