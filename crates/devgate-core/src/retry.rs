//! Retrying transient backend failures.
//!
//! A session runs the backend link step of `connect` through [`with_retry`].
//! Only [`Error::Backend`](crate::Error::Backend) failures whose [`BackendError`](crate::BackendError)
//! is transient are retried; everything a caller did wrong fails at once.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use devgate_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryConfig::new(3).initial_delay(Duration::from_millis(200));
//! let linked = with_retry(&policy, "connect", || async { Ok::<_, Error>(true) }).await?;
//! assert!(linked);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Result;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for a single delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor applied to the delay after every retry.
    pub backoff_multiplier: f64,
    /// Stretch each delay by up to a quarter at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self::default().max_retries(max_retries)
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Backoff for establishing a BLE link.
    ///
    /// Peripherals that advertise slowly may need several seconds before
    /// they accept a connection.
    pub fn for_connect() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Two quick retries without jitter.
    pub fn quick() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delays slept between attempts, one per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let cap = self.max_delay.as_secs_f64();
        (0..self.max_retries).map(move |retry| {
            let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
            let base = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
                .min(cap);
            let stretch = if self.jitter {
                1.0 + rand::rng().random_range(0.0..0.25)
            } else {
                1.0
            };
            Duration::from_secs_f64(base * stretch)
        })
    }
}

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
///
/// Returns the last error when every attempt failed.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, attempt: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = config.delays();
    let mut retries = 0u32;

    loop {
        let error = match attempt().await {
            Ok(value) => {
                if retries > 0 {
                    debug!(operation, retries, "Backend call recovered");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            return Err(error);
        }
        let Some(delay) = delays.next() else {
            return Err(error);
        };

        retries += 1;
        warn!(
            operation,
            retry = retries,
            max_retries = config.max_retries,
            error = %error,
            ?delay,
            "Transient backend failure, retrying"
        );
        sleep(delay).await;
    }
}
