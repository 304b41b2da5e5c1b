use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::utils::error::{AppError, Result};

/// Enforces a minimum gap between consecutive requests from one collaborator.
///
/// The first request goes out immediately. Later requests wait until `delay`
/// has passed since the previous one, plus up to `jitter` of random slack.
pub struct RateLimiter {
    delay: Duration,
    jitter: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Self {
            delay,
            jitter,
            last_request: Mutex::new(None),
        }
    }

    /// Negative values count as zero. Values no `Duration` can hold are rejected.
    pub fn from_secs_f64(delay_secs: f64, jitter_secs: f64) -> Result<Self> {
        Ok(Self::new(
            to_duration("delay", delay_secs)?,
            to_duration("jitter", jitter_secs)?,
        ))
    }

    /// Wait for our turn, then record the request time. Returns the time slept.
    pub async fn acquire(&self) -> Duration {
        let mut last_request = self.last_request.lock().await;

        let mut slept = Duration::ZERO;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed + self.random_jitter();
                tracing::debug!("Rate limit: waiting {:.2}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
                slept = wait;
            }
        }

        *last_request = Some(Instant::now());
        slept
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.0..1.0);
        self.jitter.mul_f64(factor)
    }
}

fn to_duration(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|e| AppError::Validation(format!("Invalid rate limit {}: {} ({})", name, secs, e)))
}
