use {
    std::time::Duration,
    tokio::time::{Instant, sleep_until},
};

/// Spaces out requests so that at most one starts per `interval`, measured
/// from the start of the previous request.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: None,
        }
    }

    /// Waits until the next request may start and records that it did.
    pub async fn wait(&mut self) {
        if let Some(last_start) = self.last_start {
            sleep_until(last_start + self.interval).await;
        }
        self.last_start = Some(Instant::now());
    }
}

/// Exponential backoff between retries of the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `retry`, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
