use std::time::Duration;

/// Delays between remote calls during a sweep.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pacing {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Pacing {
    /// No waiting at all, for tests and one-off local runs.
    #[cfg(test)]
    pub const IMMEDIATE: Self = Self { base_delay: Duration::ZERO, max_delay: Duration::ZERO };

    pub const fn backoff(self) -> Backoff {
        Backoff { pacing: self, delay: self.base_delay }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5) }
    }
}

/// Adaptive delay: doubles on every failure up to the maximum and drops back on success.
#[derive(Copy, Clone, Debug)]
pub struct Backoff {
    pacing: Pacing,
    delay: Duration,
}

impl Backoff {
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    pub const fn on_success(&mut self) {
        self.delay = self.pacing.base_delay;
    }

    pub fn on_failure(&mut self) {
        self.delay = self.delay.saturating_mul(2).min(self.pacing.max_delay);
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
