use std::time::Duration;

/// Delays before reconnect attempts 1, 2, 3 and 4+.
pub const RECONNECT_DELAYS: [Duration; 4] = [
    Duration::from_secs(3),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(150),
];

/// Reconnect schedule keyed by attempt number. The last step repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    steps: Vec<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: RECONNECT_DELAYS.to_vec(),
        }
    }
}

impl Backoff {
    /// An empty schedule means reconnect immediately.
    pub fn from_steps(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.steps.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempt.saturating_sub(1) as usize).min(last);
        self.steps[index]
    }
}

/// First heartbeat fires one full interval after HELLO.
pub fn heartbeat_timer(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}
