use std::time::Duration;

/// Delay applied between a hard failure and the next connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay after every failure.
    Fixed { delay_ms: u64 },
    /// Doubles per consecutive failed attempt, capped at `max_delay_ms`.
    Exponential { base_delay_ms: u64, max_delay_ms: u64 },
}

impl ReconnectPolicy {
    pub fn fixed(delay_ms: u64) -> Self {
        Self::Fixed { delay_ms }
    }

    pub fn exponential(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::Exponential {
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based, reset on `Connected`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                base_delay_ms,
                max_delay_ms,
            } => {
                let shift = attempt.min(20);
                let multiplier = 1_u64 << shift;
                let calculated = base_delay_ms.saturating_mul(multiplier);
                Duration::from_millis(calculated.min(max_delay_ms))
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(5_000)
    }
}
