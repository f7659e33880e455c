use std::time::Duration;

/// Recognized configuration options.
#[derive(Debug, Clone)]
pub struct Config {
    /// Retransmit intervals, used as `timeouts[min(attempt, len-1)]`.
    /// Must be non-empty.
    pub timeouts: Vec<Duration>,
    /// Age-out of idle connections; `Duration::ZERO` disables age-out.
    pub max_retransmit_time: Duration,
    /// Deprecated. If true, self-sent messages loop back. Default false;
    /// this implementation does not honor `true` (see DESIGN.md).
    pub loopback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeouts: vec![
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(3200),
            ],
            max_retransmit_time: Duration::from_millis(60_000),
            loopback: false,
        }
    }
}

impl Config {
    /// Returns the retransmit delay for the given (zero-based) attempt,
    /// plateauing at the last configured value.
    pub fn timeout_for_attempt(&self, attempt: usize) -> Duration {
        let idx = attempt.min(self.timeouts.len() - 1);
        self.timeouts[idx]
    }
}

pub const DEFAULT_FIRST_SEQNO: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_spec() {
        let c = Config::default();
        assert_eq!(
            c.timeouts,
            vec![
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(3200),
            ]
        );
        assert_eq!(c.max_retransmit_time, Duration::from_millis(60_000));
        assert!(!c.loopback);
    }

    #[test]
    fn timeout_plateaus_at_last_value() {
        let c = Config::default();
        assert_eq!(c.timeout_for_attempt(0), Duration::from_millis(400));
        assert_eq!(c.timeout_for_attempt(3), Duration::from_millis(3200));
        assert_eq!(c.timeout_for_attempt(100), Duration::from_millis(3200));
    }
}
