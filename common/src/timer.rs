//! Adaptive stopping for batch loops that must finish inside a fixed
//! wall-clock budget.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Used to drive timers in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Tunables for [`TaskSetTimer`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    /// Hard execution limit of one invocation.
    pub timeout: Duration,

    /// Fraction of `timeout` the loop is allowed to use.
    pub safety_factor: f64,

    /// Only consider the most recent N gaps when estimating the cost of the
    /// next item. `None` considers every gap.
    pub lookback: Option<usize>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            safety_factor: 0.8,
            lookback: None,
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timer timeout must be positive".into()));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "timer safety factor must be in (0, 1], got {}",
                self.safety_factor
            )));
        }
        if self.lookback == Some(0) {
            return Err(Error::InvalidConfig("timer lookback must be at least 1".into()));
        }
        Ok(())
    }

    /// The part of the timeout the loop may actually spend.
    pub fn budget(&self) -> Duration {
        self.timeout.mul_f64(self.safety_factor)
    }
}

/// Predicts whether processing one more item would overrun the budget.
///
/// The timer assumes the next item may take as long as the slowest item seen
/// so far, and asks to stop once `now + slowest` would land past the budget.
pub struct TaskSetTimer {
    config: TimerConfig,
    clock: Arc<dyn Clock>,
    start: Instant,
    completions: Vec<Instant>,
}

impl TaskSetTimer {
    pub fn new(config: TimerConfig, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            config,
            clock,
            start,
            completions: Vec::new(),
        }
    }

    /// Resets the start of the loop to now and forgets every completion.
    pub fn start(&mut self) {
        self.start = self.clock.now();
        self.completions.clear();
    }

    /// Marks one item as fully processed.
    pub fn record_completion(&mut self) {
        self.completions.push(self.clock.now());
    }

    pub fn completions(&self) -> usize {
        self.completions.len()
    }

    /// Largest gap between consecutive completions, zero with fewer than two.
    fn worst_gap(&self) -> Duration {
        let gaps = self.completions.windows(2).map(|w| w[1] - w[0]);
        let skip = match self.config.lookback {
            Some(n) => self.completions.len().saturating_sub(1).saturating_sub(n),
            None => 0,
        };
        gaps.skip(skip).max().unwrap_or(Duration::ZERO)
    }

    pub fn should_stop(&self) -> bool {
        // One completion tells us nothing about per-item cost.
        if self.completions.len() < 2 {
            return false;
        }
        let worst_case = self.clock.now() + self.worst_gap();
        worst_case.saturating_duration_since(self.start) > self.config.budget()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(config: TimerConfig) -> (Arc<ManualClock>, TaskSetTimer) {
        let clock = Arc::new(ManualClock::new());
        let timer = TaskSetTimer::new(config, clock.clone());
        (clock, timer)
    }

    #[test]
    fn never_stops_without_two_completions() {
        let (clock, mut timer) = timer(TimerConfig::default());
        assert!(!timer.should_stop());

        clock.advance(Duration::from_secs(30));
        assert!(!timer.should_stop());

        timer.record_completion();
        assert!(!timer.should_stop());
    }

    #[test]
    fn steady_items_fit_the_budget() {
        let (clock, mut timer) = timer(TimerConfig::default());
        timer.record_completion();
        clock.advance(Duration::from_secs(1));
        timer.record_completion();
        clock.advance(Duration::from_secs(1));
        timer.record_completion();

        // now = 2s, worst gap = 1s, 3s < 8s.
        assert!(!timer.should_stop());
    }

    #[test]
    fn one_slow_item_stops_the_loop() {
        let (clock, mut timer) = timer(TimerConfig::default());
        timer.record_completion();
        clock.advance(Duration::from_secs(1));
        timer.record_completion();
        clock.advance(Duration::from_secs(9));
        timer.record_completion();

        // now = 10s, worst gap = 9s.
        assert!(timer.should_stop());
    }

    #[test]
    fn projection_is_measured_from_start() {
        let (clock, mut timer) = timer(TimerConfig::default());
        clock.advance(Duration::from_secs(6));
        timer.record_completion();
        clock.advance(Duration::from_millis(1500));
        timer.record_completion();

        // 7.5s + 1.5s = 9s > 8s.
        assert!(timer.should_stop());

        timer.start();
        assert!(!timer.should_stop());
    }

    #[test]
    fn lookback_forgets_old_outliers() {
        let config = TimerConfig {
            timeout: Duration::from_secs(100),
            lookback: Some(2),
            ..TimerConfig::default()
        };
        let (clock, mut timer) = timer(config);
        timer.record_completion();
        clock.advance(Duration::from_secs(50));
        timer.record_completion();
        clock.advance(Duration::from_secs(1));
        timer.record_completion();

        // Both gaps (50s, 1s) are inside the window.
        assert!(timer.should_stop());

        clock.advance(Duration::from_secs(1));
        timer.record_completion();
        // Window is now (1s, 1s); 52s + 1s < 80s.
        assert!(!timer.should_stop());
    }

    #[test]
    fn config_validation() {
        assert!(TimerConfig::default().validate().is_ok());
        let bad_factor = TimerConfig {
            safety_factor: 1.5,
            ..TimerConfig::default()
        };
        assert!(bad_factor.validate().is_err());
        let bad_lookback = TimerConfig {
            lookback: Some(0),
            ..TimerConfig::default()
        };
        assert!(bad_lookback.validate().is_err());
    }
}
