//! Adaptive wave sizing. After every wave the controller either relaxes (more
//! parallelism, shorter pauses), throttles, or trips the circuit breaker when
//! rate limiting has persisted across too many consecutive matches.

use chrono::{DateTime, Utc};
use matchcast_models::{PauseWindow, ProgressState};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub initial_concurrency: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub recovery_factor: f64,
    pub break_threshold: u32,
    pub break_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_concurrency: 1,
            max_concurrency: 4,
            initial_concurrency: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            recovery_factor: 0.5,
            break_threshold: 5,
            break_backoff: Duration::from_secs(90),
        }
    }
}

/// What happened to one match in a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub rate_limited: bool,
    pub retried: bool,
}

impl AttemptOutcome {
    pub fn success(retried: bool) -> Self {
        Self {
            succeeded: true,
            rate_limited: false,
            retried,
        }
    }

    pub fn failure(rate_limited: bool, retried: bool) -> Self {
        Self {
            succeeded: false,
            rate_limited,
            retried,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveAdjustment {
    CircuitBreak { backoff: Duration },
    Throttle,
    Relax,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveTally {
    pub succeeded: usize,
    pub rate_limited: usize,
    pub other_failures: usize,
    pub retried: usize,
}

/// Per-invocation controller state, passed by reference through the wave loop.
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    config: ControllerConfig,
    concurrency: usize,
    delay: Duration,
    consecutive_rate_limited: u32,
    circuit_open: bool,
    circuit_breaks: u32,
    tally: WaveTally,
}

impl ConcurrencyController {
    pub fn new(config: ControllerConfig) -> Self {
        let concurrency = config
            .initial_concurrency
            .clamp(config.min_concurrency, config.max_concurrency);
        let delay = config.base_delay;
        Self {
            config,
            concurrency,
            delay,
            consecutive_rate_limited: 0,
            circuit_open: false,
            circuit_breaks: 0,
            tally: WaveTally::default(),
        }
    }

    /// Resumes from a checkpoint written by an earlier invocation.
    pub fn restore(config: ControllerConfig, progress: &ProgressState) -> Self {
        let mut controller = Self::new(config);
        controller.concurrency = progress
            .concurrency
            .clamp(controller.config.min_concurrency, controller.config.max_concurrency);
        controller.delay = Duration::from_millis(progress.delay_ms)
            .clamp(controller.config.base_delay, controller.config.max_delay);
        controller.consecutive_rate_limited = progress.consecutive_rate_limited;
        controller.circuit_breaks = progress.circuit_breaks;
        controller
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn consecutive_rate_limited(&self) -> u32 {
        self.consecutive_rate_limited
    }

    pub fn circuit_open(&self) -> bool {
        self.circuit_open
    }

    pub fn circuit_breaks(&self) -> u32 {
        self.circuit_breaks
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Feed outcomes in the order the matches were issued.
    pub fn observe(&mut self, outcome: AttemptOutcome) {
        if outcome.retried {
            self.tally.retried += 1;
        }
        if outcome.succeeded {
            self.tally.succeeded += 1;
            self.consecutive_rate_limited = 0;
        } else if outcome.rate_limited {
            self.tally.rate_limited += 1;
            self.consecutive_rate_limited += 1;
        } else {
            self.tally.other_failures += 1;
        }
    }

    pub fn finish_wave(&mut self) -> WaveAdjustment {
        let tally = std::mem::take(&mut self.tally);

        let adjustment = if self.consecutive_rate_limited >= self.config.break_threshold {
            warn!(
                consecutive = self.consecutive_rate_limited,
                backoff = ?self.config.break_backoff,
                "circuit breaker tripped"
            );
            self.consecutive_rate_limited = 0;
            self.circuit_open = true;
            self.circuit_breaks += 1;
            self.increase_delay();
            self.decrease_concurrency();
            WaveAdjustment::CircuitBreak {
                backoff: self.config.break_backoff,
            }
        } else if tally.rate_limited > 0 || tally.retried > 0 {
            self.increase_delay();
            self.decrease_concurrency();
            WaveAdjustment::Throttle
        } else {
            self.decay_delay();
            self.concurrency = (self.concurrency + 1).min(self.config.max_concurrency);
            WaveAdjustment::Relax
        };

        debug!(
            ?adjustment,
            ?tally,
            concurrency = self.concurrency,
            delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "wave evaluated"
        );
        adjustment
    }

    /// Called once the break backoff has been slept off.
    pub fn close_circuit(&mut self) {
        self.circuit_open = false;
    }

    fn increase_delay(&mut self) {
        let next = self.delay.mul_f64(self.config.backoff_multiplier.max(1.0));
        self.delay = next.min(self.config.max_delay);
    }

    fn decay_delay(&mut self) {
        let next = self.delay.mul_f64(self.config.recovery_factor.clamp(0.0, 1.0));
        self.delay = next.max(self.config.base_delay);
    }

    fn decrease_concurrency(&mut self) {
        self.concurrency = self
            .concurrency
            .saturating_sub(1)
            .max(self.config.min_concurrency);
    }

    pub fn delay_ms(&self) -> u64 {
        u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX)
    }

    /// The stored pause window, if it is still in effect at `now`.
    pub fn active_pause(window: Option<&PauseWindow>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        window.filter(|w| w.is_active(now)).map(|w| w.until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ConcurrencyController {
        ConcurrencyController::new(ControllerConfig {
            break_backoff: Duration::from_secs(90),
            ..Default::default()
        })
    }

    #[test]
    fn test_clean_wave_relaxes() {
        let mut c = controller();
        c.delay = Duration::from_secs(4);
        c.observe(AttemptOutcome::success(false));
        c.observe(AttemptOutcome::success(false));

        assert_eq!(c.finish_wave(), WaveAdjustment::Relax);
        assert_eq!(c.concurrency(), 3);
        assert_eq!(c.delay(), Duration::from_secs(2));

        for _ in 0..5 {
            c.finish_wave();
        }
        assert_eq!(c.concurrency(), 4);
        assert_eq!(c.delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_throttles() {
        let mut c = controller();
        c.observe(AttemptOutcome::success(true));
        c.observe(AttemptOutcome::success(false));

        assert_eq!(c.finish_wave(), WaveAdjustment::Throttle);
        assert_eq!(c.concurrency(), 1);
        assert_eq!(c.delay(), Duration::from_secs(1));

        c.observe(AttemptOutcome::failure(true, true));
        assert_eq!(c.finish_wave(), WaveAdjustment::Throttle);
        assert_eq!(c.concurrency(), 1);
        assert_eq!(c.delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut c = controller();
        for _ in 0..20 {
            c.observe(AttemptOutcome::failure(false, true));
            c.finish_wave();
        }
        assert_eq!(c.delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_other_failures_without_retry_still_relax() {
        let mut c = controller();
        c.observe(AttemptOutcome::failure(false, false));
        assert_eq!(c.finish_wave(), WaveAdjustment::Relax);
    }

    #[test]
    fn test_circuit_breaks_once_after_five_consecutive() {
        let mut c = controller();
        let mut breaks = 0;

        // Two waves of rate-limited failures: 2 then 3 consecutive.
        for wave in [2, 3] {
            for _ in 0..wave {
                c.observe(AttemptOutcome::failure(true, true));
            }
            if let WaveAdjustment::CircuitBreak { backoff } = c.finish_wave() {
                assert_eq!(backoff, Duration::from_secs(90));
                breaks += 1;
                c.close_circuit();
            }
        }

        assert_eq!(breaks, 1);
        assert_eq!(c.consecutive_rate_limited(), 0);
        assert_eq!(c.circuit_breaks(), 1);
        assert!(!c.circuit_open());

        c.observe(AttemptOutcome::success(false));
        assert_eq!(c.finish_wave(), WaveAdjustment::Relax);
    }

    #[test]
    fn test_success_resets_consecutive_counter() {
        let mut c = controller();
        for _ in 0..4 {
            c.observe(AttemptOutcome::failure(true, true));
        }
        c.observe(AttemptOutcome::success(true));
        c.observe(AttemptOutcome::failure(true, true));

        assert_eq!(c.consecutive_rate_limited(), 1);
        assert_eq!(c.finish_wave(), WaveAdjustment::Throttle);
    }

    #[test]
    fn test_restore_clamps_checkpoint() {
        let progress = ProgressState {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            run_id: uuid::Uuid::new_v4(),
            predicted: 3,
            remaining: 2,
            failures: 0,
            delay_ms: 120_000,
            concurrency: 9,
            consecutive_rate_limited: 3,
            circuit_open: false,
            circuit_breaks: 1,
            waves: 2,
            done: false,
            updated_at: Utc::now(),
        };

        let c = ConcurrencyController::restore(ControllerConfig::default(), &progress);
        assert_eq!(c.concurrency(), 4);
        assert_eq!(c.delay(), Duration::from_secs(30));
        assert_eq!(c.consecutive_rate_limited(), 3);
        assert_eq!(c.circuit_breaks(), 1);
    }

    #[test]
    fn test_active_pause() {
        let now = Utc::now();
        let window = PauseWindow {
            until: now + chrono::Duration::minutes(10),
            reason: Some("provider outage".to_string()),
        };
        assert_eq!(ConcurrencyController::active_pause(Some(&window), now), Some(window.until));
        assert_eq!(
            ConcurrencyController::active_pause(Some(&window), now + chrono::Duration::hours(1)),
            None
        );
        assert_eq!(ConcurrencyController::active_pause(None, now), None);
    }
}
