/// Default ceiling of snapshots per second across all probes.
pub const DEFAULT_GLOBAL_SNAPSHOTS_PER_SECOND: u32 = 25;

/// Default rate of probes that capture snapshots.
pub const DEFAULT_SNAPSHOTS_PER_SECOND: f64 = 1.0;

/// Default rate of probes that only log a message.
pub const DEFAULT_LOGS_PER_SECOND: f64 = 5000.0;

/// Length of the global counting window.
const WINDOW_MS: f64 = 1000.0;

/// An error creating a sampler.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SamplingError {
    /// The rate is zero, negative or not a finite number.
    #[error("snapshots per second must be a positive number, got {0}")]
    InvalidRate(f64),
}

/// The shared snapshot budget of all probes.
#[derive(Clone, Debug)]
pub struct GlobalBudget {
    limit: u32,
    window_start: Option<f64>,
    count: u32,
}

impl GlobalBudget {
    /// Creates a budget allowing `limit` snapshots per window.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window_start: None,
            count: 0,
        }
    }

    /// The number of snapshots allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The number of snapshots recorded in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns `true` if another snapshot fits into the window at `now_ms`.
    ///
    /// Starts a new window if more than a second has elapsed since the current one started.
    pub fn has_capacity(&mut self, now_ms: f64) -> bool {
        match self.window_start {
            Some(start) if now_ms - start <= WINDOW_MS => {}
            _ => {
                self.window_start = Some(now_ms);
                self.count = 0;
            }
        }

        self.count < self.limit
    }

    /// Records a snapshot in the current window.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }
}

impl Default for GlobalBudget {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_SNAPSHOTS_PER_SECOND)
    }
}

/// The sampling state of a single probe.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeSampler {
    ms_between_sampling: f64,
    last_capture_ms: Option<f64>,
}

impl ProbeSampler {
    /// Creates a sampler allowing `per_second` firings per second.
    pub fn new(per_second: f64) -> Result<Self, SamplingError> {
        if !per_second.is_finite() || per_second <= 0.0 {
            return Err(SamplingError::InvalidRate(per_second));
        }

        Ok(Self {
            ms_between_sampling: 1000.0 / per_second,
            last_capture_ms: None,
        })
    }

    /// The minimum time between two firings in milliseconds.
    pub fn ms_between_sampling(&self) -> f64 {
        self.ms_between_sampling
    }

    /// When the probe last fired.
    pub fn last_capture_ms(&self) -> Option<f64> {
        self.last_capture_ms
    }

    /// Returns `true` if the minimum interval has elapsed at `now_ms`.
    ///
    /// Times keep their fractional part, so rates above one firing per millisecond hold.
    pub fn is_due(&self, now_ms: f64) -> bool {
        match self.last_capture_ms {
            Some(last) => now_ms - last >= self.ms_between_sampling,
            None => true,
        }
    }

    /// Records a firing at `now_ms`.
    pub fn record(&mut self, now_ms: f64) {
        self.last_capture_ms = Some(now_ms);
    }
}

/// Why a firing was skipped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The global snapshot budget of the current window is exhausted.
    GlobalBudget,
    /// The probe fired too recently.
    ProbeRate,
}

/// The outcome of a sampling decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SamplingDecision {
    /// The probe may fire. Both limiters have recorded the firing.
    Sample,
    /// The probe must not fire.
    Skip(SkipReason),
}

impl SamplingDecision {
    /// Returns `true` if the probe may fire.
    pub fn is_sample(self) -> bool {
        matches!(self, SamplingDecision::Sample)
    }
}

/// Combines the global budget with per-probe samplers.
#[derive(Clone, Debug, Default)]
pub struct SamplingController {
    global: GlobalBudget,
}

impl SamplingController {
    /// Creates a controller with a global ceiling of `global_limit` snapshots per second.
    pub fn new(global_limit: u32) -> Self {
        Self {
            global: GlobalBudget::new(global_limit),
        }
    }

    /// Returns the global budget.
    pub fn global(&self) -> &GlobalBudget {
        &self.global
    }

    /// Decides whether the probe owning `sampler` may fire at `now_ms`.
    ///
    /// Only probes that capture snapshots count against the global budget. A firing is recorded
    /// in both limiters only if both allow it.
    pub fn sample(
        &mut self,
        sampler: &mut ProbeSampler,
        captures_snapshot: bool,
        now_ms: f64,
    ) -> SamplingDecision {
        if captures_snapshot && !self.global.has_capacity(now_ms) {
            return SamplingDecision::Skip(SkipReason::GlobalBudget);
        }

        if !sampler.is_due(now_ms) {
            return SamplingDecision::Skip(SkipReason::ProbeRate);
        }

        if captures_snapshot {
            self.global.record();
        }
        sampler.record(now_ms);

        SamplingDecision::Sample
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use tripwire_common::{Clock, ManualClock, duration_to_millis_f64};

    use super::*;

    fn now(clock: &ManualClock) -> f64 {
        duration_to_millis_f64(clock.monotonic())
    }

    #[test]
    fn test_invalid_rates() {
        assert_eq!(ProbeSampler::new(0.0), Err(SamplingError::InvalidRate(0.0)));
        assert_eq!(ProbeSampler::new(-1.0), Err(SamplingError::InvalidRate(-1.0)));
        assert!(ProbeSampler::new(f64::INFINITY).is_err());
        assert!(ProbeSampler::new(f64::NAN).is_err());
        assert_eq!(ProbeSampler::new(4.0).unwrap().ms_between_sampling(), 250.0);
    }

    #[test]
    fn test_default_rates() {
        let snapshots = ProbeSampler::new(DEFAULT_SNAPSHOTS_PER_SECOND).unwrap();
        assert_eq!(snapshots.ms_between_sampling(), 1000.0);
        let logs = ProbeSampler::new(DEFAULT_LOGS_PER_SECOND).unwrap();
        assert_eq!(logs.ms_between_sampling(), 0.2);
    }

    #[test]
    fn test_sampler_interval() {
        let clock = ManualClock::new();
        let mut controller = SamplingController::default();
        let mut sampler = ProbeSampler::new(1.0).unwrap();

        let decision = controller.sample(&mut sampler, true, now(&clock));
        assert_eq!(decision, SamplingDecision::Sample);
        assert_eq!(sampler.last_capture_ms(), Some(0.0));

        clock.advance_ms(500);
        let decision = controller.sample(&mut sampler, true, now(&clock));
        assert_eq!(decision, SamplingDecision::Skip(SkipReason::ProbeRate));
        assert_eq!(sampler.last_capture_ms(), Some(0.0));

        clock.advance_ms(500);
        let decision = controller.sample(&mut sampler, true, now(&clock));
        assert_eq!(decision, SamplingDecision::Sample);
        assert_eq!(sampler.last_capture_ms(), Some(1000.0));
    }

    #[test]
    fn test_sub_millisecond_interval() {
        let clock = ManualClock::new();
        let mut controller = SamplingController::default();
        let mut sampler = ProbeSampler::new(DEFAULT_LOGS_PER_SECOND).unwrap();

        let mut fired = 0;
        for _ in 0..40 {
            if controller.sample(&mut sampler, false, now(&clock)).is_sample() {
                fired += 1;
            }
            clock.advance(Duration::from_micros(250));
        }
        assert_eq!(fired, 40);

        // 0.15ms apart is faster than 5000 per second, so every other call fires
        let mut fired = 0;
        for _ in 0..40 {
            if controller.sample(&mut sampler, false, now(&clock)).is_sample() {
                fired += 1;
            }
            clock.advance(Duration::from_micros(150));
        }
        assert_eq!(fired, 20);
    }

    #[test]
    fn test_global_ceiling() {
        let mut controller = SamplingController::new(2);
        let mut samplers: Vec<_> = (0..3)
            .map(|_| ProbeSampler::new(1.0).unwrap())
            .collect();

        let decisions: Vec<_> = samplers
            .iter_mut()
            .map(|sampler| controller.sample(sampler, true, 10.0))
            .collect();

        assert_eq!(
            decisions,
            vec![
                SamplingDecision::Sample,
                SamplingDecision::Sample,
                SamplingDecision::Skip(SkipReason::GlobalBudget),
            ]
        );
        assert_eq!(controller.global().count(), 2);
        // the rejected sampler did not consume its own budget
        assert_eq!(samplers[2].last_capture_ms(), None);
    }

    #[test]
    fn test_global_window_resets() {
        let mut controller = SamplingController::new(1);
        let mut first = ProbeSampler::new(100.0).unwrap();
        let mut second = ProbeSampler::new(100.0).unwrap();

        assert!(controller.sample(&mut first, true, 0.0).is_sample());
        assert!(!controller.sample(&mut second, true, 1000.0).is_sample());
        assert!(controller.sample(&mut second, true, 1000.5).is_sample());
    }

    #[test]
    fn test_window_boundary_burst() {
        // Known imprecision of the coarse window: up to twice the limit around a reset.
        let mut budget = GlobalBudget::new(2);
        let mut allowed = 0;
        for now in [0.0, 999.0, 1001.0, 1002.0] {
            if budget.has_capacity(now) {
                budget.record();
                allowed += 1;
            }
        }
        assert_eq!(allowed, 4);
    }

    #[test]
    fn test_log_only_skips_global_budget() {
        let mut controller = SamplingController::new(1);
        let mut snapshot = ProbeSampler::new(10.0).unwrap();
        let mut logs: Vec<_> = (0..5)
            .map(|_| ProbeSampler::new(DEFAULT_LOGS_PER_SECOND).unwrap())
            .collect();

        assert!(controller.sample(&mut snapshot, true, 0.0).is_sample());
        for sampler in &mut logs {
            assert!(controller.sample(sampler, false, 0.0).is_sample());
        }
        assert_eq!(controller.global().count(), 1);
    }
}
