use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::kernel::Net;
use crate::time::{TimeBase, TimeUnit};

/// Jitter sigmas above this would let a 3-sigma excursion push a half-period
/// toward zero for duty cycles away from the extremes, so construction
/// rejects them.
pub const MAX_JITTER_SIGMA: f64 = 0.2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClockConfigError {
    #[error("duty cycle must lie in (0, 1), got {0}")]
    DutyCycleOutOfRange(f64),
    #[error("jitter sigma must lie in [0, {MAX_JITTER_SIGMA}], got {0}")]
    JitterSigmaOutOfRange(f64),
    #[error("clock period must be positive, got {0}")]
    NonPositivePeriod(f64),
}

/// Static description of one clock domain's waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSpec {
    /// Nominal period in `unit`.
    pub period: f64,
    /// High fraction of the period, in (0, 1).
    pub duty_cycle: f64,
    /// Angular offset of the cycle start, in degrees.
    pub phase_shift: f64,
    /// Sigma of the Gaussian(1, sigma) factor applied to each period.
    pub period_jitter_sigma: f64,
    /// Sigma of the Gaussian(1, sigma) factor applied to each duty cycle.
    pub duty_jitter_sigma: f64,
    pub unit: TimeUnit,
}

impl ClockSpec {
    /// Fixed-period spec: no jitter, 50% duty, no phase shift.
    pub fn plain(period: f64, unit: TimeUnit) -> Self {
        Self {
            period,
            duty_cycle: 0.5,
            phase_shift: 0.0,
            period_jitter_sigma: 0.0,
            duty_jitter_sigma: 0.0,
            unit,
        }
    }

    pub fn validate(&self) -> Result<(), ClockConfigError> {
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(ClockConfigError::NonPositivePeriod(self.period));
        }
        if self.duty_cycle <= 0.0 || self.duty_cycle >= 1.0 {
            return Err(ClockConfigError::DutyCycleOutOfRange(self.duty_cycle));
        }
        for sigma in [self.period_jitter_sigma, self.duty_jitter_sigma] {
            if !(0.0..=MAX_JITTER_SIGMA).contains(&sigma) {
                return Err(ClockConfigError::JitterSigmaOutOfRange(sigma));
            }
        }
        Ok(())
    }
}

/// Generator process for one clock domain.
///
/// Runs in two stages: a one-shot priming stage that reaches the level and
/// position implied by the phase shift, then an unending toggling stage that
/// redraws the period and duty jitter factors every cycle. There is no
/// terminal state; the kernel tears the task down when the run ends.
pub struct ClockGen {
    net: Net,
    spec: ClockSpec,
    time_base: TimeBase,
    rng: StdRng,
    period_jitter: Normal<f64>,
    duty_jitter: Normal<f64>,
}

impl ClockGen {
    pub fn new(net: Net, spec: ClockSpec, seed: u64) -> Result<Self, ClockConfigError> {
        spec.validate()?;
        let period_jitter = Normal::new(1.0, spec.period_jitter_sigma)
            .map_err(|_| ClockConfigError::JitterSigmaOutOfRange(spec.period_jitter_sigma))?;
        let duty_jitter = Normal::new(1.0, spec.duty_jitter_sigma)
            .map_err(|_| ClockConfigError::JitterSigmaOutOfRange(spec.duty_jitter_sigma))?;
        let time_base = net.kernel().time_base();
        Ok(Self {
            net,
            spec,
            time_base,
            rng: StdRng::seed_from_u64(seed),
            period_jitter,
            duty_jitter,
        })
    }

    /// Drive the signal forever.
    pub async fn run(mut self) {
        let period = self.spec.period;
        let phase_switch = period * self.spec.duty_cycle;
        let phase_arg = period * ((self.spec.phase_shift / 360.0).rem_euclid(1.0));
        if phase_arg >= phase_switch {
            // The shift lands inside the low interval: finish it out.
            self.net.drive(0);
            self.hold(period - phase_arg).await;
        } else {
            self.net.drive(1);
            self.hold(phase_switch - phase_arg).await;
            self.net.drive(0);
            self.hold(period - phase_switch).await;
        }
        loop {
            let (high, low) = self.next_intervals();
            self.net.drive(1);
            self.hold(high).await;
            self.net.drive(0);
            self.hold(low).await;
        }
    }

    /// Draw one jittered (high, low) interval pair in spec units.
    fn next_intervals(&mut self) -> (f64, f64) {
        let period = self.spec.period * self.period_jitter.sample(&mut self.rng);
        let duty = self.spec.duty_cycle * self.duty_jitter.sample(&mut self.rng);
        (period * duty, period * (1.0 - duty))
    }

    /// Duration in spec units, truncated to kernel ticks, never below one
    /// tick so the generator cannot schedule a zero-length suspension.
    fn interval_ticks(&self, duration: f64) -> u64 {
        self.time_base
            .to_precision_units(duration, self.spec.unit, TimeUnit::Step)
            .max(1)
    }

    async fn hold(&self, duration: f64) {
        let ticks = self.interval_ticks(duration);
        self.net.kernel().delay(ticks).await;
    }
}
