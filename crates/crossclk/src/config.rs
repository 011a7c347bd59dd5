use std::path::PathBuf;

use serde::Deserialize;

use crate::clock::ClockSpec;
use crate::testbench::{DEPTH_ENV, HarnessError};
use crate::time::{TimeError, TimeUnit};

/// Per-domain clock parameters as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub period: f64,
    pub duty_cycle: f64,
    pub phase_shift: f64,
    pub period_jitter_sigma: f64,
    pub duty_jitter_sigma: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period: 10.0,
            duty_cycle: 0.5,
            phase_shift: 0.0,
            period_jitter_sigma: 0.0,
            duty_jitter_sigma: 0.0,
        }
    }
}

impl ClockConfig {
    /// Materialize a [`ClockSpec`]; plain mode zeroes the jitter sigmas.
    pub fn to_spec(&self, unit: TimeUnit, plain: bool) -> ClockSpec {
        ClockSpec {
            period: self.period,
            duty_cycle: self.duty_cycle,
            phase_shift: self.phase_shift,
            period_jitter_sigma: if plain { 0.0 } else { self.period_jitter_sigma },
            duty_jitter_sigma: if plain { 0.0 } else { self.duty_jitter_sigma },
            unit,
        }
    }
}

/// Full configuration for one orchestrated run.
///
/// The defaults describe the reference scenario: width 8, 1000 items, plain
/// 5 ns / 20 ns clocks at picosecond precision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Data width in bits, 1..=63.
    pub width: u32,
    /// Stimulus item count (stream mode).
    pub count: usize,
    /// Fill the DUT to capacity instead of streaming through it.
    pub fill_to_capacity: bool,
    /// Write-domain clock.
    pub clk_a: ClockConfig,
    /// Read-domain clock.
    pub clk_b: ClockConfig,
    /// Unit the clock periods are expressed in.
    pub unit: TimeUnit,
    /// Kernel tick unit.
    pub precision: TimeUnit,
    /// Clock edges each reset line is held active.
    pub reset_cycles: u32,
    /// Idle read-domain cycles before and after reset.
    pub idle_cycles: u32,
    /// Read-domain cycles to flush in-flight items after draining.
    pub flush_cycles: u32,
    /// Seed for stimulus and jitter streams.
    pub seed: u64,
    /// Use fixed-period clocks and enforce even tick periods.
    pub plain_clocks: bool,
    /// Dump a VCD trace of the boundary signals to this path.
    pub vcd: Option<PathBuf>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            width: 8,
            count: 1000,
            fill_to_capacity: false,
            clk_a: ClockConfig {
                period: 5.0,
                ..ClockConfig::default()
            },
            clk_b: ClockConfig {
                period: 20.0,
                ..ClockConfig::default()
            },
            unit: TimeUnit::Ns,
            precision: TimeUnit::Ps,
            reset_cycles: 5,
            idle_cycles: 10,
            flush_cycles: 32,
            seed: 0x5eed,
            plain_clocks: true,
            vcd: None,
        }
    }
}

impl TestConfig {
    pub fn from_toml(text: &str) -> Result<Self, HarnessError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.width == 0 || self.width > 63 {
            return Err(HarnessError::InvalidWidth(self.width));
        }
        if self.precision == TimeUnit::Step {
            return Err(TimeError::UnsupportedUnit("step".to_string()).into());
        }
        self.clk_a.to_spec(self.unit, self.plain_clocks).validate()?;
        self.clk_b.to_spec(self.unit, self.plain_clocks).validate()?;
        Ok(())
    }

    /// Usable capacity for fill-to-capacity runs: one less than the FIFO
    /// depth. The DUT-declared parameter wins; without one the environment
    /// override is consulted.
    pub fn resolve_capacity(&self, dut_depth: Option<usize>) -> Result<usize, HarnessError> {
        let depth = match dut_depth {
            Some(depth) => depth,
            None => match std::env::var(DEPTH_ENV) {
                Ok(raw) => raw.parse().map_err(|_| HarnessError::MissingDepth)?,
                Err(_) => return Err(HarnessError::MissingDepth),
            },
        };
        Ok(depth.saturating_sub(1))
    }
}
