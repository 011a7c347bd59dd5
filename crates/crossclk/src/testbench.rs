use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;

use crate::agent::{ReadMonitor, WriteDriver};
use crate::clock::{ClockConfigError, ClockGen};
use crate::config::TestConfig;
use crate::interface::{ReadInterface, WriteInterface};
use crate::kernel::Kernel;
use crate::model::{FifoModel, FifoPins};
use crate::time::{TimeError, TimeUnit};

/// Environment override for the FIFO depth when the DUT declares none.
pub const DEPTH_ENV: &str = "CROSSCLK_FIFO_DEPTH";

/// End-of-run verification failures. None of these are retried: a handshake
/// or ordering violation is a correctness bug, not a transient condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Fewer items observed than submitted: a truncated run.
    #[error("underrun: submitted {submitted} items but observed only {observed}")]
    Underrun { submitted: usize, observed: usize },
    /// More items observed than submitted.
    #[error("excess: submitted {submitted} items but observed {observed}")]
    Excess { submitted: usize, observed: usize },
    #[error("mismatch at index {index}: expected {expected:#x}, got {actual:#x}")]
    Mismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },
    /// A fill-to-capacity run left the DUT still advertising write space.
    #[error("write side still ready after filling {capacity} slots")]
    ReadyAfterFill { capacity: usize },
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("invalid clock config: {0}")]
    Clock(#[from] ClockConfigError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error("plain clock period of {ticks} ticks is not divisible into half periods")]
    PeriodNotDivisible { ticks: u64 },
    #[error("data width must lie in 1..=63, got {0}")]
    InvalidWidth(u32),
    #[error("fill-to-capacity requested but no depth parameter or CROSSCLK_FIFO_DEPTH override present")]
    MissingDepth,
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("trace output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub submitted: usize,
    pub observed: usize,
    /// Simulation time at the end of the run, in kernel ticks.
    pub end_time: u64,
}

#[derive(Clone, Copy, Debug)]
enum StimulusMode {
    Stream { count: usize },
    Fill { capacity: usize },
}

/// Composes clocks, reset, agents and checking over a DUT's pins.
#[derive(Debug)]
pub struct TestBench {
    kernel: Kernel,
    pins: FifoPins,
    config: TestConfig,
    mode: StimulusMode,
}

impl TestBench {
    /// Bind to `pins` and drive every harness-owned signal to its idle value,
    /// so nothing undefined reaches the DUT at time zero. `dut_depth` is the
    /// DUT-declared capacity parameter, if it exposes one.
    pub fn new(
        kernel: &Kernel,
        pins: &FifoPins,
        config: &TestConfig,
        dut_depth: Option<usize>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        if config.plain_clocks {
            let time_base = kernel.time_base();
            for clk in [&config.clk_a, &config.clk_b] {
                let ticks = time_base.to_precision_units(clk.period, config.unit, TimeUnit::Step);
                if ticks % 2 != 0 {
                    return Err(HarnessError::PeriodNotDivisible { ticks });
                }
            }
        }
        let mode = if config.fill_to_capacity {
            StimulusMode::Fill {
                capacity: config.resolve_capacity(dut_depth)?,
            }
        } else {
            StimulusMode::Stream {
                count: config.count,
            }
        };
        pins.wr_en.drive(0);
        pins.wr_data.drive(0);
        pins.rd_en.drive(0);
        pins.rst_a_n.drive(1);
        pins.rst_b_n.drive(1);
        Ok(Self {
            kernel: kernel.clone(),
            pins: pins.clone(),
            config: config.clone(),
            mode,
        })
    }

    /// Run the full stimulus sequence and the end-of-run check. Consumes the
    /// bench; must execute inside [`Kernel::run`].
    pub async fn execute(self) -> Result<RunReport, HarnessError> {
        let wif = self.pins.write_interface();
        let rif = self.pins.read_interface();
        let driver = WriteDriver::new(wif.clone());

        self.start_clocks()?;

        match self.mode {
            StimulusMode::Stream { count } => {
                let monitor = ReadMonitor::new(rif.clone());
                let observed = monitor.received();
                self.kernel.spawn(monitor.run());

                self.idle_and_reset(&wif, &rif).await;

                let stimulus =
                    generate_stimulus(self.config.width, count, self.config.seed.wrapping_add(2));
                for &value in &stimulus {
                    driver.submit(value).await;
                }
                log::debug!("submitted {} items, draining the read side", stimulus.len());

                // Drain: watch settled rising edges until the DUT stops
                // advertising data, then flush in-flight pulses.
                loop {
                    rif.iface.redge().await;
                    rif.iface.settle().await;
                    if !rif.rd_rdy.is_high() {
                        break;
                    }
                }
                rif.iface.clk.cycles(self.config.flush_cycles).await;

                let observed = observed.borrow().clone();
                check_sequence(&stimulus, &observed)?;
                log::info!("all {} items matched in order", stimulus.len());
                Ok(RunReport {
                    submitted: stimulus.len(),
                    observed: observed.len(),
                    end_time: self.kernel.now(),
                })
            }
            StimulusMode::Fill { capacity } => {
                // No reader: fill the DUT and verify it stops advertising
                // space once capacity is reached.
                self.idle_and_reset(&wif, &rif).await;

                let stimulus = generate_stimulus(
                    self.config.width,
                    capacity,
                    self.config.seed.wrapping_add(2),
                );
                for &value in &stimulus {
                    driver.submit(value).await;
                }
                // Give ready one more edge to reflect the final write.
                wif.iface.redge().await;
                wif.iface.settle().await;
                if wif.wr_rdy.is_high() {
                    return Err(CheckError::ReadyAfterFill { capacity }.into());
                }
                log::info!("write ready deasserted after {} items", capacity);
                Ok(RunReport {
                    submitted: capacity,
                    observed: 0,
                    end_time: self.kernel.now(),
                })
            }
        }
    }

    fn start_clocks(&self) -> Result<(), HarnessError> {
        let spec_a = self
            .config
            .clk_a
            .to_spec(self.config.unit, self.config.plain_clocks);
        let spec_b = self
            .config
            .clk_b
            .to_spec(self.config.unit, self.config.plain_clocks);
        let clock_a = ClockGen::new(self.pins.clk_a.clone(), spec_a, self.config.seed)?;
        let clock_b = ClockGen::new(
            self.pins.clk_b.clone(),
            spec_b,
            self.config.seed.wrapping_add(1),
        )?;
        self.kernel.spawn(clock_a.run());
        self.kernel.spawn(clock_b.run());
        Ok(())
    }

    /// Idle cycles, then reset both domains concurrently (their release
    /// points are unrelated, and the DUT must tolerate that), then idle
    /// again before stimulus starts.
    async fn idle_and_reset(&self, wif: &WriteInterface, rif: &ReadInterface) {
        self.pins.clk_b.cycles(self.config.idle_cycles).await;
        let cycles = self.config.reset_cycles;
        let iface_a = wif.iface.clone();
        let iface_b = rif.iface.clone();
        let reset_a = self.kernel.spawn(async move { iface_a.apply_reset(cycles).await });
        let reset_b = self.kernel.spawn(async move { iface_b.apply_reset(cycles).await });
        reset_a.join().await;
        reset_b.join().await;
        log::info!("reset released on both domains");
        self.pins.clk_b.cycles(self.config.idle_cycles).await;
    }
}

/// Construct everything for one self-checking run against the behavioral
/// FIFO model and execute it: the composition entry point the CLI and the
/// scenario tests use.
pub fn run_test(config: &TestConfig, depth: usize) -> Result<RunReport, HarnessError> {
    let kernel = Kernel::with_precision(config.precision)?;
    let pins = FifoPins::new(&kernel, config.width);
    let dut = FifoModel::new(pins.clone(), depth);
    dut.start(&kernel);
    let bench = TestBench::new(&kernel, &pins, config, Some(dut.depth()))?;
    if let Some(path) = &config.vcd {
        kernel.trace_vcd(path)?;
    }
    kernel.run(async move { bench.execute().await })
}

/// Uniform values in [0, 2^width - 1), reproducible from `seed`.
/// `width` must lie in 1..=63.
pub fn generate_stimulus(width: u32, count: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bound = (1u64 << width) - 1;
    (0..count).map(|_| rng.gen_range(0..bound)).collect()
}

/// Compare the observed log against the submitted sequence, element for
/// element and in order.
pub fn check_sequence(submitted: &[u64], observed: &[u64]) -> Result<(), CheckError> {
    for (index, (expected, actual)) in submitted.iter().zip(observed).enumerate() {
        if expected != actual {
            return Err(CheckError::Mismatch {
                index,
                expected: *expected,
                actual: *actual,
            });
        }
    }
    if observed.len() < submitted.len() {
        return Err(CheckError::Underrun {
            submitted: submitted.len(),
            observed: observed.len(),
        });
    }
    if observed.len() > submitted.len() {
        return Err(CheckError::Excess {
            submitted: submitted.len(),
            observed: observed.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stimulus_is_reproducible_and_bounded() {
        let a = generate_stimulus(8, 500, 7);
        let b = generate_stimulus(8, 500, 7);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| v < 255));
        assert_ne!(a, generate_stimulus(8, 500, 8));
    }

    #[test]
    fn check_accepts_an_exact_match() {
        assert_eq!(check_sequence(&[1, 2, 3], &[1, 2, 3]), Ok(()));
        assert_eq!(check_sequence(&[], &[]), Ok(()));
    }

    #[test]
    fn check_reports_the_first_mismatch_position() {
        let err = check_sequence(&[1, 2, 3], &[1, 9, 3]).unwrap_err();
        assert_eq!(
            err,
            CheckError::Mismatch {
                index: 1,
                expected: 2,
                actual: 9
            }
        );
    }

    #[test]
    fn check_distinguishes_underrun_from_excess() {
        let err = check_sequence(&[1, 2, 3], &[1, 2]).unwrap_err();
        assert_eq!(
            err,
            CheckError::Underrun {
                submitted: 3,
                observed: 2
            }
        );
        let err = check_sequence(&[1, 2], &[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            CheckError::Excess {
                submitted: 2,
                observed: 3
            }
        );
    }

    #[test]
    fn underrun_wins_only_when_the_prefix_matches() {
        // A wrong value before the truncation point is the better diagnosis.
        let err = check_sequence(&[1, 2, 3], &[9]).unwrap_err();
        assert!(matches!(err, CheckError::Mismatch { index: 0, .. }));
    }

    #[test]
    fn odd_tick_periods_are_rejected_in_plain_mode() {
        use crate::config::ClockConfig;
        let kernel = Kernel::with_precision(TimeUnit::Ns).unwrap();
        let config = TestConfig {
            precision: TimeUnit::Ns,
            // 5 ticks at ns precision
            clk_a: ClockConfig {
                period: 5.0,
                ..ClockConfig::default()
            },
            ..TestConfig::default()
        };
        let pins = FifoPins::new(&kernel, config.width);
        let err = TestBench::new(&kernel, &pins, &config, Some(8)).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::PeriodNotDivisible { ticks: 5 }
        ));
    }
}
