use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("unsupported time unit: {0:?}")]
    UnsupportedUnit(String),
}

/// Time units understood by the harness, from seconds down to the
/// kernel-defined minimal `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum TimeUnit {
    S,
    Ms,
    Us,
    Ns,
    Ps,
    Step,
}

impl TimeUnit {
    /// Decimal exponent relative to one second. `step` resolves to the
    /// exponent of one kernel tick.
    pub(crate) fn exponent(self, step_exponent: i32) -> i32 {
        match self {
            TimeUnit::S => 0,
            TimeUnit::Ms => -3,
            TimeUnit::Us => -6,
            TimeUnit::Ns => -9,
            TimeUnit::Ps => -12,
            TimeUnit::Step => step_exponent,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, TimeError> {
        match s {
            "s" => Ok(TimeUnit::S),
            "ms" => Ok(TimeUnit::Ms),
            "us" => Ok(TimeUnit::Us),
            "ns" => Ok(TimeUnit::Ns),
            "ps" => Ok(TimeUnit::Ps),
            "step" => Ok(TimeUnit::Step),
            other => Err(TimeError::UnsupportedUnit(other.to_string())),
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = TimeError;

    fn try_from(s: String) -> Result<Self, TimeError> {
        s.parse()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Step => "step",
        };
        write!(f, "{}", name)
    }
}

/// Converts real-valued durations between time units.
///
/// Every timed wait in the harness rounds through this one place, so all
/// precision-loss decisions are made consistently: the value is scaled by the
/// power-of-ten exponent difference between the units and truncated to an
/// integer last.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    step_exponent: i32,
}

impl TimeBase {
    /// `step_exponent` is the decimal exponent of one kernel tick relative to
    /// one second (e.g. -12 for picosecond precision).
    pub const fn new(step_exponent: i32) -> Self {
        Self { step_exponent }
    }

    /// Convert `value` expressed in `from` into an integer count of `to`.
    /// Negative and non-finite inputs count as zero.
    pub fn to_precision_units(self, value: f64, from: TimeUnit, to: TimeUnit) -> u64 {
        let diff = from.exponent(self.step_exponent) - to.exponent(self.step_exponent);
        let scaled = value * 10f64.powi(diff);
        if scaled.is_finite() && scaled > 0.0 {
            scaled as u64
        } else {
            0
        }
    }
}
