mod agent;
mod clock;
mod config;
mod interface;
mod kernel;
mod model;
mod testbench;
mod time;
mod vcd;

pub use agent::{ReadMonitor, WriteDriver};
pub use clock::{ClockConfigError, ClockGen, ClockSpec, MAX_JITTER_SIGMA};
pub use config::{ClockConfig, TestConfig};
pub use kernel::{
    DelayFuture, EdgeFuture, EdgeKind, JoinFuture, Kernel, Net, SettleFuture, SignalId, TaskHandle,
};
pub use interface::{Interface, ReadInterface, WriteInterface};
pub use model::{FifoModel, FifoPins};
pub use testbench::{
    CheckError, DEPTH_ENV, HarnessError, RunReport, TestBench, check_sequence, generate_stimulus,
    run_test,
};
pub use time::{TimeBase, TimeError, TimeUnit};
