use std::cell::Cell;
use std::rc::Rc;

use crossclk::{FifoModel, FifoPins, Kernel, Net, TestBench, TestConfig};

/// Counts enable assertions seen at rising edges of `clk` before `rst_n` has
/// been observed active and released again.
fn spawn_probe(kernel: &Kernel, clk: Net, rst_n: Net, enable: Net, violations: Rc<Cell<u32>>) {
    kernel.spawn(async move {
        let mut was_active = false;
        loop {
            clk.rising().await;
            if !rst_n.is_high() {
                was_active = true;
            } else if was_active {
                break;
            }
            if enable.is_high() {
                violations.set(violations.get() + 1);
            }
        }
    });
}

/// Until reset has completed on a domain, that domain's enable line must
/// never be seen asserted.
#[test]
fn no_enable_assertion_before_reset_completes() {
    let config = TestConfig {
        count: 50,
        ..TestConfig::default()
    };
    let kernel = Kernel::new();
    let pins = FifoPins::new(&kernel, config.width);
    let dut = FifoModel::new(pins.clone(), 8);
    dut.start(&kernel);
    let bench = TestBench::new(&kernel, &pins, &config, Some(dut.depth())).unwrap();

    let violations = Rc::new(Cell::new(0u32));
    spawn_probe(
        &kernel,
        pins.clk_a.clone(),
        pins.rst_a_n.clone(),
        pins.wr_en.clone(),
        Rc::clone(&violations),
    );
    spawn_probe(
        &kernel,
        pins.clk_b.clone(),
        pins.rst_b_n.clone(),
        pins.rd_en.clone(),
        Rc::clone(&violations),
    );

    let report = kernel.run(async move { bench.execute().await }).unwrap();
    assert_eq!(report.observed, 50);
    assert_eq!(violations.get(), 0);
}

/// The model holds its ready lines low while its domain is in reset.
#[test]
fn ready_lines_stay_low_during_reset() {
    let config = TestConfig {
        count: 10,
        ..TestConfig::default()
    };
    let kernel = Kernel::new();
    let pins = FifoPins::new(&kernel, config.width);
    let dut = FifoModel::new(pins.clone(), 8);
    dut.start(&kernel);
    let bench = TestBench::new(&kernel, &pins, &config, Some(dut.depth())).unwrap();

    let seen_ready_in_reset = Rc::new(Cell::new(false));
    let flag = Rc::clone(&seen_ready_in_reset);
    let clk = pins.clk_a.clone();
    let rst = pins.rst_a_n.clone();
    let rdy = pins.wr_rdy.clone();
    kernel.spawn(async move {
        let mut was_active = false;
        loop {
            clk.rising().await;
            clk.kernel().settle().await;
            if !rst.is_high() {
                was_active = true;
                if rdy.is_high() {
                    flag.set(true);
                }
            } else if was_active {
                break;
            }
        }
    });

    kernel.run(async move { bench.execute().await }).unwrap();
    assert!(!seen_ready_in_reset.get());
}
