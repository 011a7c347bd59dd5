use crossclk::{
    DEPTH_ENV, FifoModel, FifoPins, HarnessError, Kernel, TestBench, TestConfig,
};

/// A depth-8 FIFO accepts seven writes; after the seventh the write side must
/// stop advertising space, because an eighth attempt would have to block.
#[test]
fn fill_leaves_ready_deasserted_at_depth_minus_one() {
    let config = TestConfig {
        fill_to_capacity: true,
        ..TestConfig::default()
    };
    let kernel = Kernel::new();
    let pins = FifoPins::new(&kernel, config.width);
    let dut = FifoModel::new(pins.clone(), 8);
    dut.start(&kernel);
    let bench = TestBench::new(&kernel, &pins, &config, Some(dut.depth())).unwrap();
    let probe = pins.clone();
    let report = kernel.run(async move { bench.execute().await }).unwrap();
    assert_eq!(report.submitted, 7);
    assert_eq!(dut.occupancy(), 7);
    assert!(!probe.wr_rdy.is_high());
}

#[test]
fn fill_passes_through_run_test_entry_point() {
    let config = TestConfig {
        fill_to_capacity: true,
        ..TestConfig::default()
    };
    let report = crossclk::run_test(&config, 16).unwrap();
    assert_eq!(report.submitted, 15);
    assert_eq!(report.observed, 0);
}

#[test]
fn capacity_resolution_prefers_the_dut_parameter() {
    let config = TestConfig {
        fill_to_capacity: true,
        ..TestConfig::default()
    };
    assert_eq!(config.resolve_capacity(Some(8)).unwrap(), 7);
    assert!(matches!(
        config.resolve_capacity(None),
        Err(HarnessError::MissingDepth)
    ));
    // SAFETY: this test binary touches the variable from this test only.
    unsafe { std::env::set_var(DEPTH_ENV, "16") };
    assert_eq!(config.resolve_capacity(None).unwrap(), 15);
    unsafe { std::env::remove_var(DEPTH_ENV) };
}
