use crossclk::{ClockConfig, TestConfig, run_test};
use test_case::test_case;

/// Reference scenario: width 8, 1000 random values, plain 5 ns / 20 ns
/// clocks, zero phase. Every value must come back, in order.
#[test]
fn stream_5ns_to_20ns_exact_match() {
    let config = TestConfig::default();
    let report = run_test(&config, 8).unwrap();
    assert_eq!(report.submitted, 1000);
    assert_eq!(report.observed, 1000);
}

#[test_case(2.0, 18.0 ; "fast_writer_slow_reader")]
#[test_case(18.0, 2.0 ; "slow_writer_fast_reader")]
#[test_case(6.0, 6.0 ; "matched_periods")]
#[test_case(14.0, 4.0 ; "seven_to_two_ratio")]
#[test_case(4.0, 16.0 ; "one_to_four_ratio")]
fn stream_survives_any_period_ratio(period_a: f64, period_b: f64) {
    let config = TestConfig {
        count: 200,
        clk_a: ClockConfig {
            period: period_a,
            ..ClockConfig::default()
        },
        clk_b: ClockConfig {
            period: period_b,
            ..ClockConfig::default()
        },
        ..TestConfig::default()
    };
    let report = run_test(&config, 8).unwrap();
    assert_eq!(report.observed, 200);
}

/// Jittered, phase-shifted, asymmetric-duty clocks: the handshake still
/// carries every item across in order.
#[test]
fn stream_with_jitter_and_phase_shift() {
    let config = TestConfig {
        count: 300,
        width: 16,
        plain_clocks: false,
        clk_a: ClockConfig {
            period: 7.0,
            duty_cycle: 0.45,
            phase_shift: 90.0,
            period_jitter_sigma: 0.1,
            duty_jitter_sigma: 0.05,
        },
        clk_b: ClockConfig {
            period: 13.0,
            duty_cycle: 0.55,
            phase_shift: 270.0,
            period_jitter_sigma: 0.2,
            duty_jitter_sigma: 0.1,
        },
        ..TestConfig::default()
    };
    let report = run_test(&config, 8).unwrap();
    assert_eq!(report.observed, 300);
}

/// The same seed reproduces the same run, tick for tick.
#[test]
fn runs_are_reproducible_by_seed() {
    let config = TestConfig {
        count: 100,
        plain_clocks: false,
        clk_a: ClockConfig {
            period: 6.0,
            period_jitter_sigma: 0.1,
            ..ClockConfig::default()
        },
        ..TestConfig::default()
    };
    let first = run_test(&config, 8).unwrap();
    let second = run_test(&config, 8).unwrap();
    assert_eq!(first.end_time, second.end_time);
}

#[test]
fn emits_a_vcd_trace_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.vcd");
    let config = TestConfig {
        count: 20,
        vcd: Some(path.clone()),
        ..TestConfig::default()
    };
    run_test(&config, 8).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("$enddefinitions $end"));
    assert!(text.contains("$var wire 1 ! clk_a $end"));
    assert!(text.contains("wr_data"));
}
