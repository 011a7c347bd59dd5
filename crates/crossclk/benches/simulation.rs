use criterion::{Criterion, criterion_group, criterion_main};
use crossclk::{ClockGen, ClockSpec, Kernel, TestConfig, TimeUnit, run_test};

fn benchmark_kernel(c: &mut Criterion) {
    c.bench_function("clock_cycles_10k", |b| {
        b.iter(|| {
            let kernel = Kernel::new();
            let clk = kernel.net("clk", 1);
            let clock = ClockGen::new(clk.clone(), ClockSpec::plain(10.0, TimeUnit::Ns), 7).unwrap();
            kernel.spawn(clock.run());
            kernel.run(async move { clk.cycles(10_000).await })
        })
    });

    c.bench_function("round_trip_100", |b| {
        let config = TestConfig {
            count: 100,
            ..TestConfig::default()
        };
        b.iter(|| run_test(&config, 8).unwrap())
    });
}

criterion_group!(benches, benchmark_kernel);
criterion_main!(benches);
