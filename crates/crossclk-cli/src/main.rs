use std::fs;
use std::path::PathBuf;

use clap::Parser;
use crossclk::{RunReport, TestConfig, run_test};
use itertools::iproduct;
use miette::{IntoDiagnostic, Result, bail};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "crossclk",
    about = "Sweep a dual-clock FIFO testbench across clock period pairs"
)]
struct Cli {
    /// TOML test configuration; built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write-domain periods to sweep, comma separated
    #[arg(long, value_delimiter = ',', default_value = "4,6,10,14,18")]
    periods_a: Vec<f64>,

    /// Read-domain periods to sweep, comma separated
    #[arg(long, value_delimiter = ',', default_value = "2,8,12,16,20")]
    periods_b: Vec<f64>,

    /// Items per run (overrides the config)
    #[arg(long)]
    count: Option<usize>,

    /// RNG seed (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Depth of the behavioral FIFO model
    #[arg(long, default_value_t = 8)]
    depth: usize,

    /// Emit a JSON report to stdout
    #[arg(long)]
    json: bool,

    /// Dump one VCD trace per run into this directory
    #[arg(long)]
    vcd_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct SweepEntry {
    period_a: f64,
    period_b: f64,
    outcome: String,
    report: Option<RunReport>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).into_diagnostic()?;
            TestConfig::from_toml(&text).into_diagnostic()?
        }
        None => TestConfig::default(),
    };
    if let Some(dir) = &cli.vcd_dir {
        fs::create_dir_all(dir).into_diagnostic()?;
    }

    let mut entries = Vec::new();
    let mut failures = 0usize;
    for (&period_a, &period_b) in iproduct!(&cli.periods_a, &cli.periods_b) {
        let mut config = base.clone();
        config.clk_a.period = period_a;
        config.clk_b.period = period_b;
        if let Some(count) = cli.count {
            config.count = count;
        }
        if let Some(seed) = cli.seed {
            config.seed = seed;
        }
        if let Some(dir) = &cli.vcd_dir {
            config.vcd = Some(dir.join(format!("sweep_a{period_a}_b{period_b}.vcd")));
        }
        match run_test(&config, cli.depth) {
            Ok(report) => {
                eprintln!(
                    "ok: clk_a={period_a} clk_b={period_b} ({} items in {} ticks)",
                    report.observed, report.end_time
                );
                entries.push(SweepEntry {
                    period_a,
                    period_b,
                    outcome: "pass".to_string(),
                    report: Some(report),
                });
            }
            Err(err) => {
                failures += 1;
                eprintln!("FAIL: clk_a={period_a} clk_b={period_b}: {err}");
                entries.push(SweepEntry {
                    period_a,
                    period_b,
                    outcome: err.to_string(),
                    report: None,
                });
            }
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&entries).into_diagnostic()?;
        println!("{json}");
    }
    eprintln!("{} run(s), {} failure(s)", entries.len(), failures);
    if failures > 0 {
        bail!("{failures} sweep run(s) failed");
    }
    Ok(())
}
