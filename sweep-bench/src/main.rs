mod cli;
mod config;
mod data_gen;
mod harness;
mod output;
mod stats;

use std::process::ExitCode;
use std::slice;
use std::sync::Arc;

use clap::Parser;
use sweep_primitives::{Device, DeviceConfig, DeviceInfo, ExecutionMode, TuningParameters};

use cli::{Command, DeviceArgs, SweepArgs};
use config::{get_profile, quick_profile};
use harness::{CheckResult, Harness, HarnessError};
use output::json::{write_json, Report};
use output::progress::SweepProgress;
use output::table::{keys_table, render_bench, render_checks};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = SweepArgs::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn build_harness(args: &DeviceArgs) -> Result<Harness, HarnessError> {
    let mut config = DeviceConfig::default();
    if let Some(workers) = args.workers {
        config = config
            .with_info(DeviceInfo::software(workers))
            .with_workers(workers);
    }
    if args.serial {
        config = config.with_mode(ExecutionMode::SerialReversed);
    }
    if let Some(max_dim) = args.max_dim {
        config = config.with_max_dispatch_dimension(max_dim);
    }
    let tuning = match (args.partition_size, args.threads_per_group) {
        (Some(partition_size), Some(threads)) => Some(TuningParameters::custom(partition_size, threads)?),
        _ => None,
    };
    let device = Device::with_config(config)?;
    Ok(Harness::new(Arc::new(device), tuning))
}

/// Returns whether every validation passed.
fn run(args: SweepArgs) -> Result<bool, HarnessError> {
    let harness = build_harness(&args.device)?;
    let device = harness.device().clone();
    println!("sweep-bench: {} ({:?})", device.info().description, device.mode());

    match args.command {
        Command::Sort(sort) => {
            let run = harness.run_sort(&sort)?;
            render_checks(slice::from_ref(&run.check));
            if !run.head.is_empty() {
                println!("{}", keys_table(run.key_type, &run.head));
            }
            Ok(run.check.passed())
        }
        Command::Scan(scan) => {
            let check = harness.run_scan(&scan)?;
            render_checks(slice::from_ref(&check));
            Ok(check.passed())
        }
        Command::TestAll(test) => {
            let progress = SweepProgress::new();
            let checks = harness.test_all(test.suite, progress.callback());
            progress.finish();
            let checks = checks?;
            render_checks(&checks);
            Ok(checks.iter().all(CheckResult::passed))
        }
        Command::Bench(bench) => {
            let mut profile = match &bench.profile {
                Some(name) => get_profile(name).ok_or_else(|| HarnessError::UnknownProfile(name.clone()))?,
                None => quick_profile(),
            };
            if let Some(size) = bench.size {
                profile.sizes = vec![size];
            }
            if let Some(batch) = bench.batch {
                profile.batch = batch;
            }
            println!(
                "  profile {}: sizes {:?}, {} timed runs, {} warmup",
                profile.name, profile.sizes, profile.batch, profile.warmup
            );

            let progress = SweepProgress::new();
            let results = harness.bench(&bench, &profile, progress.callback());
            progress.finish();
            let results = results?;
            render_bench(&results);

            if let Some(path) = &bench.json_file {
                let report = Report::new(&device.info().description, device.workers(), &results);
                write_json(path, &report)?;
            }
            Ok(results.iter().all(|r| r.errors == 0))
        }
    }
}
