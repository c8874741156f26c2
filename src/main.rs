// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use crate::config::Config;
use crate::workload::{launch_workload, Generator, RequestQueue};
use backtrace::Backtrace;
use clap::{value_parser, Command};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use ringlog::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::time::sleep;

mod admin;
mod clients;
mod config;
mod limiter;
mod metrics;
mod output;
mod workload;

use metrics::*;

static RUNNING: AtomicBool = AtomicBool::new(true);
static WAIT: AtomicUsize = AtomicUsize::new(0);

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let cli = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "Dispatches generated requests to an endpoint through one rate limited worker per credential.",
        )
        .arg(
            clap::Arg::new("CONFIG")
                .help("Configuration file")
                .value_parser(value_parser!(PathBuf))
                .action(clap::ArgAction::Set)
                .required(true)
                .index(1),
        )
        .get_matches();

    let Some(config) = cli.get_one::<PathBuf>("CONFIG") else {
        unreachable!("CONFIG is a required argument");
    };
    let config = Config::new(config);

    run(config)
}

/// Prints the error to stderr and terminates the process.
fn fatal(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{context}: {error}");
    std::process::exit(1);
}

fn run(config: Config) {
    // configure debug log
    let debug_output: Box<dyn Output> = if let Some(file) = config.debug().log_file() {
        let backup = config
            .debug()
            .log_backup()
            .unwrap_or(format!("{}.old", file));
        match File::new(&file, &backup, config.debug().log_max_size()) {
            Ok(f) => Box::new(f),
            Err(e) => fatal("failed to open debug log file", e),
        }
    } else {
        // by default, log to stderr
        Box::new(Stderr::new())
    };

    let level = config.debug().log_level();

    let debug_log = match if level <= Level::Info {
        LogBuilder::new().format(ringlog::default_format)
    } else {
        LogBuilder::new()
    }
    .output(debug_output)
    .log_queue_depth(config.debug().log_queue_depth())
    .single_message_size(config.debug().log_single_message_size())
    .build()
    {
        Ok(log) => log,
        Err(e) => fatal("failed to initialize debug log", e),
    };

    let mut log = MultiLogBuilder::new()
        .level_filter(level.to_level_filter())
        .default(debug_log)
        .build()
        .start();

    output!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    output!(
        "Target: {} Workers: {} Rate: {}/{:?} (+{} headroom)",
        config.target().endpoint(),
        config.target().credentials().len(),
        config.ratelimit().rate(),
        config.ratelimit().period(),
        config.ratelimit().headroom(),
    );

    // initialize async runtime for control plane
    let control_runtime = match Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
    {
        Ok(rt) => rt,
        Err(e) => fatal("failed to initialize tokio runtime", e),
    };

    // spawn logging thread
    control_runtime.spawn(async move {
        while RUNNING.load(Ordering::Relaxed) {
            sleep(Duration::from_millis(1)).await;
            let _ = log.flush();
        }
        let _ = log.flush();
    });

    let counters = Arc::new(Counters::new());
    let queue = RequestQueue::new();

    debug!("Initializing workload generator");
    let generator = match Generator::new(&config, queue.clone(), counters.clone()) {
        Ok(generator) => generator,
        Err(e) => fatal("failed to initialize workload ratelimit", e),
    };

    // spawn the admin thread
    control_runtime.spawn(admin::http(config.clone(), counters.clone()));

    // begin cli output
    control_runtime.spawn(output::log(config.clone(), counters.clone(), queue.clone()));

    debug!("Starting dispatch workers");
    let client_runtime = match clients::launch(&config, queue, counters) {
        Ok(rt) => rt,
        Err(e) => fatal("failed to launch dispatch workers", e),
    };

    debug!("Running workload generator");
    let workload_runtime = match launch_workload(generator) {
        Ok(rt) => rt,
        Err(e) => fatal("failed to launch workload generator", e),
    };

    debug!("Waiting for run to complete");
    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));
    }

    // shutdown thread pools
    workload_runtime.shutdown_timeout(Duration::from_millis(100));
    client_runtime.shutdown_timeout(Duration::from_millis(100));

    // delay before exiting
    while WAIT.load(Ordering::Relaxed) > 0 {
        std::thread::sleep(Duration::from_millis(100));
    }

    std::thread::sleep(Duration::from_millis(100));
}
