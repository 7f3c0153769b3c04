//! `rebound`: inspect and exercise retry policies.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rebound_core::{BackoffConfig, BackoffStrategy, CircuitStatus, ExecutorConfig};
use rebound_runtime::{Executor, ResilienceError, RetryOn};

#[derive(Parser)]
#[command(name = "rebound")]
#[command(about = "Inspect and exercise retry, backoff and circuit-breaker policies")]
struct Cli {
    /// Show debug logs
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the delay before each retry attempt
    Schedule {
        /// Load the backoff from a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// constant, linear, exponential or fibonacci
        #[arg(long)]
        strategy: Option<BackoffStrategy>,

        /// Base delay, e.g. "500ms"
        #[arg(long, value_parser = humantime::parse_duration)]
        base: Option<Duration>,

        /// Maximum delay, e.g. "1m"
        #[arg(long, value_parser = humantime::parse_duration)]
        max: Option<Duration>,

        /// Jitter fraction in [0, 1)
        #[arg(long)]
        jitter: Option<f64>,

        /// Number of attempts to print
        #[arg(long, default_value = "8")]
        attempts: u32,
    },

    /// Validate a config file and print it normalized
    Validate {
        /// Path to a .yaml, .yml or .json config
        path: PathBuf,
    },

    /// Run an executor against an operation that fails a set number of times
    Simulate {
        /// Load the policy from a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Invocations that fail before the operation recovers
        #[arg(long, default_value = "2")]
        fail_first: u32,

        /// Number of calls to make
        #[arg(long, default_value = "3")]
        calls: u32,

        /// Multiply every delay and timeout by this factor
        #[arg(long, default_value = "0.01")]
        time_scale: f64,

        /// Register a fallback for the simulated key
        #[arg(long)]
        fallback: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Schedule {
            config,
            strategy,
            base,
            max,
            jitter,
            attempts,
        } => {
            let mut backoff = match config {
                Some(path) => load_config(&path)?.backoff,
                None => BackoffConfig::default(),
            };
            if let Some(strategy) = strategy {
                backoff.strategy = strategy;
            }
            if let Some(base) = base {
                backoff.base_delay = base;
            }
            if let Some(max) = max {
                backoff.max_delay = max;
            }
            if let Some(jitter) = jitter {
                backoff.jitter = jitter;
            }
            backoff.validate().context("invalid backoff")?;
            print_schedule(&backoff, attempts);
        }
        Commands::Validate { path } => {
            let config = load_config(&path)?;
            print!("{}", config.to_yaml()?);
            eprintln!("{} is valid", path.display());
        }
        Commands::Simulate {
            config,
            fail_first,
            calls,
            time_scale,
            fallback,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => ExecutorConfig::default(),
            };
            let runtime = tokio::runtime::Runtime::new()?;
            let report = runtime.block_on(simulate(
                scale(config, time_scale)?,
                fail_first,
                calls,
                fallback,
            ))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<ExecutorConfig> {
    ExecutorConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn print_schedule(backoff: &BackoffConfig, attempts: u32) {
    println!(
        "strategy={:?} base={} max={} jitter={}",
        backoff.strategy,
        humantime::format_duration(backoff.base_delay),
        humantime::format_duration(backoff.max_delay),
        backoff.jitter
    );
    println!("{:>8}  {:>12}  {:>12}  {:>12}", "attempt", "delay", "min", "max");

    for (i, delay) in backoff.schedule(attempts).into_iter().enumerate() {
        let spread = delay.mul_f64(backoff.jitter);
        println!(
            "{:>8}  {:>12.3}  {:>12.3}  {:>12.3}",
            i + 1,
            delay.as_secs_f64(),
            delay.saturating_sub(spread).as_secs_f64(),
            (delay + spread).as_secs_f64()
        );
    }
}

/// Shrink (or stretch) every duration in a config.
fn scale(mut config: ExecutorConfig, factor: f64) -> Result<ExecutorConfig> {
    anyhow::ensure!(
        factor.is_finite() && factor > 0.0,
        "time scale must be a positive finite number"
    );

    let scaled = |d: Duration| {
        Duration::try_from_secs_f64(d.as_secs_f64() * factor)
            .with_context(|| format!("scaling {} by {factor} overflows", humantime::format_duration(d)))
    };
    config.reset_timeout = scaled(config.reset_timeout)?;
    config.backoff.base_delay = scaled(config.backoff.base_delay)?;
    config.backoff.max_delay = scaled(config.backoff.max_delay)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Serialize)]
struct CallReport {
    call: u32,
    outcome: String,
    severity: Option<String>,
    invocations_so_far: u32,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    calls: Vec<CallReport>,
    circuit: CircuitStatus,
}

#[derive(Debug, Clone)]
struct SimulatedFailure(u32);

impl std::fmt::Display for SimulatedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "simulated failure #{}", self.0)
    }
}

const SIMULATED_KEY: &str = "simulated";

async fn simulate(
    config: ExecutorConfig,
    fail_first: u32,
    calls: u32,
    fallback: bool,
) -> Result<SimulationReport> {
    let executor: Executor<SimulatedFailure> = Executor::from_config(config, RetryOn::all())?;
    if fallback {
        executor.register_fallback(SIMULATED_KEY, || async {
            Ok::<_, SimulatedFailure>("fallback".to_string())
        });
    }

    let invocations = Arc::new(AtomicU32::new(0));
    let mut reports = Vec::with_capacity(calls as usize);

    for call in 1..=calls {
        let result = executor
            .execute(SIMULATED_KEY, || {
                let invocations = invocations.clone();
                async move {
                    let n = invocations.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= fail_first {
                        Err(SimulatedFailure(n))
                    } else {
                        Ok(format!("success on invocation {n}"))
                    }
                }
            })
            .await;

        let (outcome, severity) = match result {
            Ok(value) => (value, None),
            Err(e @ ResilienceError::Inner(_)) => (format!("fallback failed: {e}"), Some(e.severity())),
            Err(e) => (e.to_string(), Some(e.severity())),
        };
        tracing::info!(call, outcome = %outcome, "Call finished");

        reports.push(CallReport {
            call,
            outcome,
            severity: severity.map(|s| s.to_string()),
            invocations_so_far: invocations.load(Ordering::SeqCst),
        });
    }

    Ok(SimulationReport {
        calls: reports,
        circuit: executor.get_circuit_status(SIMULATED_KEY),
    })
}
