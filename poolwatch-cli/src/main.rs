use clap::{Parser, Subcommand};
use poolwatch_core::{DiagnosticReport, ReportThresholds, StateCounts};
use poolwatch_monitor::{
    ConnectionConfig, DiagnoseOptions, ReapPolicy, ReapReport, diagnose, run_reap,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "poolwatch", version = "0.1.0")]
#[command(about = "Postgres connection-pool diagnostics and idle-session reclamation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Snapshot the session registry, probe the server, print a report
    Diagnose {
        /// Probe timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// Print the report as one JSON document
        #[arg(long)]
        json: bool,
    },
    /// Terminate stale idle sessions to free pool capacity
    Reap {
        /// Minimum idle age, in seconds, before a session may be reaped
        #[arg(long, default_value_t = 300)]
        max_idle_age: u64,
        /// Idle sessions always left alive
        #[arg(long, default_value_t = 5)]
        safety_floor: usize,
        /// Maximum terminations in one pass
        #[arg(long, default_value_t = 50)]
        budget: usize,
        /// Print the outcome as one JSON document
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize JSON logging once.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter, // fallback to default if parsing fails
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .try_init();

    let cli = Cli::parse();

    // Connection settings come from the environment only: DATABASE_URL, or
    // the discrete DB_* variables. A config failure means nothing below can
    // work, so it exits before any connection is attempted.
    let config = match ConnectionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "connection settings could not be resolved");
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    let code = match cli.command {
        Commands::Diagnose { timeout_secs, json } => {
            let options = DiagnoseOptions {
                probe_timeout: Duration::from_secs(timeout_secs),
                thresholds: ReportThresholds::default(),
            };
            let report = diagnose(&config, &options).await;
            if json {
                print_json(&report);
            } else {
                print_report(&report);
            }
            report.exit_code()
        }
        Commands::Reap {
            max_idle_age,
            safety_floor,
            budget,
            json,
        } => {
            let policy = ReapPolicy {
                max_idle_age: Duration::from_secs(max_idle_age),
                safety_floor,
                budget,
            };
            match run_reap(&config, &policy).await {
                Ok(report) => {
                    if json {
                        print_json(&report);
                    } else {
                        print_reap(&report);
                    }
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "reap pass failed");
                    eprintln!("reap failed: {e}");
                    e.exit_code()
                }
            }
        }
    };
    std::process::exit(code);
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(doc) => println!("{doc}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

fn print_counts(counts: Option<StateCounts>) {
    match counts {
        Some(counts) => {
            println!("sessions.total = {}", counts.total);
            println!("sessions.active = {}", counts.active);
            println!("sessions.idle = {}", counts.idle);
            println!(
                "sessions.idle_in_transaction = {}",
                counts.idle_in_transaction
            );
        }
        None => println!("sessions = unknown (registry visibility degraded)"),
    }
}

fn print_report(report: &DiagnosticReport) {
    println!("classification = {}", report.classification);
    println!(
        "probe.latency = {}",
        humantime::format_duration(Duration::from_millis(
            report.probe.latency.as_millis() as u64
        ))
    );
    if let Some(version) = &report.probe.server_version {
        println!("probe.server_version = {version}");
    }
    if let Some(error) = &report.probe.error {
        println!("probe.error = {error}");
    }
    print_counts(report.snapshot.counts);
    for action in &report.actions {
        println!("action = {action}");
    }
}

fn print_reap(report: &ReapReport) {
    print_counts(report.counts_before);
    println!("terminated = {}", report.terminated);
    for failure in &report.failures {
        println!("failed pid {} = {}", failure.pid, failure.reason);
    }
    for pid in &report.stuck_in_transaction {
        println!("warning = pid {pid} is idle in transaction; left alone");
    }
}
