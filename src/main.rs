//! Keyforge - exhaustive candidate search against a remote checking service
//!
//! Configuration comes from `KEYFORGE_*` environment variables (or `.env`).
//! Ctrl-C cancels the run; a second Ctrl-C exits without waiting for shutdown.

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use keyforge::{logging, RunOutcome, Search, SearchConfig};
use std::env;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        print_help();
        return;
    }
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("keyforge {}", keyforge::VERSION);
        return;
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            process::exit(1);
        }
    };
    let guard = match logging::init(config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e.user_message());
            process::exit(1);
        }
    };

    let code = match run(config).await {
        Ok(outcome) => {
            println!("{}", outcome);
            outcome.exit_code()
        }
        Err(e) => {
            match e.downcast_ref::<keyforge::KeyforgeError>() {
                Some(err) => eprintln!("{}", err.user_message()),
                None => eprintln!("❌ Error: {:#}", e),
            }
            1
        }
    };

    // Flush the log file before exiting
    drop(guard);
    process::exit(code);
}

fn load_config() -> keyforge::Result<SearchConfig> {
    let config = SearchConfig::from_env()?;
    config.validate()?;
    Ok(config)
}

async fn run(config: SearchConfig) -> anyhow::Result<RunOutcome> {
    let search = Search::with_http(config)?;

    let interrupt = CancellationToken::new();
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::info!("KeyboardInterrupt received, stopping");
            interrupt.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Second interrupt, exiting without waiting for shutdown");
                process::exit(1);
            }
        });
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} {msg}")
            .context("invalid progress template")?,
    );
    bar.enable_steady_tick(Duration::from_millis(200));

    let report = {
        let bar = bar.clone();
        search
            .run_with_progress(interrupt, move |snapshot| {
                bar.set_message(format!(
                    "{} checked, {} unknown, {:.0}/s",
                    snapshot.resolved(),
                    snapshot.unknown,
                    snapshot.checks_per_second
                ));
            })
            .await
    };
    bar.finish_and_clear();
    let report = report?;

    tracing::info!(
        elapsed_secs = (report.finished_at - report.started_at).num_seconds(),
        "Time taken"
    );
    Ok(report.outcome)
}

/// Print help information
fn print_help() {
    println!("🔑 Keyforge - exhaustive candidate search");
    println!("═══════════════════════════════════════");
    println!();
    println!("USAGE:");
    println!("    keyforge");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    KEYFORGE_BASE_URL                 Verification service");
    println!("                                      (default: http://127.0.0.1:5000)");
    println!("    KEYFORGE_MODE                     remote: check every candidate remotely");
    println!("                                      md5: match the target digest locally,");
    println!("                                      confirm the match remotely (default: remote)");
    println!("    KEYFORGE_CHARSET                  digits, lower, upper, alnum or literal");
    println!("                                      symbols (default: alnum)");
    println!("    KEYFORGE_MIN_LENGTH               Shortest length, inclusive (default: 8)");
    println!("    KEYFORGE_MAX_LENGTH               Longest length, exclusive (default: 16)");
    println!("    KEYFORGE_WORKERS                  Generator threads (default: CPU count)");
    println!("    KEYFORGE_BATCH_SIZE               Candidates per batch (default: 500000)");
    println!("    KEYFORGE_CHANNEL_CAPACITY         Candidates buffered per worker");
    println!("                                      (default: 4000000)");
    println!("    KEYFORGE_MAX_CONCURRENCY          Concurrent requests (default: 1024)");
    println!("    KEYFORGE_MAX_PENDING              Outstanding verification tasks");
    println!("                                      (default: 2x concurrency)");
    println!("    KEYFORGE_RETRY_BUDGET             Attempts per candidate (default: 3)");
    println!("    KEYFORGE_REQUEST_TIMEOUT_SECS     Per-request timeout (default: 30)");
    println!("    KEYFORGE_SHUTDOWN_TIMEOUT_SECS    Shutdown grace period (default: 10)");
    println!("    KEYFORGE_PROGRESS_INTERVAL_SECS   Progress interval, 0 disables (default: 10)");
    println!("    KEYFORGE_LOG_FILE                 Run log, truncated at start; empty disables");
    println!("                                      (default: requests.log)");
    println!("    RUST_LOG                          Log filter (default: info)");
    println!();
    println!("EXIT STATUS:");
    println!("    0  candidate found, or search space exhausted");
    println!("    1  cancelled or invalid configuration");
}
