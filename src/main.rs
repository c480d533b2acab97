//! tiered-resilience
//!
//! Command-line front end for the resilience core.
//!
//! ```text
//! tiered-resilience [--config FILE] check
//!     → load + validate config → print effective config as JSON
//!
//! tiered-resilience [--config FILE] drill --requests N --fail-rate tier=p ...
//!     → simulated tiers behind retry + breakers + fallback, health monitor on
//!     → Ctrl-C / SIGTERM stops early
//!     → print DrillReport as JSON
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use tiered_resilience::config::resolve_config;
use tiered_resilience::drill::{run_drill, DrillPlan};
use tiered_resilience::lifecycle::signals::spawn_signal_listener;
use tiered_resilience::lifecycle::Shutdown;
use tiered_resilience::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "tiered-resilience")]
#[command(about = "Circuit breakers, retry and tier fallback", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults plus RESILIENCE_* overrides when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the effective values
    Check,
    /// Drive simulated tiers through the full resilience stack
    Drill {
        #[arg(short = 'n', long, default_value_t = 100)]
        requests: u64,

        #[arg(short = 'j', long, default_value_t = 8)]
        concurrency: usize,

        /// Failure probability for a tier, e.g. `primary=0.9` (repeatable)
        #[arg(long = "fail-rate", value_parser = parse_fail_rate)]
        fail_rate: Vec<(String, f64)>,

        /// Simulated latency per tier request, in milliseconds
        #[arg(long, default_value_t = 5)]
        latency_ms: u64,
    },
}

fn parse_fail_rate(raw: &str) -> Result<(String, f64), String> {
    let (tier, rate) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TIER=RATE, got '{raw}'"))?;
    let rate: f64 = rate
        .parse()
        .map_err(|e| format!("invalid rate '{rate}': {e}"))?;
    Ok((tier.to_string(), rate))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(
        config = ?cli.config,
        tiers = ?config.fallback.order,
        "tiered-resilience v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Drill {
            requests,
            concurrency,
            fail_rate,
            latency_ms,
        } => {
            let plan = DrillPlan {
                requests,
                concurrency,
                fail_rates: fail_rate.into_iter().collect::<BTreeMap<_, _>>(),
                latency: Duration::from_millis(latency_ms),
            };

            let shutdown = Shutdown::new();
            let receiver = shutdown.subscribe();
            let listener = spawn_signal_listener(shutdown);

            let report = run_drill(&config, plan, receiver).await?;
            listener.abort();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
