//! Festsync simulation binary.
//!
//! Runs a seeded simulation of several dashboard clients against an
//! in-memory backend and checks invariants after every step.
//!
//! # Usage
//!
//! ```bash
//! # One run with a fixed seed
//! festsync-sim --seed 42 --steps 2000 --clients 4
//!
//! # Sweep 100 seeds starting at 1
//! festsync-sim --seed 1 --runs 100
//! ```

use clap::Parser;
use festsync_harness::SimWorld;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Names handed to simulated users, in order.
const NAMES: [&str; 6] = ["Aoi", "Ren", "Sora", "Hina", "Kai", "Mio"];

/// Festsync deterministic simulation
#[derive(Parser, Debug)]
#[command(name = "festsync-sim")]
#[command(about = "Seeded simulation of festsync clients against an in-memory backend")]
#[command(version)]
struct Args {
    /// First seed to run
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of consecutive seeds to run
    #[arg(short, long, default_value = "1")]
    runs: u64,

    /// Random operations per run
    #[arg(long, default_value = "1000")]
    steps: u64,

    /// Simulated clients per run
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u8).range(1..=6))]
    clients: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, runs = args.runs, steps = args.steps, "simulation starting");

    for seed in args.seed..args.seed.saturating_add(args.runs) {
        let mut world = SimWorld::new(seed);
        for name in NAMES.iter().take(usize::from(args.clients)) {
            world.add_client(name).await;
        }

        match world.run(args.steps).await {
            Ok(stats) => tracing::info!(
                seed,
                steps = stats.steps,
                updates = stats.view_updates,
                rejected = stats.rejected,
                stalled = stats.stalled_sends,
                "run passed"
            ),
            Err(failure) => {
                tracing::error!(seed, %failure, "run failed");
                return Err(failure.into());
            },
        }
    }

    tracing::info!("all runs passed");
    Ok(())
}
