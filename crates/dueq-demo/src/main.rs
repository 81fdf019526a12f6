use std::time::Duration;

use clap::Parser;
use dueq_core::DueqConfig;
use dueq_scheduler::{Scheduler, TaskError};
use tracing::info;

/// Walk through the ordering guarantees: a late task, three tied tasks, and
/// one due immediately, then print when each actually ran.
#[derive(Debug, Parser)]
#[command(name = "dueq-demo", version, about)]
struct Cli {
    /// Path to a dueq.toml config file.
    #[arg(long)]
    config: Option<String>,

    /// Base delay in milliseconds; the tied tasks run after one unit, the late task after two.
    #[arg(long, default_value_t = 5_000)]
    scale_ms: u64,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

/// Log the start and report the wall-clock time the task actually ran.
fn stamp(label: &str) -> Result<String, TaskError> {
    info!("start {label}");
    Ok(chrono::Utc::now().to_rfc3339())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DueqConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        DueqConfig::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .init();

    if cli.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let scheduler = Scheduler::<String>::with_config(config.scheduler.clone());
    scheduler.start()?;
    info!(at = %scheduler.now(), "demo started");

    let unit = Duration::from_millis(cli.scale_ms);
    // Late task first, so the earlier ones have to overtake it.
    let now = scheduler.now();
    let late = scheduler.task().after(unit * 2).run(move || stamp("1")).submit()?;

    // Three tasks at one instant run in submission order.
    let tied_at = now + chrono::Duration::from_std(unit)?;
    let second = scheduler.submit(tied_at, move || stamp("2"))?;
    let third = scheduler.submit(tied_at, move || stamp("3"))?;
    let fourth = scheduler.submit(tied_at, move || stamp("4"))?;

    // Due now: runs before everything above.
    let immediate = scheduler.task().now().run(move || stamp("5")).submit()?;

    info!(stats = %serde_json::to_string(&scheduler.stats())?, "tasks submitted");

    info!("finished 2 at {}", second.await?);
    info!("finished 3 at {}", third.await?);
    info!("finished 4 at {}", fourth.await?);
    // Already resolved by now; this await returns immediately.
    info!("finished 5 at {}", immediate.await?);
    info!("finished 1 at {}", late.await?);

    scheduler.stop()?;
    scheduler.join().await;
    Ok(())
}
