use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use crypto_portfolio_core::config::TrackerConfig;
use crypto_portfolio_core::providers::coingecko::CoinGeckoClient;
use crypto_portfolio_core::services::snapshot_scheduler::{PortfolioOutcome, TickReport};
use crypto_portfolio_core::PortfolioTracker;

mod logger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the snapshot scheduler until interrupted (default)
    Run,
    /// Take one round of snapshots and exit
    Tick,
    /// Print a user's snapshot history as JSON
    History {
        user_id: String,
        /// 1h, 24h, 7d, 30d or 90d
        #[arg(short, long, default_value = "24h")]
        range: String,
    },
    /// Print a user's most recent snapshot as JSON
    Latest { user_id: String },
    /// Print a user's current holdings as JSON
    Show { user_id: String },
    /// Add coins to a user's holdings
    Add {
        user_id: String,
        symbol: String,
        amount: f64,
    },
    /// Remove coins from a user's holdings
    Remove {
        user_id: String,
        symbol: String,
        amount: f64,
    },
    /// List the quote currencies CoinGecko can price against
    Currencies,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logger::setup_logger().context("failed to set up logger")?;

    let cli = Cli::parse();
    let config = TrackerConfig::from_env().context("invalid configuration")?;
    let tracker = PortfolioTracker::from_config(config)
        .await
        .context("failed to initialize tracker")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&tracker).await?,
        Commands::Currencies => {
            let client = CoinGeckoClient::with_base_url(tracker.config().coingecko_base_url.clone())
                .with_api_key(tracker.config().coingecko_api_key.clone());
            let currencies = client.supported_currencies().await?;
            println!("{}", currencies.join(", "));
        }
        Commands::Tick => {
            let report = tracker.take_snapshots().await;
            print_report(&report);
        }
        Commands::History { user_id, range } => {
            let snapshots = tracker.history(&user_id, &range).await?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        Commands::Latest { user_id } => match tracker.latest_snapshot(&user_id).await? {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => println!("No snapshots for {user_id}"),
        },
        Commands::Show { user_id } => {
            let portfolio = tracker.get_portfolio(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&portfolio)?);
        }
        Commands::Add {
            user_id,
            symbol,
            amount,
        } => {
            let portfolio = tracker.add_holding(&user_id, &symbol, amount).await?;
            println!("{}", serde_json::to_string_pretty(&portfolio)?);
        }
        Commands::Remove {
            user_id,
            symbol,
            amount,
        } => {
            let portfolio = tracker.remove_holding(&user_id, &symbol, amount).await?;
            println!("{}", serde_json::to_string_pretty(&portfolio)?);
        }
    }

    Ok(())
}

async fn run(tracker: &PortfolioTracker) -> Result<()> {
    info!(
        "Starting snapshot daemon: every {}s in {}, store {}",
        tracker.config().snapshot_interval_secs,
        tracker.config().currency,
        tracker
            .config()
            .store_path
            .as_ref()
            .map_or_else(|| "in-memory".to_string(), |p| p.display().to_string())
    );

    let handle = tracker.start_scheduler();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested, waiting for the current tick to finish");
    handle.shutdown().await;
    Ok(())
}

fn print_report(report: &TickReport) {
    println!(
        "Tick {:?}: {} saved, {} skipped, {} failed",
        report.status,
        report.saved(),
        report.skipped(),
        report.failed()
    );
    for outcome in &report.outcomes {
        match outcome {
            PortfolioOutcome::Saved {
                user_id,
                total_value,
                entries,
                ..
            } => println!("  {user_id}: saved {entries} coin(s), total {total_value:.2}"),
            PortfolioOutcome::Skipped { user_id } => println!("  {user_id}: skipped (no prices)"),
            PortfolioOutcome::Failed {
                user_id,
                kind,
                message,
            } => {
                error!("{user_id}: {kind} failure: {message}");
                println!("  {user_id}: failed ({kind}): {message}");
            }
        }
    }
}
