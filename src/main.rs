mod candles;
mod config;
mod exchange;
mod funding;
mod indicators;
mod journal;
mod mtf;
mod notifications;
mod orchestrator;
mod orders;
mod positions;
mod reconcile;
mod risk;
mod strategies;
mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use exchange::{BybitClient, Exchange, PaperExchange};
use orchestrator::TradingCore;

#[derive(Parser)]
#[command(name = "trading-core")]
#[command(author = "Trading Core")]
#[command(version = "0.1.0")]
#[command(about = "Live trading core for a perpetual-futures signal-to-execution pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration environment name (selects config/{name}.toml)
    #[arg(short, long, default_value = "default")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Force testnet/mainnet regardless of config
    #[arg(long)]
    testnet: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run against the live exchange with real orders
    Live,
    /// Run against paper-simulated fills fed by live market data
    Paper {
        /// Starting paper balance in quote currency
        #[arg(short, long, default_value = "10000")]
        capital: f64,
    },
    /// Validate the layered configuration and exit
    CheckConfig,
    /// Print the most recent journalled equity snapshot
    Status {
        /// Path to the journal database
        #[arg(short, long, default_value = "journal.db")]
        journal: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("trading core starting");

    match cli.command {
        Commands::Live => run_live(&cli.config, cli.testnet).await,
        Commands::Paper { capital } => run_paper(&cli.config, cli.testnet, Decimal::try_from(capital)?).await,
        Commands::CheckConfig => check_config(&cli.config, cli.testnet),
        Commands::Status { journal } => print_status(&journal).await,
    }
}

fn load_settings(environment: &str, testnet: Option<bool>) -> Result<config::AppSettings> {
    let settings = config::load(environment)?;
    let settings = config::apply_cli_overrides(settings, testnet, None);
    if let Err(errors) = settings.validate() {
        return Err(anyhow!("invalid configuration: {}", errors.join("; ")));
    }
    Ok(settings)
}

fn check_config(environment: &str, testnet: Option<bool>) -> Result<()> {
    let settings = load_settings(environment, testnet)?;
    info!(symbols = ?settings.trading.enabled_symbols, testnet = settings.exchange.use_testnet, "configuration is valid");
    Ok(())
}

async fn run_live(environment: &str, testnet: Option<bool>) -> Result<()> {
    let settings = load_settings(environment, testnet)?;
    if settings.exchange.api_key.is_empty() || settings.exchange.api_secret.is_empty() {
        return Err(anyhow!("live trading requires exchange.api_key and exchange.api_secret"));
    }

    let exchange: Arc<dyn Exchange> = Arc::new(BybitClient::new(
        settings.exchange.api_key.clone(),
        settings.exchange.api_secret.clone(),
        settings.exchange.use_testnet,
        settings.exchange.recv_window_ms as u64,
    ));

    run_core(settings, exchange).await
}

async fn run_paper(environment: &str, testnet: Option<bool>, starting_capital: Decimal) -> Result<()> {
    let settings = load_settings(environment, testnet)?;

    let market_data: Arc<dyn Exchange> = Arc::new(BybitClient::new(
        settings.exchange.api_key.clone(),
        settings.exchange.api_secret.clone(),
        settings.exchange.use_testnet,
        settings.exchange.recv_window_ms as u64,
    ));
    let exchange: Arc<dyn Exchange> = Arc::new(PaperExchange::new(market_data, starting_capital));

    run_core(settings, exchange).await
}

async fn run_core(settings: config::AppSettings, exchange: Arc<dyn Exchange>) -> Result<()> {
    let core = Arc::new(TradingCore::new(settings, exchange).await?);
    core.start().await?;

    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    core.stop().await;
    Ok(())
}

async fn print_status(journal_path: &str) -> Result<()> {
    let journal = journal::JournalWriter::new(journal_path).await?;
    match journal.last_equity_snapshot().await? {
        Some((timestamp, equity)) => {
            info!(timestamp = %timestamp, equity = %equity, "most recent equity snapshot");
        }
        None => {
            error!("no equity snapshots recorded yet");
        }
    }
    Ok(())
}
