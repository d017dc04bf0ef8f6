use anyhow::Context;
use api_client::{ApiClient, BinanceClient};
use backtester::{BacktestResult, Backtester};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{Config, load_config};
use engine::LiveEngine;
use optimizer::Optimizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// The main entry point for the bandwatch trading bot.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets may come from a .env file; its absence is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli.log_dir);

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from '{}'", cli.config))?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Optimize(args) => handle_optimize(config, args).await,
        Commands::Backtest(args) => handle_backtest(config, args).await,
    }
}

/// Console output plus a daily rolling log file. The returned guard flushes the
/// file writer on drop and must live as long as the program.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "bandwatch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// An RSI + Bollinger Bands trading bot with a self-tuning parameter optimizer.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    /// Directory for the rolling log files.
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the live trading loop.
    Run,
    /// Run one optimizer pass over fresh history and print the candidates.
    Optimize(OptimizeArgs),
    /// Simulate a single parameter set over fresh history.
    Backtest(BacktestArgs),
}

#[derive(Parser)]
struct OptimizeArgs {
    /// Hide the progress bar.
    #[arg(long)]
    no_progress: bool,
}

/// Every flag defaults to the configured seed parameter.
#[derive(Parser)]
struct BacktestArgs {
    #[arg(long)]
    rsi_period: Option<usize>,
    #[arg(long)]
    rsi_upper: Option<f64>,
    #[arg(long)]
    rsi_lower: Option<f64>,
    #[arg(long)]
    bb_period: Option<usize>,
    #[arg(long)]
    bb_level: Option<f64>,
}

fn exchange_client(config: &Config) -> anyhow::Result<BinanceClient> {
    Ok(BinanceClient::new(
        config.bot.live_trading_enabled,
        &config.api,
        config.bot.history_limit,
    )?)
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_run(config: Config) -> anyhow::Result<()> {
    if config.bot.live_trading_enabled {
        tracing::warn!("Live trading is ENABLED. Orders will be sent to the production exchange.");
    }
    let api_client: Arc<dyn ApiClient> = Arc::new(exchange_client(&config)?);
    let notifier = Arc::from(alerter::from_config(&config.telegram));

    let engine = LiveEngine::new(config, api_client, notifier)?;
    engine.run().await?;
    Ok(())
}

async fn handle_optimize(config: Config, args: OptimizeArgs) -> anyhow::Result<()> {
    let client = exchange_client(&config)?;
    let bot = &config.bot;
    let series = client
        .fetch_bars(&bot.base, &bot.quote, bot.interval_minutes)
        .await
        .context("Failed to fetch history")?;

    let optimizer = Optimizer::new(
        config.optimizer.clone(),
        config.strategy.clone(),
        config.simulation.clone(),
    )?
    .with_progress(!args.no_progress);

    // The search is CPU-bound; keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || optimizer.run(&series)).await??;

    match outcome {
        Some(outcome) => {
            println!("{}", results_table(&outcome.candidates));
            println!(
                "Evaluated {} parameter sets. Winner: {:?} (delta {:.4})",
                outcome.evaluated, outcome.best.params, outcome.best.delta
            );
        }
        None => println!("No adequate parameters found."),
    }
    Ok(())
}

async fn handle_backtest(config: Config, args: BacktestArgs) -> anyhow::Result<()> {
    let mut params = config.strategy.seed;
    if let Some(v) = args.rsi_period {
        params.rsi_period = v;
    }
    if let Some(v) = args.rsi_upper {
        params.rsi_upper_bound = v;
    }
    if let Some(v) = args.rsi_lower {
        params.rsi_lower_bound = v;
    }
    if let Some(v) = args.bb_period {
        params.bb_period = v;
    }
    if let Some(v) = args.bb_level {
        params.bb_level = v;
    }
    params.validate()?;

    let client = exchange_client(&config)?;
    let bot = &config.bot;
    let series = client
        .fetch_bars(&bot.base, &bot.quote, bot.interval_minutes)
        .await
        .context("Failed to fetch history")?;

    let backtester = Backtester::new(config.strategy.clone(), config.simulation.clone())?;
    let result = backtester.run(&series, &params)?;

    println!("{}", results_table(std::slice::from_ref(&result)));
    println!("Final wallet: {:.2} {}", result.final_wallet, bot.quote);
    Ok(())
}

fn results_table(results: &[BacktestResult]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "RSI", "Upper", "Lower", "BB", "Level", "Delta", "Trades", "Sell watch", "Buy watch",
    ]);
    for r in results {
        let p = r.params;
        table.add_row(vec![
            p.rsi_period.to_string(),
            format!("{:.1}", p.rsi_upper_bound),
            format!("{:.1}", p.rsi_lower_bound),
            p.bb_period.to_string(),
            format!("{:.2}", p.bb_level),
            format!("{:.4}", r.delta),
            r.trades.to_string(),
            r.end_in_sell_period.to_string(),
            r.end_in_buy_period.to_string(),
        ]);
    }
    table
}
