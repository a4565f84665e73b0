//! Grid strategy backtester
//!
//! Replays a historical candle file through the same grid advisor the live
//! service uses, with simulated fills, fee accounting and average-cost
//! position tracking. Prints the report to stdout and writes trades.csv,
//! rounds_detail.csv and report.md into a directory named after the
//! position size.

use clap::Parser;
use gridbot::application::backtest::{BacktestConfig, BacktestEngine, loader, report};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Replay the grid strategy over historical candles")]
struct Args {
    /// JSON candle file (array of stored candle events)
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value = "10000")]
    initial_balance: Decimal,

    #[arg(long, default_value = "0.001")]
    fee_rate: Decimal,

    #[arg(long, default_value = "0")]
    slippage: Decimal,

    #[arg(long, default_value = "ETH-USDT")]
    inst_id: String,

    #[arg(long, default_value = "0.0015")]
    take_profit_rate_min: Decimal,

    #[arg(long, default_value = "0.003")]
    take_profit_rate_max: Decimal,

    #[arg(long, default_value = "100")]
    position_size: Decimal,

    #[arg(long, default_value = "1")]
    break_even_min: Decimal,

    #[arg(long, default_value = "20")]
    break_even_max: Decimal,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    enable_trend_filter: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    enable_red_candle_filter: bool,

    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    enable_auto_funding: bool,

    #[arg(long, default_value = "1000")]
    auto_funding_amount: Decimal,

    /// Candles without an open before funds are injected
    #[arg(long, default_value_t = 288)]
    auto_funding_idle_threshold: u32,

    /// Directory the result folder is created under
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

fn run(args: Args) -> anyhow::Result<()> {
    let candles = loader::load_candles(&args.data)?;

    let config = BacktestConfig {
        initial_balance: args.initial_balance,
        fee_rate: args.fee_rate,
        slippage: args.slippage,
        inst_id: args.inst_id,
        take_profit_rate_min: args.take_profit_rate_min,
        take_profit_rate_max: args.take_profit_rate_max,
        position_size: args.position_size,
        break_even_min: args.break_even_min,
        break_even_max: args.break_even_max,
        enable_trend_filter: args.enable_trend_filter,
        enable_red_candle_filter: args.enable_red_candle_filter,
        enable_auto_funding: args.enable_auto_funding,
        auto_funding_amount: args.auto_funding_amount,
        auto_funding_idle_threshold: args.auto_funding_idle_threshold,
    };

    let mut engine = BacktestEngine::new(config.clone())?;
    let result = engine.run(&candles);

    let rendered = report::render_report(&config, &result, engine.funding_log());
    print!("{rendered}");

    let dir = report::export_all(
        &args.output,
        &config,
        &result,
        engine.trade_log(),
        engine.rounds(),
        engine.funding_log(),
    )?;
    println!("\nResults written to {}", dir.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
