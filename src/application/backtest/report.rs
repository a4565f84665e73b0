use crate::application::backtest::engine::{
    BacktestConfig, FundingRecord, RoundRecord, TradeLogEntry,
};
use crate::application::backtest::metrics::BacktestReport;
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// `YYYY-MM-DD HH:MM:SS`, UTC.
pub fn format_time(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => String::from("invalid-time"),
    }
}

/// Writes trades.csv, rounds_detail.csv and report.md into a directory named
/// after the position size, under `output_root`. Returns the directory path.
pub fn export_all(
    output_root: &Path,
    config: &BacktestConfig,
    report: &BacktestReport,
    trades: &[TradeLogEntry],
    rounds: &[RoundRecord],
    funding: &[FundingRecord],
) -> Result<PathBuf> {
    let dir = output_root.join(format!("backtest_{}", config.position_size));
    fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create output directory '{}'", dir.display()))?;

    write_trades_csv(&dir.join("trades.csv"), trades)?;
    write_rounds_csv(&dir.join("rounds_detail.csv"), rounds)?;
    fs::write(dir.join("report.md"), render_report(config, report, funding))
        .context("cannot write report.md")?;
    Ok(dir)
}

fn write_trades_csv(path: &Path, trades: &[TradeLogEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create '{}'", path.display()))?;
    writer.write_record([
        "TradeID",
        "Time",
        "Action",
        "Price",
        "PositionSize",
        "Balance",
        "PnL%",
        "PnL",
        "Fee",
        "Reason",
        "PositionID",
    ])?;
    for trade in trades {
        writer.write_record([
            trade.trade_id.to_string(),
            format_time(trade.time),
            trade.action.to_string(),
            format!("{:.2}", trade.price),
            format!("{:.2}", trade.position_size),
            format!("{:.2}", trade.balance),
            format!("{:.4}", trade.pnl_percent),
            format!("{:.2}", trade.pnl),
            format!("{:.8}", trade.fee),
            trade.reason.clone(),
            trade.position_id.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_rounds_csv(path: &Path, rounds: &[RoundRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create '{}'", path.display()))?;
    writer.write_record([
        "Round",
        "StartTime",
        "EndTime",
        "Opens",
        "Closes",
        "GrossPnL",
        "Fees",
        "NetPnL",
        "EndBalance",
        "Completed",
    ])?;
    for round in rounds {
        writer.write_record([
            round.round.to_string(),
            format_time(round.start_time),
            format_time(round.end_time),
            round.opens.to_string(),
            round.closes.to_string(),
            format!("{:.2}", round.gross_pnl),
            format!("{:.8}", round.fees),
            format!("{:.2}", round.net_pnl),
            format!("{:.2}", round.end_balance),
            round.completed.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// The human-readable report, also printed to stdout by the CLI.
pub fn render_report(
    config: &BacktestConfig,
    report: &BacktestReport,
    funding: &[FundingRecord],
) -> String {
    let mut out = String::new();
    out.push_str("# Backtest Report\n\n");
    out.push_str(&format!("Instrument: {}\n\n", config.inst_id));

    out.push_str("## Configuration\n\n");
    out.push_str(&format!("- Position size: {}\n", config.position_size));
    out.push_str(&format!("- Fee rate: {}\n", config.fee_rate));
    out.push_str(&format!(
        "- Take-profit rate: {} - {}\n",
        config.take_profit_rate_min, config.take_profit_rate_max
    ));
    out.push_str(&format!(
        "- Break-even window: {} - {}\n",
        config.break_even_min, config.break_even_max
    ));
    out.push_str(&format!("- Trend filter: {}\n", config.enable_trend_filter));
    out.push_str(&format!(
        "- Red-candle filter: {}\n",
        config.enable_red_candle_filter
    ));
    out.push_str(&format!("- Auto funding: {}\n\n", config.enable_auto_funding));

    out.push_str("## Results\n\n");
    out.push_str(&format!("- Initial balance: {:.2}\n", report.initial_balance));
    out.push_str(&format!("- Final balance: {:.2}\n", report.final_balance));
    out.push_str(&format!("- Total equity: {:.2}\n", report.total_equity));
    out.push_str(&format!("- Net profit: {:.2}\n", report.net_profit));
    out.push_str(&format!("- Total return: {:.2}%\n", report.total_return_pct));
    out.push_str(&format!("- Max drawdown: {:.2}%\n", report.max_drawdown_pct));
    out.push_str(&format!("- Opened trades: {}\n", report.total_opened_trades));
    out.push_str(&format!(
        "- Closed trades: {} ({} wins / {} losses)\n",
        report.total_trades, report.winning_trades, report.losing_trades
    ));
    out.push_str(&format!("- Win rate: {:.2}%\n", report.win_rate));
    out.push_str(&format!("- Profit factor: {:.2}\n", report.profit_factor));
    out.push_str(&format!(
        "- Gross profit (avg-cost): {:.2}\n",
        report.total_profit_gross
    ));
    out.push_str(&format!(
        "- Gross profit (per-entry): {:.2}\n",
        report.total_profit_gross_entry
    ));
    out.push_str(&format!(
        "- Fees paid: {:.8} (open {:.8} / close {:.8})\n",
        report.total_fees_paid, report.total_fees_open, report.total_fees_close
    ));
    out.push_str(&format!(
        "- Open positions: {} (notional {:.2}, unrealized {:.2} at mark {:.2})\n",
        report.open_positions,
        report.open_position_notional,
        report.unrealized_pnl,
        report.mark_price
    ));
    out.push_str(&format!(
        "- Average hold: {}s\n",
        report.average_hold_secs
    ));

    if !funding.is_empty() {
        out.push_str("\n## Funding\n\n");
        for record in funding {
            out.push_str(&format!(
                "- {}: +{} after {} idle candles ({} -> {})\n",
                format_time(record.time),
                record.amount,
                record.idle_candles,
                record.before,
                record.after
            ));
        }
    }
    out
}
