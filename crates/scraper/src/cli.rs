use anyhow::Result;
use common::db::Database;
use chrono::Utc;
use common::store::{
    format_ts, history_for_address, latest_per_address, query_snapshots, snapshot_stats,
};
use common::types::{SnapshotQuery, WalletSnapshot};

use crate::analyze::{analyze, format_active_row};

const DEFAULT_TOP: u32 = 20;
const HISTORY_LIMIT: u32 = 30;
const USAGE: &str =
    "usage: scraper [--config <path>] [run | stats | top [N] | wallet <address> | analyze | price <token>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Stats,
    Top { limit: u32 },
    Wallet { address: String },
    Analyze,
    Price { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub command: Command,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Cli, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let mut config_path = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or_else(|| USAGE.to_string())?;
                config_path = Some(path);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("run") => Command::Run,
        Some("stats") => Command::Stats,
        Some("top") => {
            let limit = match positional.next() {
                Some(n) => n
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid count for top: {n}"))?,
                None => DEFAULT_TOP,
            };
            Command::Top { limit }
        }
        Some("wallet") => {
            let address = positional
                .next()
                .ok_or_else(|| "usage: scraper wallet <address>".to_string())?;
            Command::Wallet { address }
        }
        Some("analyze") => Command::Analyze,
        Some("price") => {
            let token = positional
                .next()
                .ok_or_else(|| "usage: scraper price <token>".to_string())?;
            Command::Price { token }
        }
        Some(other) => return Err(format!("unknown command: {other}\n{USAGE}")),
    };

    Ok(Cli {
        config_path,
        command,
    })
}

/// Read-only inspection commands. `Run` and `Price` need the async runtime and
/// are handled in `main`.
pub fn run_command(db: &Database, cmd: &Command) -> Result<()> {
    match cmd {
        Command::Stats => show_stats(db),
        Command::Top { limit } => show_top(db, *limit),
        Command::Wallet { address } => show_wallet(db, address),
        Command::Analyze => show_analysis(db),
        Command::Run | Command::Price { .. } => Ok(()),
    }
}

fn show_stats(db: &Database) -> Result<()> {
    let stats = snapshot_stats(&db.conn)?;
    println!("Snapshot store:");
    println!("  total_records={}", stats.total_records);
    println!("  distinct_addresses={}", stats.distinct_addresses);
    println!("  average_winrate={:.3}", stats.average_winrate);
    match stats.latest_collected_at {
        Some(ts) => println!("  latest_collected_at={}", format_ts(&ts)),
        None => println!("  latest_collected_at=(none)"),
    }
    Ok(())
}

pub fn format_row(s: &WalletSnapshot) -> String {
    format!(
        "{winrate:>6.3}  {profit:>12.2}  {tf:>3}  {collected}  {address}  tag={tag}",
        winrate = s.winrate,
        profit = s.realized_profit,
        tf = s.timeframe.as_str(),
        collected = format_ts(&s.collected_at),
        address = s.address,
        tag = s.tag.as_deref().unwrap_or("-"),
    )
}

fn show_top(db: &Database, limit: u32) -> Result<()> {
    let query = SnapshotQuery {
        limit,
        ..SnapshotQuery::default()
    };
    let rows = query_snapshots(&db.conn, &query)?;
    println!("Latest snapshots ({}):", rows.len());
    for row in &rows {
        println!("{}", format_row(row));
    }
    Ok(())
}

fn show_wallet(db: &Database, address: &str) -> Result<()> {
    println!("Wallet: {address}");
    let rows = history_for_address(&db.conn, address, HISTORY_LIMIT)?;
    if rows.is_empty() {
        println!("  (no snapshots)");
        return Ok(());
    }
    for row in &rows {
        println!(
            "  {}  buys={} sells={} pnl={}",
            format_row(row),
            row.buy_count,
            row.sell_count,
            row.pnl.map_or_else(|| "-".to_string(), |p| format!("{p:.4}")),
        );
    }
    Ok(())
}

fn show_analysis(db: &Database) -> Result<()> {
    let analysis = analyze(latest_per_address(&db.conn)?, Utc::now());
    println!("Active wallets ({}):", analysis.wallets.len());
    for (idx, wallet) in analysis.wallets.iter().enumerate() {
        println!("{}", format_active_row(idx + 1, wallet));
    }
    println!("Summary:");
    println!("  total_profit={:.2}", analysis.total_profit);
    println!("  average_winrate={:.1}%", analysis.average_winrate * 100.0);
    Ok(())
}
