//! Stratagem CLI: replay recorded quotes through strategy traders.
//!
//! Commands:
//! - `replay`: feed CSV tick files through one trader per instrument against the paper execution
//! - `check-config`: parse and validate a parameters file

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratagem_core::config::InstrumentConfig;
use stratagem_core::domain::Tick;
use stratagem_core::execution::PaperExecution;
use stratagem_core::notify::LogNotifier;
use stratagem_core::persistence::JsonFileStore;
use stratagem_core::trader::TraderStats;
use stratagem_core::{StratagemConfig, StrategyTrader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratagem", about = "Stratagem CLI, multi-timeframe strategy trader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay CSV quotes (timestamp,bid,ask,volume) through the configured traders.
    Replay {
        /// Path to the TOML parameters file.
        #[arg(long)]
        config: PathBuf,

        /// Tick files as MARKET=path.csv, one per instrument.
        #[arg(long = "ticks", required = true, value_parser = parse_tick_source)]
        ticks: Vec<(String, PathBuf)>,

        /// Persist trader state under this directory after the replay.
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },
    /// Parse and validate a parameters file.
    CheckConfig {
        /// Path to the TOML parameters file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { config, ticks, store_dir } => run_replay(&config, ticks, store_dir.as_deref()),
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn parse_tick_source(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((market, path)) if !market.is_empty() && !path.is_empty() => {
            Ok((market.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected MARKET=path.csv, got '{arg}'")),
    }
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = StratagemConfig::from_path(path).with_context(|| format!("invalid config {}", path.display()))?;
    println!(
        "{}: strategy '{}' on account '{}', {} instrument(s), {} timeframe(s)",
        path.display(),
        config.strategy,
        config.account,
        config.instruments.len(),
        config.params.timeframes.len()
    );
    Ok(())
}

// ─── Replay ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TickRow {
    timestamp: String,
    bid: f64,
    ask: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    market_id: String,
    ticks: usize,
    open_trades: usize,
    stats: TraderStats,
}

fn run_replay(config_path: &Path, sources: Vec<(String, PathBuf)>, store_dir: Option<&Path>) -> Result<()> {
    let config =
        StratagemConfig::from_path(config_path).with_context(|| format!("invalid config {}", config_path.display()))?;

    let instruments: BTreeMap<&str, &InstrumentConfig> =
        config.instruments.iter().map(|i| (i.market_id.as_str(), i)).collect();
    for (market, _) in &sources {
        if !instruments.contains_key(market.as_str()) {
            bail!("no instrument '{market}' in {}", config_path.display());
        }
    }

    let reports: Vec<Result<ReplayReport>> = sources
        .par_iter()
        .map(|(market, path)| replay_market(&config, instruments[market.as_str()], path, store_dir))
        .collect();

    let mut out = Vec::with_capacity(reports.len());
    for report in reports {
        out.push(report?);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn replay_market(
    config: &StratagemConfig,
    instrument: &InstrumentConfig,
    path: &Path,
    store_dir: Option<&Path>,
) -> Result<ReplayReport> {
    let ticks = load_ticks(path)?;
    let paper = Arc::new(PaperExecution::new());
    let trader = StrategyTrader::new(
        config.strategy.clone(),
        config.account.clone(),
        config.params.clone(),
        instrument.to_instrument(),
        paper.clone(),
        Arc::new(LogNotifier),
    )
    .with_context(|| format!("cannot build trader for {}", instrument.market_id))?;

    let store = store_dir.map(JsonFileStore::new);
    if let Some(store) = &store {
        let restored = trader.loads(store).with_context(|| format!("cannot restore {}", instrument.market_id))?;
        info!(market_id = %instrument.market_id, restored, "restored trades");
    }

    let base = config.params.base_timeframe;
    for tick in &ticks {
        trader.on_tick(*tick);
        trader.process(base, tick.timestamp);
        for event in paper.on_quote(&instrument.market_id, tick.bid, tick.ask, tick.timestamp) {
            if !trader.order_signal(&event) {
                warn!(market_id = %instrument.market_id, order_id = %event.order_id(), "unrouted order event");
            }
        }
    }
    if let Some(last) = ticks.last() {
        trader.update_trades(last.timestamp);
    }

    if let Some(store) = &store {
        trader.save(store).with_context(|| format!("cannot persist {}", instrument.market_id))?;
    }

    let open_trades = trader.trades().iter().filter(|t| !t.is_terminal()).count();
    info!(market_id = %instrument.market_id, ticks = ticks.len(), open_trades, "replay done");

    Ok(ReplayReport { market_id: instrument.market_id.clone(), ticks: ticks.len(), open_trades, stats: trader.stats() })
}

fn load_ticks(path: &Path) -> Result<Vec<Tick>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut ticks = Vec::new();
    for (line, row) in reader.deserialize::<TickRow>().enumerate() {
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), line + 2))?;
        let timestamp =
            parse_timestamp(&row.timestamp).with_context(|| format!("{}: bad timestamp at row {}", path.display(), line + 2))?;
        ticks.push(Tick::new(timestamp, row.bid, row.ask, row.volume));
    }
    ticks.sort_by_key(|t| t.timestamp);
    Ok(ticks)
}

/// RFC 3339, or epoch seconds / milliseconds.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(epoch) = raw.parse::<i64>() {
        let parsed = if epoch.abs() >= 100_000_000_000 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
        return parsed.with_context(|| format!("epoch out of range: {raw}"));
    }
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
