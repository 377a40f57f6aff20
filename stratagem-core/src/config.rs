//! Strategy trader parameters and the TOML file they are read from.

use crate::analysis::{AnalyzerConfig, FactoryError};
use crate::domain::{Instrument, Timeframe, TradeMode};
use crate::trade::EntryOrderType;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid parameter: {0}")]
    Invalid(String),
    #[error("invalid analyzer: {0}")]
    Factory(#[from] FactoryError),
}

// ─── Trader parameters ───────────────────────────────────────────────

/// Parameters of one strategy trader. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraderParams {
    /// Extra same-direction trades allowed on top of the first one.
    pub pyramided: u32,
    pub hedging: bool,
    pub max_trades: usize,
    /// Minimum delay between two entries in the same direction.
    pub trade_delay_secs: u64,
    /// Timeframe whose passes drive `process`.
    pub base_timeframe: Timeframe,
    pub min_traded_timeframe: Timeframe,
    pub max_traded_timeframe: Timeframe,
    /// Timeframe supplying the ATR stop and stop trailing.
    pub sltp_timeframe: Timeframe,
    /// Timeframe supplying the pivot ladder.
    pub ref_timeframe: Timeframe,
    /// Timeframe whose trend gates entries, the reference timeframe when unset.
    pub trend_timeframe: Option<Timeframe>,
    pub min_vol24h: f64,
    pub min_price: f64,
    /// Entry allowed when no region is defined.
    pub region_allow: bool,
    pub margin_only: bool,
    pub sltp_max_rate: f64,
    pub sltp_max_timeframe: Timeframe,
    /// Minimum delay between two exchange-side stop or target modifications.
    pub sltp_min_interval_secs: u64,
    pub min_reward_risk: f64,
    pub min_gain: f64,
    pub max_loss: f64,
    pub filter_cache_interval_secs: u64,
    /// Unfilled entries are canceled after this delay, one trade timeframe when unset.
    pub entry_timeout_secs: Option<u64>,
    pub order_type: EntryOrderType,
    pub timeframes: Vec<AnalyzerConfig>,
}

impl Default for TraderParams {
    fn default() -> Self {
        Self {
            pyramided: 0,
            hedging: false,
            max_trades: 1,
            trade_delay_secs: 30,
            base_timeframe: Timeframe::TICK,
            min_traded_timeframe: Timeframe::M3,
            max_traded_timeframe: Timeframe::M3,
            sltp_timeframe: Timeframe::H1,
            ref_timeframe: Timeframe::D1,
            trend_timeframe: None,
            min_vol24h: 1000.0,
            min_price: 0.000005,
            region_allow: true,
            margin_only: true,
            sltp_max_rate: 3.0,
            sltp_max_timeframe: Timeframe::M1,
            sltp_min_interval_secs: 60,
            min_reward_risk: 1.0,
            min_gain: 0.005,
            max_loss: 0.035,
            filter_cache_interval_secs: 3600,
            entry_timeout_secs: None,
            order_type: EntryOrderType::Limit,
            timeframes: AnalyzerConfig::default_set(),
        }
    }
}

/// Shortest entry timeout applied.
const MIN_ENTRY_TIMEOUT_SECS: u64 = 60;

impl TraderParams {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn trend_timeframe(&self) -> Timeframe {
        self.trend_timeframe.unwrap_or(self.ref_timeframe)
    }

    pub fn trade_delay(&self) -> Duration {
        Duration::seconds(self.trade_delay_secs as i64)
    }

    pub fn sltp_min_interval(&self) -> Duration {
        Duration::seconds(self.sltp_min_interval_secs as i64)
    }

    pub fn filter_cache_interval(&self) -> Duration {
        Duration::seconds(self.filter_cache_interval_secs as i64)
    }

    /// Entry timeout for a trade on `timeframe`.
    pub fn entry_timeout(&self, timeframe: Timeframe) -> Duration {
        let secs = self.entry_timeout_secs.unwrap_or(timeframe.secs() as u64).max(MIN_ENTRY_TIMEOUT_SECS);
        Duration::seconds(secs as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.max_trades == 0 {
            return invalid("max_trades must be >= 1".into());
        }
        if self.min_traded_timeframe > self.max_traded_timeframe {
            return invalid(format!(
                "min_traded_timeframe {} is above max_traded_timeframe {}",
                self.min_traded_timeframe, self.max_traded_timeframe
            ));
        }
        for (name, value) in [
            ("min_reward_risk", self.min_reward_risk),
            ("min_gain", self.min_gain),
            ("max_loss", self.max_loss),
            ("sltp_max_rate", self.sltp_max_rate),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return invalid(format!("{name} must be positive (got {value})"));
            }
        }
        if self.max_loss >= 1.0 {
            return invalid(format!("max_loss must be below 1 (got {})", self.max_loss));
        }

        let mut seen = BTreeSet::new();
        for analyzer in &self.timeframes {
            analyzer.validate()?;
            if !seen.insert(analyzer.timeframe) {
                return invalid(format!("timeframe {} configured twice", analyzer.timeframe));
            }
        }
        for (name, tf) in [
            ("sltp_timeframe", self.sltp_timeframe),
            ("ref_timeframe", self.ref_timeframe),
            ("trend_timeframe", self.trend_timeframe()),
        ] {
            if !seen.contains(&tf) {
                return invalid(format!("{name} {tf} has no analyzer"));
            }
        }
        Ok(())
    }
}

// ─── Parameters file ─────────────────────────────────────────────────

/// One market as described in the parameters file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    pub market_id: String,
    #[serde(default = "default_trade_mode")]
    pub trade_mode: TradeMode,
    pub tick_size: f64,
    pub lot_size: f64,
    #[serde(default)]
    pub maker_fee: f64,
    #[serde(default)]
    pub taker_fee: f64,
    #[serde(default)]
    pub min_notional: f64,
    pub trade_quantity: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    /// 24h quote volume assumed for the market filter.
    #[serde(default)]
    pub vol24h_quote: f64,
}

fn default_trade_mode() -> TradeMode {
    TradeMode::Margin
}
fn default_leverage() -> f64 {
    1.0
}

impl InstrumentConfig {
    pub fn to_instrument(&self) -> Instrument {
        let mut instrument = Instrument::new(self.market_id.clone(), self.trade_mode, self.tick_size, self.lot_size);
        instrument.maker_fee = self.maker_fee;
        instrument.taker_fee = self.taker_fee;
        instrument.min_notional = self.min_notional;
        instrument.trade_quantity = self.trade_quantity;
        instrument.leverage = self.leverage;
        instrument.vol24h_quote = self.vol24h_quote;
        instrument
    }
}

/// Whole parameters file: strategy identity, trader parameters, markets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StratagemConfig {
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub params: TraderParams,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

fn default_account() -> String {
    "paper".into()
}
fn default_strategy() -> String {
    "stratagem".into()
}

impl StratagemConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.params.validate()?;
        for instrument in &config.instruments {
            if !(instrument.tick_size > 0.0 && instrument.lot_size > 0.0) {
                return Err(ConfigError::Invalid(format!("{}: tick_size and lot_size must be positive", instrument.market_id)));
            }
        }
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }
}
