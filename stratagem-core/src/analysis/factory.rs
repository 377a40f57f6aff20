//! Factory: converts `AnalyzerConfig` into runtime analyzers.

use super::{MomentumCrossover, PivotBreakout, TimeframeAnalyzer};
use crate::domain::Timeframe;
use serde::{Deserialize, Serialize};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FactoryError {
    #[error("{name} must be >= 1 (got {value}) for timeframe {timeframe}")]
    InvalidPeriod { timeframe: Timeframe, name: &'static str, value: usize },

    #[error("ATR multiplier must be positive (got {0})")]
    InvalidMultiplier(f64),

    #[error("RSI bounds must satisfy 0 <= low < high <= 100 (got {low}..{high})")]
    InvalidRsiBounds { low: f64, high: f64 },

    #[error("analyzers need a candle timeframe, not tick level")]
    TickTimeframe,
}

// ─── Config ──────────────────────────────────────────────────────────

/// One analyzer, as written in the parameters file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    pub timeframe: Timeframe,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,
    #[serde(flatten)]
    pub kind: AnalyzerKind,
}

/// Indicator recipe of an analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyzerKind {
    /// EMA/SMA crossover confirmed by RSI.
    MomentumCrossover {
        #[serde(default = "default_ema_period")]
        ema_period: usize,
        #[serde(default = "default_sma_period")]
        sma_period: usize,
        #[serde(default = "default_rsi_period")]
        rsi_period: usize,
        #[serde(default = "default_rsi_low")]
        rsi_low: f64,
        #[serde(default = "default_rsi_high")]
        rsi_high: f64,
    },
    /// Pivot R1/S1 breakout with an SMA trend.
    PivotBreakout {
        #[serde(default = "default_sma_period")]
        sma_period: usize,
    },
}

fn default_depth() -> usize {
    64
}
fn default_atr_period() -> usize {
    14
}
fn default_atr_multiplier() -> f64 {
    1.5
}
fn default_ema_period() -> usize {
    8
}
fn default_sma_period() -> usize {
    20
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_low() -> f64 {
    30.0
}
fn default_rsi_high() -> f64 {
    70.0
}

impl AnalyzerConfig {
    /// Daily and hourly pivot breakouts plus a three-minute momentum crossover.
    pub fn default_set() -> Vec<AnalyzerConfig> {
        vec![
            AnalyzerConfig {
                timeframe: Timeframe::D1,
                depth: 56,
                atr_period: 14,
                atr_multiplier: 1.5,
                kind: AnalyzerKind::PivotBreakout { sma_period: 50 },
            },
            AnalyzerConfig {
                timeframe: Timeframe::H1,
                depth: 64,
                atr_period: 14,
                atr_multiplier: 1.5,
                kind: AnalyzerKind::PivotBreakout { sma_period: 20 },
            },
            AnalyzerConfig {
                timeframe: Timeframe::M3,
                depth: 36,
                atr_period: 14,
                atr_multiplier: 3.0,
                kind: AnalyzerKind::MomentumCrossover {
                    ema_period: 8,
                    sma_period: 20,
                    rsi_period: 14,
                    rsi_low: 30.0,
                    rsi_high: 70.0,
                },
            },
        ]
    }

    pub fn validate(&self) -> Result<(), FactoryError> {
        if self.timeframe.is_tick() {
            return Err(FactoryError::TickTimeframe);
        }
        let check = |name: &'static str, value: usize| {
            if value == 0 {
                Err(FactoryError::InvalidPeriod { timeframe: self.timeframe, name, value })
            } else {
                Ok(())
            }
        };
        check("depth", self.depth)?;
        check("atr_period", self.atr_period)?;
        if !(self.atr_multiplier > 0.0 && self.atr_multiplier.is_finite()) {
            return Err(FactoryError::InvalidMultiplier(self.atr_multiplier));
        }
        match self.kind {
            AnalyzerKind::MomentumCrossover { ema_period, sma_period, rsi_period, rsi_low, rsi_high } => {
                check("ema_period", ema_period)?;
                check("sma_period", sma_period)?;
                check("rsi_period", rsi_period)?;
                if !(0.0..=100.0).contains(&rsi_low) || !(0.0..=100.0).contains(&rsi_high) || rsi_low >= rsi_high {
                    return Err(FactoryError::InvalidRsiBounds { low: rsi_low, high: rsi_high });
                }
            }
            AnalyzerKind::PivotBreakout { sma_period } => check("sma_period", sma_period)?,
        }
        Ok(())
    }
}

// ─── Analyzer factory ────────────────────────────────────────────────

/// Create an analyzer from its configuration.
pub fn build_analyzer(config: &AnalyzerConfig) -> Result<Box<dyn TimeframeAnalyzer>, FactoryError> {
    config.validate()?;
    let analyzer: Box<dyn TimeframeAnalyzer> = match config.kind {
        AnalyzerKind::MomentumCrossover { ema_period, sma_period, rsi_period, rsi_low, rsi_high } => {
            Box::new(MomentumCrossover::new(
                config.timeframe,
                config.depth,
                ema_period,
                sma_period,
                rsi_period,
                rsi_low,
                rsi_high,
                config.atr_period,
                config.atr_multiplier,
            ))
        }
        AnalyzerKind::PivotBreakout { sma_period } => Box::new(PivotBreakout::new(
            config.timeframe,
            config.depth,
            sma_period,
            config.atr_period,
            config.atr_multiplier,
        )),
    };
    Ok(analyzer)
}
