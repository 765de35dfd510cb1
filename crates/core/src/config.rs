//! Configuration structures for the leverage token backtester.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{RatioBounds, TimeRange};

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Strategy under test.
    pub strategy: StrategyConfig,
    /// Rebalance auction timing.
    pub auction: AuctionConfig,
    /// Backtest parameters.
    pub backtest: BacktestSettings,
}

impl Config {
    /// Parse a configuration from JSON. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that all sections are internally consistent.
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.auction.validate()?;
        self.backtest.validate()
    }
}

/// Leverage token strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Strategy name (e.g., "WEETH-WETH-17x").
    pub name: String,
    /// Collateral asset symbol.
    pub collateral_symbol: String,
    /// Debt asset symbol.
    pub debt_symbol: String,
    /// Collateral ratio bounds.
    pub bounds: RatioBounds,
    /// Backtest window.
    pub window: TimeRange,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "WEETH-WETH-17x".to_string(),
            collateral_symbol: "weETH".to_string(),
            debt_symbol: "ETH".to_string(),
            bounds: RatioBounds {
                min: 1.06135,
                target: 1.0625,
                max: 1.062893082,
                emergency_threshold: 1.06061,
            },
            // 2025-01-01 .. 2025-09-30
            window: TimeRange::new(1_735_689_600, 1_759_190_400),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        let b = &self.bounds;
        if !(b.emergency_threshold < b.min && b.min < b.target && b.target < b.max) {
            return Err(Error::config(format!(
                "ratio bounds must satisfy emergency < min < target < max, got {} / {} / {} / {}",
                b.emergency_threshold, b.min, b.target, b.max
            )));
        }
        if b.target <= 1.0 {
            return Err(Error::config(format!(
                "target ratio must be above 1.0, got {}",
                b.target
            )));
        }
        if self.window.from > self.window.to {
            return Err(Error::config(format!(
                "backtest window starts after it ends ({} > {})",
                self.window.from, self.window.to
            )));
        }
        Ok(())
    }
}

/// Timing of rebalance auctions.
///
/// The timing model runs one creation trial per evaluation, so the expected
/// wait before an auction is created depends on how often it is evaluated.
/// `creation_probability` is calibrated for 5-minute ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Minimum time for an out-of-bounds position to be noticed (seconds).
    pub min_notice_secs: f64,
    /// Maximum time for an out-of-bounds position to be noticed (seconds).
    pub max_notice_secs: f64,
    /// Mean auction duration once created (seconds).
    pub avg_duration_secs: f64,
    /// Standard deviation of the auction duration (seconds).
    pub duration_std_dev_secs: f64,
    /// Chance per evaluation that someone creates an auction (0-1).
    pub creation_probability: f64,
    /// Delay before an emergency rebalance executes (seconds).
    pub emergency_delay_secs: f64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            min_notice_secs: 600.0,
            max_notice_secs: 3600.0,
            avg_duration_secs: 2400.0,
            duration_std_dev_secs: 1200.0,
            creation_probability: 0.05,
            emergency_delay_secs: 600.0,
        }
    }
}

impl AuctionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.creation_probability) {
            return Err(Error::config(format!(
                "creation_probability must be in [0, 1], got {}",
                self.creation_probability
            )));
        }
        if self.min_notice_secs < 0.0 || self.min_notice_secs > self.max_notice_secs {
            return Err(Error::config(format!(
                "notice window must satisfy 0 <= min <= max, got [{}, {}]",
                self.min_notice_secs, self.max_notice_secs
            )));
        }
        if self.duration_std_dev_secs < 0.0 || self.emergency_delay_secs < 0.0 {
            return Err(Error::config(
                "duration std-dev and emergency delay must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Backtest run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Initial deposit in collateral units.
    pub initial_deposit: f64,
    /// Annual management fee as a decimal (0.02 = 2% per year).
    pub management_fee_rate: f64,
    /// Estimated cost per rebalance in USD.
    pub rebalance_cost_usd: f64,
    /// Seed for the auction timing random source.
    pub seed: u64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_deposit: 1.0,
            management_fee_rate: 0.02,
            rebalance_cost_usd: 5.0,
            seed: 42,
        }
    }
}

impl BacktestSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_deposit > 0.0) {
            return Err(Error::config(format!(
                "initial deposit must be positive, got {}",
                self.initial_deposit
            )));
        }
        if self.management_fee_rate < 0.0 || self.rebalance_cost_usd < 0.0 {
            return Err(Error::config("fee rate and rebalance cost must be non-negative"));
        }
        Ok(())
    }
}
