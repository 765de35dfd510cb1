//! Backtest driver.
//!
//! Replays historical prices and borrow rates through a [`PositionEngine`]
//! and collects the resulting history and metrics.

use std::path::Path;

use levtoken_core::{
    ts_to_date, AuctionConfig, BacktestSettings, Config, Error, MarketPrices, RebalanceRecord,
    Result, Snapshot, StrategyConfig, Timestamp, Wad, SECONDS_PER_DAY,
};
use levtoken_ingestion::{merge_timelines, HistoricalData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{collateral_for_ratio, EngineConfig, PositionEngine};
use crate::metrics::{BacktestMetrics, MetricsCalculator};
use crate::random::{RandomSource, SeededRandom};

/// Backtest configuration.
#[derive(Debug, Clone, Default)]
pub struct BacktestConfig {
    /// Strategy to backtest.
    pub strategy: StrategyConfig,
    /// Auction timing parameters.
    pub auction: AuctionConfig,
    /// Initial deposit in collateral units.
    pub initial_deposit: f64,
    /// Estimated cost per rebalance in USD.
    pub rebalance_cost_usd: f64,
    /// Annual management fee as a decimal.
    pub management_fee_rate: f64,
}

impl From<&Config> for BacktestConfig {
    fn from(config: &Config) -> Self {
        Self {
            strategy: config.strategy.clone(),
            auction: config.auction.clone(),
            initial_deposit: config.backtest.initial_deposit,
            rebalance_cost_usd: config.backtest.rebalance_cost_usd,
            management_fee_rate: config.backtest.management_fee_rate,
        }
    }
}

impl BacktestConfig {
    fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.auction.validate()?;
        BacktestSettings {
            initial_deposit: self.initial_deposit,
            management_fee_rate: self.management_fee_rate,
            rebalance_cost_usd: self.rebalance_cost_usd,
            ..BacktestSettings::default()
        }
        .validate()
    }
}

/// Time span covered by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
    pub duration_days: f64,
}

/// Result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub period: Period,
    pub metrics: BacktestMetrics,
    pub rebalances: Vec<RebalanceRecord>,
    pub history: Vec<Snapshot>,
}

impl BacktestResult {
    /// Pretty JSON with token amounts as exact integer strings.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the result as pretty JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Runs historical simulations of a leverage token strategy.
///
/// Usage: [`load_data`](Self::load_data), then [`initialize`](Self::initialize),
/// then [`run`](Self::run).
pub struct Backtester<R> {
    data: Option<HistoricalData>,
    config: Option<BacktestConfig>,
    engine: Option<PositionEngine<R>>,
}

impl<R: RandomSource> Backtester<R> {
    /// Create an empty backtester.
    pub fn new() -> Self {
        Self {
            data: None,
            config: None,
            engine: None,
        }
    }

    /// Load the historical series to replay.
    pub fn load_data(&mut self, data: HistoricalData) {
        self.data = Some(data);
    }

    /// Build the initial position for `config`.
    ///
    /// The position starts at the target ratio with equity equal to the
    /// deposit, priced at the first observation at or after the window start.
    /// `random` drives the auction timing model.
    pub fn initialize(&mut self, config: BacktestConfig, random: R) -> Result<()> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::not_ready("historical data not loaded, call load_data() first"))?;
        config.validate()?;

        let window = config.strategy.window;
        let (first_debt, first_collateral) = match (
            data.debt_prices.first_at_or_after(window.from),
            data.collateral_prices.first_at_or_after(window.from),
        ) {
            (Some(debt), Some(collateral)) => (debt, collateral),
            _ => {
                return Err(Error::insufficient_data(format!(
                    "no price data at or after {} for the backtest window",
                    ts_to_date(window.from)
                )))
            }
        };

        let bounds = config.strategy.bounds;
        let target = Wad::from_f64(bounds.target);
        let deposit = Wad::from_f64(config.initial_deposit);
        let prices = MarketPrices {
            collateral_price_usd: first_collateral.price,
            debt_price_usd: first_debt.price,
            timestamp: first_debt.timestamp,
        };

        // ratio R = c*Pc / (d*Pd) and equity = c - d*Pd/Pc, solved for d and c
        let debt = deposit
            .mul_div_floor(
                Wad::from_f64(prices.collateral_price_usd),
                Wad::from_f64(prices.debt_price_usd),
            )
            .mul_div_floor(Wad::ONE, target.saturating_sub(Wad::ONE));
        let collateral = collateral_for_ratio(debt, target, &prices);

        let engine_config = EngineConfig {
            initial_collateral: collateral,
            initial_debt: debt,
            initial_shares: deposit,
            bounds,
            start_timestamp: first_debt.timestamp,
            rebalance_cost_usd: config.rebalance_cost_usd,
            management_fee_rate: config.management_fee_rate,
            auction: config.auction.clone(),
        };

        info!(
            strategy = %config.strategy.name,
            deposit = config.initial_deposit,
            collateral_symbol = %config.strategy.collateral_symbol,
            target_leverage = bounds.target_leverage(),
            collateral = %engine_config.initial_collateral,
            debt = %engine_config.initial_debt,
            shares = %engine_config.initial_shares,
            "initialized simulation"
        );

        self.engine = Some(PositionEngine::new(engine_config, random));
        self.config = Some(config);
        Ok(())
    }

    /// Replay the window tick by tick.
    ///
    /// Per tick: accrue the management fee, accrue interest since the
    /// previous tick, advance the clock, rebalance if the auction model
    /// fires, then record a snapshot.
    pub fn run(&mut self) -> Result<BacktestResult> {
        let (data, config, engine) = match (&self.data, &self.config, self.engine.as_mut()) {
            (Some(data), Some(config), Some(engine)) => (data, config, engine),
            _ => {
                return Err(Error::not_ready(
                    "backtester not initialized, call initialize() first",
                ))
            }
        };

        let window = config.strategy.window;
        let timeline = merge_timelines(
            &data.debt_prices.within(&window),
            &data.collateral_prices.within(&window),
            &data.borrow_apy.within(&window),
        );

        let (start, end) = match (timeline.first(), timeline.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => {
                return Err(Error::insufficient_data(format!(
                    "no data points between {} and {}",
                    ts_to_date(window.from),
                    ts_to_date(window.to)
                )))
            }
        };

        info!(
            from = %ts_to_date(window.from),
            to = %ts_to_date(window.to),
            ticks = timeline.len(),
            "running backtest"
        );

        let mut rebalances = Vec::new();
        let mut last_timestamp = start;
        let progress_interval = (timeline.len() / 20).max(1);

        for (i, point) in timeline.iter().enumerate() {
            let prices = point.prices();
            let rate = point.borrow_rate();
            let delta = point.timestamp - last_timestamp;

            engine.accrue_management_fee(point.timestamp);
            if delta > 0 {
                engine.accrue_interest(&rate, delta);
            }
            engine.update_timestamp(point.timestamp);

            let check = engine.check_rebalance_needed(&prices);
            if let Some(trigger) = check.trigger {
                let record = engine.rebalance(&prices, trigger.direction);
                debug!(
                    date = %ts_to_date(point.timestamp),
                    direction = trigger.direction.as_str(),
                    emergency = trigger.is_emergency,
                    ratio_before = record.ratio_before,
                    ratio_after = record.ratio_after,
                    "rebalanced"
                );
                rebalances.push(record);
            }

            engine.record_snapshot(&prices, rate.apy);
            last_timestamp = point.timestamp;

            if (i + 1) % progress_interval == 0 {
                debug!(progress_pct = (i + 1) * 100 / timeline.len(), "backtest progress");
            }
        }

        info!(rebalances = rebalances.len(), "backtest complete");

        let history = engine.history().to_vec();
        let metrics = MetricsCalculator::new(config.strategy.bounds).calculate(&history, &rebalances)?;

        Ok(BacktestResult {
            strategy_name: config.strategy.name.clone(),
            period: Period {
                start,
                end,
                duration_days: (end - start) as f64 / SECONDS_PER_DAY,
            },
            metrics,
            rebalances,
            history,
        })
    }

    /// The engine, once initialized.
    pub fn engine(&self) -> Option<&PositionEngine<R>> {
        self.engine.as_ref()
    }
}

impl Backtester<SeededRandom> {
    /// Initialize from a loaded [`Config`], seeding the auction model with
    /// `config.backtest.seed` so the run can be reproduced.
    pub fn initialize_from_config(&mut self, config: &Config) -> Result<()> {
        self.initialize(
            BacktestConfig::from(config),
            SeededRandom::new(config.backtest.seed),
        )
    }
}

impl<R: RandomSource> Default for Backtester<R> {
    fn default() -> Self {
        Self::new()
    }
}
