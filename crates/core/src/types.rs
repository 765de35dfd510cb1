//! Core data types for the leverage token backtester.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fixed::Wad;

/// Timestamp in seconds since Unix epoch (UTC).
pub type Timestamp = i64;

/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Seconds in a year, 365.25-day convention. Shared by fee and interest accrual.
pub const SECONDS_PER_YEAR: f64 = 365.25 * SECONDS_PER_DAY;

/// Format a timestamp as a calendar date for logs.
pub fn ts_to_date(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (seconds).
    pub from: Timestamp,
    /// End timestamp (seconds).
    pub to: Timestamp,
}

impl TimeRange {
    pub fn new(from: Timestamp, to: Timestamp) -> Self {
        Self { from, to }
    }

    /// Whether `ts` falls inside the window.
    #[inline]
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.from && ts <= self.to
    }

    /// Window length in days.
    pub fn duration_days(&self) -> f64 {
        (self.to - self.from) as f64 / SECONDS_PER_DAY
    }
}

/// A single observation of a price or rate series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Timestamp in seconds.
    pub timestamp: Timestamp,
    /// Observed value (USD price, or APY as a decimal).
    pub price: f64,
}

/// Rebalance direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Ratio above max: borrow more and buy collateral.
    Up,
    /// Ratio below min: sell collateral and repay debt.
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

/// Collateral ratio policy of a leverage token.
///
/// Valid bounds satisfy `emergency_threshold < min < target < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBounds {
    /// Below this ratio a rebalance down is due.
    pub min: f64,
    /// Ratio a rebalance restores.
    pub target: f64,
    /// Above this ratio a rebalance up is due.
    pub max: f64,
    /// Pre-liquidation threshold; below it rebalances are fast-tracked.
    pub emergency_threshold: f64,
}

impl RatioBounds {
    /// Whether `ratio` lies within `[min, max]`.
    #[inline]
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.min && ratio <= self.max
    }

    /// Leverage implied by the target ratio, `1 / (1 - 1/target)`.
    pub fn target_leverage(&self) -> f64 {
        1.0 / (1.0 - 1.0 / self.target)
    }
}

/// Point-in-time USD prices of both assets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    pub collateral_price_usd: f64,
    pub debt_price_usd: f64,
    pub timestamp: Timestamp,
}

/// Point-in-time borrow rate of the lending market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorrowRate {
    /// APY as a decimal (0.025 = 2.5%).
    pub apy: f64,
    pub timestamp: Timestamp,
}

/// Balances of a leverage token at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    /// Collateral held in the lending market.
    pub collateral_amount: Wad,
    /// Debt owed to the lending market.
    pub debt_amount: Wad,
    /// Outstanding shares of the token.
    pub total_shares: Wad,
    /// Timestamp of the state (seconds).
    pub timestamp: Timestamp,
}

/// Log entry for one executed rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub state_before: PositionState,
    pub state_after: PositionState,
    pub direction: Direction,
    pub ratio_before: f64,
    pub ratio_after: f64,
    /// Reporting figure only, never deducted from the position.
    pub estimated_cost_usd: f64,
}

/// Log entry for the position at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub state: PositionState,
    pub prices: MarketPrices,
    pub borrow_apy: f64,
    /// Collateral ratio; serialized as `null` when infinite (no debt).
    pub collateral_ratio: f64,
    /// Share price in collateral units.
    pub share_price: f64,
    pub equity_usd: f64,
}
