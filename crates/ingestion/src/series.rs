//! Historical price and rate series.
//!
//! Series arrive from the data-fetching layer as JSON files, one per asset.
//! This module loads and normalizes them before they reach the backtester.

use std::collections::HashSet;
use std::path::Path;

use levtoken_core::{Error, PricePoint, Result, TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One asset's price (or APY) history, as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetSeries {
    /// Asset symbol (e.g., "ETH", "weETH").
    pub symbol: String,
    /// Data source tag (e.g., "binance", "defillama", "morpho").
    pub source: String,
    /// Nominal sampling interval (e.g., "5m").
    pub timeframe: String,
    /// Observations, ascending by timestamp.
    pub data: Vec<PricePoint>,
}

impl AssetSeries {
    /// Create a series from observations.
    pub fn new(
        symbol: impl Into<String>,
        source: impl Into<String>,
        timeframe: impl Into<String>,
        data: Vec<PricePoint>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            timeframe: timeframe.into(),
            data,
        }
    }

    /// Parse a series from JSON and normalize it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut series: AssetSeries = serde_json::from_str(json)?;
        series.normalize();
        Ok(series)
    }

    /// Load a series from a JSON file and normalize it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let series = Self::from_json_str(&json)
            .map_err(|e| Error::data(format!("{}: {e}", path.display())))?;
        debug!(symbol = %series.symbol, points = series.len(), "loaded series");
        Ok(series)
    }

    /// Sort ascending and drop repeated timestamps, keeping the first occurrence.
    pub fn normalize(&mut self) {
        // stable sort keeps the first occurrence ahead of its duplicates
        self.data.sort_by_key(|p| p.timestamp);
        let mut seen = HashSet::with_capacity(self.data.len());
        let before = self.data.len();
        self.data.retain(|p| seen.insert(p.timestamp));
        if self.data.len() != before {
            debug!(
                symbol = %self.symbol,
                dropped = before - self.data.len(),
                "dropped duplicate timestamps"
            );
        }
    }

    /// Observations inside the window (inclusive on both ends).
    pub fn within(&self, range: &TimeRange) -> Vec<PricePoint> {
        self.data
            .iter()
            .filter(|p| range.contains(p.timestamp))
            .copied()
            .collect()
    }

    /// First observation at or after `ts`.
    pub fn first_at_or_after(&self, ts: Timestamp) -> Option<PricePoint> {
        let idx = self.data.partition_point(|p| p.timestamp < ts);
        self.data.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The three series a backtest consumes.
#[derive(Debug, Clone, Default)]
pub struct HistoricalData {
    /// USD price of the debt asset.
    pub debt_prices: AssetSeries,
    /// USD price of the collateral asset.
    pub collateral_prices: AssetSeries,
    /// Borrow APY of the lending market (decimal, in the `price` field).
    pub borrow_apy: AssetSeries,
}

impl HistoricalData {
    pub fn new(debt_prices: AssetSeries, collateral_prices: AssetSeries, borrow_apy: AssetSeries) -> Self {
        Self {
            debt_prices,
            collateral_prices,
            borrow_apy,
        }
    }
}
