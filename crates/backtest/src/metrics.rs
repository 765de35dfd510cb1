//! Backtest performance metrics.
//!
//! Calculates performance metrics from the snapshot history of a run.

use levtoken_core::{Error, RatioBounds, RebalanceRecord, Result, Snapshot, Timestamp, SECONDS_PER_YEAR};
use serde::{Deserialize, Serialize};

/// Performance metrics for a backtest run. Returns and drawdown are fractions (0.05 = 5%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Share price at the first snapshot (collateral units).
    pub initial_share_price: f64,
    /// Share price at the last snapshot (collateral units).
    pub final_share_price: f64,
    /// Total return over the run.
    pub total_return: f64,
    /// Compound annualized return.
    pub annualized_return: f64,
    /// Largest peak-to-trough decline of the share price.
    pub max_drawdown: f64,
    /// Number of executed rebalances.
    pub rebalance_count: usize,
    /// Sum of estimated rebalance costs in USD.
    pub total_gas_costs_usd: f64,
    /// Mean collateral ratio over all snapshots.
    pub avg_collateral_ratio: f64,
    /// Snapshots with the ratio below min.
    pub times_below_min: usize,
    /// Snapshots with the ratio above max.
    pub times_above_max: usize,
}

/// Share price drawdown at one snapshot.
#[derive(Debug, Clone)]
pub struct DrawdownPoint {
    pub timestamp: Timestamp,
    pub share_price: f64,
    pub peak: f64,
    pub drawdown: f64,
}

/// Metrics calculator.
pub struct MetricsCalculator {
    bounds: RatioBounds,
}

impl MetricsCalculator {
    /// Create a calculator for a strategy's ratio bounds.
    pub fn new(bounds: RatioBounds) -> Self {
        Self { bounds }
    }

    /// Calculate metrics from the snapshot history and executed rebalances.
    pub fn calculate(&self, history: &[Snapshot], rebalances: &[RebalanceRecord]) -> Result<BacktestMetrics> {
        let (first, last) = match (history.first(), history.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::insufficient_data("no history to calculate metrics")),
        };

        let initial = first.share_price;
        let final_price = last.share_price;

        let mut metrics = BacktestMetrics {
            initial_share_price: initial,
            final_share_price: final_price,
            rebalance_count: rebalances.len(),
            ..Default::default()
        };

        if initial > 0.0 {
            metrics.total_return = (final_price - initial) / initial;

            let years = (last.timestamp - first.timestamp) as f64 / SECONDS_PER_YEAR;
            if years > 0.0 {
                metrics.annualized_return = (final_price / initial).powf(1.0 / years) - 1.0;
            }
        }

        metrics.max_drawdown = self
            .drawdown_curve(history)
            .iter()
            .map(|p| p.drawdown)
            .fold(0.0, f64::max);

        // an infinite ratio (zero debt) keeps the mean infinite
        metrics.avg_collateral_ratio =
            history.iter().map(|s| s.collateral_ratio).sum::<f64>() / history.len() as f64;

        for snapshot in history {
            if snapshot.collateral_ratio < self.bounds.min {
                metrics.times_below_min += 1;
            } else if snapshot.collateral_ratio > self.bounds.max {
                metrics.times_above_max += 1;
            }
        }

        metrics.total_gas_costs_usd = rebalances.iter().map(|r| r.estimated_cost_usd).sum();

        Ok(metrics)
    }

    /// Running drawdown of the share price, walking snapshots in order.
    pub fn drawdown_curve(&self, history: &[Snapshot]) -> Vec<DrawdownPoint> {
        let mut curve = Vec::with_capacity(history.len());
        let mut peak = match history.first() {
            Some(first) => first.share_price,
            None => return curve,
        };

        for snapshot in history {
            peak = peak.max(snapshot.share_price);
            let drawdown = if peak > 0.0 {
                (peak - snapshot.share_price) / peak
            } else {
                0.0
            };
            curve.push(DrawdownPoint {
                timestamp: snapshot.timestamp,
                share_price: snapshot.share_price,
                peak,
                drawdown,
            });
        }

        curve
    }
}
