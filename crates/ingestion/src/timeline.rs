//! Timeline merging.
//!
//! Aligns independently sampled series onto one ordered timeline, carrying
//! each series' last observation forward where it has no sample.

use std::collections::{BTreeMap, BTreeSet};

use levtoken_core::{BorrowRate, MarketPrices, PricePoint, Timestamp};

/// One tick of the merged timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePoint {
    pub timestamp: Timestamp,
    pub debt_price: f64,
    pub collateral_price: f64,
    pub borrow_apy: f64,
}

impl TimelinePoint {
    /// Prices at this tick.
    #[inline]
    pub fn prices(&self) -> MarketPrices {
        MarketPrices {
            collateral_price_usd: self.collateral_price,
            debt_price_usd: self.debt_price,
            timestamp: self.timestamp,
        }
    }

    /// Borrow rate at this tick.
    #[inline]
    pub fn borrow_rate(&self) -> BorrowRate {
        BorrowRate {
            apy: self.borrow_apy,
            timestamp: self.timestamp,
        }
    }
}

/// Forward-filling lookup over one series.
struct FilledSeries {
    values: BTreeMap<Timestamp, f64>,
    last: f64,
}

impl FilledSeries {
    fn new(points: &[PricePoint]) -> Self {
        Self {
            values: points.iter().map(|p| (p.timestamp, p.price)).collect(),
            last: 0.0,
        }
    }

    /// Value at `ts`, or the last one seen (0 before the first observation).
    ///
    /// Must be called with ascending timestamps.
    fn at(&mut self, ts: Timestamp) -> f64 {
        if let Some(&value) = self.values.get(&ts) {
            self.last = value;
        }
        self.last
    }
}

/// Merge the three input series into one ascending timeline.
///
/// Every timestamp present in any series becomes a tick. A series with no
/// observation at a tick contributes its most recent prior value.
pub fn merge_timelines(
    debt_prices: &[PricePoint],
    collateral_prices: &[PricePoint],
    borrow_apy: &[PricePoint],
) -> Vec<TimelinePoint> {
    let timestamps: BTreeSet<Timestamp> = debt_prices
        .iter()
        .chain(collateral_prices)
        .chain(borrow_apy)
        .map(|p| p.timestamp)
        .collect();

    let mut debt = FilledSeries::new(debt_prices);
    let mut collateral = FilledSeries::new(collateral_prices);
    let mut apy = FilledSeries::new(borrow_apy);

    timestamps
        .into_iter()
        .map(|timestamp| TimelinePoint {
            timestamp,
            debt_price: debt.at(timestamp),
            collateral_price: collateral.at(timestamp),
            borrow_apy: apy.at(timestamp),
        })
        .collect()
}
