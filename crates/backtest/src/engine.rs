//! Leverage token position engine.
//!
//! Holds the token's collateral, debt and share balances and applies the
//! protocol's accounting: management fee dilution, borrow interest and
//! rebalances back to the target collateral ratio.

use levtoken_core::{
    AuctionConfig, BorrowRate, Direction, MarketPrices, PositionState, RatioBounds,
    RebalanceRecord, Snapshot, Timestamp, Wad, SECONDS_PER_YEAR,
};

use crate::auction::{AuctionTimingModel, PendingAction, RebalanceTrigger};
use crate::random::RandomSource;

/// Initial balances and policy of a simulated leverage token.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_collateral: Wad,
    pub initial_debt: Wad,
    pub initial_shares: Wad,
    pub bounds: RatioBounds,
    pub start_timestamp: Timestamp,
    /// Estimated cost per rebalance in USD (reported, not charged).
    pub rebalance_cost_usd: f64,
    /// Annual management fee as a decimal.
    pub management_fee_rate: f64,
    pub auction: AuctionConfig,
}

/// Outcome of a rebalance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceCheck {
    /// Set when an auction executes on this tick.
    pub trigger: Option<RebalanceTrigger>,
    pub current_ratio: f64,
}

impl RebalanceCheck {
    #[inline]
    pub fn needed(&self) -> bool {
        self.trigger.is_some()
    }

    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.trigger.map(|t| t.direction)
    }
}

/// Accounting engine for one leverage token.
pub struct PositionEngine<R> {
    state: PositionState,
    bounds: RatioBounds,
    rebalance_cost_usd: f64,
    management_fee_rate: f64,
    last_fee_accrual: Timestamp,
    auction: AuctionTimingModel<R>,
    history: Vec<Snapshot>,
}

impl<R: RandomSource> PositionEngine<R> {
    /// Create an engine holding the initial balances.
    pub fn new(config: EngineConfig, random: R) -> Self {
        let auction =
            AuctionTimingModel::new(config.auction, config.bounds.emergency_threshold, random);
        Self {
            state: PositionState {
                collateral_amount: config.initial_collateral,
                debt_amount: config.initial_debt,
                total_shares: config.initial_shares,
                timestamp: config.start_timestamp,
            },
            bounds: config.bounds,
            rebalance_cost_usd: config.rebalance_cost_usd,
            management_fee_rate: config.management_fee_rate,
            last_fee_accrual: config.start_timestamp,
            auction,
            history: Vec::new(),
        }
    }

    /// Current balances, by value.
    pub fn state(&self) -> PositionState {
        self.state
    }

    /// Snapshots recorded so far.
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn bounds(&self) -> &RatioBounds {
        &self.bounds
    }

    /// The auction currently scheduled, by value.
    pub fn pending_auction(&self) -> PendingAction {
        self.auction.pending()
    }

    /// Collateral value over debt value; infinite without debt.
    pub fn collateral_ratio(&self, prices: &MarketPrices) -> f64 {
        if self.state.debt_amount.is_zero() {
            return f64::INFINITY;
        }
        let collateral_value = self.state.collateral_amount.to_f64() * prices.collateral_price_usd;
        let debt_value = self.state.debt_amount.to_f64() * prices.debt_price_usd;
        collateral_value / debt_value
    }

    /// Equity per share in collateral units; 0 when no shares exist.
    pub fn share_price(&self, prices: &MarketPrices) -> f64 {
        if self.state.total_shares.is_zero() {
            return 0.0;
        }
        let debt_in_collateral = self.state.debt_amount.to_f64()
            * (prices.debt_price_usd / prices.collateral_price_usd);
        let equity = self.state.collateral_amount.to_f64() - debt_in_collateral;
        equity / self.state.total_shares.to_f64()
    }

    /// Collateral value minus debt value in USD.
    pub fn equity_usd(&self, prices: &MarketPrices) -> f64 {
        self.state.collateral_amount.to_f64() * prices.collateral_price_usd
            - self.state.debt_amount.to_f64() * prices.debt_price_usd
    }

    /// Mint management fee shares for the time since the last accrual.
    ///
    /// `fee_shares = floor(total_shares * rate * elapsed / SECONDS_PER_YEAR)`, floored once.
    pub fn accrue_management_fee(&mut self, now: Timestamp) {
        if self.management_fee_rate == 0.0 {
            return;
        }
        let elapsed = now - self.last_fee_accrual;
        if elapsed <= 0 {
            return;
        }

        let accrued = Wad::from_f64(self.management_fee_rate * elapsed as f64);
        let fee_shares = self.state.total_shares.mul_div_floor(accrued, year());
        self.state.total_shares = self.state.total_shares.saturating_add(fee_shares);
        self.last_fee_accrual = now;
    }

    /// Grow debt by the borrow rate over `delta_secs`.
    ///
    /// Linear approximation of continuous compounding:
    /// `debt += floor(debt * apy * delta / SECONDS_PER_YEAR)`.
    pub fn accrue_interest(&mut self, rate: &BorrowRate, delta_secs: i64) {
        if delta_secs <= 0 || self.state.debt_amount.is_zero() {
            return;
        }

        let accrued = Wad::from_f64(rate.apy.abs() * delta_secs as f64);
        let interest = self.state.debt_amount.mul_div_floor(accrued, year());
        self.state.debt_amount = if rate.apy >= 0.0 {
            self.state.debt_amount.saturating_add(interest)
        } else {
            self.state.debt_amount.saturating_sub(interest)
        };
        self.state.timestamp = rate.timestamp;
    }

    /// Move the engine clock.
    pub fn update_timestamp(&mut self, timestamp: Timestamp) {
        self.state.timestamp = timestamp;
    }

    /// Ask the auction model whether a rebalance executes at these prices.
    ///
    /// An in-bounds ratio always clears a scheduled auction.
    pub fn check_rebalance_needed(&mut self, prices: &MarketPrices) -> RebalanceCheck {
        let ratio = self.collateral_ratio(prices);
        let trigger = self
            .auction
            .evaluate(prices.timestamp, ratio, self.bounds.min, self.bounds.max);

        if self.bounds.contains(ratio) {
            self.auction.reset();
        }

        RebalanceCheck {
            trigger,
            current_ratio: ratio,
        }
    }

    /// Restore the target ratio at constant total value.
    ///
    /// With `V = debt + collateral * Pc / Pd` in debt units, the new balances
    /// are `debt = V / (1 + target)` and `collateral = debt * target * Pd / Pc`.
    /// The vault only borrows, repays and moves collateral; swap costs fall on
    /// the external rebalancer, so value is conserved up to flooring. Every
    /// step rounds down, so a rebalance never adds value. `direction` is
    /// recorded but does not change the math.
    pub fn rebalance(&mut self, prices: &MarketPrices, direction: Direction) -> RebalanceRecord {
        let state_before = self.state;
        let ratio_before = self.collateral_ratio(prices);

        let collateral_price = Wad::from_f64(prices.collateral_price_usd);
        let debt_price = Wad::from_f64(prices.debt_price_usd);
        let target = Wad::from_f64(self.bounds.target);

        let total_value = self
            .state
            .debt_amount
            .saturating_add(self.state.collateral_amount.mul_div_floor(collateral_price, debt_price));
        let target_debt = total_value.mul_div_floor(Wad::ONE, Wad::ONE.saturating_add(target));

        self.state.debt_amount = target_debt;
        self.state.collateral_amount = collateral_for_ratio(target_debt, target, prices);
        self.state.timestamp = prices.timestamp;

        self.auction.reset();

        RebalanceRecord {
            state_before,
            state_after: self.state,
            direction,
            ratio_before,
            ratio_after: self.collateral_ratio(prices),
            estimated_cost_usd: self.rebalance_cost_usd,
        }
    }

    /// Append a snapshot of the current state.
    pub fn record_snapshot(&mut self, prices: &MarketPrices, borrow_apy: f64) {
        let snapshot = Snapshot {
            timestamp: self.state.timestamp,
            state: self.state,
            prices: *prices,
            borrow_apy,
            collateral_ratio: self.collateral_ratio(prices),
            share_price: self.share_price(prices),
            equity_usd: self.equity_usd(prices),
        };
        self.history.push(snapshot);
    }
}

/// Collateral that puts `debt` at `ratio`: `floor(floor(debt * ratio) * Pd / Pc)`.
pub fn collateral_for_ratio(debt: Wad, ratio: Wad, prices: &MarketPrices) -> Wad {
    debt.mul_floor(ratio).mul_div_floor(
        Wad::from_f64(prices.debt_price_usd),
        Wad::from_f64(prices.collateral_price_usd),
    )
}

/// One year in seconds, as a raw-scaled divisor.
fn year() -> Wad {
    Wad::from_raw(SECONDS_PER_YEAR as u128 * Wad::ONE.raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;
    use approx::assert_relative_eq;

    fn bounds() -> RatioBounds {
        RatioBounds {
            min: 1.5,
            target: 2.0,
            max: 2.5,
            emergency_threshold: 1.2,
        }
    }

    fn prices(collateral: f64, debt: f64, timestamp: i64) -> MarketPrices {
        MarketPrices {
            collateral_price_usd: collateral,
            debt_price_usd: debt,
            timestamp,
        }
    }

    fn engine_with(
        collateral: f64,
        debt: f64,
        fee_rate: f64,
        probability: f64,
    ) -> PositionEngine<ScriptedRandom> {
        let config = EngineConfig {
            initial_collateral: Wad::from_f64(collateral),
            initial_debt: Wad::from_f64(debt),
            initial_shares: Wad::ONE,
            bounds: bounds(),
            start_timestamp: 1_000_000,
            rebalance_cost_usd: 5.0,
            management_fee_rate: fee_rate,
            auction: AuctionConfig {
                creation_probability: probability,
                ..AuctionConfig::default()
            },
        };
        PositionEngine::new(config, ScriptedRandom::new(vec![0.0], vec![0.0]))
    }

    /// 2 collateral against 1 debt.
    fn engine() -> PositionEngine<ScriptedRandom> {
        engine_with(2.0, 1.0, 0.0, 1.0)
    }

    fn total_value(state: &PositionState, p: &MarketPrices) -> f64 {
        state.debt_amount.to_f64()
            + state.collateral_amount.to_f64() * p.collateral_price_usd / p.debt_price_usd
    }

    #[test]
    fn test_ratio_two() {
        let e = engine();
        assert_relative_eq!(e.collateral_ratio(&prices(1000.0, 1000.0, 0)), 2.0);
    }

    #[test]
    fn test_ratio_follows_collateral_price() {
        let e = engine();
        assert_relative_eq!(e.collateral_ratio(&prices(2000.0, 1000.0, 0)), 4.0);
        assert_relative_eq!(e.collateral_ratio(&prices(500.0, 1000.0, 0)), 1.0);
    }

    #[test]
    fn test_ratio_infinite_without_debt() {
        let e = engine_with(2.0, 0.0, 0.0, 1.0);
        assert_eq!(e.collateral_ratio(&prices(1000.0, 1000.0, 0)), f64::INFINITY);
    }

    #[test]
    fn test_share_price_and_equity() {
        let e = engine();
        let p = prices(1000.0, 1000.0, 0);
        // equity = 2 - 1 = 1 collateral over 1 share
        assert_relative_eq!(e.share_price(&p), 1.0);
        assert_relative_eq!(e.equity_usd(&p), 1000.0);
    }

    #[test]
    fn test_share_price_zero_shares() {
        let config = EngineConfig {
            initial_collateral: Wad::from_f64(2.0),
            initial_debt: Wad::from_f64(1.0),
            initial_shares: Wad::ZERO,
            bounds: bounds(),
            start_timestamp: 0,
            rebalance_cost_usd: 0.0,
            management_fee_rate: 0.0,
            auction: AuctionConfig::default(),
        };
        let e = PositionEngine::new(config, ScriptedRandom::new(vec![0.0], vec![0.0]));
        assert_eq!(e.share_price(&prices(1000.0, 1000.0, 0)), 0.0);
    }

    #[test]
    fn test_no_rebalance_within_bounds() {
        let mut e = engine();
        let check = e.check_rebalance_needed(&prices(1000.0, 1000.0, 1_000_000));
        assert!(!check.needed());
        assert!(check.direction().is_none());
        assert_relative_eq!(check.current_ratio, 2.0);
    }

    #[test]
    fn test_reports_ratio_out_of_bounds() {
        let mut e = engine();
        let check = e.check_rebalance_needed(&prices(1500.0, 1000.0, 1_000_000));
        assert_relative_eq!(check.current_ratio, 3.0);
        // scheduled, not yet executed
        assert!(!check.needed());
        assert!(e.pending_auction().is_scheduled());
    }

    #[test]
    fn test_in_bounds_clears_stale_auction() {
        let mut e = engine();
        e.check_rebalance_needed(&prices(1500.0, 1000.0, 1_000_000));
        assert!(e.pending_auction().is_scheduled());

        e.check_rebalance_needed(&prices(1000.0, 1000.0, 1_000_300));
        assert_eq!(e.pending_auction(), PendingAction::Empty);
    }

    #[test]
    fn test_check_fires_after_auction_delay() {
        let mut e = engine();
        let high = prices(1500.0, 1000.0, 1_000_000);
        e.check_rebalance_needed(&high);

        let later = prices(1500.0, 1000.0, 1_000_000 + 4 * 3600);
        let check = e.check_rebalance_needed(&later);
        assert!(check.needed());
        assert_eq!(check.direction(), Some(Direction::Up));
    }

    #[test]
    fn test_rebalance_down_to_target() {
        let mut e = engine();
        // collateral falls 30%: ratio 1.4
        let p = prices(700.0, 1000.0, 1_000_300);
        let before = e.state();
        let record = e.rebalance(&p, Direction::Down);

        assert_relative_eq!(record.ratio_before, 1.4, epsilon = 1e-12);
        assert_relative_eq!(record.ratio_after, 2.0, epsilon = 1e-9);
        assert!(record.state_after.debt_amount < before.debt_amount);
        assert!(record.state_after.collateral_amount < before.collateral_amount);
        assert_relative_eq!(
            total_value(&record.state_after, &p),
            total_value(&before, &p),
            max_relative = 1e-12
        );
        assert_eq!(record.estimated_cost_usd, 5.0);
        assert_eq!(record.direction, Direction::Down);
        assert_eq!(record.state_after.timestamp, 1_000_300);
    }

    /// Value in raw debt units, floored the same way the engine floors it.
    fn raw_value(state: &PositionState, p: &MarketPrices) -> u128 {
        state.debt_amount.raw()
            + state
                .collateral_amount
                .mul_div_floor(Wad::from_f64(p.collateral_price_usd), Wad::from_f64(p.debt_price_usd))
                .raw()
    }

    fn engine_17x(collateral_raw: u128, debt_raw: u128) -> PositionEngine<ScriptedRandom> {
        let config = EngineConfig {
            initial_collateral: Wad::from_raw(collateral_raw),
            initial_debt: Wad::from_raw(debt_raw),
            initial_shares: Wad::ONE,
            bounds: RatioBounds {
                min: 1.06135,
                target: 1.0625,
                max: 1.062893082,
                emergency_threshold: 1.06061,
            },
            start_timestamp: 0,
            rebalance_cost_usd: 0.0,
            management_fee_rate: 0.0,
            auction: AuctionConfig::default(),
        };
        PositionEngine::new(config, ScriptedRandom::new(vec![0.0], vec![0.0]))
    }

    #[test]
    fn test_rebalance_conserves_value_in_raw_units() {
        let mut e = engine_17x(17_000_000_000_000_000_123, 16_100_000_000_000_000_077);
        let p = prices(1.0, 1.0, 300);
        let before = raw_value(&e.state(), &p);
        let record = e.rebalance(&p, Direction::Up);
        let after = raw_value(&record.state_after, &p);

        assert_eq!(before, 33_100_000_000_000_000_200);
        assert_eq!(record.state_after.debt_amount.raw(), 16_048_484_848_484_848_581);
        assert_eq!(record.state_after.collateral_amount.raw(), 17_051_515_151_515_151_617);
        assert!(after <= before);
        assert!(before - after <= 2, "lost {} raw units", before - after);
    }

    #[test]
    fn test_rebalance_never_adds_value() {
        let mut e = engine_17x(17_000_000_000_000_000_123, 16_100_000_000_000_000_077);
        for (i, (pc, pd)) in [(3200.5, 3000.0), (1.0371, 1.0), (2999.75, 3001.25), (0.97, 1.0)]
            .into_iter()
            .enumerate()
        {
            let p = prices(pc, pd, 300 * (i as i64 + 1));
            let before = raw_value(&e.state(), &p);
            let record = e.rebalance(&p, Direction::Down);
            let after = raw_value(&record.state_after, &p);
            assert!(after <= before, "rebalance at {pc}/{pd} added value");
            // four floors, the last two scaled by at most Pc / Pd < 2
            assert!(before - after <= 5, "rebalance at {pc}/{pd} lost {} raw units", before - after);
        }
    }

    #[test]
    fn test_rebalance_up_to_target() {
        let mut e = engine();
        // collateral rises 50%: ratio 3.0
        let p = prices(1500.0, 1000.0, 1_000_300);
        let before = e.state();
        let record = e.rebalance(&p, Direction::Up);

        assert_relative_eq!(record.ratio_after, 2.0, epsilon = 1e-9);
        assert!(record.state_after.debt_amount > before.debt_amount);
        assert!(record.state_after.collateral_amount > before.collateral_amount);
        assert_relative_eq!(
            total_value(&record.state_after, &p),
            total_value(&before, &p),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_rebalance_clears_pending_auction() {
        let mut e = engine();
        let p = prices(1500.0, 1000.0, 1_000_000);
        e.check_rebalance_needed(&p);
        assert!(e.pending_auction().is_scheduled());
        e.rebalance(&p, Direction::Up);
        assert_eq!(e.pending_auction(), PendingAction::Empty);
    }

    #[test]
    fn test_zero_apy_leaves_debt_exact() {
        let mut e = engine();
        let before = e.state().debt_amount;
        e.accrue_interest(
            &BorrowRate {
                apy: 0.0,
                timestamp: 2_000_000,
            },
            365 * 86_400,
        );
        assert_eq!(e.state().debt_amount, before);
    }

    #[test]
    fn test_interest_one_year() {
        let mut e = engine();
        e.accrue_interest(
            &BorrowRate {
                apy: 0.05,
                timestamp: 1_000_000 + SECONDS_PER_YEAR as i64,
            },
            SECONDS_PER_YEAR as i64,
        );
        assert_relative_eq!(e.state().debt_amount.to_f64(), 1.05, max_relative = 1e-15);
        assert_eq!(e.state().timestamp, 1_000_000 + SECONDS_PER_YEAR as i64);
    }

    #[test]
    fn test_interest_skips_zero_delta() {
        let mut e = engine();
        let before = e.state();
        e.accrue_interest(
            &BorrowRate {
                apy: 0.5,
                timestamp: 5,
            },
            0,
        );
        assert_eq!(e.state(), before);
    }

    #[test]
    fn test_zero_fee_never_mints() {
        let mut e = engine();
        e.accrue_management_fee(1_000_000 + 10 * 86_400);
        assert_eq!(e.state().total_shares, Wad::ONE);
    }

    #[test]
    fn test_fee_dilutes_shares() {
        let mut e = engine_with(2.0, 1.0, 0.02, 1.0);
        e.accrue_management_fee(1_000_000 + SECONDS_PER_YEAR as i64);
        assert_relative_eq!(e.state().total_shares.to_f64(), 1.02, max_relative = 1e-15);
    }

    #[test]
    fn test_fee_floors_once() {
        let config = |shares: u128| EngineConfig {
            initial_collateral: Wad::from_f64(2.0),
            initial_debt: Wad::ONE,
            initial_shares: Wad::from_raw(shares),
            bounds: bounds(),
            start_timestamp: 0,
            rebalance_cost_usd: 0.0,
            management_fee_rate: 0.02,
            auction: AuctionConfig::default(),
        };

        // floor(shares * 0.02 * 3600 / 31_557_600) in raw units
        for (shares, fee) in [
            (1_000_000_000_000_000_000, 2_281_542_322_610),
            (123_456_789_012_345_678_901_234, 281_671_889_145_210_310),
        ] {
            let mut e = PositionEngine::new(config(shares), ScriptedRandom::new(vec![0.0], vec![0.0]));
            e.accrue_management_fee(3600);
            assert_eq!(e.state().total_shares.raw(), shares + fee);
        }
    }

    #[test]
    fn test_fee_monotonic_in_elapsed_time() {
        let mut short = engine_with(2.0, 1.0, 0.02, 1.0);
        let mut long = engine_with(2.0, 1.0, 0.02, 1.0);
        short.accrue_management_fee(1_000_000 + 3600);
        long.accrue_management_fee(1_000_000 + 7200);
        assert!(long.state().total_shares >= short.state().total_shares);
        assert!(short.state().total_shares >= Wad::ONE);
    }

    #[test]
    fn test_fee_ignores_past_timestamps() {
        let mut e = engine_with(2.0, 1.0, 0.02, 1.0);
        e.accrue_management_fee(1_000_000 + 3600);
        let shares = e.state().total_shares;
        e.accrue_management_fee(1_000_000);
        e.accrue_management_fee(1_000_000 + 3600);
        assert_eq!(e.state().total_shares, shares);
    }

    #[test]
    fn test_state_is_a_copy() {
        let mut e = engine();
        let mut copy = e.state();
        copy.collateral_amount = Wad::ZERO;
        assert_eq!(e.state().collateral_amount, Wad::from_f64(2.0));

        e.update_timestamp(42);
        assert_eq!(copy.timestamp, 1_000_000);
    }

    #[test]
    fn test_record_snapshot() {
        let mut e = engine();
        e.update_timestamp(1_000_300);
        e.record_snapshot(&prices(1000.0, 1000.0, 1_000_300), 0.025);

        let snap = &e.history()[0];
        assert_eq!(snap.timestamp, 1_000_300);
        assert_eq!(snap.borrow_apy, 0.025);
        assert_relative_eq!(snap.collateral_ratio, 2.0);
        assert_relative_eq!(snap.share_price, 1.0);
        assert_relative_eq!(snap.equity_usd, 1000.0);
    }
}
