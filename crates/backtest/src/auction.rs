//! Rebalance auction timing.
//!
//! Rebalances of a leverage token are executed by external actors through a
//! Dutch auction, so an out-of-bounds position is not corrected instantly.
//! This model decides, on each evaluation, whether a correction fires now.
//!
//! Each evaluation of an out-of-bounds position without a pending auction is
//! one Bernoulli trial with `creation_probability`. The expected wait before an
//! auction is created therefore scales with the spacing between evaluations.
//! Positions below the emergency threshold skip the trial and are scheduled
//! after a fixed short delay.

use levtoken_core::{AuctionConfig, Direction, Timestamp};
use tracing::{debug, trace};

use crate::random::RandomSource;

/// The auction currently scheduled, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingAction {
    /// Nothing scheduled.
    Empty,
    /// An auction will execute at `execute_at`.
    Scheduled {
        created_at: Timestamp,
        execute_at: Timestamp,
        direction: Direction,
        is_emergency: bool,
    },
}

impl PendingAction {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, PendingAction::Scheduled { .. })
    }
}

/// A correction that fired on this evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceTrigger {
    pub direction: Direction,
    pub is_emergency: bool,
}

/// Probabilistic timing model for rebalance auctions.
pub struct AuctionTimingModel<R> {
    config: AuctionConfig,
    emergency_threshold: f64,
    pending: PendingAction,
    random: R,
}

impl<R: RandomSource> AuctionTimingModel<R> {
    /// Create a timing model with nothing scheduled.
    pub fn new(config: AuctionConfig, emergency_threshold: f64, random: R) -> Self {
        Self {
            config,
            emergency_threshold,
            pending: PendingAction::Empty,
            random,
        }
    }

    /// Evaluate the position at `now`.
    ///
    /// Returns the trigger when a scheduled auction is due; it is consumed.
    /// Otherwise may schedule a new auction and returns `None`.
    pub fn evaluate(
        &mut self,
        now: Timestamp,
        ratio: f64,
        min: f64,
        max: f64,
    ) -> Option<RebalanceTrigger> {
        if let PendingAction::Scheduled {
            execute_at,
            direction,
            is_emergency,
            ..
        } = self.pending
        {
            if now >= execute_at {
                self.pending = PendingAction::Empty;
                trace!(now, ?direction, is_emergency, "auction executed");
                return Some(RebalanceTrigger {
                    direction,
                    is_emergency,
                });
            }
            // at most one auction in flight
            return None;
        }

        if ratio >= min && ratio <= max {
            return None;
        }

        let direction = if ratio < min {
            Direction::Down
        } else {
            Direction::Up
        };

        if ratio < self.emergency_threshold {
            let execute_at = now + delay_secs(self.config.emergency_delay_secs);
            debug!(now, execute_at, ratio, "emergency rebalance scheduled");
            self.pending = PendingAction::Scheduled {
                created_at: now,
                execute_at,
                direction,
                is_emergency: true,
            };
            return None;
        }

        if self.random.uniform() < self.config.creation_probability {
            let notice = self
                .random
                .uniform_between(self.config.min_notice_secs, self.config.max_notice_secs);
            let duration = self
                .random
                .normal(self.config.avg_duration_secs, self.config.duration_std_dev_secs);
            let execute_at = now + delay_secs(notice + duration.max(0.0));
            debug!(now, execute_at, ratio, ?direction, "auction scheduled");
            self.pending = PendingAction::Scheduled {
                created_at: now,
                execute_at,
                direction,
                is_emergency: false,
            };
        }

        None
    }

    /// Drop any scheduled auction.
    pub fn reset(&mut self) {
        self.pending = PendingAction::Empty;
    }

    /// The scheduled auction, by value.
    pub fn pending(&self) -> PendingAction {
        self.pending
    }
}

/// Whole seconds to wait. Rounds up so that `now >= execute_at` holds exactly
/// when the fractional deadline has passed.
fn delay_secs(secs: f64) -> i64 {
    secs.max(0.0).ceil() as i64
}
