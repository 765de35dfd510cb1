//! Backtesting engine for leverage tokens.
//!
//! This crate provides:
//! - Probabilistic rebalance auction timing
//! - Position accounting (fees, interest, rebalances)
//! - Historical replay and performance metrics

pub mod auction;
pub mod engine;
pub mod metrics;
pub mod random;
pub mod simulator;

pub use auction::{AuctionTimingModel, PendingAction, RebalanceTrigger};
pub use engine::{EngineConfig, PositionEngine, RebalanceCheck};
pub use metrics::{BacktestMetrics, DrawdownPoint, MetricsCalculator};
pub use random::{RandomSource, SeededRandom};
pub use simulator::{BacktestConfig, BacktestResult, Backtester, Period};
