//! Core types and configuration for the leverage token backtester.
//!
//! This crate provides shared types used across all other crates:
//! - Position, price and rate types
//! - 18-decimal fixed-point amounts
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod fixed;
pub mod types;

pub use config::{AuctionConfig, BacktestSettings, Config, StrategyConfig};
pub use error::{Error, Result};
pub use fixed::Wad;
pub use types::*;
