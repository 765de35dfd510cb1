//! Data ingestion and normalization for the leverage token backtester.
//!
//! This crate handles:
//! - Loading price and APY series from JSON
//! - Series normalization (ordering, duplicate timestamps)
//! - Window filtering
//! - Timeline merging with forward fill

pub mod series;
pub mod timeline;

pub use series::{AssetSeries, HistoricalData};
pub use timeline::{merge_timelines, TimelinePoint};
