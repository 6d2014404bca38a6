//! # Stratus Stats
//!
//! Long-window statistics over gridded weather data: streaming per-cell
//! count/sum/min/max, exact percentiles for short windows, the P² on-line
//! percentile estimator for long ones, calendar time windows
//! (monthly/seasonal/annual) and the on-disk statistics artifact layout.

#![warn(clippy::all)]

pub mod accumulator;
pub mod error;
pub mod percentile;
pub mod store;
pub mod windows;

pub use accumulator::{GridStatistics, GridStatsAccumulator, PercentileField};
pub use error::{Error, Result};
pub use percentile::{exact_percentiles, P2Quantile};
pub use store::{StatisticsArtifact, StatisticsStore};
pub use windows::{iter_time_windows, TimeWindow, WindowKind};
