//! Resampling of raw tick series into fixed-interval bars.
//!
//! This crate handles:
//! - Volume differencing and price scaling
//! - OHLC, volume and turnover aggregation per bucket
//! - The parallel resampling pass over a raw store

pub mod bar_builder;
pub mod resampler;

pub use bar_builder::{build_bars, volume_deltas, BarBuilder};
pub use resampler::{read_all, resample, resample_file, resample_output_path, ResampleSummary};
