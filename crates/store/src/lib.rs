//! Columnar storage for the FLEX feed converter.
//!
//! This crate provides:
//! - The raw store: per-security append-only price and volume series
//! - The bar store: per-security resampled OHLC bars
//!
//! Both are DuckDB database files, one table per partition.

mod db;
pub mod bars;
pub mod raw;

pub use bars::{BarStoreReader, BarStoreWriter};
pub use raw::{RawStoreReader, RawStoreWriter, StoreSummary};
