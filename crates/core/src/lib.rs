//! Core types and configuration for the FLEX feed converter.
//!
//! This crate provides shared types used across all other crates:
//! - Feed record types (chunks, tag records, bars)
//! - Security code mapping
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod security;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use security::partition_name;
pub use types::*;
