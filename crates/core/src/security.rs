//! Security code mapping.
//!
//! Partitions are named by a one-letter venue prefix followed by the
//! security id, e.g. Tokyo "1234" becomes "t1234".

use crate::error::{Error, Result};
use crate::types::SecurityKey;

/// (exchange code, partition prefix, venue) table.
const EXCHANGES: [(&str, &str, &str); 4] = [
    ("1", "t", "Tokyo Stock Exchange"),
    ("3", "n", "Nagoya Stock Exchange"),
    ("6", "f", "Fukuoka Stock Exchange"),
    ("8", "s", "Sapporo Stock Exchange"),
];

fn lookup(exchange: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    EXCHANGES.iter().find(|(code, _, _)| *code == exchange)
}

/// Partition name for a security.
///
/// Codes outside the table are an error: they signal corruption or a venue
/// nobody has validated.
pub fn partition_name(key: &SecurityKey) -> Result<String> {
    let (_, prefix, _) = lookup(&key.exchange)
        .ok_or_else(|| Error::unknown_exchange(&key.exchange, &key.security))?;
    Ok(format!("{prefix}{}", key.security))
}

/// Venue name for an exchange code.
pub fn venue(exchange: &str) -> Option<&'static str> {
    lookup(exchange).map(|(_, _, name)| *name)
}
