//! Core data types for the FLEX feed converter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp in microseconds since Unix epoch (UTC).
pub type TimestampUs = i64;

/// Microseconds in one second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert a timestamp to the start of its interval bucket.
///
/// Buckets are aligned to the epoch, not to the first tick seen.
#[inline]
pub fn bucket_start(ts_us: TimestampUs, interval_us: i64) -> TimestampUs {
    ts_us.div_euclid(interval_us) * interval_us
}

/// One framed chunk of the feed: a single security's update for one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// Tag blocks, trailing pad bytes removed.
    pub payload: Vec<u8>,
    /// Exchange code (e.g. "1" for Tokyo).
    pub exchange: String,
    /// Session code.
    pub session: String,
    /// Category code.
    pub category: String,
    /// Security id, blanks stripped.
    pub security: String,
    /// Size declared in the chunk header, header included.
    pub declared_size: usize,
}

impl RawChunk {
    /// Key identifying the security this chunk belongs to.
    pub fn key(&self) -> SecurityKey {
        SecurityKey::new(&self.exchange, &self.security)
    }
}

/// Kind of a decoded tag block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagKind {
    /// "4P" price block.
    Price,
    /// "VL" volume block.
    Volume,
}

impl TagKind {
    /// Two-byte tag id on the wire.
    pub fn tag_id(self) -> &'static [u8; 2] {
        match self {
            TagKind::Price => b"4P",
            TagKind::Volume => b"VL",
        }
    }

    /// Store namespace holding series of this kind.
    pub fn namespace(self) -> &'static str {
        match self {
            TagKind::Price => "price",
            TagKind::Volume => "volume",
        }
    }

    /// Resolve a tag id; unknown ids map to `None`.
    pub fn from_tag_id(id: &[u8]) -> Option<Self> {
        match id {
            b"4P" => Some(TagKind::Price),
            b"VL" => Some(TagKind::Volume),
            _ => None,
        }
    }
}

/// Current price print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Timestamp in microseconds.
    pub ts_us: TimestampUs,
    /// Unscaled integer price.
    pub raw_price: i64,
    /// Number of implied decimal digits in `raw_price`.
    pub decimal_flag: u8,
}

impl PriceTick {
    /// Price with the decimal flag applied.
    #[inline]
    pub fn scaled(&self) -> f64 {
        self.raw_price as f64 / 10f64.powi(i32::from(self.decimal_flag))
    }
}

/// Session-cumulative volume print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTick {
    /// Timestamp in microseconds (second resolution).
    pub ts_us: TimestampUs,
    /// Cumulative traded volume as reported.
    pub cumulative: i64,
}

/// A decoded tag block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagRecord {
    Price(PriceTick),
    Volume(VolumeTick),
}

impl TagRecord {
    /// Kind of this record.
    pub fn kind(&self) -> TagKind {
        match self {
            TagRecord::Price(_) => TagKind::Price,
            TagRecord::Volume(_) => TagKind::Volume,
        }
    }

    /// Timestamp of this record.
    pub fn ts_us(&self) -> TimestampUs {
        match self {
            TagRecord::Price(p) => p.ts_us,
            TagRecord::Volume(v) => v.ts_us,
        }
    }
}

/// (exchange code, security id) pair identifying one instrument.
///
/// Both parts are stored with ASCII blanks trimmed so that keys built from
/// padded wire fields and from user input compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityKey {
    pub exchange: String,
    pub security: String,
}

impl SecurityKey {
    /// Create a canonical key.
    pub fn new(exchange: impl AsRef<str>, security: impl AsRef<str>) -> Self {
        Self {
            exchange: exchange.as_ref().trim().to_string(),
            security: security.as_ref().trim().to_string(),
        }
    }
}

impl fmt::Display for SecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.security)
    }
}

/// Fixed-interval OHLC bar with volume and turnover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledBar {
    /// Bucket start timestamp (us).
    pub interval_start: TimestampUs,
    /// Open price; `None` when the bucket holds volume prints only.
    pub open: Option<f64>,
    /// High price.
    pub high: Option<f64>,
    /// Low price.
    pub low: Option<f64>,
    /// Close price.
    pub close: Option<f64>,
    /// Traded volume (sum of per-print deltas).
    pub volume: i64,
    /// Turnover (sum of price x delta).
    pub amount: f64,
}

/// Resampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    micros: i64,
}

impl Interval {
    /// Create an interval from a microsecond count.
    pub fn from_micros(micros: i64) -> Result<Self> {
        if micros <= 0 {
            return Err(Error::config(format!("interval must be positive, got {micros}us")));
        }
        Ok(Self { micros })
    }

    /// Create an interval from whole seconds.
    pub fn from_secs(secs: i64) -> Result<Self> {
        Self::from_micros(secs.saturating_mul(MICROS_PER_SECOND))
    }

    /// Interval length in microseconds.
    #[inline]
    pub fn as_micros(self) -> i64 {
        self.micros
    }
}

impl FromStr for Interval {
    type Err = Error;

    /// Parse `<count><unit>`; units follow the usual resampling aliases
    /// (`us`, `ms`/`L`, `s`/`S`, `m`/`min`/`T`, `h`/`H`). A bare count is
    /// seconds.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| Error::config(format!("invalid interval {s:?}")))?
        };
        let unit_us = match unit {
            "us" | "U" => 1,
            "ms" | "L" => 1_000,
            "" | "s" | "S" => MICROS_PER_SECOND,
            "m" | "min" | "T" => 60 * MICROS_PER_SECOND,
            "h" | "H" => 3_600 * MICROS_PER_SECOND,
            _ => return Err(Error::config(format!("invalid interval unit in {s:?}"))),
        };
        Self::from_micros(count.saturating_mul(unit_us))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(i64, &str); 4] = [
            (3_600 * MICROS_PER_SECOND, "h"),
            (60 * MICROS_PER_SECOND, "min"),
            (MICROS_PER_SECOND, "s"),
            (1_000, "ms"),
        ];
        for (size, suffix) in UNITS {
            if self.micros % size == 0 {
                return write!(f, "{}{}", self.micros / size, suffix);
            }
        }
        write!(f, "{}us", self.micros)
    }
}
