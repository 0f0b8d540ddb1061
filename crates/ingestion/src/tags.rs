//! Tag block parsing.
//!
//! A chunk payload is a sequence of tag blocks separated by 0x13. The first
//! two bytes of a block name its kind; only current-price ("4P") and
//! cumulative-volume ("VL") blocks are decoded, the rest are skipped.

use std::slice::Split;

use flex_core::{Error, PriceTick, Result, TagKind, TagRecord, TimestampUs, VolumeTick, MICROS_PER_SECOND};

use crate::fields::{is_blank, parse_digits};

/// Separator between tag blocks.
pub const TAG_DELIMITER: u8 = 0x13;

/// Length of a "4P" block.
pub const PRICE_BLOCK_LEN: usize = 107;

/// Length of a "VL" block.
pub const VOLUME_BLOCK_LEN: usize = 27;

// "4P" layout. Open, high and low each carry flag, 14-digit price, sign,
// HHMMSS time and change flag (high and low also a leading stop flag);
// only the current price is decoded.
const CUR_FLAG: usize = 75;
const CUR_PRICE: std::ops::Range<usize> = 76..90;
const CUR_SIGN: usize = 90;
const CUR_TIME: std::ops::Range<usize> = 91..103;
const CLOSING_FLAG: usize = 106;

// "VL" layout.
const VL_CUMULATIVE: std::ops::Range<usize> = 6..20;
const VL_TIME: std::ops::Range<usize> = 20..26;

fn is_delimiter(b: &u8) -> bool {
    *b == TAG_DELIMITER
}

/// Lazily decode the records of one chunk payload.
///
/// `day_epoch_seconds` is the Unix time of the session day's midnight;
/// block times are offsets from it.
pub fn parse_chunk(payload: &[u8], day_epoch_seconds: i64) -> TagIter<'_> {
    TagIter {
        blocks: payload.split(is_delimiter as fn(&u8) -> bool),
        day_epoch_seconds,
        failed: false,
    }
}

/// Iterator over the records of a chunk, in block order.
///
/// Stops after the first malformed block.
pub struct TagIter<'a> {
    blocks: Split<'a, u8, fn(&u8) -> bool>,
    day_epoch_seconds: i64,
    failed: bool,
}

impl Iterator for TagIter<'_> {
    type Item = Result<TagRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for block in self.blocks.by_ref() {
            let parsed = match block.get(..2).and_then(TagKind::from_tag_id) {
                Some(TagKind::Price) => parse_price_block(block, self.day_epoch_seconds),
                Some(TagKind::Volume) => parse_volume_block(block, self.day_epoch_seconds).map(Some),
                None => continue,
            };
            match parsed {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

fn check_len(block: &[u8], expected: usize, kind: TagKind) -> Result<()> {
    if block.len() != expected {
        return Err(Error::malformed(format!(
            "{} block is {} bytes, expected {expected}",
            String::from_utf8_lossy(kind.tag_id()),
            block.len()
        )));
    }
    Ok(())
}

/// Decode a "4P" block. `None` for closing placeholders and heartbeats.
fn parse_price_block(block: &[u8], day_epoch_seconds: i64) -> Result<Option<TagRecord>> {
    check_len(block, PRICE_BLOCK_LEN, TagKind::Price)?;

    if block[CLOSING_FLAG] == b'1' {
        return Ok(None);
    }
    let time = &block[CUR_TIME];
    if is_blank(time) {
        return Ok(None);
    }

    let seconds = seconds_of_day(&time[..6])?;
    let micros = parse_digits(&time[6..], "price time fraction")?;
    let decimal_flag = parse_digits(&block[CUR_FLAG..=CUR_FLAG], "decimal flag")? as u8;
    let magnitude = parse_digits(&block[CUR_PRICE], "price")?;
    let raw_price = if block[CUR_SIGN] == b'-' { -magnitude } else { magnitude };

    Ok(Some(TagRecord::Price(PriceTick {
        ts_us: to_micros(day_epoch_seconds, seconds) + micros,
        raw_price,
        decimal_flag,
    })))
}

/// Decode a "VL" block.
fn parse_volume_block(block: &[u8], day_epoch_seconds: i64) -> Result<TagRecord> {
    check_len(block, VOLUME_BLOCK_LEN, TagKind::Volume)?;

    let seconds = seconds_of_day(&block[VL_TIME])?;
    Ok(TagRecord::Volume(VolumeTick {
        ts_us: to_micros(day_epoch_seconds, seconds),
        cumulative: parse_digits(&block[VL_CUMULATIVE], "cumulative volume")?,
    }))
}

/// Seconds since midnight of an `HHMMSS` field.
fn seconds_of_day(hhmmss: &[u8]) -> Result<i64> {
    let h = parse_digits(&hhmmss[0..2], "hours")?;
    let m = parse_digits(&hhmmss[2..4], "minutes")?;
    let s = parse_digits(&hhmmss[4..6], "seconds")?;
    Ok(h * 3_600 + m * 60 + s)
}

#[inline]
fn to_micros(day_epoch_seconds: i64, seconds_of_day: i64) -> TimestampUs {
    (day_epoch_seconds + seconds_of_day) * MICROS_PER_SECOND
}
