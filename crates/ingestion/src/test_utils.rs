//! Synthetic feed builders for tests.
//!
//! Produce byte-exact chunks and tag blocks in the wire layout decoded by
//! [`crate::framer`] and [`crate::tags`].

use crate::framer::{HEADER_SIZE, PAD_BYTE};
use crate::tags::TAG_DELIMITER;

/// Build a "4P" block whose current price is `raw_price` at `time`
/// (`HHMMSSffffff`, or empty for a heartbeat).
pub fn price_block(decimal_flag: u8, raw_price: i64, time: &str, closing: bool) -> Vec<u8> {
    let sign = if raw_price < 0 { '-' } else { '+' };
    let price = format!("{:>14}", raw_price.unsigned_abs());
    let flag = decimal_flag % 10;

    let mut block = String::from("4P  ");
    block.push_str(&format!("{flag}{price}{sign}0900001"));
    block.push_str(&format!(" {flag}{price}{sign}0900001"));
    block.push_str(&format!(" {flag}{price}{sign}0900001"));
    block.push_str(&format!("{flag}{price}{sign}{time:<12}1"));
    block.push_str(if closing { "  1" } else { "   " });
    block.into_bytes()
}

/// Build a "VL" block reporting `cumulative` volume at `time` (`HHMMSS`).
pub fn volume_block(cumulative: i64, time: &str) -> Vec<u8> {
    format!("VL   0{cumulative:>14}{time:<6} ").into_bytes()
}

/// Join tag blocks into a chunk payload, led by an unrelated block.
pub fn payload(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"NO    3351".to_vec();
    for block in blocks {
        out.push(TAG_DELIMITER);
        out.extend_from_slice(block);
    }
    out
}

/// Frame tag blocks into a complete chunk for one security.
pub fn chunk(exchange: &str, security: &str, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = payload(blocks);
    body.push(PAD_BYTE);

    let size = HEADER_SIZE + body.len();
    let mut out = Vec::with_capacity(size);
    out.push(PAD_BYTE);
    out.extend_from_slice(format!("{size:>6}").as_bytes());
    out.extend_from_slice(b"00300132072100");
    out.extend_from_slice(format!("{exchange:1.1}").as_bytes());
    out.extend_from_slice(b"010111");
    out.extend_from_slice(format!("{security:<12.12}").as_bytes());
    out.push(0x12);
    out.extend(body);
    out
}
