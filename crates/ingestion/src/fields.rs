//! Fixed-width ASCII field decoding.

use flex_core::{Error, Result};

/// Parse a fixed-width ASCII number.
///
/// Surrounding blanks are ignored and an all-blank field is zero. Any other
/// non-digit byte is an error.
pub(crate) fn parse_digits(field: &[u8], name: &str) -> Result<i64> {
    let digits = field.trim_ascii();
    if digits.len() > 18 {
        return Err(Error::malformed(format!("{name}: {} digits overflow", digits.len())));
    }
    digits.iter().try_fold(0i64, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + i64::from(b - b'0'))
        } else {
            Err(Error::malformed(format!(
                "{name}: non-digit byte 0x{b:02x} in {:?}",
                String::from_utf8_lossy(field)
            )))
        }
    })
}

/// Decode an ASCII text field with blanks stripped.
pub(crate) fn parse_text(field: &[u8], name: &str) -> Result<String> {
    std::str::from_utf8(field)
        .map(|s| s.trim().to_string())
        .map_err(|_| Error::malformed(format!("{name}: not ASCII: {field:?}")))
}

/// Whether a field holds nothing but blanks.
pub(crate) fn is_blank(field: &[u8]) -> bool {
    field.iter().all(|&b| b == b' ')
}
