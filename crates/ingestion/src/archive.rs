//! Source archives: opening, session dates and output naming.
//!
//! A capture ships as a zip or gzip archive holding exactly one feed file,
//! named after its session date (`StandardEquities_20180604.zip`).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use flex_core::{Error, Result};
use tracing::debug;

/// Compression layer around a feed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Gzip,
}

impl ArchiveKind {
    /// Select the archive kind from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("zip") => Ok(ArchiveKind::Zip),
            Some("gz") => Ok(ArchiveKind::Gzip),
            _ => Err(Error::unsupported_archive(format!(
                "{} (expected .zip or .gz)",
                path.display()
            ))),
        }
    }
}

/// Open the single feed file inside `path` and hand it to `consume`
/// together with its declared size, if any.
///
/// The declared size only drives progress reporting; some archives
/// under-report it for very large members.
pub fn with_feed_stream<T>(
    path: &Path,
    consume: impl FnOnce(&mut dyn Read, Option<u64>) -> Result<T>,
) -> Result<T> {
    let kind = ArchiveKind::from_path(path)?;
    let file = BufReader::new(File::open(path)?);

    match kind {
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| Error::unsupported_archive(format!("{}: {e}", path.display())))?;
            if archive.is_empty() {
                return Err(Error::unsupported_archive(format!("{}: archive is empty", path.display())));
            }
            if archive.len() > 1 {
                debug!(entries = archive.len(), "reading first archive entry only");
            }
            let mut inner = archive
                .by_index(0)
                .map_err(|e| Error::unsupported_archive(format!("{}: {e}", path.display())))?;
            let size = Some(inner.size()).filter(|&s| s > 0);
            debug!(entry = inner.name(), declared_size = ?size, "opened zip entry");
            consume(&mut inner, size)
        }
        ArchiveKind::Gzip => {
            let mut inner = MultiGzDecoder::new(file);
            consume(&mut inner, None)
        }
    }
}

/// Session date encoded as the trailing `YYYYMMDD` of the file stem.
pub fn session_date(path: &Path) -> Result<NaiveDate> {
    let stem = archive_stem(path)?;
    let digits = &stem[stem.trim_end_matches(|c: char| c.is_ascii_digit()).len()..];
    if digits.len() < 8 {
        return Err(Error::config(format!(
            "no YYYYMMDD session date at the end of {stem:?}; pass the date explicitly"
        )));
    }
    NaiveDate::parse_from_str(&digits[digits.len() - 8..], "%Y%m%d")
        .map_err(|e| Error::config(format!("bad session date in {stem:?}: {e}")))
}

/// Unix time of local midnight on `date`, for a session `utc_offset_secs`
/// ahead of UTC.
pub fn day_epoch_seconds(date: NaiveDate, utc_offset_secs: i64) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
        - utc_offset_secs
}

/// `<dir>/<basename-without-archive-ext><suffix>.<ext>`.
pub fn output_path(src: &Path, suffix: &str, ext: &str) -> Result<PathBuf> {
    ArchiveKind::from_path(src)?;
    let stem = archive_stem(src)?;
    Ok(src.with_file_name(format!("{stem}{suffix}.{ext}")))
}

fn archive_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::unsupported_archive(format!("{} has no file name", path.display())))
}
