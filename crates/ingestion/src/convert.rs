//! Conversion pass: feed archive to raw store.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use flex_core::config::FeedConfig;
use flex_core::{Config, Result, TagKind, TagRecord};
use flex_store::{RawStoreWriter, StoreSummary};
use tracing::info;

use crate::archive::{day_epoch_seconds, with_feed_stream, ArchiveKind};
use crate::framer::ChunkFramer;
use crate::tags::parse_chunk;

/// Statistics about one decoded stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Chunks framed.
    pub chunks: u64,
    /// Price records appended.
    pub price_records: u64,
    /// Volume records appended.
    pub volume_records: u64,
    /// Bytes consumed from the stream.
    pub bytes: u64,
    /// Whether the stream ended inside a chunk.
    pub truncated: bool,
}

impl StreamStats {
    /// Total records appended.
    pub fn records(&self) -> u64 {
        self.price_records + self.volume_records
    }

    fn count(&mut self, record: &TagRecord) {
        match record.kind() {
            TagKind::Price => self.price_records += 1,
            TagKind::Volume => self.volume_records += 1,
        }
    }
}

/// Result of converting one source file.
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    /// Raw store written.
    pub output: PathBuf,
    /// Decoding statistics.
    pub stream: StreamStats,
    /// Store statistics.
    pub store: StoreSummary,
}

/// Decode a feed stream into `store`.
///
/// Framing, tag parsing and appending run as one sequential pipeline. A
/// chunk's records are all decoded before any of them is appended, so a
/// malformed block never leaves half a chunk behind.
pub fn convert_stream<R: Read>(
    reader: R,
    size_hint: Option<u64>,
    day_epoch_seconds: i64,
    store: &mut RawStoreWriter,
    feed: &FeedConfig,
) -> Result<StreamStats> {
    let mut framer = ChunkFramer::new(reader);
    let mut stats = StreamStats::default();
    let mut progress = Progress::new(size_hint, feed.progress_step_bytes);

    while let Some(chunk) = framer.next_chunk()? {
        let records = parse_chunk(&chunk.payload, day_epoch_seconds).collect::<Result<Vec<_>>>()?;
        let key = chunk.key();
        for record in records {
            stats.count(&record);
            store.append(&key, record)?;
        }
        stats.chunks += 1;
        progress.update(framer.bytes_read(), store.security_count());
    }

    stats.bytes = framer.bytes_read();
    stats.truncated = framer.was_truncated();
    Ok(stats)
}

/// Convert one archive into a raw store at `output`.
///
/// The archive kind is checked before the output is created. On error the
/// output may be partially written and must be discarded.
pub fn convert_file(src: &Path, output: &Path, date: NaiveDate, config: &Config) -> Result<ConvertSummary> {
    ArchiveKind::from_path(src)?;
    let day_epoch = day_epoch_seconds(date, config.feed.utc_offset_secs);
    info!(src = %src.display(), output = %output.display(), %date, "converting");

    let mut store = RawStoreWriter::create(output, &config.store)?;
    let stream = with_feed_stream(src, |reader, size| {
        convert_stream(reader, size, day_epoch, &mut store, &config.feed)
    })?;
    let store = store.finish()?;

    info!(
        src = %src.display(),
        chunks = stream.chunks,
        records = stream.records(),
        truncated = stream.truncated,
        "conversion finished"
    );
    Ok(ConvertSummary {
        output: output.to_path_buf(),
        stream,
        store,
    })
}

/// Best-effort progress logging; the total may be unknown or wrong.
struct Progress {
    total: Option<u64>,
    step: u64,
    next: u64,
}

impl Progress {
    fn new(total: Option<u64>, step: u64) -> Self {
        let step = step.max(1);
        Self { total, step, next: step }
    }

    fn update(&mut self, bytes: u64, securities: usize) {
        if bytes < self.next {
            return;
        }
        self.next = bytes + self.step;
        match self.total {
            Some(total) if total >= bytes => {
                let pct = bytes as f64 * 100.0 / total as f64;
                info!(bytes, total, securities, "streaming {pct:.1}%");
            }
            _ => info!(bytes, securities, "streaming"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chunk, price_block, volume_block};
    use flex_core::config::StoreConfig;
    use flex_core::Error;
    use flex_store::RawStoreReader;

    const DAY: i64 = 1_528_038_000;

    fn convert_bytes(stream: &[u8], path: &Path) -> Result<StreamStats> {
        let mut store = RawStoreWriter::create(path, &StoreConfig::default())?;
        let stats = convert_stream(stream, None, DAY, &mut store, &FeedConfig::default())?;
        store.finish()?;
        Ok(stats)
    }

    #[test]
    fn test_two_securities_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");

        let mut stream = chunk("8", "9876", &[price_block(1, 500, "090000000000", false)]);
        stream.extend(chunk(
            "1",
            "1234",
            &[price_block(4, 20_380_000, "090000063886", false), volume_block(100, "090000")],
        ));
        stream.extend(chunk("8", "9876", &[price_block(1, 510, "090001000000", false)]));

        let stats = convert_bytes(&stream, &path).unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.price_records, 3);
        assert_eq!(stats.volume_records, 1);
        assert_eq!(stats.bytes, stream.len() as u64);
        assert!(!stats.truncated);

        let reader = RawStoreReader::open(&path).unwrap();
        assert_eq!(reader.price_series("t1234").unwrap().len(), 1);
        let sapporo = reader.price_series("s9876").unwrap();
        assert_eq!(sapporo.len(), 2);
        assert_eq!(sapporo[0].raw_price, 500);
        assert_eq!(sapporo[1].raw_price, 510);
        assert_eq!(reader.volume_series("t1234").unwrap()[0].cumulative, 100);
    }

    #[test]
    fn test_unknown_exchange_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let stream = chunk("9", "1234", &[volume_block(1, "090000")]);

        let err = convert_bytes(&stream, &path).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownExchange { ref exchange, .. } if exchange == "9"
        ));
    }

    #[test]
    fn test_malformed_chunk_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let mut bad = volume_block(1, "090000");
        bad.push(b' ');
        let stream = chunk("1", "1234", &[price_block(1, 10, "090000000000", false), bad]);

        let mut store = RawStoreWriter::create(&path, &StoreConfig::default()).unwrap();
        let err = convert_stream(stream.as_slice(), None, DAY, &mut store, &FeedConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert_eq!(store.security_count(), 0);
    }

    #[test]
    fn test_truncated_capture_keeps_complete_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let mut stream = chunk("1", "1234", &[volume_block(100, "090000")]);
        let tail = chunk("1", "1234", &[volume_block(200, "090001")]);
        stream.extend_from_slice(&tail[..tail.len() / 2]);

        let stats = convert_bytes(&stream, &path).unwrap();
        assert_eq!(stats.chunks, 1);
        assert!(stats.truncated);
        let reader = RawStoreReader::open(&path).unwrap();
        assert_eq!(reader.volume_series("t1234").unwrap().len(), 1);
    }

    #[test]
    fn test_convert_gzip_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("StandardEquities_20180604.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&src).unwrap(),
            flate2::Compression::default(),
        );
        encoder
            .write_all(&chunk("1", "1234", &[price_block(4, 20_380_000, "090000063886", false)]))
            .unwrap();
        encoder.finish().unwrap();

        let output = dir.path().join("StandardEquities_20180604.duckdb");
        let date = NaiveDate::from_ymd_opt(2018, 6, 4).unwrap();
        let summary = convert_file(&src, &output, date, &Config::default()).unwrap();
        assert_eq!(summary.store.price_series, 1);
        assert_eq!(summary.store.price_rows, 1);

        let reader = RawStoreReader::open(&output).unwrap();
        let ticks = reader.price_series("t1234").unwrap();
        assert_eq!(ticks[0].ts_us, (DAY + 9 * 3_600) * 1_000_000 + 63_886);
    }

    #[test]
    fn test_unsupported_archive_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.duckdb");
        let date = NaiveDate::from_ymd_opt(2018, 6, 4).unwrap();
        let err = convert_file(&dir.path().join("feed.7z"), &output, date, &Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchive(_)));
        assert!(!output.exists());
    }
}
