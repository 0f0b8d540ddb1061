//! Store-level resampling pass: raw store in, bar store out.

use std::path::{Path, PathBuf};

use flex_core::config::ResampleConfig;
use flex_core::{Interval, PriceTick, ResampledBar, Result, TagKind, VolumeTick};
use flex_store::{BarStoreReader, BarStoreWriter, RawStoreReader};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::bar_builder::build_bars;

/// Result of one resampling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResampleSummary {
    /// Securities resampled.
    pub securities: usize,
    /// Bars written across all securities.
    pub bars: u64,
    /// Volume partitions without a matching price partition.
    pub volume_only: usize,
}

struct LoadedSeries {
    partition: String,
    prices: Vec<PriceTick>,
    volumes: Vec<VolumeTick>,
}

/// Resample every price partition of `raw`, with its matching volume
/// partition, into `out`.
///
/// Securities are handled `parallel_batch` at a time: series are loaded and
/// written sequentially, bars are built in parallel.
pub fn resample(
    raw: &RawStoreReader,
    out: &mut BarStoreWriter,
    interval: Interval,
    parallel_batch: usize,
) -> Result<ResampleSummary> {
    let partitions = raw.partitions(TagKind::Price)?;
    let volume_only = raw
        .partitions(TagKind::Volume)?
        .iter()
        .filter(|name| partitions.binary_search(name).is_err())
        .count();
    if volume_only > 0 {
        debug!(volume_only, "skipping volume partitions without prices");
    }

    let mut summary = ResampleSummary {
        volume_only,
        ..Default::default()
    };

    for batch in partitions.chunks(parallel_batch.max(1)) {
        let loaded = batch
            .iter()
            .map(|partition| {
                Ok(LoadedSeries {
                    partition: partition.clone(),
                    prices: raw.price_series(partition)?,
                    volumes: raw.volume_series(partition)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let built: Vec<(String, Vec<ResampledBar>)> = loaded
            .into_par_iter()
            .map(|series| {
                let bars = build_bars(&series.prices, &series.volumes, interval);
                (series.partition, bars)
            })
            .collect();

        for (partition, bars) in built {
            out.write(&partition, &bars)?;
            summary.securities += 1;
            summary.bars += bars.len() as u64;
        }
        debug!(done = summary.securities, total = partitions.len(), "resampled batch");
    }

    Ok(summary)
}

/// Resample the raw store at `src` into a new bar store at `dst`.
pub fn resample_file(src: &Path, dst: &Path, interval: Interval, config: &ResampleConfig) -> Result<ResampleSummary> {
    info!(src = %src.display(), dst = %dst.display(), %interval, "resampling");
    let raw = RawStoreReader::open(src)?;
    let mut out = BarStoreWriter::create(dst)?;
    let summary = resample(&raw, &mut out, interval, config.parallel_batch)?;
    out.finish()?;

    info!(
        src = %src.display(),
        securities = summary.securities,
        bars = summary.bars,
        "resampling finished"
    );
    Ok(summary)
}

/// `<dir>/<raw stem>_<interval>.<ext>`.
pub fn resample_output_path(raw: &Path, interval: Interval, ext: &str) -> PathBuf {
    let stem = raw.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    raw.with_file_name(format!("{stem}_{interval}.{ext}"))
}

/// Read every table of a bar store, by partition name.
pub fn read_all(path: &Path) -> Result<Vec<(String, Vec<ResampledBar>)>> {
    let reader = BarStoreReader::open(path)?;
    reader
        .partitions()?
        .into_iter()
        .map(|partition| {
            let bars = reader.read(&partition)?;
            Ok((partition, bars))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_core::config::StoreConfig;
    use flex_core::{SecurityKey, TagRecord};
    use flex_store::RawStoreWriter;

    const SEC: i64 = 1_000_000;

    fn write_raw(path: &Path) {
        let mut writer = RawStoreWriter::create(path, &StoreConfig::default()).unwrap();
        let tokyo = SecurityKey::new("1", "1234");
        let nagoya = SecurityKey::new("3", "5555");
        let sapporo = SecurityKey::new("8", "9876");
        for (i, raw_price) in [1000, 1010, 990].into_iter().enumerate() {
            let tick = PriceTick {
                ts_us: i as i64 * SEC / 2,
                raw_price,
                decimal_flag: 1,
            };
            writer.append(&tokyo, TagRecord::Price(tick)).unwrap();
        }
        for (ts_us, cumulative) in [(0, 100), (SEC, 300)] {
            writer
                .append(&tokyo, TagRecord::Volume(VolumeTick { ts_us, cumulative }))
                .unwrap();
        }
        writer
            .append(
                &sapporo,
                TagRecord::Price(PriceTick {
                    ts_us: 5 * SEC,
                    raw_price: 42,
                    decimal_flag: 0,
                }),
            )
            .unwrap();
        writer
            .append(&nagoya, TagRecord::Volume(VolumeTick { ts_us: 0, cumulative: 7 }))
            .unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_resample_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("raw.duckdb");
        let dst = dir.path().join("raw_1s.duckdb");
        write_raw(&src);

        let interval = Interval::from_secs(1).unwrap();
        let summary = resample_file(&src, &dst, interval, &ResampleConfig::default()).unwrap();
        assert_eq!(summary.securities, 2);
        assert_eq!(summary.volume_only, 1);
        assert_eq!(summary.bars, 3);

        let tables = read_all(&dst).unwrap();
        let names: Vec<&str> = tables.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["s9876", "t1234"]);

        let tokyo = &tables[1].1;
        assert_eq!(tokyo.len(), 2);
        assert_eq!(tokyo[0].open, Some(100.0));
        assert_eq!(tokyo[0].high, Some(101.0));
        assert_eq!(tokyo[0].volume, 100);
        assert_eq!(tokyo[1].close, Some(99.0));
        assert_eq!(tokyo[1].volume, 200);
    }

    #[test]
    fn test_resample_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("raw.duckdb");
        write_raw(&src);

        let interval = Interval::from_secs(1).unwrap();
        let first = dir.path().join("a.duckdb");
        let second = dir.path().join("b.duckdb");
        let config = ResampleConfig {
            parallel_batch: 1,
            ..Default::default()
        };
        resample_file(&src, &first, interval, &config).unwrap();
        resample_file(&src, &second, interval, &ResampleConfig::default()).unwrap();

        assert_eq!(read_all(&first).unwrap(), read_all(&second).unwrap());
        // Raw input untouched.
        let raw = RawStoreReader::open(&src).unwrap();
        assert_eq!(raw.price_series("t1234").unwrap().len(), 3);
    }

    #[test]
    fn test_output_path() {
        let interval: Interval = "5min".parse().unwrap();
        assert_eq!(
            resample_output_path(Path::new("/d/StandardEquities_20180604.duckdb"), interval, "duckdb"),
            PathBuf::from("/d/StandardEquities_20180604_5min.duckdb")
        );
    }
}
