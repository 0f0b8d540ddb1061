//! Raw tick store.
//!
//! Decoded rows land in two namespaces, `price` and `volume`, holding one
//! append-only table per security. Row order inside a table is arrival
//! order; nothing is sorted on ingest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use duckdb::{params, Connection};
use flex_core::config::StoreConfig;
use flex_core::security::venue;
use flex_core::{partition_name, Error, PriceTick, Result, SecurityKey, TagKind, TagRecord, VolumeTick};
use tracing::{debug, info};

use crate::db::{create_fresh, db_err, list_tables, open_read_only, quote_ident};

/// Counts reported when a conversion pass closes its store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Number of price series created.
    pub price_series: usize,
    /// Number of volume series created.
    pub volume_series: usize,
    /// Price rows written.
    pub price_rows: u64,
    /// Volume rows written.
    pub volume_rows: u64,
}

/// One series and the rows not yet appended to its table.
struct Series {
    kind: TagKind,
    partition: String,
    pending: Vec<TagRecord>,
    written: u64,
}

impl Series {
    fn create(conn: &Connection, kind: TagKind, partition: String) -> Result<Self> {
        let columns = match kind {
            TagKind::Price => "ts_us BIGINT NOT NULL, raw_price BIGINT NOT NULL, decimal_flag INTEGER NOT NULL",
            TagKind::Volume => "ts_us BIGINT NOT NULL, cumulative BIGINT NOT NULL",
        };
        conn.execute_batch(&format!(
            "CREATE TABLE {}.{} ({columns});",
            quote_ident(kind.namespace()),
            quote_ident(&partition),
        ))
        .map_err(db_err)?;
        debug!(namespace = kind.namespace(), partition = %partition, "created series");

        Ok(Self {
            kind,
            partition,
            pending: Vec::new(),
            written: 0,
        })
    }

    fn push(&mut self, conn: &Connection, record: TagRecord, batch_rows: usize) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= batch_rows {
            self.flush(conn)?;
        }
        Ok(())
    }

    fn flush(&mut self, conn: &Connection) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut appender = conn
            .appender_to_db(&self.partition, self.kind.namespace())
            .map_err(db_err)?;
        for record in &self.pending {
            match record {
                TagRecord::Price(p) => appender
                    .append_row(params![p.ts_us, p.raw_price, i32::from(p.decimal_flag)])
                    .map_err(db_err)?,
                TagRecord::Volume(v) => appender
                    .append_row(params![v.ts_us, v.cumulative])
                    .map_err(db_err)?,
            }
        }
        appender.flush().map_err(db_err)?;
        self.written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

/// Price and volume series of one security.
#[derive(Default)]
struct SeriesPair {
    price: Option<Series>,
    volume: Option<Series>,
}

impl SeriesPair {
    fn slot(&mut self, kind: TagKind) -> &mut Option<Series> {
        match kind {
            TagKind::Price => &mut self.price,
            TagKind::Volume => &mut self.volume,
        }
    }
}

/// Builds the raw store for one conversion pass.
///
/// The writer owns the registry of series; a series is created the first
/// time its security appears. Rows are buffered per series and appended in
/// batches, so memory grows with the number of securities, not ticks.
/// Call [`RawStoreWriter::finish`] once at the end of the pass.
pub struct RawStoreWriter {
    conn: Connection,
    path: PathBuf,
    batch_rows: usize,
    registry: HashMap<SecurityKey, SeriesPair>,
}

impl RawStoreWriter {
    /// Create a new store at `path`, replacing any previous file.
    pub fn create(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        if config.batch_rows == 0 {
            return Err(Error::config("store.batch_rows must be at least 1"));
        }
        let path = path.as_ref().to_path_buf();
        let conn = create_fresh(&path)?;
        conn.execute_batch(&format!(
            "CREATE SCHEMA {}; CREATE SCHEMA {};",
            quote_ident(TagKind::Price.namespace()),
            quote_ident(TagKind::Volume.namespace()),
        ))
        .map_err(db_err)?;

        Ok(Self {
            conn,
            path,
            batch_rows: config.batch_rows,
            registry: HashMap::new(),
        })
    }

    /// Number of distinct securities seen so far.
    pub fn security_count(&self) -> usize {
        self.registry.len()
    }

    /// Append one decoded record to its security's series.
    ///
    /// Fails with `UnknownExchange` the first time a security with an
    /// unmapped exchange code shows up.
    pub fn append(&mut self, key: &SecurityKey, record: TagRecord) -> Result<()> {
        let kind = record.kind();
        if let Some(series) = self.registry.get_mut(key).and_then(|pair| pair.slot(kind).as_mut()) {
            return series.push(&self.conn, record, self.batch_rows);
        }

        let partition = partition_name(key)?;
        if kind == TagKind::Price {
            debug!(security = %key, venue = venue(&key.exchange).unwrap_or_default(), "new security");
        }
        let mut series = Series::create(&self.conn, kind, partition)?;
        series.push(&self.conn, record, self.batch_rows)?;
        *self.registry.entry(key.clone()).or_default().slot(kind) = Some(series);
        Ok(())
    }

    /// Flush every series and close the store.
    pub fn finish(mut self) -> Result<StoreSummary> {
        let mut summary = StoreSummary::default();
        for pair in self.registry.values_mut() {
            if let Some(series) = pair.price.as_mut() {
                series.flush(&self.conn)?;
                summary.price_series += 1;
                summary.price_rows += series.written;
            }
            if let Some(series) = pair.volume.as_mut() {
                series.flush(&self.conn)?;
                summary.volume_series += 1;
                summary.volume_rows += series.written;
            }
        }

        self.conn.close().map_err(|(_, err)| db_err(err))?;
        info!(
            path = %self.path.display(),
            price_series = summary.price_series,
            volume_series = summary.volume_series,
            price_rows = summary.price_rows,
            volume_rows = summary.volume_rows,
            "raw store written"
        );
        Ok(summary)
    }
}

/// Read-only access to a raw store.
pub struct RawStoreReader {
    conn: Connection,
}

impl RawStoreReader {
    /// Open an existing raw store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: open_read_only(path.as_ref())?,
        })
    }

    /// Partition names present in a namespace, sorted.
    pub fn partitions(&self, kind: TagKind) -> Result<Vec<String>> {
        list_tables(&self.conn, kind.namespace())
    }

    fn has_partition(&self, kind: TagKind, partition: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                params![kind.namespace(), partition],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Price rows of a partition in arrival order. Missing partitions are
    /// empty.
    pub fn price_series(&self, partition: &str) -> Result<Vec<PriceTick>> {
        if !self.has_partition(TagKind::Price, partition)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT ts_us, raw_price, decimal_flag FROM {}.{} ORDER BY rowid",
            quote_ident(TagKind::Price.namespace()),
            quote_ident(partition),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(db_err)?
            .collect::<duckdb::Result<Vec<_>>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(ts_us, raw_price, flag)| {
                let decimal_flag = u8::try_from(flag).map_err(|_| {
                    Error::malformed(format!("decimal flag {flag} out of range in {partition}"))
                })?;
                Ok(PriceTick {
                    ts_us,
                    raw_price,
                    decimal_flag,
                })
            })
            .collect()
    }

    /// Volume rows of a partition in arrival order. Missing partitions are
    /// empty.
    pub fn volume_series(&self, partition: &str) -> Result<Vec<VolumeTick>> {
        if !self.has_partition(TagKind::Volume, partition)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT ts_us, cumulative FROM {}.{} ORDER BY rowid",
            quote_ident(TagKind::Volume.namespace()),
            quote_ident(partition),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(VolumeTick {
                    ts_us: row.get(0)?,
                    cumulative: row.get(1)?,
                })
            })
            .map_err(db_err)?
            .collect::<duckdb::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(ts_us: i64, raw_price: i64) -> TagRecord {
        TagRecord::Price(PriceTick {
            ts_us,
            raw_price,
            decimal_flag: 4,
        })
    }

    fn volume(ts_us: i64, cumulative: i64) -> TagRecord {
        TagRecord::Volume(VolumeTick { ts_us, cumulative })
    }

    fn small_batches() -> StoreConfig {
        StoreConfig {
            batch_rows: 2,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_series_created_on_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");

        let tokyo = SecurityKey::new("1", "1234");
        let sapporo = SecurityKey::new("8", "9876");

        let mut writer = RawStoreWriter::create(&path, &small_batches()).unwrap();
        writer.append(&sapporo, price(3, 30)).unwrap();
        writer.append(&tokyo, price(1, 10)).unwrap();
        writer.append(&sapporo, price(2, 20)).unwrap();
        writer.append(&sapporo, volume(2, 100)).unwrap();
        assert_eq!(writer.security_count(), 2);
        let summary = writer.finish().unwrap();

        assert_eq!(summary.price_series, 2);
        assert_eq!(summary.volume_series, 1);
        assert_eq!(summary.price_rows, 3);
        assert_eq!(summary.volume_rows, 1);

        let reader = RawStoreReader::open(&path).unwrap();
        assert_eq!(reader.partitions(TagKind::Price).unwrap(), vec!["s9876", "t1234"]);
        assert_eq!(reader.partitions(TagKind::Volume).unwrap(), vec!["s9876"]);
    }

    #[test]
    fn test_arrival_order_preserved_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let key = SecurityKey::new("1", "1234");

        let mut writer = RawStoreWriter::create(&path, &small_batches()).unwrap();
        for (ts, px) in [(5, 50), (1, 10), (3, 30), (2, 20), (4, 40)] {
            writer.append(&key, price(ts, px)).unwrap();
        }
        writer.finish().unwrap();

        let reader = RawStoreReader::open(&path).unwrap();
        let ts: Vec<i64> = reader
            .price_series("t1234")
            .unwrap()
            .iter()
            .map(|p| p.ts_us)
            .collect();
        assert_eq!(ts, vec![5, 1, 3, 2, 4]);
        assert!(reader.volume_series("t1234").unwrap().is_empty());
    }

    #[test]
    fn test_buffers_grow_with_rows_not_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let key = SecurityKey::new("1", "1234");

        let mut writer = RawStoreWriter::create(&path, &StoreConfig::default()).unwrap();
        writer.append(&key, price(1, 10)).unwrap();
        let pending = &writer.registry[&key].price.as_ref().unwrap().pending;
        assert_eq!(pending.len(), 1);
        assert!(pending.capacity() < StoreConfig::default().batch_rows);
        writer.finish().unwrap();
    }

    #[test]
    fn test_unknown_exchange_fails_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");

        let mut writer = RawStoreWriter::create(&path, &StoreConfig::default()).unwrap();
        let err = writer
            .append(&SecurityKey::new("9", "1234"), price(1, 10))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownExchange { .. }));
    }

    #[test]
    fn test_create_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.duckdb");
        let key = SecurityKey::new("1", "1234");

        let mut writer = RawStoreWriter::create(&path, &StoreConfig::default()).unwrap();
        writer.append(&key, volume(1, 100)).unwrap();
        writer.finish().unwrap();

        let writer = RawStoreWriter::create(&path, &StoreConfig::default()).unwrap();
        writer.finish().unwrap();

        let reader = RawStoreReader::open(&path).unwrap();
        assert!(reader.partitions(TagKind::Volume).unwrap().is_empty());
    }
}
