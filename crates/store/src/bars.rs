//! Resampled bar store: one table per security, ascending by interval start.

use std::path::{Path, PathBuf};

use duckdb::{params, Connection};
use flex_core::{ResampledBar, Result};
use tracing::info;

use crate::db::{create_fresh, db_err, list_tables, open_read_only, quote_ident};

const BAR_SCHEMA: &str = "main";

/// Writes resampled bars, one table per partition.
pub struct BarStoreWriter {
    conn: Connection,
    path: PathBuf,
    tables: usize,
    bars: u64,
}

impl BarStoreWriter {
    /// Create a new bar store at `path`, replacing any previous file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = create_fresh(&path)?;
        Ok(Self {
            conn,
            path,
            tables: 0,
            bars: 0,
        })
    }

    /// Write the bars of one partition. `bars` must be ascending by start.
    pub fn write(&mut self, partition: &str, bars: &[ResampledBar]) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE {} (\
                    interval_start BIGINT NOT NULL, \
                    open DOUBLE, high DOUBLE, low DOUBLE, close DOUBLE, \
                    volume BIGINT NOT NULL, amount DOUBLE NOT NULL);",
                quote_ident(partition)
            ))
            .map_err(db_err)?;

        let mut appender = self.conn.appender(partition).map_err(db_err)?;
        for bar in bars {
            appender
                .append_row(params![
                    bar.interval_start,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.amount
                ])
                .map_err(db_err)?;
        }
        appender.flush().map_err(db_err)?;

        self.tables += 1;
        self.bars += bars.len() as u64;
        Ok(())
    }

    /// Close the store.
    pub fn finish(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| db_err(err))?;
        info!(path = %self.path.display(), tables = self.tables, bars = self.bars, "bar store written");
        Ok(())
    }
}

/// Read-only access to a bar store.
pub struct BarStoreReader {
    conn: Connection,
}

impl BarStoreReader {
    /// Open an existing bar store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: open_read_only(path.as_ref())?,
        })
    }

    /// Partition names, sorted.
    pub fn partitions(&self) -> Result<Vec<String>> {
        list_tables(&self.conn, BAR_SCHEMA)
    }

    /// Bars of a partition, ascending by interval start.
    pub fn read(&self, partition: &str) -> Result<Vec<ResampledBar>> {
        let sql = format!(
            "SELECT interval_start, open, high, low, close, volume, amount \
             FROM {} ORDER BY interval_start",
            quote_ident(partition)
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let bars = stmt
            .query_map(params![], |row| {
                Ok(ResampledBar {
                    interval_start: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    amount: row.get(6)?,
                })
            })
            .map_err(db_err)?
            .collect::<duckdb::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(bars)
    }
}
