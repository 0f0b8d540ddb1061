//! DuckDB connection helpers shared by the stores.

use std::path::Path;

use duckdb::{params, AccessMode, Config as DbConfig, Connection};
use flex_core::{Error, Result};

/// Convert a DuckDB error into ours.
pub(crate) fn db_err(err: duckdb::Error) -> Error {
    Error::database(err.to_string())
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Open a new database file, replacing any previous output at `path`.
pub(crate) fn create_fresh(path: &Path) -> Result<Connection> {
    for stale in [path.to_path_buf(), path.with_extension(wal_extension(path))] {
        if stale.exists() {
            std::fs::remove_file(&stale)?;
        }
    }
    Connection::open(path).map_err(db_err)
}

/// Open an existing database file without write access.
pub(crate) fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("store not found: {}", path.display()),
        )));
    }
    let config = DbConfig::default()
        .access_mode(AccessMode::ReadOnly)
        .map_err(db_err)?;
    Connection::open_with_flags(path, config).map_err(db_err)
}

/// Table names in a schema, sorted.
pub(crate) fn list_tables(conn: &Connection, schema: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? ORDER BY table_name",
        )
        .map_err(db_err)?;
    let names = stmt
        .query_map(params![schema], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<duckdb::Result<Vec<_>>>()
        .map_err(db_err)?;
    Ok(names)
}

fn wal_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.wal"),
        None => "wal".to_string(),
    }
}
