//! Maintenance entry points over the service database.
//!
//! The wider comic-management schema is owned elsewhere; the supervisor only
//! needs the handful of privileged operations reachable from maintenance
//! mode, plus the schema-version probe that decides whether an implicit
//! upgrade must run. The [`MaintenanceStore`] trait is the seam the
//! dispatcher is tested through; [`SqliteStore`] is the production
//! implementation.

use std::fmt;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::store");

/// Schema version the running code expects.
pub const EXPECTED_SCHEMA_VERSION: i32 = 2;

/// Privileged database operations reachable from maintenance mode.
pub trait MaintenanceStore {
    /// Current `user_version` of the open database.
    fn schema_version(&self) -> Result<i32, StoreError>;

    /// Whether the schema is behind what the code expects.
    fn requires_upgrade(&self) -> Result<bool, StoreError> {
        Ok(self.schema_version()? < EXPECTED_SCHEMA_VERSION)
    }

    /// Brings the schema up to [`EXPECTED_SCHEMA_VERSION`].
    fn upgrade_schema(&mut self) -> Result<(), StoreError>;

    /// Merges comic rows from another service database.
    fn import_database(&mut self, path: &Utf8Path) -> Result<ImportSummary, StoreError>;

    /// Imports comic IDs from a JSON document.
    fn import_json(&mut self, path: &Utf8Path) -> Result<ImportSummary, StoreError>;

    /// Exports all comic IDs to a JSON document; returns the exported count.
    fn export_json(&self, path: &Utf8Path) -> Result<usize, StoreError>;

    /// Collapses doubled path separators in stored locations; returns the
    /// number of repaired rows.
    fn fix_slashes(&mut self) -> Result<usize, StoreError>;

    /// Empties the provider search table; returns the number of rows dropped.
    fn clear_provider_table(&mut self) -> Result<usize, StoreError>;

    /// Snapshot of the quantities an operator asks about.
    fn status(&self) -> Result<StoreStatus, StoreError>;
}

/// Rows affected by an import operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows newly added.
    pub added: usize,
    /// Rows skipped because they already existed.
    pub skipped: usize,
}

/// Operator-facing status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    /// Current schema version.
    pub schema_version: i32,
    /// Total tracked comics.
    pub total_comics: usize,
    /// Comics imported but not yet refreshed.
    pub wanted_comics: usize,
    /// Rows in the provider search table.
    pub provider_rows: usize,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "schema v{}: {} comics ({} wanted), {} provider rows",
            self.schema_version, self.total_comics, self.wanted_comics, self.provider_rows
        )
    }
}

/// Errors raised by maintenance store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// A referenced file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// An output file could not be written.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// A JSON document did not have the expected shape.
    #[error("failed to parse '{path}': {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The database schema is newer than this build understands.
    #[error("database schema v{found} is newer than supported v{supported}")]
    SchemaAhead { found: i32, supported: i32 },
}

/// JSON document shape shared by import and export.
#[derive(Debug, Deserialize, Serialize)]
struct ComicIdDocument {
    #[serde(rename = "ComicID")]
    comic_ids: Vec<String>,
}

/// Seam through which the supervisor opens the store, so launch sequencing
/// can be exercised without a real database.
pub trait StoreOpener {
    /// Store type produced by this opener.
    type Store: MaintenanceStore;

    /// Opens the store backing the given database path.
    fn open(&self, path: &Utf8Path) -> Result<Self::Store, StoreError>;
}

/// Opener for the production SQLite store.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteOpener;

impl StoreOpener for SqliteOpener {
    type Store = SqliteStore;

    fn open(&self, path: &Utf8Path) -> Result<Self::Store, StoreError> {
        SqliteStore::open(path)
    }
}

/// Production store over the service database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the service database.
    ///
    /// A fresh database receives the current schema immediately; an existing
    /// database keeps its recorded version so the supervisor can decide
    /// whether an upgrade pass is due. A database from a future build is
    /// refused outright.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_std_path())?;
        let mut store = Self { conn };
        let version = store.schema_version()?;
        if version == 0 {
            store.install_current_schema()?;
        } else if version > EXPECTED_SCHEMA_VERSION {
            return Err(StoreError::SchemaAhead {
                found: version,
                supported: EXPECTED_SCHEMA_VERSION,
            });
        }
        Ok(store)
    }

    fn install_current_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS comics (
                 comic_id TEXT PRIMARY KEY,
                 name TEXT,
                 location TEXT,
                 status TEXT NOT NULL DEFAULT 'active'
             );
             CREATE TABLE IF NOT EXISTS provider_searches (
                 id INTEGER PRIMARY KEY,
                 provider TEXT NOT NULL,
                 search_term TEXT,
                 searched_at TEXT
             );",
        )?;
        self.set_schema_version(EXPECTED_SCHEMA_VERSION)?;
        Ok(())
    }

    fn set_schema_version(&self, version: i32) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    fn insert_comic_ids<I>(&mut self, ids: I, status: &str) -> Result<ImportSummary, StoreError>
    where
        I: IntoIterator<Item = String>,
    {
        let tx = self.conn.transaction()?;
        let mut summary = ImportSummary::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO comics (comic_id, status) VALUES (?1, ?2)",
            )?;
            for id in ids {
                let added = stmt.execute(rusqlite::params![id, status])?;
                if added > 0 {
                    summary.added += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl MaintenanceStore for SqliteStore {
    fn schema_version(&self) -> Result<i32, StoreError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    fn upgrade_schema(&mut self) -> Result<(), StoreError> {
        let mut version = self.schema_version()?;
        while version < EXPECTED_SCHEMA_VERSION {
            match version {
                1 => {
                    self.conn.execute_batch(
                        "ALTER TABLE comics ADD COLUMN status TEXT NOT NULL DEFAULT 'active';",
                    )?;
                }
                _ => {
                    self.install_current_schema()?;
                    break;
                }
            }
            version += 1;
            self.set_schema_version(version)?;
            info!(
                target: STORE_TARGET,
                version,
                "schema upgraded"
            );
        }
        Ok(())
    }

    fn import_database(&mut self, path: &Utf8Path) -> Result<ImportSummary, StoreError> {
        if !path.as_std_path().exists() {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        let other = Connection::open_with_flags(
            path.as_std_path(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        let ids: Vec<String> = {
            let mut stmt = other.prepare("SELECT comic_id FROM comics")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        self.insert_comic_ids(ids, "active")
    }

    fn import_json(&mut self, path: &Utf8Path) -> Result<ImportSummary, StoreError> {
        let text = fs::read_to_string(path.as_std_path()).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: ComicIdDocument =
            serde_json::from_str(&text).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        // Imported IDs are marked wanted so the next refresh pass fills in
        // their metadata.
        self.insert_comic_ids(document.comic_ids, "wanted")
    }

    fn export_json(&self, path: &Utf8Path) -> Result<usize, StoreError> {
        let ids: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT comic_id FROM comics ORDER BY comic_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let document = ComicIdDocument {
            comic_ids: ids,
        };
        let serialised = serde_json::to_string_pretty(&document).map_err(|source| {
            StoreError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path.as_std_path(), serialised).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(document.comic_ids.len())
    }

    fn fix_slashes(&mut self) -> Result<usize, StoreError> {
        let mut repaired = 0;
        // Collapse repeated separators until none remain; stored locations
        // may carry more than one doubled slash.
        loop {
            let changed = self.conn.execute(
                "UPDATE comics SET location = REPLACE(location, '//', '/')
                 WHERE location LIKE '%//%'",
                [],
            )?;
            if changed == 0 {
                break;
            }
            repaired = repaired.max(changed);
        }
        Ok(repaired)
    }

    fn clear_provider_table(&mut self) -> Result<usize, StoreError> {
        let dropped = self.conn.execute("DELETE FROM provider_searches", [])?;
        Ok(dropped)
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        Ok(StoreStatus {
            schema_version: self.schema_version()?,
            total_comics: self.count("SELECT COUNT(*) FROM comics")?,
            wanted_comics: self.count("SELECT COUNT(*) FROM comics WHERE status = 'wanted'")?,
            provider_rows: self.count("SELECT COUNT(*) FROM provider_searches")?,
        })
    }
}
