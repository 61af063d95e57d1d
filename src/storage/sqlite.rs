use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use super::{next_version, CasOutcome, StoredDocument, VersionedStore};
use crate::types::{RegistryError, Result, SchemaVersion};

/// Sort key under which the org schema document is stored.
pub const SCHEMA_SORT_KEY: &str = "schema";

/// Default table holding registry documents.
pub const DEFAULT_TABLE: &str = "schema_registry";

/// Options for opening a [`SqliteStore`].
#[derive(Clone, Debug)]
pub struct SqliteStoreOptions {
    /// Table name; must be a plain SQL identifier.
    pub table: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Use WAL journaling so readers do not block the writer.
    pub wal: bool,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }
}

/// [`VersionedStore`] backed by a SQLite table keyed by a generic
/// partition/sort key pair.
///
/// Compare-and-swap is a single conditional statement, so several processes
/// may share one database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `path`.
    pub fn open(path: impl AsRef<Path>, opts: SqliteStoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::init(conn, opts, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(opts: SqliteStoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, opts, None)
    }

    fn init(conn: Connection, opts: SqliteStoreOptions, path: Option<PathBuf>) -> Result<Self> {
        validate_table_name(&opts.table)?;
        conn.busy_timeout(opts.busy_timeout)?;
        if opts.wal && path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    pk TEXT NOT NULL,
                    sk TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    document BLOB NOT NULL,
                    PRIMARY KEY (pk, sk)
                )",
                opts.table
            ),
            [],
        )?;
        debug!(table = %opts.table, path = ?path, "store.sqlite.open");
        Ok(Self {
            conn: Mutex::new(conn),
            table: opts.table,
            path,
        })
    }

    /// Table this store reads and writes.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn current_version(conn: &Connection, table: &str, org_id: &str) -> Result<Option<SchemaVersion>> {
        let raw: Option<i64> = conn
            .query_row(
                &format!("SELECT version FROM {table} WHERE pk = ?1 AND sk = ?2"),
                params![org_id, SCHEMA_SORT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(decode_version).transpose()
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.table)
            .field("path", &self.path)
            .finish()
    }
}

impl VersionedStore for SqliteStore {
    fn read(&self, org_id: &str) -> Result<Option<StoredDocument>> {
        let conn = self.conn.lock();
        let row: Option<(i64, Vec<u8>)> = conn
            .query_row(
                &format!(
                    "SELECT version, document FROM {} WHERE pk = ?1 AND sk = ?2",
                    self.table
                ),
                params![org_id, SCHEMA_SORT_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        trace!(org_id, found = row.is_some(), "store.sqlite.read");
        match row {
            Some((version, bytes)) => Ok(Some(StoredDocument {
                bytes,
                version: decode_version(version)?,
            })),
            None => Ok(None),
        }
    }

    fn write(
        &self,
        org_id: &str,
        document: &[u8],
        expected: Option<SchemaVersion>,
    ) -> Result<CasOutcome> {
        let conn = self.conn.lock();
        let version = next_version(expected);
        let changed = match expected {
            Some(current) => conn.execute(
                &format!(
                    "UPDATE {} SET document = ?1, version = ?2
                     WHERE pk = ?3 AND sk = ?4 AND version = ?5",
                    self.table
                ),
                params![
                    document,
                    encode_version(version)?,
                    org_id,
                    SCHEMA_SORT_KEY,
                    encode_version(current)?
                ],
            )?,
            None => conn.execute(
                &format!(
                    "INSERT INTO {} (pk, sk, version, document) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (pk, sk) DO NOTHING",
                    self.table
                ),
                params![org_id, SCHEMA_SORT_KEY, encode_version(version)?, document],
            )?,
        };
        if changed == 1 {
            trace!(org_id, version = version.0, "store.sqlite.write");
            return Ok(CasOutcome::Committed(version));
        }
        let actual = Self::current_version(&conn, &self.table, org_id)?;
        trace!(org_id, ?expected, ?actual, "store.sqlite.conflict");
        Ok(CasOutcome::Conflict { actual })
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::Configuration(format!(
            "table name '{table}' is not a plain identifier"
        )))
    }
}

fn encode_version(version: SchemaVersion) -> Result<i64> {
    i64::try_from(version.0)
        .map_err(|_| RegistryError::Corruption(format!("version {version} exceeds i64 range")))
}

fn decode_version(raw: i64) -> Result<SchemaVersion> {
    u64::try_from(raw)
        .map(SchemaVersion)
        .map_err(|_| RegistryError::Corruption(format!("negative stored version {raw}")))
}
