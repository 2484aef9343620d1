//! Table Store
//!
//! Manages a directory of indicator tables and serves the [`Store`] adapter
//! on top of them.
//!
//! ## Responsibilities
//! - Discover existing tables on startup and on `refresh()`
//! - Search tables newest → oldest for point lookups
//! - Write new tables from imported records
//! - Stream every key for filter builds
//! - Bound concurrent file access through the session pool

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, SieveError, StoreError, StoreResult};

use super::pool::{ConnectionPool, ManageConnection, PoolState, PooledConnection};
use super::table::{TableBuilder, TableCursor, TableMeta, TableReader, TABLE_EXTENSION};
use super::{Deadline, IndicatorRecord, Store};

// =============================================================================
// Table Set and Sessions
// =============================================================================

/// Tables currently served, newest first
struct TableSet {
    /// Bumped whenever the list changes; stale sessions are not reused
    generation: u64,
    /// One template reader per table (index loaded once, shared by sessions)
    tables: Vec<(u64, TableReader)>,
}

/// A pooled session: one open file handle per table
pub struct TableSession {
    generation: u64,
    readers: Vec<TableReader>,
}

/// Opens sessions against the current table set
pub struct TableConnector {
    tables: Arc<RwLock<TableSet>>,
}

impl ManageConnection for TableConnector {
    type Connection = TableSession;

    fn connect(&self) -> StoreResult<TableSession> {
        let set = self.tables.read();
        let readers = set
            .tables
            .iter()
            .map(|(_, template)| template.reopen())
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(TableSession {
            generation: set.generation,
            readers,
        })
    }

    fn is_valid(&self, conn: &TableSession) -> bool {
        conn.generation == self.tables.read().generation
    }
}

// =============================================================================
// Table Store
// =============================================================================

/// Directory-backed indicator store
///
/// ## Concurrency:
/// - `tables`: RwLock; lookups never touch it directly, sessions snapshot it
/// - `pool`: caps open sessions at `max_open_connections`
/// - `import_lock`: one writer at a time
/// - All methods use `&self`
pub struct TableStore {
    /// Directory where tables are stored
    data_dir: PathBuf,

    /// Tables currently served
    tables: Arc<RwLock<TableSet>>,

    /// Next ID for new tables
    next_table_id: AtomicU64,

    /// Serializes imports and refreshes
    import_lock: Mutex<()>,

    /// Bounded session pool
    pool: ConnectionPool<TableConnector>,
}

impl TableStore {
    /// Open or create a store in `path`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing table files
    /// 3. Load each table's key index
    /// 4. Order newest first
    pub fn open(path: &Path, max_open: usize, max_idle: usize) -> Result<Self> {
        fs::create_dir_all(path)?;

        let ids = Self::discover(path)?;
        let mut tables = Vec::with_capacity(ids.len());
        for id in &ids {
            tables.push((*id, TableReader::open(&Self::table_path_with_dir(path, *id))?));
        }

        let next_id = ids.first().map(|&id| id + 1).unwrap_or(1);
        let tables = Arc::new(RwLock::new(TableSet {
            generation: 1,
            tables,
        }));

        let pool = ConnectionPool::new(
            TableConnector {
                tables: Arc::clone(&tables),
            },
            max_open,
            max_idle,
        )?;

        tracing::debug!(dir = %path.display(), tables = ids.len(), "Indicator store opened");

        Ok(Self {
            data_dir: path.to_path_buf(),
            tables,
            next_table_id: AtomicU64::new(next_id),
            import_lock: Mutex::new(()),
            pool,
        })
    }

    /// Open using the store settings of `config`
    pub fn open_with_config(config: &Config) -> Result<Self> {
        Self::open(
            &config.data_dir,
            config.max_open_connections,
            config.max_idle_connections,
        )
    }

    /// Write `records` to a new table and start serving it
    ///
    /// Records are sorted by value; for a repeated value the last one wins.
    /// The file is written under a temporary name and renamed into place so
    /// a concurrent `refresh()` never sees it half written.
    pub fn import<I>(&self, records: I) -> Result<TableMeta>
    where
        I: IntoIterator<Item = IndicatorRecord>,
    {
        let sorted: BTreeMap<String, IndicatorRecord> = records
            .into_iter()
            .map(|r| (r.value.clone(), r))
            .collect();

        if sorted.is_empty() {
            return Err(SieveError::Config(
                "import contains no indicator records".to_string(),
            ));
        }

        let _guard = self.import_lock.lock();

        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let path = self.table_path(id);
        let tmp_path = path.with_extension(format!("{}.tmp", TABLE_EXTENSION));

        let written = Self::write_table(&tmp_path, &path, sorted.values());
        let mut meta = match written {
            Ok(meta) => meta,
            Err(e) => {
                // Best effort; the original error is what the caller needs
                let _ = fs::remove_file(&tmp_path);
                tracing::warn!(table = id, error = %e, "Indicator import failed");
                return Err(e);
            }
        };
        meta.path = path.clone();

        let reader = TableReader::open(&path)?;
        {
            let mut set = self.tables.write();
            set.tables.insert(0, (id, reader));
            set.generation += 1;
        }
        self.pool.clear_idle();

        tracing::info!(table = id, records = meta.entry_count, "Indicator table imported");

        Ok(meta)
    }

    /// Write a table at `tmp_path` and rename it to `path`
    fn write_table<'a>(
        tmp_path: &Path,
        path: &Path,
        records: impl Iterator<Item = &'a IndicatorRecord>,
    ) -> Result<TableMeta> {
        let mut builder = TableBuilder::new(tmp_path)?;
        for record in records {
            builder.add_record(record)?;
        }
        let meta = builder.finish()?;
        fs::rename(tmp_path, path)?;
        Ok(meta)
    }

    /// Rediscover tables on disk; returns whether the served set changed
    pub fn reload(&self) -> Result<bool> {
        let _guard = self.import_lock.lock();

        let ids = Self::discover(&self.data_dir)?;
        let current: Vec<u64> = self.tables.read().tables.iter().map(|(id, _)| *id).collect();
        if ids == current {
            return Ok(false);
        }

        // Reuse already loaded indexes for tables we know
        let mut tables = Vec::with_capacity(ids.len());
        {
            let set = self.tables.read();
            for id in &ids {
                let reader = match set.tables.iter().find(|(known, _)| known == id) {
                    Some((_, template)) => template.reopen()?,
                    None => TableReader::open(&self.table_path(*id))?,
                };
                tables.push((*id, reader));
            }
        }

        if let Some(&newest) = ids.first() {
            self.next_table_id.fetch_max(newest + 1, Ordering::SeqCst);
        }

        {
            let mut set = self.tables.write();
            set.tables = tables;
            set.generation += 1;
        }
        self.pool.clear_idle();

        tracing::info!(tables = ids.len(), "Indicator tables reloaded");

        Ok(true)
    }

    /// Get the number of tables
    pub fn table_count(&self) -> usize {
        self.tables.read().tables.len()
    }

    /// Total entries across tables (values repeated across tables count twice)
    pub fn entry_count(&self) -> u64 {
        self.tables.read().tables.iter().map(|(_, r)| r.entry_count()).sum()
    }

    /// Generation of the served table set
    pub fn generation(&self) -> u64 {
        self.tables.read().generation
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next table ID (for testing/debugging)
    pub fn next_table_id(&self) -> u64 {
        self.next_table_id.load(Ordering::SeqCst)
    }

    /// Occupancy of the session pool
    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Table IDs present in `dir`, newest first
    fn discover(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_table_id(&file_path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Generate the file path for a table with given ID
    fn table_path(&self, id: u64) -> PathBuf {
        Self::table_path_with_dir(&self.data_dir, id)
    }

    /// Generate table path given a directory and ID
    fn table_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("table_{:06}.{}", id, TABLE_EXTENSION))
    }

    /// Parse table ID from filename
    /// "table_000042.itb" → Some(42); temporaries and other files → None
    fn parse_table_id(path: &Path) -> Option<u64> {
        if path.extension()? != TABLE_EXTENSION {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("table_")?.parse().ok()
    }
}

impl Store for TableStore {
    type Keys = KeyStream;

    fn point_lookup(&self, key: &str, deadline: Deadline) -> StoreResult<Option<IndicatorRecord>> {
        let mut session = self.pool.get(deadline)?;

        for i in 0..session.readers.len() {
            deadline.check()?;

            let reader = &mut session.readers[i];
            if !reader.might_contain(key.as_bytes()) {
                continue;
            }

            match reader.get_record(key) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => continue,
                Err(e) => {
                    if matches!(e, StoreError::Io(_)) {
                        session.mark_broken();
                    }
                    return Err(e);
                }
            }
        }

        Ok(None)
    }

    fn enumerate_keys(&self, deadline: Deadline) -> StoreResult<KeyStream> {
        let session = self.pool.get(deadline)?;
        Ok(KeyStream {
            session,
            table: 0,
            cursor: None,
            deadline,
            finished: false,
        })
    }

    fn refresh(&self) -> StoreResult<bool> {
        self.reload().map_err(|e| match e {
            SieveError::Store(e) => e,
            SieveError::Io(e) => StoreError::Io(e),
            other => StoreError::Unavailable(other.to_string()),
        })
    }
}

// =============================================================================
// Key Stream
// =============================================================================

/// Single-pass stream of every key, holding one pooled session throughout
///
/// Keys come straight from the tables' data blocks, newest table first. A
/// value present in several tables is yielded once per table.
pub struct KeyStream {
    session: PooledConnection<TableConnector>,
    /// Table currently being scanned
    table: usize,
    cursor: Option<TableCursor>,
    deadline: Deadline,
    finished: bool,
}

impl KeyStream {
    fn fail(&mut self, e: StoreError) -> Option<StoreResult<String>> {
        self.finished = true;
        if matches!(e, StoreError::Io(_)) {
            self.session.mark_broken();
        }
        Some(Err(e))
    }
}

impl Iterator for KeyStream {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Err(e) = self.deadline.check() {
                return self.fail(e);
            }

            let Some(reader) = self.session.readers.get_mut(self.table) else {
                self.finished = true;
                return None;
            };
            let cursor = self.cursor.get_or_insert_with(|| TableCursor::new(reader));

            match cursor.next_entry(reader) {
                Ok(Some((key, _))) => {
                    return Some(String::from_utf8(key).map_err(|e| {
                        StoreError::MalformedRow(format!(
                            "{}: indicator value is not UTF-8: {}",
                            reader.path().display(),
                            e
                        ))
                    }));
                }
                Ok(None) => {
                    self.table += 1;
                    self.cursor = None;
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}
