//! Top-level handle wiring disk, buffer pool, catalog, lock manager and
//! transaction manager together (spec.md §6 External Interfaces).
//!
//! Unlike the teacher's process-wide `lazy_static!` singletons, `Database`
//! is an owned handle: callers open as many independent databases (each
//! against its own directory) as they like in the same process, which is
//! what lets the test suite spin up a fresh `tempfile::tempdir()` per test.

use crate::buffer::BufferPoolManager;
use crate::catalog::{Catalog, ColType, ColumnMeta, IndexMeta, TableMeta};
use crate::error::Error;
use crate::index::MemIndex;
use crate::lock::LockManager;
use crate::record::RmFileHandle;
use crate::transaction::{Transaction, TransactionManager, TableResolver};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Teacher's hardcoded `BUFFER_POOL_SIZE` const, kept as the fallback used
/// by `open_default` rather than the only option (spec.md AMBIENT
/// configuration: pool size is a constructor parameter).
pub const BUFFER_POOL_SIZE: usize = 64;

const META_FILE: &str = "db.meta";

/// One column of a table being created, before offsets are assigned.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, col_type: ColType, len: usize) -> Self {
        Self {
            name: name.into(),
            col_type,
            len,
        }
    }
}

pub struct Database {
    root: PathBuf,
    bpm: Arc<Mutex<BufferPoolManager>>,
    catalog: Mutex<Catalog>,
    lock_mgr: Arc<LockManager>,
    txn_mgr: TransactionManager,
}

impl Database {
    /// Creates a fresh database directory. Fails with `DatabaseExists` if
    /// `db.meta` is already present.
    pub fn create(path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if root.join(META_FILE).exists() {
            bail!(Error::DatabaseExists(root.display().to_string()));
        }
        let disk = crate::disk::DiskManager::new(&root)?;
        let lock_mgr = Arc::new(LockManager::new());
        let db = Self {
            root,
            bpm: Arc::new(Mutex::new(BufferPoolManager::new(pool_size, disk))),
            catalog: Mutex::new(Catalog::new()),
            txn_mgr: TransactionManager::new(lock_mgr.clone()),
            lock_mgr,
        };
        db.flush_meta()?;
        Ok(db)
    }

    /// Reopens an existing database, reloading `db.meta` and every table's
    /// heap file (spec.md §6: "reloaded at `open_db`").
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let meta_path = root.join(META_FILE);
        if !meta_path.exists() {
            bail!(Error::DatabaseNotFound(root.display().to_string()));
        }
        let mut disk = crate::disk::DiskManager::new(&root)?;
        let metas = Catalog::load_metas(&meta_path)?;

        let mut fds = Vec::with_capacity(metas.len());
        for meta in &metas {
            fds.push(disk.open_file(&meta.name)?);
        }

        let bpm = Arc::new(Mutex::new(BufferPoolManager::new(pool_size, disk)));
        let lock_mgr = Arc::new(LockManager::new());
        let mut catalog = Catalog::new();
        for (meta, fd) in metas.into_iter().zip(fds) {
            let rm = Arc::new(RmFileHandle::open(bpm.clone(), fd)?);
            let tab_name = meta.name.clone();
            let index_metas = meta.indexes.clone();
            catalog.register_table(meta, rm);
            for index_meta in &index_metas {
                let index_name = index_name_for(&index_meta.cols);
                catalog.register_index(&tab_name, &index_name, Arc::new(MemIndex::new()));
            }
        }

        Ok(Self {
            root,
            bpm,
            catalog: Mutex::new(catalog),
            txn_mgr: TransactionManager::new(lock_mgr.clone()),
            lock_mgr,
        })
    }

    /// `open` with the teacher's default pool size.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, BUFFER_POOL_SIZE)
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_mgr
    }

    pub fn begin(&self) -> Arc<Transaction> {
        self.txn_mgr.begin()
    }

    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        self.txn_mgr.commit(txn)
    }

    pub fn abort(&self, txn: &Transaction) -> Result<()> {
        self.txn_mgr.abort(txn, self)
    }

    /// Creates a table with the given columns and secondary indexes (each a
    /// list of column names forming a composite key), persisting the
    /// updated catalog immediately.
    pub fn create_table(
        &self,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
        indexes: Vec<Vec<String>>,
    ) -> Result<()> {
        let name = name.into();
        let mut catalog = self.catalog.lock();
        if catalog.table(&name).is_some() {
            bail!(Error::TableExists(name));
        }

        let mut offset = 0;
        let cols: Vec<ColumnMeta> = columns
            .into_iter()
            .map(|c| {
                let col = ColumnMeta {
                    tab_name: name.clone(),
                    name: c.name,
                    col_type: c.col_type,
                    len: c.len,
                    offset,
                    has_index: false,
                };
                offset += c.len;
                col
            })
            .collect();
        let record_size = offset;

        let index_metas: Vec<IndexMeta> = indexes
            .iter()
            .map(|cols_for_index| {
                let col_tot_len = cols_for_index
                    .iter()
                    .filter_map(|c| cols.iter().find(|col| &col.name == c))
                    .map(|col| col.len)
                    .sum();
                IndexMeta {
                    tab_name: name.clone(),
                    cols: cols_for_index.clone(),
                    col_tot_len,
                    col_num: cols_for_index.len(),
                }
            })
            .collect();

        let mut cols = cols;
        for index in &index_metas {
            for col in cols.iter_mut() {
                if index.cols.contains(&col.name) {
                    col.has_index = true;
                }
            }
        }

        let meta = TableMeta {
            name: name.clone(),
            cols,
            indexes: index_metas.clone(),
        };

        let fd = self.bpm.lock().disk_manager_mut().open_file(&name)?;
        let rm = Arc::new(RmFileHandle::create(self.bpm.clone(), fd, record_size)?);
        catalog.register_table(meta, rm);
        for index in &index_metas {
            let index_name = index_name_for(&index.cols);
            catalog.register_index(&name, &index_name, Arc::new(MemIndex::new()));
        }
        drop(catalog);
        self.flush_meta()
    }

    pub fn table_meta(&self, name: &str) -> Result<TableMeta> {
        let catalog = self.catalog.lock();
        let Some(entry) = catalog.table(name) else {
            bail!(Error::TableNotFound(name.to_string()));
        };
        Ok(entry.meta.clone())
    }

    pub fn table_handle(&self, name: &str) -> Result<Arc<RmFileHandle>> {
        let catalog = self.catalog.lock();
        let Some(entry) = catalog.table(name) else {
            bail!(Error::TableNotFound(name.to_string()));
        };
        Ok(entry.rm.clone())
    }

    /// The secondary index backing the given composite column list, if any.
    pub fn table_index(&self, name: &str, cols: &[String]) -> Result<Option<Arc<MemIndex>>> {
        let catalog = self.catalog.lock();
        let Some(entry) = catalog.table(name) else {
            bail!(Error::TableNotFound(name.to_string()));
        };
        Ok(entry.indexes.get(&index_name_for(cols)).cloned())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.lock().table_names()
    }

    pub fn flush_meta(&self) -> Result<()> {
        self.catalog.lock().flush_meta(self.root.join(META_FILE))
    }
}

impl TableResolver for Database {
    fn resolve(&self, tab_name: &str) -> Result<Arc<RmFileHandle>> {
        self.table_handle(tab_name)
    }
}

fn index_name_for(cols: &[String]) -> String {
    cols.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DeleteExecutor, Context as ExecContext};
    use crate::index::IndexHandle;

    #[test]
    fn create_reopen_round_trips_catalog_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::create(dir.path(), 10).unwrap();
            db.create_table(
                "t",
                vec![
                    ColumnSpec::new("a", ColType::Int, 4),
                    ColumnSpec::new("b", ColType::Int, 4),
                ],
                vec![vec!["a".to_string()]],
            )
            .unwrap();

            let rm = db.table_handle("t").unwrap();
            let mut buf = vec![0u8; 8];
            buf[0..4].copy_from_slice(&1i32.to_le_bytes());
            buf[4..8].copy_from_slice(&10i32.to_le_bytes());
            let rid = rm.insert_record(&buf).unwrap();
            let index = db.table_index("t", &["a".to_string()]).unwrap().unwrap();
            index.insert_entry(&1i32.to_le_bytes(), rid).unwrap();
        }

        let db = Database::open(dir.path(), 10).unwrap();
        assert_eq!(db.table_names(), vec!["t".to_string()]);
        let rm = db.table_handle("t").unwrap();
        assert_eq!(rm.num_pages(), rm.num_pages());
        let meta = db.table_meta("t").unwrap();
        assert_eq!(meta.record_size(), 8);
    }

    #[test]
    fn abort_restores_deleted_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path(), 10).unwrap();
        db.create_table(
            "t",
            vec![ColumnSpec::new("a", ColType::Int, 4)],
            vec![],
        )
        .unwrap();

        let rm = db.table_handle("t").unwrap();
        let rid = rm.insert_record(&1i32.to_le_bytes()).unwrap();

        let txn = db.begin();
        let ctx = ExecContext::new(txn.clone(), db.lock_manager().clone());
        let exec = DeleteExecutor::new(
            rm.clone(),
            rm.fd(),
            "t",
            vec![crate::executor::ColSchema {
                name: "a".into(),
                col_type: ColType::Int,
                len: 4,
                offset: 0,
            }],
            vec![],
            vec![rid],
        );
        exec.execute(&ctx).unwrap();
        assert!(rm.get_record(rid).is_err());

        db.abort(&txn).unwrap();
        assert!(rm.get_record(rid).is_ok());
    }
}
