//! Table/column/index metadata and its persistence to `db.meta` (spec.md §3
//! "Column/Table/Index meta", §6 "Persisted files").

use crate::index::MemIndex;
use crate::record::RmFileHandle;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColType {
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub tab_name: String,
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
    pub offset: usize,
    pub has_index: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub tab_name: String,
    pub cols: Vec<String>,
    pub col_tot_len: usize,
    pub col_num: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub cols: Vec<ColumnMeta>,
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    pub fn record_size(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    pub fn col(&self, name: &str) -> Option<&ColumnMeta> {
        self.cols.iter().find(|c| c.name == name)
    }

    pub fn index_on(&self, cols: &[String]) -> Option<&IndexMeta> {
        self.indexes.iter().find(|ix| ix.cols == cols)
    }
}

/// Runtime handle bundle for one table: its metadata plus the live heap-file
/// and index handles backing it.
pub struct TableEntry {
    pub meta: TableMeta,
    pub rm: Arc<RmFileHandle>,
    pub indexes: HashMap<String, Arc<MemIndex>>,
}

#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, TableEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, meta: TableMeta, rm: Arc<RmFileHandle>) {
        self.tables.insert(
            meta.name.clone(),
            TableEntry {
                meta,
                rm,
                indexes: HashMap::new(),
            },
        );
    }

    pub fn register_index(&mut self, tab_name: &str, index_name: &str, index: Arc<MemIndex>) {
        if let Some(entry) = self.tables.get_mut(tab_name) {
            entry.indexes.insert(index_name.to_string(), index);
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableEntry> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn table_metas(&self) -> Vec<TableMeta> {
        self.tables.values().map(|e| e.meta.clone()).collect()
    }

    pub fn flush_meta(&self, path: impl AsRef<Path>) -> Result<()> {
        let metas = self.table_metas();
        let bytes = bincode::serialize(&metas).context("serializing catalog")?;
        std::fs::write(path, bytes).context("writing db.meta")?;
        Ok(())
    }

    pub fn load_metas(path: impl AsRef<Path>) -> Result<Vec<TableMeta>> {
        let bytes = std::fs::read(path).context("reading db.meta")?;
        let metas = bincode::deserialize(&bytes).context("deserializing catalog")?;
        Ok(metas)
    }
}
