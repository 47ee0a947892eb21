use super::{build_index_key, write_value, Context, Schema, SetClause};
use crate::index::IndexHandle;
use crate::page::Fd;
use crate::record::{RmFileHandle, Rid};
use crate::transaction::{WType, WriteRecord};
use anyhow::Result;
use std::sync::Arc;

/// Applies a fixed set of column assignments to a fixed list of rids,
/// maintaining every secondary index and logging an undo record per row
/// (spec.md §4.5 Update).
pub struct UpdateExecutor {
    rm: Arc<RmFileHandle>,
    fd: Fd,
    tab_name: String,
    schema: Schema,
    indexes: Vec<(Vec<String>, Arc<dyn IndexHandle>)>,
    rids: Vec<Rid>,
    sets: Vec<SetClause>,
}

impl UpdateExecutor {
    pub fn new(
        rm: Arc<RmFileHandle>,
        fd: Fd,
        tab_name: impl Into<String>,
        schema: Schema,
        indexes: Vec<(Vec<String>, Arc<dyn IndexHandle>)>,
        rids: Vec<Rid>,
        sets: Vec<SetClause>,
    ) -> Self {
        Self {
            rm,
            fd,
            tab_name: tab_name.into(),
            schema,
            indexes,
            rids,
            sets,
        }
    }

    pub fn execute(&self, ctx: &Context) -> Result<usize> {
        let mut count = 0;
        for &rid in &self.rids {
            ctx.lock_mgr.lock_exclusive_on_record(&ctx.txn, self.fd, rid)?;

            let before = self.rm.get_record(rid)?;
            for (index_cols, index) in &self.indexes {
                let old_key = build_index_key(&before.data, &self.schema, index_cols);
                index.delete_entry(&old_key)?;
            }

            ctx.txn.append_write_record(WriteRecord::new(
                WType::UpdateTuple,
                self.tab_name.clone(),
                rid,
                before.clone(),
            ));

            let mut new_data = before.data.clone();
            for set in &self.sets {
                if let Some(col) = self.schema.iter().find(|c| c.name == set.col) {
                    write_value(&mut new_data, col, &set.value);
                }
            }
            self.rm.update_record(rid, &new_data)?;

            for (index_cols, index) in &self.indexes {
                let new_key = build_index_key(&new_data, &self.schema, index_cols);
                index.insert_entry(&new_key, rid)?;
            }
            count += 1;
        }
        Ok(count)
    }
}
