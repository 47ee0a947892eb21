use super::{build_index_key, Context, Schema};
use crate::index::IndexHandle;
use crate::page::Fd;
use crate::record::{RmFileHandle, Rid};
use crate::transaction::{WType, WriteRecord};
use anyhow::Result;
use std::sync::Arc;

/// Deletes a fixed list of rids, maintaining every secondary index and
/// logging an undo record per row (spec.md §4.5 Delete).
pub struct DeleteExecutor {
    rm: Arc<RmFileHandle>,
    fd: Fd,
    tab_name: String,
    schema: Schema,
    indexes: Vec<(Vec<String>, Arc<dyn IndexHandle>)>,
    rids: Vec<Rid>,
}

impl DeleteExecutor {
    pub fn new(
        rm: Arc<RmFileHandle>,
        fd: Fd,
        tab_name: impl Into<String>,
        schema: Schema,
        indexes: Vec<(Vec<String>, Arc<dyn IndexHandle>)>,
        rids: Vec<Rid>,
    ) -> Self {
        Self {
            rm,
            fd,
            tab_name: tab_name.into(),
            schema,
            indexes,
            rids,
        }
    }

    pub fn execute(&self, ctx: &Context) -> Result<usize> {
        let mut count = 0;
        for &rid in &self.rids {
            ctx.lock_mgr.lock_exclusive_on_record(&ctx.txn, self.fd, rid)?;

            let before = self.rm.get_record(rid)?;
            for (index_cols, index) in &self.indexes {
                let key = build_index_key(&before.data, &self.schema, index_cols);
                index.delete_entry(&key)?;
            }

            ctx.txn.append_write_record(WriteRecord::new(
                WType::DeleteTuple,
                self.tab_name.clone(),
                rid,
                before,
            ));
            self.rm.delete_record(rid)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::catalog::ColType;
    use crate::disk::DiskManager;
    use crate::executor::ColSchema;
    use crate::index::MemIndex;
    use crate::lock::LockManager;
    use crate::transaction::TransactionManager;
    use parking_lot::Mutex;

    #[test]
    fn deletes_and_removes_index_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskManager::new(dir.path()).unwrap();
        let fd = disk.open_file("t").unwrap();
        let bpm = Arc::new(Mutex::new(BufferPoolManager::new(10, disk)));
        let rm = Arc::new(RmFileHandle::create(bpm, fd, 4).unwrap());
        let index = Arc::new(MemIndex::new());
        let mut rids = vec![];
        for v in [1i32, 2, 3] {
            let rid = rm.insert_record(&v.to_le_bytes()).unwrap();
            index.insert_entry(&v.to_le_bytes(), rid).unwrap();
            rids.push((v, rid));
        }

        let schema: Schema = vec![ColSchema {
            name: "a".into(),
            col_type: ColType::Int,
            len: 4,
            offset: 0,
        }];
        let target = rids[1].1;
        let exec = DeleteExecutor::new(
            rm.clone(),
            fd,
            "t",
            schema,
            vec![(vec!["a".to_string()], index.clone() as Arc<dyn IndexHandle>)],
            vec![target],
        );

        let lm = Arc::new(LockManager::new());
        let tm = TransactionManager::new(lm.clone());
        let txn = tm.begin();
        let ctx = Context::new(txn, lm);

        let deleted = exec.execute(&ctx).unwrap();
        assert_eq!(deleted, 1);
        assert!(rm.get_record(target).is_err());
        assert!(index
            .scan(crate::index::leaf_begin(), crate::index::leaf_end())
            .iter()
            .all(|(_, rid)| *rid != target));
    }
}
