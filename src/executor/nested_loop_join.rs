use super::{ColSchema, Executor, Schema};
use anyhow::Result;

/// Cartesian-product join: left is outer. Column offsets of the right side
/// are shifted by `left.tuple_len()` (spec.md §4.5 NestedLoopJoin).
pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    schema: Schema,
}

fn joined_schema(left: &Schema, right: &Schema, left_len: usize) -> Schema {
    let mut schema = left.clone();
    schema.extend(right.iter().map(|c| ColSchema {
        name: c.name.clone(),
        col_type: c.col_type,
        len: c.len,
        offset: c.offset + left_len,
    }));
    schema
}

impl NestedLoopJoinExecutor {
    pub fn new(left: Box<dyn Executor>, right: Box<dyn Executor>) -> Self {
        let schema = joined_schema(left.cols(), right.cols(), left.tuple_len());
        Self { left, right, schema }
    }

    /// Skips past any left tuple whose right side is empty, so `is_end()`
    /// only reports true once the outer is truly exhausted.
    fn skip_empty_right(&mut self) -> Result<()> {
        while !self.left.is_end() && self.right.is_end() {
            self.left.next_tuple()?;
            if self.left.is_end() {
                return Ok(());
            }
            self.right.begin_tuple()?;
        }
        Ok(())
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.left.begin_tuple()?;
        if self.left.is_end() {
            return Ok(());
        }
        self.right.begin_tuple()?;
        self.skip_empty_right()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.right.next_tuple()?;
        self.skip_empty_right()
    }

    fn is_end(&self) -> bool {
        self.left.is_end()
    }

    fn current(&self) -> Result<Vec<u8>> {
        let mut row = self.left.current()?;
        row.extend(self.right.current()?);
        Ok(row)
    }

    fn cols(&self) -> &Schema {
        &self.schema
    }

    fn tuple_len(&self) -> usize {
        self.left.tuple_len() + self.right.tuple_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::catalog::ColType;
    use crate::disk::DiskManager;
    use crate::executor::SeqScanExecutor;
    use crate::record::RmFileHandle;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn table(values: &[i32]) -> (Arc<RmFileHandle>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskManager::new(dir.path()).unwrap();
        let fd = disk.open_file("t").unwrap();
        let bpm = Arc::new(Mutex::new(BufferPoolManager::new(10, disk)));
        let rm = Arc::new(RmFileHandle::create(bpm, fd, 4).unwrap());
        for v in values {
            rm.insert_record(&v.to_le_bytes()).unwrap();
        }
        (rm, dir)
    }

    fn schema() -> Schema {
        vec![ColSchema {
            name: "a".into(),
            col_type: ColType::Int,
            len: 4,
            offset: 0,
        }]
    }

    #[test]
    fn produces_full_cartesian_product() {
        let (l, _d1) = table(&[1, 2]);
        let (r, _d2) = table(&[10, 20, 30]);
        let left = Box::new(SeqScanExecutor::new(l, schema(), vec![]));
        let right = Box::new(SeqScanExecutor::new(r, schema(), vec![]));
        let mut join = NestedLoopJoinExecutor::new(left, right);
        join.begin_tuple().unwrap();
        let mut count = 0;
        while !join.is_end() {
            let row = join.current().unwrap();
            assert_eq!(row.len(), 8);
            count += 1;
            join.next_tuple().unwrap();
        }
        assert_eq!(count, 6);
    }

    #[test]
    fn empty_right_yields_nothing() {
        let (l, _d1) = table(&[1, 2]);
        let (r, _d2) = table(&[]);
        let left = Box::new(SeqScanExecutor::new(l, schema(), vec![]));
        let right = Box::new(SeqScanExecutor::new(r, schema(), vec![]));
        let mut join = NestedLoopJoinExecutor::new(left, right);
        join.begin_tuple().unwrap();
        assert!(join.is_end());
    }
}
