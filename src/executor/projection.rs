use super::{ColSchema, Executor, Schema};
use anyhow::{Context, Result};

/// Stateless re-layout of the child's output onto the selected columns,
/// packed from offset 0 (spec.md §4.5 Projection).
pub struct ProjectionExecutor {
    child: Box<dyn Executor>,
    schema: Schema,
    source: Vec<ColSchema>,
}

impl ProjectionExecutor {
    pub fn new(child: Box<dyn Executor>, selected: &[String]) -> Result<Self> {
        let mut schema = Vec::with_capacity(selected.len());
        let mut source = Vec::with_capacity(selected.len());
        let mut offset = 0;
        for name in selected {
            let col = child
                .cols()
                .iter()
                .find(|c| &c.name == name)
                .with_context(|| format!("unknown column {name}"))?
                .clone();
            schema.push(ColSchema {
                name: col.name.clone(),
                col_type: col.col_type,
                len: col.len,
                offset,
            });
            offset += col.len;
            source.push(col);
        }
        Ok(Self { child, schema, source })
    }
}

impl Executor for ProjectionExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.child.begin_tuple()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.child.next_tuple()
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn current(&self) -> Result<Vec<u8>> {
        let input = self.child.current()?;
        let mut out = vec![0u8; self.tuple_len()];
        for (src, dst) in self.source.iter().zip(self.schema.iter()) {
            out[dst.offset..dst.offset + dst.len]
                .copy_from_slice(&input[src.offset..src.offset + src.len]);
        }
        Ok(out)
    }

    fn cols(&self) -> &Schema {
        &self.schema
    }

    fn tuple_len(&self) -> usize {
        self.schema.iter().map(|c| c.len).sum()
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

    #[test]
    fn reorders_and_repacks_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskManager::new(dir.path()).unwrap();
        let fd = disk.open_file("t").unwrap();
        let bpm = Arc::new(Mutex::new(BufferPoolManager::new(10, disk)));
        let rm = Arc::new(RmFileHandle::create(bpm, fd, 8).unwrap());
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&1i32.to_le_bytes());
        buf[4..8].copy_from_slice(&2i32.to_le_bytes());
        rm.insert_record(&buf).unwrap();

        let schema = vec![
            ColSchema { name: "a".into(), col_type: ColType::Int, len: 4, offset: 0 },
            ColSchema { name: "b".into(), col_type: ColType::Int, len: 4, offset: 4 },
        ];
        let scan = Box::new(SeqScanExecutor::new(rm, schema, vec![]));
        let mut proj = ProjectionExecutor::new(scan, &["b".to_string(), "a".to_string()]).unwrap();
        proj.begin_tuple().unwrap();
        let row = proj.current().unwrap();
        assert_eq!(i32::from_le_bytes(row[0..4].try_into().unwrap()), 2);
        assert_eq!(i32::from_le_bytes(row[4..8].try_into().unwrap()), 1);
    }
}
