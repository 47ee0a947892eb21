use super::{eval_all, Condition, Executor, Schema};
use crate::record::{RmFileHandle, RmScan, Rid};
use anyhow::Result;
use std::sync::Arc;

/// Full heap-file scan, stopping at each tuple satisfying the predicate
/// conjunction (spec.md §4.5 SeqScan).
pub struct SeqScanExecutor {
    rm: Arc<RmFileHandle>,
    schema: Schema,
    conds: Vec<Condition>,
    scan: Option<RmScan>,
    rid: Rid,
}

impl SeqScanExecutor {
    pub fn new(rm: Arc<RmFileHandle>, schema: Schema, conds: Vec<Condition>) -> Self {
        Self {
            rm,
            schema,
            conds,
            scan: None,
            rid: Rid::new(-1, -1),
        }
    }

    fn advance_to_match(&mut self, mut scan: RmScan) -> Result<()> {
        loop {
            if scan.is_end() {
                self.rid = scan.rid();
                self.scan = Some(scan);
                return Ok(());
            }
            let rid = scan.rid();
            let record = self.rm.get_record(rid)?;
            if eval_all(&self.conds, &record.data, &self.schema) {
                self.rid = rid;
                self.scan = Some(scan);
                return Ok(());
            }
            scan.next()?;
        }
    }
}

impl Executor for SeqScanExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        let scan = self.rm.scan()?;
        self.advance_to_match(scan)
    }

    fn next_tuple(&mut self) -> Result<()> {
        let mut scan = self.scan.take().expect("begin_tuple must be called first");
        scan.next()?;
        self.advance_to_match(scan)
    }

    fn is_end(&self) -> bool {
        !self.rid.is_valid()
    }

    fn current(&self) -> Result<Vec<u8>> {
        Ok(self.rm.get_record(self.rid)?.data)
    }

    fn cols(&self) -> &Schema {
        &self.schema
    }

    fn tuple_len(&self) -> usize {
        self.schema.iter().map(|c| c.len).sum()
    }
}
