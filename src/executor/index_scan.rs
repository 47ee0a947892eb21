use super::{eval_all, CompOp, Condition, Context, Executor, Operand, Schema};
use crate::index::{leaf_begin, leaf_end, lower_bound, upper_bound, IndexHandle, KeyBound};
use crate::page::Fd;
use crate::record::{RmFileHandle, Rid};
use anyhow::Result;
use std::sync::Arc;

/// Index-assisted scan: narrows the candidate rid range using the leftmost
/// indexed column with a usable predicate, then re-evaluates every
/// predicate per tuple (spec.md §4.5 IndexScan).
pub struct IndexScanExecutor {
    rm: Arc<RmFileHandle>,
    schema: Schema,
    conds: Vec<Condition>,
    candidates: Vec<Rid>,
    pos: usize,
}

impl IndexScanExecutor {
    pub fn new(
        ctx: &Context,
        fd: Fd,
        rm: Arc<RmFileHandle>,
        schema: Schema,
        conds: Vec<Condition>,
        index: &dyn IndexHandle,
        index_cols: &[String],
    ) -> Result<Self> {
        ctx.lock_mgr.lock_shared_on_table(&ctx.txn, fd)?;

        let (lower, upper) = bounds_for(&conds, index_cols);
        let candidates = index.scan(lower, upper).into_iter().map(|(_, rid)| rid).collect();

        Ok(Self {
            rm,
            schema,
            conds,
            candidates,
            pos: 0,
        })
    }

    fn advance_to_match(&mut self) -> Result<()> {
        while self.pos < self.candidates.len() {
            let rid = self.candidates[self.pos];
            let record = self.rm.get_record(rid)?;
            if eval_all(&self.conds, &record.data, &self.schema) {
                return Ok(());
            }
            self.pos += 1;
        }
        Ok(())
    }
}

/// The leftmost indexed column with a usable (`op != NE`) predicate sets the
/// scan bounds; every other condition is still re-checked per tuple.
fn bounds_for(conds: &[Condition], index_cols: &[String]) -> (KeyBound, KeyBound) {
    for col in index_cols {
        for cond in conds {
            let Some(normalized) = cond.normalized_for(col) else {
                continue;
            };
            if normalized.op == CompOp::Ne {
                continue;
            }
            let Operand::Val(value) = &normalized.rhs else {
                continue;
            };
            let key = match value {
                super::Value::Int(v) => v.to_le_bytes().to_vec(),
                super::Value::Float(v) => v.to_le_bytes().to_vec(),
                super::Value::Str(s) => s.as_bytes().to_vec(),
            };
            // `lower_bound`/`upper_bound` are lower-oriented positions (first
            // key >= v / first key > v); placed in the upper slot of a
            // half-open range their polarity flips (since keys are unique,
            // "first key > v" as an upper limit is equivalent to "<= v").
            return match normalized.op {
                CompOp::Eq => (lower_bound(&key), KeyBound::Included(key.clone())),
                CompOp::Ge => (lower_bound(&key), leaf_end()),
                CompOp::Gt => (upper_bound(&key), leaf_end()),
                CompOp::Le => (leaf_begin(), KeyBound::Included(key.clone())),
                CompOp::Lt => (leaf_begin(), KeyBound::Excluded(key.clone())),
                CompOp::Ne => unreachable!(),
            };
        }
    }
    (leaf_begin(), leaf_end())
}

impl Executor for IndexScanExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        self.pos = 0;
        self.advance_to_match()
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.pos += 1;
        self.advance_to_match()
    }

    fn is_end(&self) -> bool {
        self.pos >= self.candidates.len()
    }

    fn current(&self) -> Result<Vec<u8>> {
        Ok(self.rm.get_record(self.candidates[self.pos])?.data)
    }

    fn cols(&self) -> &Schema {
        &self.schema
    }

    fn tuple_len(&self) -> usize {
        self.schema.iter().map(|c| c.len).sum()
    }
}
