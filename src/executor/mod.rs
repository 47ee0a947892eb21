//! Volcano-style pull executors (spec.md §4.5), grounded on
//! `original_source/src/execution/executor_*.h`.

pub mod delete;
pub mod index_scan;
pub mod nested_loop_join;
pub mod projection;
pub mod seq_scan;
pub mod update;

pub use delete::DeleteExecutor;
pub use index_scan::IndexScanExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

use crate::catalog::ColType;
use crate::lock::LockManager;
use crate::transaction::Transaction;
use anyhow::Result;
use std::sync::Arc;

/// One output column's type, width and byte offset within a tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct ColSchema {
    pub name: String,
    pub col_type: ColType,
    pub len: usize,
    pub offset: usize,
}

pub type Schema = Vec<ColSchema>;

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
}

pub fn read_value(data: &[u8], col: &ColSchema) -> Value {
    let slice = &data[col.offset..col.offset + col.len];
    match col.col_type {
        ColType::Int => Value::Int(i32::from_le_bytes(slice[0..4].try_into().unwrap())),
        ColType::Float => Value::Float(f64::from_le_bytes(slice[0..8].try_into().unwrap())),
        ColType::String => {
            let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
            Value::Str(String::from_utf8_lossy(&slice[..end]).into_owned())
        }
    }
}

pub fn write_value(buf: &mut [u8], col: &ColSchema, value: &Value) {
    let slice = &mut buf[col.offset..col.offset + col.len];
    slice.fill(0);
    match value {
        Value::Int(v) => slice[0..4].copy_from_slice(&v.to_le_bytes()),
        Value::Float(v) => slice[0..8].copy_from_slice(&v.to_le_bytes()),
        Value::Str(s) => {
            let bytes = s.as_bytes();
            let n = bytes.len().min(slice.len());
            slice[..n].copy_from_slice(&bytes[..n]);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompOp {
    /// The operator that holds when both sides of the comparison are
    /// swapped (spec.md §4.5 IndexScan normalization: "EQ<->EQ, NE<->NE,
    /// LT<->GT, LE<->GE").
    pub fn swapped(self) -> CompOp {
        match self {
            CompOp::Eq => CompOp::Eq,
            CompOp::Ne => CompOp::Ne,
            CompOp::Lt => CompOp::Gt,
            CompOp::Gt => CompOp::Lt,
            CompOp::Le => CompOp::Ge,
            CompOp::Ge => CompOp::Le,
        }
    }

    pub fn eval(self, lhs: &Value, rhs: &Value) -> bool {
        let ord = lhs.partial_cmp(rhs);
        match (self, ord) {
            (CompOp::Eq, Some(std::cmp::Ordering::Equal)) => true,
            (CompOp::Ne, Some(o)) => o != std::cmp::Ordering::Equal,
            (CompOp::Lt, Some(std::cmp::Ordering::Less)) => true,
            (CompOp::Gt, Some(std::cmp::Ordering::Greater)) => true,
            (CompOp::Le, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)) => true,
            (CompOp::Ge, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    Col(String),
    Val(Value),
}

/// A single predicate term. `lhs` is always a column reference; `rhs` may be
/// a literal or another column, matching the forms an executor's predicate
/// conjunction is built from.
#[derive(Debug, Clone)]
pub struct Condition {
    pub lhs_col: String,
    pub op: CompOp,
    pub rhs: Operand,
}

impl Condition {
    pub fn new(lhs_col: impl Into<String>, op: CompOp, rhs: Operand) -> Self {
        Self {
            lhs_col: lhs_col.into(),
            op,
            rhs,
        }
    }

    /// Normalizes so the indexed column named `col` sits on the left,
    /// swapping the operator when it doesn't already (spec.md §4.5).
    pub fn normalized_for(&self, col: &str) -> Option<Condition> {
        if self.lhs_col == col {
            return Some(self.clone());
        }
        if let Operand::Col(rhs_col) = &self.rhs {
            if rhs_col == col {
                return Some(Condition::new(
                    col,
                    self.op.swapped(),
                    Operand::Col(self.lhs_col.clone()),
                ));
            }
        }
        None
    }

    pub fn eval(&self, tuple: &[u8], schema: &Schema) -> bool {
        let Some(lhs_schema) = schema.iter().find(|c| c.name == self.lhs_col) else {
            return false;
        };
        let lhs = read_value(tuple, lhs_schema);
        let rhs = match &self.rhs {
            Operand::Val(v) => v.clone(),
            Operand::Col(name) => {
                let Some(rhs_schema) = schema.iter().find(|c| c.name == *name) else {
                    return false;
                };
                read_value(tuple, rhs_schema)
            }
        };
        self.op.eval(&lhs, &rhs)
    }
}

pub fn eval_all(conds: &[Condition], tuple: &[u8], schema: &Schema) -> bool {
    conds.iter().all(|c| c.eval(tuple, schema))
}

#[derive(Debug, Clone)]
pub struct SetClause {
    pub col: String,
    pub value: Value,
}

/// Carries the active transaction and lock manager through an executor
/// tree, the way the teacher's `Transaction`/lock-manager pair is threaded
/// through `table/mod.rs` operations.
pub struct Context {
    pub txn: Arc<Transaction>,
    pub lock_mgr: Arc<LockManager>,
}

impl Context {
    pub fn new(txn: Arc<Transaction>, lock_mgr: Arc<LockManager>) -> Self {
        Self { txn, lock_mgr }
    }
}

/// Uniform pull-based operator interface (spec.md §4.5).
pub trait Executor {
    fn begin_tuple(&mut self) -> Result<()>;
    fn next_tuple(&mut self) -> Result<()>;
    fn is_end(&self) -> bool;
    fn current(&self) -> Result<Vec<u8>>;
    fn cols(&self) -> &Schema;
    fn tuple_len(&self) -> usize;
}

/// Builds the packed composite index key for `index_cols`, gathering each
/// named column's byte slice from `tuple` in declaration order (spec.md
/// §4.5 Delete/Update, and the Open Question mandating the packed key).
pub fn build_index_key(tuple: &[u8], schema: &Schema, index_cols: &[String]) -> Vec<u8> {
    let mut key = Vec::new();
    for name in index_cols {
        if let Some(col) = schema.iter().find(|c| &c.name == name) {
            key.extend_from_slice(&tuple[col.offset..col.offset + col.len]);
        }
    }
    key
}
