//! Transaction lifecycle, write-set logging, and undo-based abort (spec.md
//! §4.4), grounded on the teacher's `txn_manager/mod.rs` begin/commit/abort
//! shape and `original_source/src/transaction/transaction_manager.cpp` for
//! exact undo-replay semantics.

use crate::error::{AbortReason, Error};
use crate::lock::{LockDataId, LockManager};
use crate::record::{Record, RmFileHandle, Rid};
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type TxnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Default,
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WType {
    InsertTuple,
    DeleteTuple,
    UpdateTuple,
}

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub wtype: WType,
    pub tab_name: String,
    pub rid: Rid,
    pub before_image: Record,
}

impl WriteRecord {
    pub fn new(wtype: WType, tab_name: impl Into<String>, rid: Rid, before_image: Record) -> Self {
        Self {
            wtype,
            tab_name: tab_name.into(),
            rid,
            before_image,
        }
    }
}

/// One in-flight unit of work. Shared between the executors driving it and
/// the lock manager, so every field needing mutation from either side is
/// behind its own lock (matching the teacher's `parking_lot`-everywhere
/// style).
pub struct Transaction {
    pub txn_id: TxnId,
    state: Mutex<TransactionState>,
    write_set: Mutex<Vec<WriteRecord>>,
    lock_set: Mutex<HashSet<LockDataId>>,
}

impl Transaction {
    fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            state: Mutex::new(TransactionState::Default),
            write_set: Mutex::new(Vec::new()),
            lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn append_write_record(&self, record: WriteRecord) {
        self.write_set.lock().push(record);
    }

    pub fn add_lock(&self, id: LockDataId) {
        self.lock_set.lock().insert(id);
    }

    pub fn remove_lock(&self, id: &LockDataId) {
        self.lock_set.lock().remove(id);
    }

    pub fn lock_set(&self) -> Vec<LockDataId> {
        self.lock_set.lock().iter().copied().collect()
    }

    pub fn lock_set_is_empty(&self) -> bool {
        self.lock_set.lock().is_empty()
    }

    fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_set.lock())
    }

    fn clear_lock_set(&self) {
        self.lock_set.lock().clear();
    }
}

/// Resolves a table name to its heap-file handle, supplied by the database
/// layer so the transaction manager does not need to own the catalog.
pub trait TableResolver {
    fn resolve(&self, tab_name: &str) -> Result<Arc<RmFileHandle>>;
}

pub struct TransactionManager {
    lock_mgr: Arc<LockManager>,
    next_txn_id: AtomicU64,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_mgr: Arc<LockManager>) -> Self {
        Self {
            lock_mgr,
            next_txn_id: AtomicU64::new(1),
            txn_map: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_mgr
    }

    /// Assigns a new monotonically increasing `txn_id` and registers the
    /// transaction in the process-wide map.
    pub fn begin(&self) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id));
        self.txn_map.lock().insert(txn_id, txn.clone());
        log::debug!("txn {txn_id}: begin");
        txn
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().get(&txn_id).cloned()
    }

    /// Releases every lock in the lock-set and clears transaction-owned
    /// state, marking it `COMMITTED`.
    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        for id in txn.lock_set() {
            self.lock_mgr.unlock(txn, id)?;
        }
        txn.take_write_set();
        txn.clear_lock_set();
        txn.set_state(TransactionState::Committed);
        log::debug!("txn {}: commit", txn.txn_id);
        Ok(())
    }

    /// Replays the write-set in reverse order against the tables named in
    /// each `WriteRecord`, undoing each mutation logically, then releases
    /// every lock and marks the transaction `ABORTED`.
    pub fn abort(&self, txn: &Transaction, resolver: &dyn TableResolver) -> Result<()> {
        let write_set = txn.take_write_set();
        for record in write_set.into_iter().rev() {
            let rm = resolver.resolve(&record.tab_name)?;
            match record.wtype {
                WType::InsertTuple => {
                    rm.delete_record(record.rid)?;
                }
                WType::DeleteTuple => {
                    rm.insert_record_at(record.rid, &record.before_image.data)?;
                }
                WType::UpdateTuple => {
                    rm.update_record(record.rid, &record.before_image.data)?;
                }
            }
        }

        for id in txn.lock_set() {
            self.lock_mgr.unlock(txn, id)?;
        }
        txn.clear_lock_set();
        txn.set_state(TransactionState::Aborted);
        log::warn!("txn {}: aborted", txn.txn_id);
        Ok(())
    }
}

/// Forces an abort for a transaction the lock manager denied or that
/// violated 2PL; callers surface this as the structured error kind.
pub fn abort_error(reason: AbortReason) -> anyhow::Error {
    Error::TransactionAbort(reason).into()
}
