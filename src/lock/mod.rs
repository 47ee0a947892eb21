//! Multi-granularity lock manager: strict 2PL with no-wait deadlock
//! prevention (spec.md §4.3), grounded 1:1 on
//! `original_source/src/transaction/concurrency/lock_manager.cpp`.

use crate::error::{AbortReason, Error};
use crate::page::Fd;
use crate::record::Rid;
use crate::transaction::{Transaction, TransactionState};
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IS,
    IX,
    S,
    SIX,
    X,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDataType {
    Table,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockDataId {
    pub fd: Fd,
    pub rid: Option<Rid>,
    pub data_type: LockDataType,
}

impl LockDataId {
    pub fn table(fd: Fd) -> Self {
        Self {
            fd,
            rid: None,
            data_type: LockDataType::Table,
        }
    }

    pub fn record(fd: Fd, rid: Rid) -> Self {
        Self {
            fd,
            rid: Some(rid),
            data_type: LockDataType::Record,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: u64,
    lock_mode: LockMode,
}

#[derive(Default)]
struct LockRequestQueue {
    requests: Vec<LockRequest>,
    group_mode: Option<LockMode>,
    condvar: Condvar,
}

impl LockRequestQueue {
    fn recompute_group_mode(&mut self) {
        self.group_mode = self
            .requests
            .iter()
            .fold(None, |acc, req| lub(acc, Some(req.lock_mode)));
    }

    fn find(&self, txn_id: u64) -> Option<usize> {
        self.requests.iter().position(|r| r.txn_id == txn_id)
    }
}

/// `a` already satisfies `b` without any upgrade needed.
fn satisfies(have: LockMode, want: LockMode) -> bool {
    use LockMode::*;
    match (have, want) {
        (a, b) if a == b => true,
        (X, _) => true,
        (SIX, IS | IX | S) => true,
        (S, IS) => true,
        (IX, IS) => true,
        _ => false,
    }
}

/// Least upper bound of two (optional, `None` = NON_LOCK) modes under the
/// standard multiple-granularity compatibility lattice.
fn lub(a: Option<LockMode>, b: Option<LockMode>) -> Option<LockMode> {
    use LockMode::*;
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(x), Some(y)) if x == y => Some(x),
        (Some(a), Some(b)) => {
            let pair = {
                let mut p = [a, b];
                p.sort_by_key(rank);
                p
            };
            Some(match pair {
                [IS, IS] => IS,
                [IS, IX] | [IX, IS] => IX,
                [IS, S] | [S, IS] => S,
                [IS, SIX] | [SIX, IS] => SIX,
                [IS, X] | [X, IS] => X,
                [IX, IX] => IX,
                [IX, S] | [S, IX] => SIX,
                [IX, SIX] | [SIX, IX] => SIX,
                [IX, X] | [X, IX] => X,
                [S, S] => S,
                [S, SIX] | [SIX, S] => SIX,
                [S, X] | [X, S] => X,
                [SIX, SIX] => SIX,
                [SIX, X] | [X, SIX] => X,
                [X, X] => X,
            })
        }
    }
}

fn rank(m: &LockMode) -> u8 {
    match m {
        LockMode::IS => 0,
        LockMode::IX => 1,
        LockMode::S => 2,
        LockMode::SIX => 3,
        LockMode::X => 4,
    }
}

/// Conflict matrix for brand-new (non-upgrade) requests: `true` if
/// `requested` is denied given the queue's current `group_mode`.
fn conflicts(requested: LockMode, group_mode: Option<LockMode>) -> bool {
    use LockMode::*;
    let Some(group_mode) = group_mode else {
        return false;
    };
    match requested {
        IS => matches!(group_mode, X),
        IX => matches!(group_mode, S | SIX | X),
        S => matches!(group_mode, IX | SIX | X),
        SIX => matches!(group_mode, IX | S | SIX | X),
        X => true,
    }
}

pub struct LockManager {
    table: Mutex<HashMap<LockDataId, LockRequestQueue>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_is_on_table(&self, txn: &Transaction, fd: Fd) -> Result<bool> {
        self.request(txn, LockDataId::table(fd), LockMode::IS)
    }

    pub fn lock_ix_on_table(&self, txn: &Transaction, fd: Fd) -> Result<bool> {
        self.request(txn, LockDataId::table(fd), LockMode::IX)
    }

    pub fn lock_shared_on_table(&self, txn: &Transaction, fd: Fd) -> Result<bool> {
        self.request(txn, LockDataId::table(fd), LockMode::S)
    }

    pub fn lock_exclusive_on_table(&self, txn: &Transaction, fd: Fd) -> Result<bool> {
        self.request(txn, LockDataId::table(fd), LockMode::X)
    }

    pub fn lock_shared_on_record(&self, txn: &Transaction, fd: Fd, rid: Rid) -> Result<bool> {
        self.request(txn, LockDataId::record(fd, rid), LockMode::S)
    }

    pub fn lock_exclusive_on_record(&self, txn: &Transaction, fd: Fd, rid: Rid) -> Result<bool> {
        self.request(txn, LockDataId::record(fd, rid), LockMode::X)
    }

    fn request(&self, txn: &Transaction, id: LockDataId, mode: LockMode) -> Result<bool> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => return Ok(false),
            TransactionState::Shrinking => {
                return Err(Error::TransactionAbort(AbortReason::LockOnShrinking).into())
            }
            TransactionState::Default => txn.set_state(TransactionState::Growing),
            TransactionState::Growing => {}
        }

        let mut table = self.table.lock();
        let queue = table.entry(id).or_default();

        if let Some(idx) = queue.find(txn.txn_id) {
            let have = queue.requests[idx].lock_mode;
            if satisfies(have, mode) {
                return Ok(true);
            }

            use LockMode::*;
            let outcome = match (have, mode) {
                (IS, S) if matches!(queue.group_mode, Some(IS) | Some(S)) => Some(true),
                (IS, IX) if matches!(queue.group_mode, Some(IS) | Some(IX)) => Some(true),
                (IX, S) => Some(true),
                (S, X) if queue.requests.len() == 1 => Some(true),
                (S, X) => Some(false),
                (S, IX) if queue.requests.len() == 1 => Some(true),
                (S, IX) => Some(false),
                _ => None,
            };

            match outcome {
                Some(true) => {
                    let new_mode = match (have, mode) {
                        (IX, S) => SIX,
                        (S, X) => X,
                        (S, IX) => SIX,
                        (_, m) => m,
                    };
                    queue.requests[idx].lock_mode = new_mode;
                    queue.recompute_group_mode();
                    txn.add_lock(id);
                    log::debug!("txn {}: upgraded {:?} on {:?} to {:?}", txn.txn_id, have, id, new_mode);
                    return Ok(true);
                }
                Some(false) => return Ok(false),
                None => {} // fall through to the new-request admission path
            }
        }

        if conflicts(mode, queue.group_mode) {
            log::warn!(
                "txn {}: lock {:?} on {:?} denied (group_mode={:?})",
                txn.txn_id,
                mode,
                id,
                queue.group_mode
            );
            return Err(Error::TransactionAbort(AbortReason::DeadlockPrevention).into());
        }

        if let Some(idx) = queue.find(txn.txn_id) {
            queue.requests[idx].lock_mode = mode;
        } else {
            queue.requests.push(LockRequest {
                txn_id: txn.txn_id,
                lock_mode: mode,
            });
        }
        queue.recompute_group_mode();
        txn.add_lock(id);
        log::debug!("txn {}: granted {:?} on {:?}", txn.txn_id, mode, id);
        Ok(true)
    }

    pub fn unlock(&self, txn: &Transaction, id: LockDataId) -> Result<bool> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => return Ok(false),
            TransactionState::Default => {
                return Err(Error::TransactionAbort(AbortReason::LockOnShrinking).into())
            }
            TransactionState::Growing => txn.set_state(TransactionState::Shrinking),
            TransactionState::Shrinking => {}
        }

        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(&id) else {
            return Ok(true);
        };

        if let Some(idx) = queue.find(txn.txn_id) {
            queue.requests.remove(idx);
            queue.recompute_group_mode();
        }
        queue.condvar.notify_all();
        txn.remove_lock(&id);
        Ok(true)
    }
}
