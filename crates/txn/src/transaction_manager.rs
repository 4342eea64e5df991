//! Transaction lifecycle: begin/commit/abort, backed by the write-ahead
//! log and the lock manager.
//!
//! Grounded on `examples/original_source/src/transaction/transaction_manager.h`
//! for the shape (atomic txn id counter, a mutex-guarded active-txn
//! table, `Begin`/`Commit`/`Abort` delegating to the lock manager and
//! log manager) — rebuilt around this workspace's `Transaction` (owned
//! by its executing thread rather than behind a `unique_ptr` in a global
//! map) and `wal::Wal` rather than a bespoke `LogManager`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;

use common::{DbResult, RecordId, TableId, TxnId};
use wal::Wal;

use crate::lock_manager::LockManager;
use crate::transaction::{IsolationLevel, Transaction, TxnState, WriteRecord};

/// Applies the physical inverse of a logged write during `abort`.
/// Implemented by the kernel, which knows how to reach the right table
/// heap; kept as a trait here so this crate has no dependency on `heap`
/// or `catalog`.
pub trait UndoHandler: Send + Sync {
    fn undo_insert(&self, table: TableId, rid: RecordId) -> DbResult<()>;
    fn undo_delete(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()>;
    fn undo_update(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()>;
}

/// Owns the active-transaction table and the monotonic id counter.
/// `begin`/`commit`/`abort` are the only entry points the rest of the
/// kernel needs; locking is delegated to `LockManager`, durability to
/// `wal::Wal`.
pub struct TransactionManager {
    wal: Arc<Wal>,
    lock_manager: Arc<LockManager>,
    next_txn_id: AtomicU64,
    active: Mutex<HashSet<TxnId>>,
}

impl TransactionManager {
    pub fn new(wal: Arc<Wal>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            wal,
            lock_manager,
            next_txn_id: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Allocates a new txn id, logs BEGIN, and registers the transaction
    /// as active.
    pub fn begin(&self, isolation_level: IsolationLevel) -> DbResult<Transaction> {
        let txn_id = TxnId(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let begin_lsn = self.wal.append_begin(txn_id)?;
        self.active.lock().insert(txn_id);
        tracing::debug!(txn = txn_id.0, "transaction begun");
        Ok(Transaction::new(txn_id, isolation_level, begin_lsn))
    }

    /// Appends COMMIT, flushes the WAL up to that LSN (the durability
    /// boundary), releases every lock `txn` holds, and removes it from
    /// the active table.
    pub fn commit(&self, txn: &mut Transaction) -> DbResult<()> {
        let lsn = self.wal.append_commit(txn.id())?;
        txn.set_prev_lsn(lsn);
        self.lock_manager.unlock_all(txn)?;
        txn.set_state(TxnState::Committed);
        self.active.lock().remove(&txn.id());
        tracing::debug!(txn = txn.id().0, lsn = lsn.0, "transaction committed");
        Ok(())
    }

    /// Walks `txn`'s write set in reverse, undoing each entry through
    /// `undo`, then logs ABORT, releases locks, and retires the txn.
    pub fn abort(&self, txn: &mut Transaction, undo: &dyn UndoHandler) -> DbResult<()> {
        for (table, rid, record) in txn.drain_write_set_rev() {
            match record {
                WriteRecord::Insert => undo.undo_insert(table, rid)?,
                WriteRecord::Delete { before } => undo.undo_delete(table, rid, &before)?,
                WriteRecord::Update { before } => undo.undo_update(table, rid, &before)?,
            }
        }
        let lsn = self.wal.append_abort(txn.id())?;
        txn.set_prev_lsn(lsn);
        self.lock_manager.unlock_all(txn)?;
        txn.set_state(TxnState::Aborted);
        self.active.lock().remove(&txn.id());
        tracing::debug!(txn = txn.id().0, "transaction aborted");
        Ok(())
    }

    /// Snapshot of currently active txn ids, for `recovery`'s checkpoint
    /// record.
    pub fn active_txn_ids(&self) -> Vec<TxnId> {
        self.active.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingUndo {
        calls: StdMutex<Vec<String>>,
    }

    impl UndoHandler for RecordingUndo {
        fn undo_insert(&self, table: TableId, rid: RecordId) -> DbResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("undo_insert({},{:?})", table.0, rid));
            Ok(())
        }
        fn undo_delete(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
            self.calls.lock().unwrap().push(format!(
                "undo_delete({},{:?},{}b)",
                table.0,
                rid,
                before.len()
            ));
            Ok(())
        }
        fn undo_update(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
            self.calls.lock().unwrap().push(format!(
                "undo_update({},{:?},{}b)",
                table.0,
                rid,
                before.len()
            ));
            Ok(())
        }
    }

    fn harness() -> (TransactionManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());
        let lock_manager = Arc::new(LockManager::new(Duration::from_secs(1)));
        (TransactionManager::new(wal, lock_manager), dir)
    }

    #[test]
    fn begin_registers_an_active_txn() {
        let (tm, _dir) = harness();
        let txn = tm.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(tm.active_txn_ids(), vec![txn.id()]);
        assert_eq!(txn.state(), TxnState::Growing);
    }

    #[test]
    fn commit_releases_locks_and_retires_txn() {
        let (tm, _dir) = harness();
        let mut txn = tm.begin(IsolationLevel::ReadCommitted).unwrap();
        let rid = RecordId::new(common::PageId(0), 0);
        tm.lock_manager().lock_exclusive(&mut txn, rid).unwrap();
        tm.commit(&mut txn).unwrap();
        assert_eq!(txn.state(), TxnState::Committed);
        assert!(tm.active_txn_ids().is_empty());
        assert!(!txn.holds_exclusive(rid));
    }

    #[test]
    fn abort_undoes_write_set_in_reverse_order() {
        let (tm, _dir) = harness();
        let mut txn = tm.begin(IsolationLevel::ReadCommitted).unwrap();
        let table = TableId(1);
        txn.record_insert(table, RecordId::new(common::PageId(0), 0));
        txn.record_delete(table, RecordId::new(common::PageId(0), 1), vec![1, 2, 3]);

        let undo = RecordingUndo::default();
        tm.abort(&mut txn, &undo).unwrap();

        assert_eq!(txn.state(), TxnState::Aborted);
        let calls = undo.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("undo_delete"));
        assert!(calls[1].starts_with("undo_insert"));
    }

    #[test]
    fn abort_after_insert_then_delete_of_same_rid_only_undoes_the_insert() {
        let (tm, _dir) = harness();
        let mut txn = tm.begin(IsolationLevel::ReadCommitted).unwrap();
        let table = TableId(1);
        let rid = RecordId::new(common::PageId(0), 0);
        txn.record_insert(table, rid);
        txn.record_delete(table, rid, vec![1, 2, 3]);

        let undo = RecordingUndo::default();
        tm.abort(&mut txn, &undo).unwrap();

        let calls = undo.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("undo_insert"));
    }
}
