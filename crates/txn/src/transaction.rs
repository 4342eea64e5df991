use hashbrown::HashSet;

use common::{Lsn, RecordId, TableId, TxnId};

/// Transaction isolation level. The lock manager's shared/exclusive
/// protocol is the same regardless of level; the level only governs how
/// long read locks are expected to be held by a caller above this crate
/// (read-committed callers may release shared locks early).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Two-phase locking phase plus the two terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// One entry in a transaction's write set: enough to undo the operation
/// from its before-image alone (insert has none; delete/update restore
/// the bytes they overwrote).
#[derive(Clone, Debug)]
pub enum WriteRecord {
    Insert,
    Delete { before: Vec<u8> },
    Update { before: Vec<u8> },
}

/// A single transaction's locking and undo state. Owned by whichever
/// thread is executing it; the lock manager mutates the lock sets and
/// state transitions through `&mut Transaction`, per the one-writer-
/// thread-plus-lock-manager ownership rule.
#[derive(Debug)]
pub struct Transaction {
    txn_id: TxnId,
    isolation_level: IsolationLevel,
    state: TxnState,
    prev_lsn: Lsn,
    shared_lock_set: HashSet<RecordId>,
    exclusive_lock_set: HashSet<RecordId>,
    write_set: Vec<(TableId, RecordId, WriteRecord)>,
    written_rids: HashSet<RecordId>,
}

impl Transaction {
    pub(crate) fn new(txn_id: TxnId, isolation_level: IsolationLevel, begin_lsn: Lsn) -> Self {
        Self {
            txn_id,
            isolation_level,
            state: TxnState::Growing,
            prev_lsn: begin_lsn,
            shared_lock_set: HashSet::new(),
            exclusive_lock_set: HashSet::new(),
            write_set: Vec::new(),
            written_rids: HashSet::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.txn_id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn
    }

    pub(crate) fn set_prev_lsn(&mut self, lsn: Lsn) {
        self.prev_lsn = lsn;
    }

    pub(crate) fn set_state(&mut self, state: TxnState) {
        self.state = state;
    }

    pub fn holds_shared(&self, rid: RecordId) -> bool {
        self.shared_lock_set.contains(&rid)
    }

    pub fn holds_exclusive(&self, rid: RecordId) -> bool {
        self.exclusive_lock_set.contains(&rid)
    }

    pub(crate) fn grant_shared(&mut self, rid: RecordId) {
        self.shared_lock_set.insert(rid);
    }

    pub(crate) fn grant_exclusive(&mut self, rid: RecordId) {
        self.shared_lock_set.remove(&rid);
        self.exclusive_lock_set.insert(rid);
    }

    pub(crate) fn forget_lock(&mut self, rid: RecordId) {
        self.shared_lock_set.remove(&rid);
        self.exclusive_lock_set.remove(&rid);
    }

    pub(crate) fn held_rids(&self) -> Vec<RecordId> {
        self.shared_lock_set
            .iter()
            .chain(self.exclusive_lock_set.iter())
            .copied()
            .collect()
    }

    /// Record a write for later undo. Called by the kernel immediately
    /// after a heap mutation succeeds, before the caller's lock is
    /// released. Only the first write against a given RID is kept: abort
    /// must undo back to the row's state when this transaction started,
    /// so later writes against an already-recorded RID are no-ops here
    /// (e.g. insert then delete of the same RID must undo as nothing
    /// happened, not as "delete the insert, then un-delete a phantom").
    pub fn record_insert(&mut self, table: TableId, rid: RecordId) {
        if self.written_rids.insert(rid) {
            self.write_set.push((table, rid, WriteRecord::Insert));
        }
    }

    pub fn record_delete(&mut self, table: TableId, rid: RecordId, before: Vec<u8>) {
        if self.written_rids.insert(rid) {
            self.write_set.push((table, rid, WriteRecord::Delete { before }));
        }
    }

    pub fn record_update(&mut self, table: TableId, rid: RecordId, before: Vec<u8>) {
        if self.written_rids.insert(rid) {
            self.write_set.push((table, rid, WriteRecord::Update { before }));
        }
    }

    /// Drains the write set in reverse (most recent write first), the
    /// order `abort` must undo in.
    pub(crate) fn drain_write_set_rev(&mut self) -> Vec<(TableId, RecordId, WriteRecord)> {
        let mut entries = std::mem::take(&mut self.write_set);
        entries.reverse();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageId;

    #[test]
    fn write_set_keeps_only_the_first_record_per_rid() {
        let mut txn = Transaction::new(TxnId(1), IsolationLevel::ReadCommitted, Lsn(0));
        let table = TableId(1);
        let rid = RecordId::new(PageId(0), 0);

        txn.record_insert(table, rid);
        txn.record_delete(table, rid, vec![9, 9, 9]);
        txn.record_update(table, rid, vec![1]);

        let entries = txn.drain_write_set_rev();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].2, WriteRecord::Insert));
    }

    #[test]
    fn write_set_keeps_one_record_per_distinct_rid() {
        let mut txn = Transaction::new(TxnId(1), IsolationLevel::ReadCommitted, Lsn(0));
        let table = TableId(1);
        txn.record_insert(table, RecordId::new(PageId(0), 0));
        txn.record_insert(table, RecordId::new(PageId(0), 1));

        assert_eq!(txn.drain_write_set_rev().len(), 2);
    }
}
