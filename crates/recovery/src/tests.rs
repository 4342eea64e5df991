use std::sync::Mutex as StdMutex;

use common::{PageId, RecordId, TableId, TxnId};
use tempfile::tempdir;

use super::*;

#[derive(Default)]
struct RecordingHandler {
    redo_calls: StdMutex<Vec<String>>,
    undo_calls: StdMutex<Vec<String>>,
}

impl RedoHandler for RecordingHandler {
    fn redo_insert(&self, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.redo_calls
            .lock()
            .unwrap()
            .push(format!("redo_insert({},{:?},{}b)", table.0, rid, after.len()));
        Ok(())
    }
    fn redo_update(&self, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.redo_calls
            .lock()
            .unwrap()
            .push(format!("redo_update({},{:?},{}b)", table.0, rid, after.len()));
        Ok(())
    }
    fn redo_delete(&self, table: TableId, rid: RecordId) -> DbResult<()> {
        self.redo_calls
            .lock()
            .unwrap()
            .push(format!("redo_delete({},{:?})", table.0, rid));
        Ok(())
    }
}

impl UndoHandler for RecordingHandler {
    fn undo_insert(&self, table: TableId, rid: RecordId) -> DbResult<()> {
        self.undo_calls
            .lock()
            .unwrap()
            .push(format!("undo_insert({},{:?})", table.0, rid));
        Ok(())
    }
    fn undo_delete(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
        self.undo_calls.lock().unwrap().push(format!(
            "undo_delete({},{:?},{}b)",
            table.0,
            rid,
            before.len()
        ));
        Ok(())
    }
    fn undo_update(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
        self.undo_calls.lock().unwrap().push(format!(
            "undo_update({},{:?},{}b)",
            table.0,
            rid,
            before.len()
        ));
        Ok(())
    }
}

fn rid(slot: u16) -> RecordId {
    RecordId::new(PageId(0), slot)
}

#[test]
fn analysis_splits_winners_and_losers() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());

    wal.append_begin(TxnId(1)).unwrap();
    wal.append_begin(TxnId(2)).unwrap();
    wal.append_commit(TxnId(1)).unwrap();
    // txn 2 never commits or aborts: a loser at crash time.

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    assert_eq!(analysis.winners, vec![TxnId(1)]);
    assert_eq!(analysis.losers, vec![TxnId(2)]);
}

#[test]
fn analysis_seeds_losers_from_last_checkpoint() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());

    wal.append_begin(TxnId(1)).unwrap();
    let begin_lsn = wal.append_begin(TxnId(2)).unwrap();
    wal.append_checkpoint(vec![(TxnId(1), begin_lsn), (TxnId(2), begin_lsn)], vec![])
        .unwrap();
    wal.flush_to(Lsn(begin_lsn.0 + 1)).unwrap();
    wal.append_commit(TxnId(1)).unwrap();
    // txn 2's BEGIN lies before the checkpoint; only the checkpoint's
    // active-txn snapshot tells recovery it was ever running.

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    assert_eq!(analysis.winners, vec![TxnId(1)]);
    assert_eq!(analysis.losers, vec![TxnId(2)]);
}

#[test]
fn redo_replays_every_write_in_lsn_order() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());

    wal.append_begin(TxnId(1)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(1), TableId(7), rid(0), b"hello").unwrap();
    wal::WalSink::append_update(&*wal, TxnId(1), TableId(7), rid(0), b"hello", b"world").unwrap();
    wal.append_commit(TxnId(1)).unwrap();

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    let handler = RecordingHandler::default();
    let redone = rm.redo(&analysis, &handler).unwrap();

    assert_eq!(redone, 2);
    let calls = handler.redo_calls.lock().unwrap();
    assert_eq!(calls[0], "redo_insert(7,RecordId { page_id: PageId(0), slot: 0 },5b)");
    assert_eq!(calls[1], "redo_update(7,RecordId { page_id: PageId(0), slot: 0 },5b)");
}

#[test]
fn redo_skips_unreachable_pages_without_failing() {
    struct FailingRedo;
    impl RedoHandler for FailingRedo {
        fn redo_insert(&self, _: TableId, _: RecordId, _: &[u8]) -> DbResult<()> {
            Err(DbError::Storage("page deallocated".into()))
        }
        fn redo_update(&self, _: TableId, _: RecordId, _: &[u8]) -> DbResult<()> {
            unreachable!()
        }
        fn redo_delete(&self, _: TableId, _: RecordId) -> DbResult<()> {
            unreachable!()
        }
    }

    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());
    wal.append_begin(TxnId(1)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(1), TableId(1), rid(0), b"x").unwrap();
    wal.append_commit(TxnId(1)).unwrap();

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    let redone = rm.redo(&analysis, &FailingRedo).unwrap();
    assert_eq!(redone, 0);
}

#[test]
fn undo_walks_a_losers_chain_in_reverse() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());

    wal.append_begin(TxnId(1)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(1), TableId(1), rid(0), b"a").unwrap();
    wal::WalSink::append_delete(&*wal, TxnId(1), TableId(1), rid(1), b"before").unwrap();
    wal.flush_to(common::Lsn(3)).unwrap();
    // crash: no COMMIT/ABORT ever appended for txn 1.

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    assert_eq!(analysis.losers, vec![TxnId(1)]);

    let handler = RecordingHandler::default();
    let undone = rm.undo(&analysis, &handler).unwrap();
    assert_eq!(undone, 2);

    let calls = handler.undo_calls.lock().unwrap();
    assert!(calls[0].starts_with("undo_delete"), "delete undone first (reverse order)");
    assert!(calls[1].starts_with("undo_insert"));
}

#[test]
fn undo_ignores_winners_entirely() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());
    wal.append_begin(TxnId(1)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(1), TableId(1), rid(0), b"a").unwrap();
    wal.append_commit(TxnId(1)).unwrap();

    let rm = RecoveryManager::new(wal);
    let analysis = rm.analyze().unwrap();
    let handler = RecordingHandler::default();
    let undone = rm.undo(&analysis, &handler).unwrap();
    assert_eq!(undone, 0);
    assert!(handler.undo_calls.lock().unwrap().is_empty());
}

#[test]
fn checkpoint_is_durable_immediately() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());
    let rm = RecoveryManager::new(wal.clone());
    let lsn = rm.checkpoint(vec![], vec![]).unwrap();
    assert!(wal.persistent_lsn() >= lsn);
}

#[test]
fn recover_runs_all_three_phases() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path().join("wal.log")).unwrap());

    wal.append_begin(TxnId(1)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(1), TableId(1), rid(0), b"winner-row").unwrap();
    wal.append_commit(TxnId(1)).unwrap();

    wal.append_begin(TxnId(2)).unwrap();
    wal::WalSink::append_insert(&*wal, TxnId(2), TableId(1), rid(1), b"loser-row").unwrap();
    wal.flush_to(common::Lsn(4)).unwrap();

    let rm = RecoveryManager::new(wal);
    let handler = RecordingHandler::default();
    let summary = rm.recover(&handler, &handler).unwrap();

    assert_eq!(summary.winners, 1);
    assert_eq!(summary.losers, 1);
    assert_eq!(summary.redone, 2);
    assert_eq!(summary.undone, 1);
}
