use super::*;
use common::{PageId, RecordId, TableId};
use tempfile::tempdir;

#[test]
fn append_does_not_persist_until_flush() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(dir.path().join("log")).unwrap();
    let lsn = wal.append_begin(TxnId(1)).unwrap();
    assert_eq!(wal.persistent_lsn(), Lsn::INVALID);
    wal.flush_to(lsn).unwrap();
    assert!(wal.persistent_lsn() >= lsn);
}

#[test]
fn commit_flushes_immediately() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(dir.path().join("log")).unwrap();
    wal.append_begin(TxnId(1)).unwrap();
    let commit_lsn = wal.append_commit(TxnId(1)).unwrap();
    assert!(wal.persistent_lsn() >= commit_lsn);
}

#[test]
fn prev_lsn_chains_within_a_transaction() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(dir.path().join("log")).unwrap();
    let begin = wal.append_begin(TxnId(7)).unwrap();
    let rid = RecordId::new(PageId(0), 0);
    let insert = wal.append_insert(TxnId(7), TableId(1), rid, b"hello").unwrap();
    let commit = wal.append_commit(TxnId(7)).unwrap();
    wal.flush_to(commit).unwrap();

    let records = Wal::replay(dir.path().join("log")).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].lsn, begin);
    assert_eq!(records[0].prev_lsn, Lsn::INVALID);
    assert_eq!(records[1].lsn, insert);
    assert_eq!(records[1].prev_lsn, begin);
    assert_eq!(records[2].lsn, commit);
    assert_eq!(records[2].prev_lsn, insert);
}

#[test]
fn concurrent_transactions_chain_independently() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(dir.path().join("log")).unwrap();
    let a1 = wal.append_begin(TxnId(1)).unwrap();
    let b1 = wal.append_begin(TxnId(2)).unwrap();
    let a2 = wal.append_commit(TxnId(1)).unwrap();
    let b2 = wal.append_commit(TxnId(2)).unwrap();
    wal.flush_to(b2).unwrap();

    let records = Wal::replay(dir.path().join("log")).unwrap();
    let a_commit = records.iter().find(|r| r.lsn == a2).unwrap();
    let b_commit = records.iter().find(|r| r.lsn == b2).unwrap();
    assert_eq!(a_commit.prev_lsn, a1);
    assert_eq!(b_commit.prev_lsn, b1);
}

#[test]
fn replay_on_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let records = Wal::replay(dir.path().join("nope")).unwrap();
    assert!(records.is_empty());
}

#[test]
fn checkpoint_is_not_attributed_to_any_transaction() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(dir.path().join("log")).unwrap();
    let lsn = wal
        .append_checkpoint(vec![(TxnId(1), Lsn(5))], vec![(PageId(2), Lsn(3))])
        .unwrap();
    wal.flush_to(lsn).unwrap();
    let records = Wal::replay(dir.path().join("log")).unwrap();
    assert_eq!(records[0].txn_id, SYSTEM_TXN);
}
