//! Write-ahead log: the durability boundary for every transaction.
//!
//! Records are assigned a monotonic [`Lsn`] on append and chained
//! backward per transaction via `prev_lsn`, so recovery can walk a
//! single transaction's history without scanning the whole log.
//! `append` only stages a record in memory; [`Wal::flush_to`] is what
//! makes it durable (and, per the write-ahead rule, is what a data page
//! with that LSN must wait for before it can itself be written back).
//!
//! # Example
//!
//! ```no_run
//! use wal::{Wal, WalRecordBody};
//! use common::{TableId, RecordId, PageId, TxnId, WalSink};
//!
//! let wal = Wal::open("data/toydb.wal").unwrap();
//! let begin_lsn = wal.append_begin(TxnId(1)).unwrap();
//! let rid = RecordId::new(PageId(0), 0);
//! wal.append_insert(TxnId(1), TableId(1), rid, b"row-bytes").unwrap();
//! let commit_lsn = wal.append_commit(TxnId(1)).unwrap();
//! assert!(wal.persistent_lsn() >= commit_lsn);
//! let _ = begin_lsn;
//! ```

#[cfg(test)]
mod tests;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, Lsn, PageId, RecordId, TableId, TxnId};
pub use common::WalSink;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

fn bincode_config() -> impl Config {
    config::legacy()
}

/// The logical payload of a log record, independent of its LSN/txn
/// chaining metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WalRecordBody {
    Begin,
    Commit,
    Abort,
    Insert {
        table: TableId,
        rid: RecordId,
        after: Vec<u8>,
    },
    Update {
        table: TableId,
        rid: RecordId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Delete {
        table: TableId,
        rid: RecordId,
        before: Vec<u8>,
    },
    /// A fuzzy checkpoint: the transactions active and the dirty-page
    /// high-water marks at the moment it was taken.
    Checkpoint {
        active_txns: Vec<(TxnId, Lsn)>,
        dirty_pages: Vec<(PageId, Lsn)>,
    },
}

/// One entry in the log: a [`WalRecordBody`] plus its LSN and, for
/// per-txn records, the LSN of that same transaction's previous record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub body: WalRecordBody,
}

/// Sentinel transaction id used for records with no owning transaction
/// (checkpoints).
const SYSTEM_TXN: TxnId = TxnId(0);

struct Inner {
    file: File,
    /// Staged records not yet guaranteed durable, in LSN order.
    staged: Vec<(Lsn, Vec<u8>)>,
    persistent_lsn: Lsn,
}

/// Append-only, length-prefixed log file plus in-memory staging and
/// per-transaction LSN chaining.
pub struct Wal {
    path: PathBuf,
    inner: Mutex<Inner>,
    next_lsn: AtomicU64,
    txn_prev_lsn: Mutex<HashMap<TxnId, Lsn>>,
}

impl Wal {
    /// Open or create a log file at `path`. Does not replay it; call
    /// [`Wal::replay`] separately during recovery.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DbError::Wal(format!("failed to open WAL file: {e}")))?;

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                staged: Vec::new(),
                persistent_lsn: Lsn::INVALID,
            }),
            next_lsn: AtomicU64::new(1),
            txn_prev_lsn: Mutex::new(HashMap::new()),
        })
    }

    fn stage(&self, txn_id: TxnId, body: WalRecordBody) -> DbResult<Lsn> {
        let lsn = Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst));
        let prev_lsn = if txn_id == SYSTEM_TXN {
            Lsn::INVALID
        } else {
            let mut table = self.txn_prev_lsn.lock();
            let prev = table.get(&txn_id).copied().unwrap_or(Lsn::INVALID);
            table.insert(txn_id, lsn);
            prev
        };
        let record = LogRecord {
            lsn,
            txn_id,
            prev_lsn,
            body,
        };
        let bytes = encode_to_vec(&record, bincode_config())
            .map_err(|e| DbError::Wal(format!("failed to serialize record: {e}")))?;
        self.inner.lock().staged.push((lsn, bytes));
        Ok(lsn)
    }

    /// Assign the next LSN to `body` and stage it in memory. Returns
    /// immediately; durability is only guaranteed after `flush_to`.
    pub fn append_record(&self, txn_id: TxnId, body: WalRecordBody) -> DbResult<Lsn> {
        self.stage(txn_id, body)
    }

    pub fn append_begin(&self, txn_id: TxnId) -> DbResult<Lsn> {
        self.stage(txn_id, WalRecordBody::Begin)
    }

    /// Append COMMIT and flush the log up to (and including) its LSN —
    /// a commit is not externally visible until this returns. Forgets
    /// the transaction's chain afterward.
    pub fn append_commit(&self, txn_id: TxnId) -> DbResult<Lsn> {
        let lsn = self.stage(txn_id, WalRecordBody::Commit)?;
        self.flush_to(lsn)?;
        self.txn_prev_lsn.lock().remove(&txn_id);
        Ok(lsn)
    }

    pub fn append_abort(&self, txn_id: TxnId) -> DbResult<Lsn> {
        let lsn = self.stage(txn_id, WalRecordBody::Abort)?;
        self.txn_prev_lsn.lock().remove(&txn_id);
        Ok(lsn)
    }

    pub fn append_checkpoint(
        &self,
        active_txns: Vec<(TxnId, Lsn)>,
        dirty_pages: Vec<(PageId, Lsn)>,
    ) -> DbResult<Lsn> {
        self.stage(
            SYSTEM_TXN,
            WalRecordBody::Checkpoint {
                active_txns,
                dirty_pages,
            },
        )
    }

    /// Guarantee every staged record up to and including `lsn` is
    /// durable. Implementation flushes everything currently staged
    /// (group-commit), which the base design explicitly permits.
    pub fn flush_to(&self, lsn: Lsn) -> DbResult<()> {
        let mut inner = self.inner.lock();
        if inner.persistent_lsn >= lsn || inner.staged.is_empty() {
            return Ok(());
        }
        let mut last = inner.persistent_lsn;
        let staged = std::mem::take(&mut inner.staged);
        for (record_lsn, bytes) in staged {
            let len = bytes.len() as u32;
            inner
                .file
                .write_all(&len.to_le_bytes())
                .map_err(|e| DbError::Wal(format!("failed to write length prefix: {e}")))?;
            inner
                .file
                .write_all(&bytes)
                .map_err(|e| DbError::Wal(format!("failed to write record: {e}")))?;
            last = record_lsn;
        }
        inner
            .file
            .sync_all()
            .map_err(|e| DbError::Wal(format!("failed to fsync WAL: {e}")))?;
        inner.persistent_lsn = last;
        tracing::debug!(persistent_lsn = inner.persistent_lsn.0, "wal flushed");
        Ok(())
    }

    /// Highest LSN guaranteed durable.
    pub fn persistent_lsn(&self) -> Lsn {
        self.inner.lock().persistent_lsn
    }

    /// Read every durable record from `path` in LSN order. Used by the
    /// recovery manager's analysis/redo/undo passes.
    pub fn replay(path: impl AsRef<Path>) -> DbResult<Vec<LogRecord>> {
        let mut file = match OpenOptions::new().read(true).open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::Wal(format!("failed to open WAL for replay: {e}"))),
        };
        file.seek(SeekFrom::Start(0))?;

        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DbError::Wal(format!("failed to read length prefix: {e}"))),
            }
            let len = u32::from_le_bytes(len_buf);
            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf)
                .map_err(|e| DbError::Wal(format!("failed to read record body: {e}")))?;
            let (record, _) = decode_from_slice(&buf, bincode_config())
                .map_err(|e| DbError::Wal(format!("failed to deserialize record: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WalSink for Wal {
    fn append_insert(&self, txn: TxnId, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<Lsn> {
        self.stage(
            txn,
            WalRecordBody::Insert {
                table,
                rid,
                after: after.to_vec(),
            },
        )
    }

    fn append_update(
        &self,
        txn: TxnId,
        table: TableId,
        rid: RecordId,
        before: &[u8],
        after: &[u8],
    ) -> DbResult<Lsn> {
        self.stage(
            txn,
            WalRecordBody::Update {
                table,
                rid,
                before: before.to_vec(),
                after: after.to_vec(),
            },
        )
    }

    fn append_delete(&self, txn: TxnId, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<Lsn> {
        self.stage(
            txn,
            WalRecordBody::Delete {
                table,
                rid,
                before: before.to_vec(),
            },
        )
    }
}
