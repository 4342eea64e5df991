//! Identifiers, row representation, configuration and the canonical error
//! type shared by every storage-kernel crate.

#[cfg(test)]
mod tests;

use std::{io, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::Value;

/// Ordinal of a column within a table schema.
pub type ColumnId = u16;

/// Logical identifier for a page in the storage layer. `u64::MAX` is the
/// reserved invalid id (the data model's `-1`).
///
/// Examples:
/// - `let freelist_page = PageId(0);`
/// - `let index_header = PageId(0);` // page 0 doubles as the B+ tree header
/// - `let invalid = PageId::INVALID;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    pub const INVALID: PageId = PageId(u64::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Monotonically increasing transaction identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(pub u64);

/// Log sequence number. `0` is the reserved invalid value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for Lsn {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Fully-qualified identifier for a record within a table heap.
/// `(PageId, SlotIndex)`, stable for the life of a record unless an
/// oversize update relocates it (treated as delete+insert with a new RID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

/// A sequence of values conforming to a schema, plus an optional RID
/// assigned once the tuple lives in a table heap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    #[serde(default)]
    rid: Option<RecordId>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Canonical error type shared across storage-kernel subsystems. Variant
/// groups follow the taxonomy: Storage, BufferPool, Index, Transaction,
/// Catalog, plus `Wal` and `Io` for the write-ahead log and raw I/O.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("buffer pool: {0}")]
    BufferPool(String),
    #[error("index: {0}")]
    Index(String),
    #[error("transaction: {0}")]
    Transaction(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage kernel, passed once at
/// construction (there is no process-wide mutable configuration global).
///
/// # Example
/// ```
/// use common::KernelConfig;
/// use std::path::PathBuf;
///
/// let config = KernelConfig::builder()
///     .data_file_path(PathBuf::from("./db/data"))
///     .log_file_path(PathBuf::from("./db/wal.log"))
///     .buffer_pool_capacity(256)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct KernelConfig {
    /// Root directory holding each table heap's and each B+ tree index's
    /// own backing file (one `buffer::BufferPoolManager` per file — see
    /// `catalog::TableStorage`/`IndexStorage`).
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_file_path: PathBuf,
    /// Path to the write-ahead log file.
    #[builder(default = PathBuf::from("./db_data/wal.log"))]
    pub log_file_path: PathBuf,
    /// Path to the on-disk catalog file.
    #[builder(default = PathBuf::from("./db_data/catalog.json"))]
    pub catalog_path: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_capacity: usize,
    /// Compile-time page size, carried in config for documentation and
    /// validation purposes; `storage::PAGE_SIZE` is the actual constant.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// How long a lock waiter blocks before `TransactionError::LockTimeout`.
    #[builder(default = Duration::from_secs(5))]
    pub lock_timeout: Duration,
    /// Optional interval between automatic checkpoints; `None` disables
    /// periodic checkpointing (callers may still invoke it on demand).
    pub checkpoint_interval: Option<Duration>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Narrow seam between the table heap and the write-ahead log: the heap
/// emits before/after images without knowing anything about LSN
/// assignment or framing. Implemented by `wal::Wal`; kept here (rather
/// than having `heap` depend on `wal`) so a recovery or test harness can
/// hand the heap a stub sink without pulling in the whole log.
pub trait WalSink: Send + Sync {
    fn append_insert(&self, txn: TxnId, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<Lsn>;
    fn append_update(
        &self,
        txn: TxnId,
        table: TableId,
        rid: RecordId,
        before: &[u8],
        after: &[u8],
    ) -> DbResult<Lsn>;
    fn append_delete(&self, txn: TxnId, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<Lsn>;
}

/// A `WalSink` that discards every record, for tests that don't care
/// about durability.
#[derive(Debug, Default)]
pub struct NullWalSink;

impl WalSink for NullWalSink {
    fn append_insert(&self, _txn: TxnId, _table: TableId, _rid: RecordId, _after: &[u8]) -> DbResult<Lsn> {
        Ok(Lsn::INVALID)
    }
    fn append_update(
        &self,
        _txn: TxnId,
        _table: TableId,
        _rid: RecordId,
        _before: &[u8],
        _after: &[u8],
    ) -> DbResult<Lsn> {
        Ok(Lsn::INVALID)
    }
    fn append_delete(&self, _txn: TxnId, _table: TableId, _rid: RecordId, _before: &[u8]) -> DbResult<Lsn> {
        Ok(Lsn::INVALID)
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{DbError, DbResult, KernelConfig, NullWalSink, RecordId, Row, TableId, TxnId, WalSink};
    pub use types::{SqlType, Value};
}
