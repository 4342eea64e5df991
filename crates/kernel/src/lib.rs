//! Storage-kernel facade: wires the disk manager, buffer pool, table
//! heaps, B+ tree indexes, lock manager, transaction manager,
//! write-ahead log, recovery manager and catalog into one entry point.
//!
//! Grounded on the shape of the teacher's own
//! `examples/wcygan-sql-database/crates/database/src/lib.rs` `Database`
//! facade (one struct owning every subsystem Arc, a constructor that
//! loads the catalog and opens the WAL, DDL as inherent methods that
//! mutate the catalog under its own lock then persist it) stripped of
//! everything that isn't this workspace's concern: no SQL parsing or
//! planning (there is no executor crate here), no async runtime or
//! `spawn_blocking` (the kernel has no I/O that needs to leave a worker
//! thread free), and no Raft (single-node only, per the storage kernel's
//! own scope).


use std::{fs, sync::Arc};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use btree::BTreeIndex;
use buffer::BufferPoolManager;
use catalog::{Catalog, Column, IndexId, IndexStorage, TableStorage};
use common::{DbError, DbResult, KernelConfig, Lsn, RecordId, Row, TableId, TxnId};
use heap::TableHeap;
use recovery::{RecoveryManager, RedoHandler};
use storage::DiskManager;
use txn::{IsolationLevel, LockManager, Transaction, TransactionManager, UndoHandler};
use types::Value;
use wal::Wal;

/// Fanout for every B+ tree this kernel opens. Not user-configurable:
/// the btree crate's own tests use tiny values (e.g. 4) to force splits
/// deterministically, but a kernel-opened tree is sized for real key/RID
/// density within one page instead.
const BTREE_MAX_SIZE: usize = 64;

/// Txn id attributed to heap writes made purely to apply an
/// already-logged effect — crash redo and abort/recovery undo — rather
/// than a caller's own in-flight transaction. `TxnId(0)` mirrors the
/// WAL's own reserved system-transaction id for checkpoint records.
const RECOVERY_TXN: TxnId = TxnId(0);

struct OpenTable {
    heap: Arc<TableHeap>,
    #[allow(dead_code)]
    bpm: Arc<BufferPoolManager>,
}

struct OpenIndex {
    index: Arc<BTreeIndex>,
    #[allow(dead_code)]
    bpm: Arc<BufferPoolManager>,
}

/// Entry point for every storage-kernel operation. Owns the catalog and
/// the write-ahead log directly; every table heap and B+ tree index it
/// has opened lives behind its own dedicated [`BufferPoolManager`],
/// reached through `tables`/`indexes`.
pub struct StorageKernel {
    config: KernelConfig,
    catalog: Mutex<Catalog>,
    wal: Arc<Wal>,
    txn_manager: TransactionManager,
    recovery: RecoveryManager,
    tables: RwLock<HashMap<TableId, OpenTable>>,
    indexes: RwLock<HashMap<IndexId, OpenIndex>>,
}

impl StorageKernel {
    /// Opens (or creates) a database at `config.data_file_path`: loads
    /// the catalog, opens every table heap and index it names, replays
    /// the write-ahead log, then runs ARIES recovery before returning a
    /// kernel ready to accept new transactions.
    pub fn open(config: KernelConfig) -> DbResult<Self> {
        fs::create_dir_all(&config.data_file_path)?;

        let catalog = Catalog::load(&config.catalog_path)?;
        let wal = Arc::new(Wal::open(&config.log_file_path)?);
        let lock_manager = Arc::new(LockManager::new(config.lock_timeout));
        let txn_manager = TransactionManager::new(wal.clone(), lock_manager);
        let recovery = RecoveryManager::new(wal.clone());

        let mut tables = HashMap::new();
        for table in catalog.tables() {
            let disk = DiskManager::open(&table.storage.data_file)?;
            let bpm = Arc::new(BufferPoolManager::with_lru(disk, config.buffer_pool_capacity));
            let heap = Arc::new(TableHeap::open(
                table.id,
                table.storage.first_page_id,
                bpm.clone(),
                wal.clone(),
            ));
            tables.insert(table.id, OpenTable { heap, bpm });
        }

        let mut indexes = HashMap::new();
        for table in catalog.tables() {
            for index_meta in table.indexes() {
                let disk = DiskManager::open(&index_meta.storage.data_file)?;
                let bpm = Arc::new(BufferPoolManager::with_lru(disk, config.buffer_pool_capacity));
                let index = Arc::new(BTreeIndex::open(
                    index_meta.name.clone(),
                    bpm.clone(),
                    BTREE_MAX_SIZE,
                )?);
                indexes.insert(index_meta.id, OpenIndex { index, bpm });
            }
        }

        let kernel = Self {
            config,
            catalog: Mutex::new(catalog),
            wal,
            txn_manager,
            recovery,
            tables: RwLock::new(tables),
            indexes: RwLock::new(indexes),
        };

        let summary = kernel.recovery.recover(&kernel, &kernel)?;
        debug!(?summary, "startup recovery complete");

        for open_table in kernel.tables.read().values() {
            open_table.heap.flush()?;
        }

        Ok(kernel)
    }

    /// Registers a new table: allocates its dedicated heap file, creates
    /// the heap, then records it in the catalog. The catalog lock is
    /// held across the whole sequence so no concurrent `create_table`
    /// can observe (or consume) the peeked id first.
    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> DbResult<TableId> {
        let mut catalog = self.catalog.lock();
        let expected_id = catalog.next_table_id();

        let data_file = self.config.data_file_path.join(format!("{name}.heap"));
        let disk = DiskManager::open(&data_file)?;
        let bpm = Arc::new(BufferPoolManager::with_lru(disk, self.config.buffer_pool_capacity));
        let heap = TableHeap::create(expected_id, bpm.clone(), self.wal.clone())?;
        let storage = TableStorage::new(data_file, heap.first_page_id());

        let table_id = catalog.create_table(name, columns, storage)?;
        debug_assert_eq!(table_id, expected_id, "catalog assigned a different id than peeked");
        catalog.save(&self.config.catalog_path)?;

        self.tables
            .write()
            .insert(table_id, OpenTable { heap: Arc::new(heap), bpm });
        Ok(table_id)
    }

    /// Registers a new single-column B+ tree index. Only rows inserted
    /// after this call are indexed — there is no backfill pass over
    /// existing rows, matching the teacher's own `execute_create_index`.
    pub fn create_index(&self, table_name: &str, index_name: &str, column: &str) -> DbResult<IndexId> {
        let mut catalog = self.catalog.lock();

        let data_file = self.config.data_file_path.join(format!("{index_name}.idx"));
        let disk = DiskManager::open(&data_file)?;
        let bpm = Arc::new(BufferPoolManager::with_lru(disk, self.config.buffer_pool_capacity));
        let index = BTreeIndex::open(index_name, bpm.clone(), BTREE_MAX_SIZE)?;
        let storage = IndexStorage::new(data_file);

        let index_id = catalog.create_index(table_name, index_name, column, storage)?;
        catalog.save(&self.config.catalog_path)?;

        self.indexes
            .write()
            .insert(index_id, OpenIndex { index: Arc::new(index), bpm });
        Ok(index_id)
    }

    /// Resolves a table's id by name, for callers that only know the
    /// name (a fresh `create_table` caller already has the id).
    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        Ok(self.catalog.lock().table(name)?.id)
    }

    /// Resolves an index's id by table and index name.
    pub fn index_id(&self, table_name: &str, index_name: &str) -> DbResult<IndexId> {
        Ok(self.catalog.lock().table(table_name)?.index(index_name)?.id)
    }

    /// Begins a new transaction at the requested isolation level.
    pub fn begin(&self, isolation: IsolationLevel) -> DbResult<Transaction> {
        self.txn_manager.begin(isolation)
    }

    /// Commits a transaction: flushes its WAL records durable, then
    /// releases every lock it holds.
    pub fn commit(&self, txn: &mut Transaction) -> DbResult<()> {
        self.txn_manager.commit(txn)
    }

    /// Aborts a transaction: physically undoes its write set in reverse
    /// order, logs the abort, then releases its locks.
    pub fn abort(&self, txn: &mut Transaction) -> DbResult<()> {
        self.txn_manager.abort(txn, self)
    }

    /// Acquires a shared lock, aborting `txn` if the wait times out.
    /// There is no executor above this crate to notice a lock timeout and
    /// react to it, so the kernel facade is the boundary that owns that
    /// reaction: a caller who gets `Err` back already has a fully aborted,
    /// rolled-back transaction, not merely a failed lock request.
    pub fn lock_shared(&self, txn: &mut Transaction, rid: RecordId) -> DbResult<()> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_shared(txn, rid))
    }

    /// Acquires an exclusive lock, aborting `txn` if the wait times out.
    /// See [`Self::lock_shared`] for why the abort happens here.
    pub fn lock_exclusive(&self, txn: &mut Transaction, rid: RecordId) -> DbResult<()> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_exclusive(txn, rid))
    }

    /// Upgrades a held shared lock to exclusive, aborting `txn` if the
    /// wait times out. See [`Self::lock_shared`] for why the abort
    /// happens here.
    pub fn lock_upgrade(&self, txn: &mut Transaction, rid: RecordId) -> DbResult<()> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_upgrade(txn, rid))
    }

    pub fn unlock(&self, txn: &mut Transaction, rid: RecordId) -> DbResult<()> {
        self.txn_manager.lock_manager().unlock(txn, rid)
    }

    /// Runs a lock-manager call and, if it fails with a lock timeout,
    /// aborts `txn` before returning the original error. Any other error
    /// (or success) passes through untouched.
    fn lock_or_abort(
        &self,
        txn: &mut Transaction,
        call: impl FnOnce(&LockManager, &mut Transaction) -> DbResult<()>,
    ) -> DbResult<()> {
        match call(self.txn_manager.lock_manager(), txn) {
            Ok(()) => Ok(()),
            Err(err @ DbError::Transaction(_)) => {
                self.abort(txn)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Inserts a row into `table`, recording the write in `txn`'s write
    /// set so `abort` can undo it. Does not itself acquire a lock — the
    /// new RID belongs to no one else yet.
    pub fn heap_insert(&self, table: TableId, row: &Row, txn: &mut Transaction) -> DbResult<RecordId> {
        let rid = self.table_heap(table)?.insert_tuple(row, txn.id())?;
        txn.record_insert(table, rid);
        Ok(rid)
    }

    /// Reads a row under a shared lock.
    pub fn heap_get(&self, table: TableId, rid: RecordId, txn: &mut Transaction) -> DbResult<Option<Row>> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_shared(txn, rid))?;
        self.table_heap(table)?.get_tuple(rid)
    }

    /// Overwrites a row under an exclusive lock, capturing its
    /// before-image for undo. Returns `false` if `rid` names no live
    /// row, without touching `txn`'s write set.
    pub fn heap_update(
        &self,
        table: TableId,
        rid: RecordId,
        new_row: &Row,
        txn: &mut Transaction,
    ) -> DbResult<bool> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_exclusive(txn, rid))?;
        let heap = self.table_heap(table)?;
        let Some(before) = heap.get_tuple(rid)? else {
            return Ok(false);
        };
        let before_bytes = TableHeap::encode_row(&before)?;
        let updated = heap.update_tuple(rid, new_row, txn.id())?;
        if updated {
            txn.record_update(table, rid, before_bytes);
        }
        Ok(updated)
    }

    /// Tombstones a row under an exclusive lock, capturing its
    /// before-image for undo.
    pub fn heap_delete(&self, table: TableId, rid: RecordId, txn: &mut Transaction) -> DbResult<bool> {
        self.lock_or_abort(txn, |lm, txn| lm.lock_exclusive(txn, rid))?;
        let heap = self.table_heap(table)?;
        let Some(before) = heap.get_tuple(rid)? else {
            return Ok(false);
        };
        let before_bytes = TableHeap::encode_row(&before)?;
        let deleted = heap.delete_tuple(rid, txn.id())?;
        if deleted {
            txn.record_delete(table, rid, before_bytes);
        }
        Ok(deleted)
    }

    /// Collects every live row in a table, in page-chain order. Eager —
    /// there is no cursor-based streaming scan at the kernel layer, that
    /// belongs to a future executor.
    pub fn heap_scan(&self, table: TableId) -> DbResult<Vec<(RecordId, Row)>> {
        Ok(self.table_heap(table)?.iter().collect())
    }

    pub fn index_insert(&self, index: IndexId, key: &Value, rid: RecordId, txn: &Transaction) -> DbResult<bool> {
        self.btree_index(index)?.insert(key, rid, txn.id())
    }

    pub fn index_remove(&self, index: IndexId, key: &Value, txn: &Transaction) -> DbResult<bool> {
        self.btree_index(index)?.remove(key, txn.id())
    }

    pub fn index_get(&self, index: IndexId, key: &Value) -> DbResult<Option<RecordId>> {
        self.btree_index(index)?.get(key)
    }

    /// Collects every `(key, RID)` pair from `key` onward. Eager, like
    /// `heap_scan`: the cursor is drained entirely within this call so
    /// its borrow of the index never has to outlive the method.
    pub fn index_range_from(&self, index: IndexId, key: &Value) -> DbResult<Vec<(Value, RecordId)>> {
        let index = self.btree_index(index)?;
        let mut cursor = index.iter_from(key)?;
        let mut out = Vec::new();
        while let Some(pair) = cursor.next()? {
            out.push(pair);
        }
        Ok(out)
    }

    /// Writes a CHECKPOINT record snapshotting the active-transaction
    /// table, then flushes it durable. Dirty-page tracking isn't
    /// maintained at this fidelity, so the dirty-page table is always
    /// empty; analysis falls back to replaying every record since the
    /// checkpoint rather than skipping pages already known flushed.
    pub fn checkpoint(&self) -> DbResult<Lsn> {
        let active_txns = self
            .txn_manager
            .active_txn_ids()
            .into_iter()
            .map(|id| (id, Lsn::INVALID))
            .collect();
        self.recovery.checkpoint(active_txns, Vec::new())
    }

    fn table_heap(&self, table: TableId) -> DbResult<Arc<TableHeap>> {
        self.tables
            .read()
            .get(&table)
            .map(|t| t.heap.clone())
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", table.0)))
    }

    /// Same lookup as `table_heap`, but reports a missing table as
    /// `DbError::Storage` rather than `DbError::Catalog`. Used only by
    /// the `RedoHandler` impl below, so that `RecoveryManager::redo`'s
    /// existing "skip on Storage error" policy (meant for "page
    /// unreachable") also benignly skips redo records belonging to a
    /// table that no longer exists, instead of failing the whole pass.
    fn table_heap_for_redo(&self, table: TableId) -> DbResult<Arc<TableHeap>> {
        self.tables
            .read()
            .get(&table)
            .map(|t| t.heap.clone())
            .ok_or_else(|| DbError::Storage(format!("redo target table {} not registered", table.0)))
    }

    fn btree_index(&self, index: IndexId) -> DbResult<Arc<BTreeIndex>> {
        self.indexes
            .read()
            .get(&index)
            .map(|i| i.index.clone())
            .ok_or_else(|| DbError::Index(format!("unknown index id {}", index.0)))
    }
}

impl UndoHandler for StorageKernel {
    fn undo_insert(&self, table: TableId, rid: RecordId) -> DbResult<()> {
        self.table_heap(table)?.delete_tuple(rid, RECOVERY_TXN).map(|_| ())
    }

    fn undo_delete(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
        let row = TableHeap::decode_row(before)?;
        self.table_heap(table)?.insert_tuple(&row, RECOVERY_TXN).map(|_| ())
    }

    fn undo_update(&self, table: TableId, rid: RecordId, before: &[u8]) -> DbResult<()> {
        let row = TableHeap::decode_row(before)?;
        self.table_heap(table)?
            .update_tuple(rid, &row, RECOVERY_TXN)
            .map(|_| ())
    }
}

impl RedoHandler for StorageKernel {
    fn redo_insert(&self, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.table_heap_for_redo(table)?.redo_insert(rid, after)
    }

    fn redo_update(&self, table: TableId, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.table_heap_for_redo(table)?.redo_update(rid, after)
    }

    fn redo_delete(&self, table: TableId, rid: RecordId) -> DbResult<()> {
        self.table_heap_for_redo(table)?.redo_delete(rid)
    }
}
