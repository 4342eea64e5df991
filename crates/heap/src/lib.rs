//! Slotted-page table heap.
//!
//! A table's rows live across a singly-linked chain of pages, each
//! starting with a [`page::PageHeader`] and a slot directory (see
//! `page` for the on-page layout). Every page access goes through the
//! buffer pool; no `TableHeap` method keeps a page pinned past its own
//! call.

#[cfg(test)]
mod tests;

mod page;

pub use page::{PageHeader, Slot};

use bincode::config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use buffer::BufferPoolManager;
use common::{DbError, DbResult, PageId, RecordId, Row, TableId, TxnId, WalSink};
use page::{HeapPage, HeapPageView};
use std::sync::Arc;

/// A heap table: an append-mostly chain of slotted pages, CRUD'd
/// entirely through the buffer pool.
pub struct TableHeap {
    table_id: TableId,
    first_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    wal: Arc<dyn WalSink>,
}

impl TableHeap {
    /// Create a brand new heap: allocates its first page via the buffer
    /// pool.
    pub fn create(table_id: TableId, bpm: Arc<BufferPoolManager>, wal: Arc<dyn WalSink>) -> DbResult<Self> {
        let (first_page_id, frame) = bpm.new_page()?;
        HeapPage::new(&mut frame.latch.write()).init()?;
        bpm.unpin_page(first_page_id, true)?;
        Ok(Self {
            table_id,
            first_page_id,
            bpm,
            wal,
        })
    }

    /// Open a heap whose first page already exists (loaded from the
    /// catalog).
    pub fn open(table_id: TableId, first_page_id: PageId, bpm: Arc<BufferPoolManager>, wal: Arc<dyn WalSink>) -> Self {
        Self {
            table_id,
            first_page_id,
            bpm,
            wal,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Write back every dirty page of this heap's buffer pool, for a
    /// checkpoint or clean shutdown.
    pub fn flush(&self) -> DbResult<()> {
        self.bpm.flush_all()
    }

    fn encode(row: &Row) -> DbResult<Vec<u8>> {
        encode_to_vec(row, config::legacy()).map_err(|e| DbError::Storage(format!("serialize row failed: {e}")))
    }

    fn decode(bytes: &[u8]) -> DbResult<Row> {
        let (row, _) = decode_from_slice(bytes, config::legacy())
            .map_err(|e| DbError::Storage(format!("deserialize row failed: {e}")))?;
        Ok(row)
    }

    /// Public entry point for callers holding raw before/after bytes
    /// straight from the write-ahead log (undo during `abort`, or a
    /// crash recovery handler) rather than a live page slot.
    pub fn decode_row(bytes: &[u8]) -> DbResult<Row> {
        Self::decode(bytes)
    }

    /// Public entry point mirroring [`TableHeap::decode_row`]: lets a
    /// caller capture a row's before-image in the exact wire format the
    /// WAL stores, for a transaction's write set.
    pub fn encode_row(row: &Row) -> DbResult<Vec<u8>> {
        Self::encode(row)
    }

    /// Insert `row`, walking the page chain for the first page with
    /// room, allocating a new tail page if none fits.
    pub fn insert_tuple(&self, row: &Row, txn: TxnId) -> DbResult<RecordId> {
        let bytes = Self::encode(row)?;

        let mut page_id = self.first_page_id;
        let mut prev_page_id = None;
        loop {
            let frame = self.bpm.fetch_page(page_id)?;
            let fits = {
                let data = frame.latch.read();
                HeapPageView::new(&data).can_fit(bytes.len())?
            };
            if fits {
                let slot = {
                    let mut data = frame.latch.write();
                    HeapPage::new(&mut data).append_tuple(&bytes)?
                };
                self.bpm.unpin_page(page_id, true)?;
                let rid = RecordId::new(page_id, slot);
                self.wal.append_insert(txn, self.table_id, rid, &bytes)?;
                tracing::trace!(table = self.table_id.0, page = page_id.0, slot, "inserted tuple");
                return Ok(rid);
            }
            let next = {
                let data = frame.latch.read();
                HeapPageView::new(&data).next_page_id()?
            };
            self.bpm.unpin_page(page_id, false)?;
            if next.is_valid() {
                prev_page_id = Some(page_id);
                page_id = next;
                continue;
            }
            break;
        }

        // No page in the chain had room: allocate a new tail page.
        let (new_page_id, new_frame) = self.bpm.new_page()?;
        {
            let mut data = new_frame.latch.write();
            let mut page = HeapPage::new(&mut data);
            page.init()?;
        }
        let slot = {
            let mut data = new_frame.latch.write();
            HeapPage::new(&mut data).append_tuple(&bytes)?
        };
        self.bpm.unpin_page(new_page_id, true)?;

        let last = prev_page_id.unwrap_or(self.first_page_id);
        let last_frame = self.bpm.fetch_page(last)?;
        {
            let mut data = last_frame.latch.write();
            HeapPage::new(&mut data).set_next_page_id(new_page_id)?;
        }
        self.bpm.unpin_page(last, true)?;

        let rid = RecordId::new(new_page_id, slot);
        self.wal.append_insert(txn, self.table_id, rid, &bytes)?;
        tracing::trace!(table = self.table_id.0, page = new_page_id.0, slot, "inserted tuple (new page)");
        Ok(rid)
    }

    /// Fetch the row at `rid`, transparently following a relocation
    /// forward pointer left behind by an oversize update. `None` means
    /// the slot is a plain tombstone (deleted).
    pub fn get_tuple(&self, rid: RecordId) -> DbResult<Option<Row>> {
        let frame = self.bpm.fetch_page(rid.page_id)?;
        let (forward, bytes) = {
            let data = frame.latch.read();
            let page = HeapPageView::new(&data);
            (page.slot(rid.slot)?.forward_to(), page.read_tuple(rid.slot)?)
        };
        self.bpm.unpin_page(rid.page_id, false)?;

        if let Some(target) = forward {
            return self.get_tuple(target);
        }
        match bytes {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Update the row at `rid`. Shrinks or grows in place when there's
    /// room; otherwise tombstones `rid` with a forwarding pointer to a
    /// freshly inserted copy elsewhere, per the base design's "RID keeps
    /// pointing at the tombstone" rule.
    pub fn update_tuple(&self, rid: RecordId, new_row: &Row, txn: TxnId) -> DbResult<bool> {
        let frame = self.bpm.fetch_page(rid.page_id)?;
        let (forward, before) = {
            let data = frame.latch.read();
            let page = HeapPageView::new(&data);
            let slot = page.slot(rid.slot)?;
            (slot.forward_to(), page.read_tuple(rid.slot)?)
        };

        if let Some(target) = forward {
            self.bpm.unpin_page(rid.page_id, false)?;
            return self.update_tuple(target, new_row, txn);
        }

        let Some(before) = before else {
            self.bpm.unpin_page(rid.page_id, false)?;
            return Ok(false);
        };

        let after = Self::encode(new_row)?;
        let placed_in_place = {
            let mut data = frame.latch.write();
            HeapPage::new(&mut data).try_update_in_place(rid.slot, &after)?
        };

        if placed_in_place {
            self.bpm.unpin_page(rid.page_id, true)?;
            self.wal.append_update(txn, self.table_id, rid, &before, &after)?;
            return Ok(true);
        }

        // No room: tombstone-with-forward to a fresh copy elsewhere.
        self.bpm.unpin_page(rid.page_id, false)?;
        let new_rid = self.insert_tuple(new_row, txn)?;
        let frame = self.bpm.fetch_page(rid.page_id)?;
        {
            let mut data = frame.latch.write();
            HeapPage::new(&mut data).set_forward(rid.slot, new_rid)?;
        }
        self.bpm.unpin_page(rid.page_id, true)?;
        self.wal.append_update(txn, self.table_id, rid, &before, &after)?;
        Ok(true)
    }

    /// Tombstone the row at `rid`.
    pub fn delete_tuple(&self, rid: RecordId, txn: TxnId) -> DbResult<bool> {
        let frame = self.bpm.fetch_page(rid.page_id)?;
        let (forward, before) = {
            let data = frame.latch.read();
            let page = HeapPageView::new(&data);
            let slot = page.slot(rid.slot)?;
            (slot.forward_to(), page.read_tuple(rid.slot)?)
        };

        if let Some(target) = forward {
            self.bpm.unpin_page(rid.page_id, false)?;
            return self.delete_tuple(target, txn);
        }

        let Some(before) = before else {
            self.bpm.unpin_page(rid.page_id, false)?;
            return Ok(false);
        };

        {
            let mut data = frame.latch.write();
            HeapPage::new(&mut data).tombstone(rid.slot)?;
        }
        self.bpm.unpin_page(rid.page_id, true)?;
        self.wal.append_delete(txn, self.table_id, rid, &before)?;
        Ok(true)
    }

    /// Walk the page chain from `first_page_id` until `target` is
    /// reached, allocating and linking fresh tail pages if the chain
    /// doesn't extend that far yet. Page ids are handed out by the
    /// buffer pool's disk manager in strictly increasing allocation
    /// order, the same order table inserts originally grew the chain
    /// in, so replaying writes in their original chronological order
    /// (as crash recovery's redo phase does) reconstructs the same
    /// chain the original chain had — an allocated id that doesn't
    /// match `target` means the replay order and allocation order have
    /// diverged, a recovery bug rather than a condition to paper over.
    fn ensure_page_in_chain(&self, target: PageId) -> DbResult<()> {
        let mut page_id = self.first_page_id;
        loop {
            if page_id == target {
                return Ok(());
            }
            let frame = self.bpm.fetch_page(page_id)?;
            let next = {
                let data = frame.latch.read();
                HeapPageView::new(&data).next_page_id()?
            };
            self.bpm.unpin_page(page_id, false)?;
            if next.is_valid() {
                page_id = next;
                continue;
            }

            let (new_page_id, new_frame) = self.bpm.new_page()?;
            {
                let mut data = new_frame.latch.write();
                HeapPage::new(&mut data).init()?;
            }
            self.bpm.unpin_page(new_page_id, true)?;

            let prev_frame = self.bpm.fetch_page(page_id)?;
            {
                let mut data = prev_frame.latch.write();
                HeapPage::new(&mut data).set_next_page_id(new_page_id)?;
            }
            self.bpm.unpin_page(page_id, true)?;

            if new_page_id != target {
                return Err(DbError::Storage(format!(
                    "redo chain mismatch: allocated page {} while replaying a write for page {}",
                    new_page_id.0, target.0
                )));
            }
            return Ok(());
        }
    }

    /// Reapply a logged insert/update at its original RID during crash
    /// recovery, bypassing the normal tail-append placement in
    /// [`TableHeap::insert_tuple`]. Idempotent: safe to call against a
    /// page that already carries the write.
    pub fn redo_insert(&self, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.ensure_page_in_chain(rid.page_id)?;
        let frame = self.bpm.fetch_page(rid.page_id)?;
        {
            let mut data = frame.latch.write();
            HeapPage::new(&mut data).redo_put(rid.slot, after)?;
        }
        self.bpm.unpin_page(rid.page_id, true)
    }

    /// Reapply a logged update at its original RID during crash
    /// recovery. Physically identical to [`TableHeap::redo_insert`]: an
    /// update's after-image simply overwrites whatever the slot holds.
    pub fn redo_update(&self, rid: RecordId, after: &[u8]) -> DbResult<()> {
        self.redo_insert(rid, after)
    }

    /// Reapply a logged delete at its original RID during crash
    /// recovery. A no-op if the page chain never reached that far,
    /// since there is nothing to delete.
    pub fn redo_delete(&self, rid: RecordId) -> DbResult<()> {
        self.ensure_page_in_chain(rid.page_id)?;
        let frame = self.bpm.fetch_page(rid.page_id)?;
        {
            let mut data = frame.latch.write();
            HeapPage::new(&mut data).redo_tombstone(rid.slot)?;
        }
        self.bpm.unpin_page(rid.page_id, true)
    }

    /// Forward-only scan over every live (non-tombstoned,
    /// non-forwarding) slot, in page-chain then slot order.
    pub fn iter(&self) -> TableHeapIter<'_> {
        TableHeapIter {
            heap: self,
            page_id: self.first_page_id,
            slot_idx: 0,
        }
    }
}

pub struct TableHeapIter<'a> {
    heap: &'a TableHeap,
    page_id: PageId,
    slot_idx: u16,
}

impl Iterator for TableHeapIter<'_> {
    type Item = (RecordId, Row);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.page_id.is_valid() {
                return None;
            }
            let frame = self.heap.bpm.fetch_page(self.page_id).ok()?;
            let num_slots = {
                let data = frame.latch.read();
                HeapPageView::new(&data).num_slots().ok()?
            };

            if self.slot_idx >= num_slots {
                let next = {
                    let data = frame.latch.read();
                    HeapPageView::new(&data).next_page_id().ok()?
                };
                self.heap.bpm.unpin_page(self.page_id, false).ok()?;
                self.page_id = next;
                self.slot_idx = 0;
                continue;
            }

            let (forward, bytes) = {
                let data = frame.latch.read();
                let page = HeapPageView::new(&data);
                (
                    page.slot(self.slot_idx).ok()?.forward_to(),
                    page.read_tuple(self.slot_idx).ok()?,
                )
            };
            self.heap.bpm.unpin_page(self.page_id, false).ok()?;
            let rid = RecordId::new(self.page_id, self.slot_idx);
            self.slot_idx += 1;

            if forward.is_some() {
                continue;
            }
            if let Some(bytes) = bytes {
                let row = TableHeap::decode(&bytes).ok()?;
                return Some((rid, row));
            }
        }
    }
}
