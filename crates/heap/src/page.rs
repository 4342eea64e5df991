//! Slotted-page layout shared by every heap page body.
//!
//! ```text
//! [ PageHeader | Slot 0 | Slot 1 | ... | free space | ... | Tuple 1 | Tuple 0 ]
//! ```
//!
//! The slot directory grows forward from the header; tuple bytes grow
//! backward from the end of the page. `free_offset` is the start of the
//! lowest-addressed tuple written so far.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId, RecordId};
use std::mem::size_of;
use storage::PAGE_SIZE;

fn bincode_config() -> impl Config {
    config::legacy()
}

const HEADER_BYTES: usize = size_of::<PageHeader>();
const SLOT_BYTES: usize = size_of::<Slot>();

/// Fixed-size header at the start of every heap page.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageHeader {
    pub next_page_id: u64,
    pub num_slots: u16,
    pub free_offset: u16,
}

impl PageHeader {
    fn empty() -> Self {
        Self {
            next_page_id: PageId::INVALID.0,
            num_slots: 0,
            free_offset: PAGE_SIZE as u16,
        }
    }
}

/// One slot-directory entry. `len == 0` marks a tombstone: either a
/// plain delete (`forward` is `PageId::INVALID`) or, after an oversize
/// update relocated the tuple, a forwarding pointer to its new home.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub offset: u16,
    pub len: u16,
    pub forward_page: u64,
    pub forward_slot: u16,
}

impl Slot {
    fn live(offset: u16, len: u16) -> Self {
        Self {
            offset,
            len,
            forward_page: PageId::INVALID.0,
            forward_slot: 0,
        }
    }

    fn tombstone() -> Self {
        Self {
            offset: 0,
            len: 0,
            forward_page: PageId::INVALID.0,
            forward_slot: 0,
        }
    }

    fn forwarding(to: RecordId) -> Self {
        Self {
            offset: 0,
            len: 0,
            forward_page: to.page_id.0,
            forward_slot: to.slot,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.len == 0
    }

    pub fn forward_to(&self) -> Option<RecordId> {
        if self.len == 0 && self.forward_page != PageId::INVALID.0 {
            Some(RecordId::new(PageId(self.forward_page), self.forward_slot))
        } else {
            None
        }
    }
}

/// Read-only view over one page's raw bytes. Used where a caller only
/// needs to inspect a page (held under the buffer pool frame's shared
/// latch) without taking the exclusive latch `HeapPage` requires.
pub struct HeapPageView<'a> {
    data: &'a [u8],
}

impl<'a> HeapPageView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn header(&self) -> DbResult<PageHeader> {
        let (header, _) = decode_from_slice(&self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("read page header failed: {e}")))?;
        Ok(header)
    }

    pub fn next_page_id(&self) -> DbResult<PageId> {
        Ok(PageId(self.header()?.next_page_id))
    }

    pub fn num_slots(&self) -> DbResult<u16> {
        Ok(self.header()?.num_slots)
    }

    fn free_space(&self) -> DbResult<usize> {
        let header = self.header()?;
        let slots_end = HEADER_BYTES + header.num_slots as usize * SLOT_BYTES;
        Ok((header.free_offset as usize).saturating_sub(slots_end))
    }

    pub fn can_fit(&self, payload_len: usize) -> DbResult<bool> {
        Ok(self.free_space()? >= payload_len + SLOT_BYTES)
    }

    fn slot_offset(slot_idx: u16) -> usize {
        HEADER_BYTES + slot_idx as usize * SLOT_BYTES
    }

    pub fn slot(&self, slot_idx: u16) -> DbResult<Slot> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let (slot, _) = decode_from_slice(&self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("read slot failed: {e}")))?;
        Ok(slot)
    }

    pub fn read_tuple(&self, slot_idx: u16) -> DbResult<Option<Vec<u8>>> {
        if slot_idx >= self.num_slots()? {
            return Err(DbError::Storage(format!("invalid slot {slot_idx}")));
        }
        let slot = self.slot(slot_idx)?;
        if slot.is_tombstone() {
            return Ok(None);
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        Ok(Some(self.data[start..end].to_vec()))
    }
}

/// A mutable view over one page's raw bytes, interpreted as a slotted
/// heap page. Borrows the buffer-pool frame body for the duration of an
/// operation.
pub struct HeapPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeapPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn init(&mut self) -> DbResult<()> {
        self.write_header(&PageHeader::empty())
    }

    pub fn header(&self) -> DbResult<PageHeader> {
        let (header, _) = decode_from_slice(&self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("read page header failed: {e}")))?;
        Ok(header)
    }

    pub fn write_header(&mut self, header: &PageHeader) -> DbResult<()> {
        encode_into_slice(header, &mut self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("write page header failed: {e}")))?;
        Ok(())
    }

    pub fn next_page_id(&self) -> DbResult<PageId> {
        Ok(PageId(self.header()?.next_page_id))
    }

    pub fn set_next_page_id(&mut self, id: PageId) -> DbResult<()> {
        let mut header = self.header()?;
        header.next_page_id = id.0;
        self.write_header(&header)
    }

    fn slot_offset(slot_idx: u16) -> usize {
        HEADER_BYTES + slot_idx as usize * SLOT_BYTES
    }

    pub fn slot(&self, slot_idx: u16) -> DbResult<Slot> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let (slot, _) = decode_from_slice(&self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("read slot failed: {e}")))?;
        Ok(slot)
    }

    fn write_slot(&mut self, slot_idx: u16, slot: &Slot) -> DbResult<()> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        encode_into_slice(slot, &mut self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("write slot failed: {e}")))?;
        Ok(())
    }

    pub fn num_slots(&self) -> DbResult<u16> {
        Ok(self.header()?.num_slots)
    }

    fn free_space(&self) -> DbResult<usize> {
        let header = self.header()?;
        let slots_end = HEADER_BYTES + header.num_slots as usize * SLOT_BYTES;
        Ok((header.free_offset as usize).saturating_sub(slots_end))
    }

    pub fn can_fit(&self, payload_len: usize) -> DbResult<bool> {
        Ok(self.free_space()? >= payload_len + SLOT_BYTES)
    }

    fn can_fit_in_place(&self, payload_len: usize) -> DbResult<bool> {
        Ok(self.free_space()? >= payload_len)
    }

    /// Append `bytes` as a brand new tuple and return its slot index.
    pub fn append_tuple(&mut self, bytes: &[u8]) -> DbResult<u16> {
        if bytes.len() > u16::MAX as usize {
            return Err(DbError::Storage("row exceeds maximum tuple size".into()));
        }
        let mut header = self.header()?;
        if header.num_slots == u16::MAX {
            return Err(DbError::Storage("slot index overflow".into()));
        }
        if !self.can_fit(bytes.len())? {
            return Err(DbError::Storage("page full".into()));
        }
        let slot_idx = header.num_slots;
        let len = bytes.len() as u16;
        let new_free_offset = header.free_offset - len;
        self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);

        self.write_slot(slot_idx, &Slot::live(new_free_offset, len))?;
        header.num_slots += 1;
        header.free_offset = new_free_offset;
        self.write_header(&header)?;
        Ok(slot_idx)
    }

    pub fn read_tuple(&self, slot_idx: u16) -> DbResult<Option<Vec<u8>>> {
        if slot_idx >= self.num_slots()? {
            return Err(DbError::Storage(format!("invalid slot {slot_idx}")));
        }
        let slot = self.slot(slot_idx)?;
        if slot.is_tombstone() {
            return Ok(None);
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        Ok(Some(self.data[start..end].to_vec()))
    }

    /// Overwrite an existing slot's payload in place. Caller must have
    /// already checked the new payload fits (same-size shrink, or the
    /// page has the spare room for a growth).
    fn rewrite_in_place(&mut self, slot_idx: u16, bytes: &[u8]) -> DbResult<()> {
        let old = self.slot(slot_idx)?;
        if bytes.len() as u16 == old.len {
            let start = old.offset as usize;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            return Ok(());
        }
        // Different size: drop the old bytes as dead space and append
        // fresh, like the append path, reusing the slot index.
        let mut header = self.header()?;
        let new_free_offset = header.free_offset - bytes.len() as u16;
        self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);
        self.write_slot(slot_idx, &Slot::live(new_free_offset, bytes.len() as u16))?;
        header.free_offset = new_free_offset;
        self.write_header(&header)
    }

    /// Attempt to place `bytes` at `slot_idx`, shrinking or growing in
    /// place. Returns `true` on success, `false` if the page has no room
    /// to grow and the caller must relocate instead.
    pub fn try_update_in_place(&mut self, slot_idx: u16, bytes: &[u8]) -> DbResult<bool> {
        let old = self.slot(slot_idx)?;
        if bytes.len() as u16 <= old.len {
            self.rewrite_in_place(slot_idx, bytes)?;
            return Ok(true);
        }
        let growth = bytes.len() as u16 - old.len;
        if self.can_fit_in_place(growth as usize)? {
            self.rewrite_in_place(slot_idx, bytes)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn tombstone(&mut self, slot_idx: u16) -> DbResult<()> {
        self.write_slot(slot_idx, &Slot::tombstone())
    }

    pub fn set_forward(&mut self, slot_idx: u16, to: RecordId) -> DbResult<()> {
        self.write_slot(slot_idx, &Slot::forwarding(to))
    }

    /// Place `bytes` at exactly `slot_idx`, padding any skipped slots
    /// with tombstones. Used only by crash recovery to redo a write at
    /// its original RID instead of appending at the tail; a no-op if
    /// the slot already holds identical bytes, since redo must be safe
    /// to run against a page that already reflects the write.
    pub fn redo_put(&mut self, slot_idx: u16, bytes: &[u8]) -> DbResult<()> {
        if bytes.len() > u16::MAX as usize {
            return Err(DbError::Storage("row exceeds maximum tuple size".into()));
        }
        let mut header = self.header()?;

        if slot_idx < header.num_slots {
            let slot = self.slot(slot_idx)?;
            if !slot.is_tombstone() {
                let start = slot.offset as usize;
                let end = start + slot.len as usize;
                if self.data[start..end] == *bytes {
                    return Ok(());
                }
                if bytes.len() as u16 == slot.len {
                    self.data[start..end].copy_from_slice(bytes);
                    return Ok(());
                }
            }
            let len = bytes.len() as u16;
            if !self.can_fit(len as usize)? {
                return Err(DbError::Storage("page full during redo".into()));
            }
            let new_free_offset = header.free_offset - len;
            self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);
            self.write_slot(slot_idx, &Slot::live(new_free_offset, len))?;
            header.free_offset = new_free_offset;
            return self.write_header(&header);
        }

        while header.num_slots < slot_idx {
            self.write_slot(header.num_slots, &Slot::tombstone())?;
            header.num_slots += 1;
        }
        let len = bytes.len() as u16;
        if !self.can_fit(len as usize)? {
            return Err(DbError::Storage("page full during redo".into()));
        }
        let new_free_offset = header.free_offset - len;
        self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);
        self.write_slot(slot_idx, &Slot::live(new_free_offset, len))?;
        header.num_slots = slot_idx + 1;
        header.free_offset = new_free_offset;
        self.write_header(&header)
    }

    /// Tombstone `slot_idx` for redo purposes: a no-op if the slot was
    /// never allocated, since there is nothing to delete.
    pub fn redo_tombstone(&mut self, slot_idx: u16) -> DbResult<()> {
        let header = self.header()?;
        if slot_idx >= header.num_slots {
            return Ok(());
        }
        self.write_slot(slot_idx, &Slot::tombstone())
    }
}
