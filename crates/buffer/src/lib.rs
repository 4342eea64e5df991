//! Buffer pool manager: the only path between query-executing code and
//! the disk.
//!
//! Every page access in the storage kernel — table heap, B+ tree,
//! catalog — goes through [`BufferPoolManager::fetch_page`] or
//! [`BufferPoolManager::new_page`]. The pool bounds memory use to a
//! fixed number of frames and evicts via a pluggable [`Replacer`],
//! defaulting to [`LruReplacer`].

#[cfg(test)]
mod tests;

mod replacer;

pub use replacer::{LruReplacer, Replacer};

use common::{DbError, DbResult, Lsn, PageId};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use storage::{DiskManager, PAGE_SIZE};

/// Buffer-pool bookkeeping for one frame slot. `pin_count`, `dirty` and
/// `lsn` are mutated only while the pool's internal mutex is held; the
/// page body sits behind its own `Arc<RwLock<_>>` so a caller holding a
/// [`FrameRef`] to read or write the body doesn't block unrelated pool
/// metadata operations.
struct Frame {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    lsn: Lsn,
    data: Arc<RwLock<Vec<u8>>>,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            lsn: Lsn::INVALID,
            data: Arc::new(RwLock::new(vec![0u8; PAGE_SIZE])),
        }
    }
}

/// A pinned page handle returned by `fetch_page`/`new_page`. Holding one
/// keeps the underlying page resident; callers must pair it with
/// [`BufferPoolManager::unpin_page`] before returning, even on error.
/// Body access goes through `latch`; pin count, dirty flag and LSN live
/// in the pool and are queried via [`BufferPoolManager::frame_lsn`] etc.
#[derive(Clone, Debug)]
pub struct FrameRef {
    pub page_id: PageId,
    pub latch: Arc<RwLock<Vec<u8>>>,
}

struct Inner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, usize>,
    free_list: Vec<usize>,
    replacer: Box<dyn Replacer>,
}

impl Inner {
    /// Find a frame to host a new page: prefer the free list, then ask
    /// the replacer for a victim. Writes the victim back first if dirty.
    fn acquire_frame_slot(&mut self, disk: &Mutex<DiskManager>) -> DbResult<usize> {
        if let Some(idx) = self.free_list.pop() {
            return Ok(idx);
        }
        let idx = self
            .replacer
            .victim()
            .ok_or_else(|| DbError::BufferPool("no evictable page".into()))?;
        let victim_page_id = self.frames[idx].page_id;
        if self.frames[idx].dirty {
            let bytes = self.frames[idx].data.read().clone();
            disk.lock().write_page(victim_page_id, &bytes)?;
        }
        self.page_table.remove(&victim_page_id);
        Ok(idx)
    }
}

/// Bounded in-memory cache of pages, backed by a [`DiskManager`], with
/// eviction delegated to a [`Replacer`].
pub struct BufferPoolManager {
    disk: Mutex<DiskManager>,
    inner: Mutex<Inner>,
}

impl BufferPoolManager {
    /// Build a pool of `capacity` frames over `disk`, using `replacer`
    /// for eviction.
    pub fn new(disk: DiskManager, capacity: usize, replacer: Box<dyn Replacer>) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        let frames = (0..capacity).map(|_| Frame::empty()).collect();
        Self {
            disk: Mutex::new(disk),
            inner: Mutex::new(Inner {
                frames,
                page_table: HashMap::new(),
                free_list: (0..capacity).collect(),
                replacer,
            }),
        }
    }

    /// Build a pool with the default [`LruReplacer`].
    pub fn with_lru(disk: DiskManager, capacity: usize) -> Self {
        Self::new(disk, capacity, Box::new(LruReplacer::new()))
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().frames.len()
    }

    fn pin_resident(inner: &mut Inner, idx: usize) -> FrameRef {
        inner.replacer.pin(idx);
        let frame = &mut inner.frames[idx];
        frame.pin_count += 1;
        FrameRef {
            page_id: frame.page_id,
            latch: frame.data.clone(),
        }
    }

    /// Fetch `id`, loading it from disk if not resident. Increments its
    /// pin count. Fails with `NoEvictablePage` only when every frame is
    /// pinned and `id` is not already resident.
    pub fn fetch_page(&self, id: PageId) -> DbResult<FrameRef> {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.page_table.get(&id) {
            return Ok(Self::pin_resident(&mut inner, idx));
        }

        let idx = inner.acquire_frame_slot(&self.disk)?;
        let mut body = vec![0u8; PAGE_SIZE];
        self.disk.lock().read_page(id, &mut body)?;
        inner.frames[idx] = Frame {
            page_id: id,
            pin_count: 1,
            dirty: false,
            lsn: Lsn::INVALID,
            data: Arc::new(RwLock::new(body)),
        };
        inner.page_table.insert(id, idx);
        tracing::trace!(page_id = id.0, frame = idx, "fetched page");
        let frame = &inner.frames[idx];
        Ok(FrameRef {
            page_id: frame.page_id,
            latch: frame.data.clone(),
        })
    }

    /// Same as `fetch_page`, but if the page has never been allocated on
    /// disk it is created zero-filled instead of failing. Supplements the
    /// base design's strict "must already exist" fetch with the original
    /// implementation's `GetSpecificPage` convenience.
    pub fn fetch_page_or_create(&self, id: PageId) -> DbResult<FrameRef> {
        let exists = id.0 < self.disk.lock().num_pages()? as u64;
        if exists {
            return self.fetch_page(id);
        }
        let mut inner = self.inner.lock();
        let idx = inner.acquire_frame_slot(&self.disk)?;
        self.disk.lock().write_page(id, &vec![0u8; PAGE_SIZE])?;
        inner.frames[idx] = Frame {
            page_id: id,
            pin_count: 1,
            dirty: true,
            lsn: Lsn::INVALID,
            data: Arc::new(RwLock::new(vec![0u8; PAGE_SIZE])),
        };
        inner.page_table.insert(id, idx);
        let frame = &inner.frames[idx];
        Ok(FrameRef {
            page_id: frame.page_id,
            latch: frame.data.clone(),
        })
    }

    /// Allocate a fresh page via the disk manager and pin it, ready for a
    /// caller to populate.
    pub fn new_page(&self) -> DbResult<(PageId, FrameRef)> {
        let mut inner = self.inner.lock();
        let idx = inner.acquire_frame_slot(&self.disk)?;
        let id = self.disk.lock().allocate_page()?;
        inner.frames[idx] = Frame {
            page_id: id,
            pin_count: 1,
            dirty: true,
            lsn: Lsn::INVALID,
            data: Arc::new(RwLock::new(vec![0u8; PAGE_SIZE])),
        };
        inner.page_table.insert(id, idx);
        tracing::trace!(page_id = id.0, frame = idx, "allocated new page");
        let frame = &inner.frames[idx];
        Ok((
            id,
            FrameRef {
                page_id: frame.page_id,
                latch: frame.data.clone(),
            },
        ))
    }

    /// Decrement `id`'s pin count and OR `dirty_hint` into its dirty
    /// flag. Once the count reaches zero the frame becomes eligible for
    /// eviction.
    pub fn unpin_page(&self, id: PageId, dirty_hint: bool) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let Some(&idx) = inner.page_table.get(&id) else {
            return Err(DbError::BufferPool(format!("page {} not resident", id.0)));
        };
        let frame = &mut inner.frames[idx];
        debug_assert!(frame.pin_count > 0, "unpin on a frame with zero pins");
        frame.pin_count = frame.pin_count.saturating_sub(1);
        frame.dirty |= dirty_hint;
        if frame.pin_count == 0 {
            inner.replacer.unpin(idx);
        }
        Ok(())
    }

    /// Force-write `id` to disk if resident, regardless of its dirty
    /// flag.
    pub fn flush_page(&self, id: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let Some(&idx) = inner.page_table.get(&id) else {
            return Ok(());
        };
        let bytes = inner.frames[idx].data.read().clone();
        self.disk.lock().write_page(id, &bytes)?;
        inner.frames[idx].dirty = false;
        Ok(())
    }

    /// Write back every dirty resident frame.
    pub fn flush_all(&self) -> DbResult<()> {
        let ids: Vec<PageId> = self.inner.lock().page_table.keys().copied().collect();
        for id in ids {
            self.flush_page(id)?;
        }
        self.disk.lock().flush()
    }

    /// Evict `id` and deallocate it on disk. Fails if the page is still
    /// pinned.
    pub fn delete_page(&self, id: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.page_table.get(&id) {
            if inner.frames[idx].pin_count > 0 {
                return Err(DbError::BufferPool(format!(
                    "page {} is pinned and cannot be deleted",
                    id.0
                )));
            }
            inner.replacer.pin(idx); // remove from eviction eligibility
            inner.page_table.remove(&id);
            inner.free_list.push(idx);
            inner.frames[idx] = Frame::empty();
        }
        drop(inner);
        self.disk.lock().deallocate_page(id);
        Ok(())
    }

    /// Mark a resident frame's LSN, used by the WAL/recovery layer to
    /// enforce the write-ahead rule before a page is flushed.
    pub fn set_page_lsn(&self, id: PageId, lsn: Lsn) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let Some(&idx) = inner.page_table.get(&id) else {
            return Err(DbError::BufferPool(format!("page {} not resident", id.0)));
        };
        inner.frames[idx].lsn = lsn;
        Ok(())
    }

    /// Current LSN recorded against a resident frame, or `Lsn::INVALID`
    /// if it isn't resident.
    pub fn frame_lsn(&self, id: PageId) -> Lsn {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&id)
            .map(|&idx| inner.frames[idx].lsn)
            .unwrap_or(Lsn::INVALID)
    }

    /// Current pin count for `id`, or 0 if not resident.
    pub fn pin_count(&self, id: PageId) -> u32 {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&id)
            .map(|&idx| inner.frames[idx].pin_count)
            .unwrap_or(0)
    }
}
