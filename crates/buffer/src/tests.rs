use super::*;
use tempfile::tempdir;

fn pool(capacity: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let disk = DiskManager::open(dir.path().join("data.db")).unwrap();
    (BufferPoolManager::with_lru(disk, capacity), dir)
}

#[test]
fn new_page_is_pinned_and_zeroed() {
    let (bpm, _dir) = pool(4);
    let (id, frame) = bpm.new_page().unwrap();
    assert!(frame.latch.read().iter().all(|&b| b == 0));
    assert_eq!(bpm.pin_count(id), 1);
}

#[test]
fn unpin_makes_frame_eligible_for_eviction() {
    let (bpm, _dir) = pool(1);
    let (id0, _f0) = bpm.new_page().unwrap();
    bpm.unpin_page(id0, true).unwrap();

    // Capacity is 1 and the only frame is unpinned, so allocating a new
    // page must evict id0.
    let (id1, _f1) = bpm.new_page().unwrap();
    assert_ne!(id0, id1);
    assert_eq!(bpm.pin_count(id0), 0);
}

#[test]
fn all_frames_pinned_fails_eviction() {
    let (bpm, _dir) = pool(2);
    let (_id0, _f0) = bpm.new_page().unwrap();
    let (_id1, _f1) = bpm.new_page().unwrap();

    let err = bpm.new_page().unwrap_err();
    assert!(matches!(err, DbError::BufferPool(_)));
}

#[test]
fn dirty_victim_is_written_back_before_eviction() {
    let (bpm, _dir) = pool(1);
    let (id0, frame0) = bpm.new_page().unwrap();
    frame0.latch.write()[0] = 0x42;
    bpm.unpin_page(id0, true).unwrap();

    let (_id1, _f1) = bpm.new_page().unwrap();

    let refetched = bpm.fetch_page(id0).unwrap();
    assert_eq!(refetched.latch.read()[0], 0x42);
}

#[test]
fn fetch_page_or_create_extends_the_file() {
    let (bpm, _dir) = pool(4);
    let id = PageId(5);
    let frame = bpm.fetch_page_or_create(id).unwrap();
    assert!(frame.latch.read().iter().all(|&b| b == 0));
}

#[test]
fn delete_page_rejects_pinned_frame() {
    let (bpm, _dir) = pool(4);
    let (id, _frame) = bpm.new_page().unwrap();
    let err = bpm.delete_page(id).unwrap_err();
    assert!(matches!(err, DbError::BufferPool(_)));
}

#[test]
fn delete_page_succeeds_once_unpinned() {
    let (bpm, _dir) = pool(4);
    let (id, _frame) = bpm.new_page().unwrap();
    bpm.unpin_page(id, false).unwrap();
    bpm.delete_page(id).unwrap();
    assert_eq!(bpm.pin_count(id), 0);
}

#[test]
fn flush_all_clears_dirty_without_evicting() {
    let (bpm, _dir) = pool(4);
    let (id, frame) = bpm.new_page().unwrap();
    frame.latch.write()[10] = 7;
    bpm.unpin_page(id, true).unwrap();
    bpm.flush_all().unwrap();

    let refetched = bpm.fetch_page(id).unwrap();
    assert_eq!(refetched.latch.read()[10], 7);
}
