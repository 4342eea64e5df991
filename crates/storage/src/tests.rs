use super::*;
use common::PageId;
use tempfile::tempdir;

#[test]
fn allocate_pages_are_monotonic_and_zeroed() {
    let dir = tempdir().unwrap();
    let mut dm = DiskManager::open(dir.path().join("data.db")).unwrap();

    let p0 = dm.allocate_page().unwrap();
    let p1 = dm.allocate_page().unwrap();
    assert_eq!(p0, PageId(0));
    assert_eq!(p1, PageId(1));

    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(p1, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let mut dm = DiskManager::open(dir.path().join("data.db")).unwrap();
    let id = dm.allocate_page().unwrap();

    let mut payload = vec![0u8; PAGE_SIZE];
    payload[0] = 0xAB;
    payload[PAGE_SIZE - 1] = 0xCD;
    dm.write_page(id, &payload).unwrap();
    dm.flush().unwrap();

    let mut buf = vec![0u8; PAGE_SIZE];
    dm.read_page(id, &mut buf).unwrap();
    assert_eq!(buf, payload);
}

#[test]
fn read_unallocated_page_fails() {
    let dir = tempdir().unwrap();
    let mut dm = DiskManager::open(dir.path().join("data.db")).unwrap();
    let mut buf = vec![0u8; PAGE_SIZE];
    let err = dm.read_page(PageId(3), &mut buf).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
}

#[test]
fn reopen_continues_page_count_from_file_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    {
        let mut dm = DiskManager::open(&path).unwrap();
        dm.allocate_page().unwrap();
        dm.allocate_page().unwrap();
        dm.flush().unwrap();
    }
    let mut dm = DiskManager::open(&path).unwrap();
    assert_eq!(dm.num_pages().unwrap(), 2);
    let next = dm.allocate_page().unwrap();
    assert_eq!(next, PageId(2));
}

#[test]
fn deallocated_pages_are_recycled() {
    let dir = tempdir().unwrap();
    let mut dm = DiskManager::open(dir.path().join("data.db")).unwrap();
    let p0 = dm.allocate_page().unwrap();
    dm.allocate_page().unwrap();
    dm.deallocate_page(p0);
    let recycled = dm.allocate_page().unwrap();
    assert_eq!(recycled, p0);
}
