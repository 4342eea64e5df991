use super::*;
use std::io;
use types::Value;

#[test]
fn config_defaults_are_sane() {
    let cfg = KernelConfig::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.buffer_pool_capacity, 256);
    assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
    assert!(cfg.checkpoint_interval.is_none());
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));
}

#[test]
fn row_tracks_optional_rid() {
    let mut row = Row::new(vec![Value::I32(1)]);
    assert_eq!(row.rid(), None);
    row.set_rid(Some(RecordId::new(PageId(3), 1)));
    assert_eq!(row.rid(), Some(RecordId::new(PageId(3), 1)));
}

#[test]
fn page_id_invalid_sentinel() {
    assert!(!PageId::INVALID.is_valid());
    assert!(PageId(0).is_valid());
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
