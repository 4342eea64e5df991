//! Transaction lifecycle and two-phase locking for the storage kernel.
//!
//! Two pieces, deliberately independent of `heap`/`btree`/`catalog`:
//! [`LockManager`] serializes access to individual `RecordId`s, and
//! [`TransactionManager`] drives begin/commit/abort against the
//! write-ahead log. Physical undo during `abort` is delegated to an
//! [`UndoHandler`] the kernel implements, so this crate never needs to
//! know what a table heap is.

mod lock_manager;
mod transaction;
mod transaction_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{IsolationLevel, Transaction, TxnState, WriteRecord};
pub use transaction_manager::{TransactionManager, UndoHandler};
