//! B+ tree key type and node layout.

use common::{PageId, RecordId};
use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::Value;

/// A single-column index key. Restricted to the types the base design
/// allows ({i32, i64, f32, f64, string}); composite keys and the rest of
/// `Value`'s variants (bool, i8/i16, null) aren't indexable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Key {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Key {
    /// Validate and narrow a `Value` into an index key. Rejects `NaN`
    /// since float keys must form a total order.
    pub fn try_from_value(value: &Value) -> DbResult<Key> {
        match value {
            Value::I32(n) => Ok(Key::I32(*n)),
            Value::I64(n) => Ok(Key::I64(*n)),
            Value::F32(f) if f.is_nan() => Err(DbError::Index("NaN is not a valid index key".into())),
            Value::F32(f) => Ok(Key::F32(*f)),
            Value::F64(f) if f.is_nan() => Err(DbError::Index("NaN is not a valid index key".into())),
            Value::F64(f) => Ok(Key::F64(*f)),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(DbError::Index(format!("{other:?} is not an indexable key type"))),
        }
    }

    /// A short tag identifying the key's variant, used to reject an
    /// index mixing key types across inserts.
    pub fn kind(&self) -> &'static str {
        match self {
            Key::I32(_) => "i32",
            Key::I64(_) => "i64",
            Key::F32(_) => "f32",
            Key::F64(_) => "f64",
            Key::Str(_) => "str",
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    /// Panics on heterogeneous comparison: `BTreeIndex` rejects a key
    /// whose kind doesn't match the tree's established kind before a
    /// `Key` of the wrong variant can ever reach here.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::I32(a), Key::I32(b)) => a.cmp(b),
            (Key::I64(a), Key::I64(b)) => a.cmp(b),
            (Key::F32(a), Key::F32(b)) => a.partial_cmp(b).expect("NaN key escaped validation"),
            (Key::F64(a), Key::F64(b)) => a.partial_cmp(b).expect("NaN key escaped validation"),
            (Key::Str(a), Key::Str(b)) => a.cmp(b),
            _ => panic!("comparing keys of different kinds ({} vs {})", self.kind(), other.kind()),
        }
    }
}

/// A B+ tree node: either an internal page of separator keys and child
/// pointers, or a leaf page of sorted `(key, rid)` entries linked to its
/// right sibling. `max_size` is not stored per-page (uniform across one
/// tree, held by `BTreeIndex` instead) — a simplification over the
/// per-page header the base design describes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BTreeNode {
    Internal {
        parent_page_id: PageId,
        /// n separator keys for n+1 children.
        keys: Vec<Key>,
        children: Vec<PageId>,
    },
    Leaf {
        parent_page_id: PageId,
        entries: Vec<(Key, RecordId)>,
        next_page_id: PageId,
    },
}

impl BTreeNode {
    pub fn new_leaf(parent_page_id: PageId) -> Self {
        BTreeNode::Leaf {
            parent_page_id,
            entries: Vec::new(),
            next_page_id: PageId::INVALID,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BTreeNode::Leaf { .. })
    }

    pub fn parent_page_id(&self) -> PageId {
        match self {
            BTreeNode::Internal { parent_page_id, .. } => *parent_page_id,
            BTreeNode::Leaf { parent_page_id, .. } => *parent_page_id,
        }
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        match self {
            BTreeNode::Internal { parent_page_id, .. } => *parent_page_id = parent,
            BTreeNode::Leaf { parent_page_id, .. } => *parent_page_id = parent,
        }
    }

    /// Number of "occupied slots": separator keys for an internal page,
    /// entries for a leaf.
    pub fn size(&self) -> usize {
        match self {
            BTreeNode::Internal { keys, .. } => keys.len(),
            BTreeNode::Leaf { entries, .. } => entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_leaf_is_empty() {
        let leaf = BTreeNode::new_leaf(PageId::INVALID);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.size(), 0);
    }

    #[test]
    fn key_ordering_is_numeric_not_lexical() {
        assert!(Key::I32(9) < Key::I32(10));
        assert!(Key::Str("9".into()) > Key::Str("10".into()));
    }

    #[test]
    fn nan_key_is_rejected() {
        assert!(Key::try_from_value(&Value::F64(f64::NAN)).is_err());
        assert!(Key::try_from_value(&Value::F64(1.0)).is_ok());
    }

    #[test]
    #[should_panic(expected = "different kinds")]
    fn heterogeneous_comparison_panics() {
        let _ = Key::I32(1).cmp(&Key::Str("a".into()));
    }
}
