//! B+ tree index: typed single-column keys mapping to record ids.
//!
//! Every page access goes through the [`buffer::BufferPoolManager`]; page 0
//! of the tree's own data file is reserved as a header page holding the
//! current root page id (or [`PageId::INVALID`] for an empty tree). Node
//! bodies are whole-struct bincode-encoded into a frame, the same framing
//! idiom `heap` and the original `wal` use.
//!
//! Structural mutation (insert/remove) is serialized behind one
//! `RwLock<()>` per index rather than per-node latch crabbing — the base
//! design explicitly allows this simplification over Lehman-Yao style
//! concurrent B-links.


mod node;

pub use node::{BTreeNode, Key};

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use buffer::{BufferPoolManager, FrameRef};
use common::{DbError, DbResult, PageId, RecordId, TxnId};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use types::Value;

fn bincode_config() -> impl Config {
    config::legacy()
}

const HEADER_PAGE_ID: PageId = PageId(0);

/// Minimum occupancy for a non-root page after rebalance: `⌈(max_size+1)/2⌉`.
fn min_size(max_size: usize) -> usize {
    (max_size + 2) / 2
}

fn decode_node(bytes: &[u8]) -> DbResult<BTreeNode> {
    let (node, _) = decode_from_slice(bytes, bincode_config())
        .map_err(|e| DbError::Index(format!("failed to decode btree node: {e}")))?;
    Ok(node)
}

fn encode_node(node: &BTreeNode) -> DbResult<Vec<u8>> {
    let bytes = encode_to_vec(node, bincode_config())
        .map_err(|e| DbError::Index(format!("failed to encode btree node: {e}")))?;
    if bytes.len() > storage::PAGE_SIZE {
        return Err(DbError::Index(format!(
            "btree node too large: {} bytes (max {})",
            bytes.len(),
            storage::PAGE_SIZE
        )));
    }
    Ok(bytes)
}

fn decode_header(bytes: &[u8]) -> Option<PageId> {
    decode_from_slice::<u64, _>(bytes, bincode_config())
        .ok()
        .map(|(id, _)| PageId(id))
}

fn encode_header(root: PageId) -> DbResult<Vec<u8>> {
    encode_to_vec(root.0, bincode_config())
        .map_err(|e| DbError::Index(format!("failed to encode btree header: {e}")))
}

/// A persistent, typed single-column B+ tree index over record ids.
pub struct BTreeIndex {
    name: String,
    bpm: Arc<BufferPoolManager>,
    max_size: usize,
    root_page_id: RwLock<PageId>,
    /// Established by whichever of get/insert/remove/iter_from runs
    /// first against this index, then enforced on every call after.
    key_kind: Mutex<Option<&'static str>>,
    /// Serializes all structural mutation and descent; see module docs.
    tree_lock: RwLock<()>,
}

impl BTreeIndex {
    /// Open (or lazily create) an index backed by `bpm`. `max_size` bounds
    /// both leaf entries and internal separator keys.
    pub fn open(name: impl Into<String>, bpm: Arc<BufferPoolManager>, max_size: usize) -> DbResult<Self> {
        assert!(max_size >= 3, "max_size must allow at least a 2-way split");
        let root_page_id = Self::load_header(&bpm)?;
        Ok(Self {
            name: name.into(),
            bpm,
            max_size,
            root_page_id: RwLock::new(root_page_id),
            key_kind: Mutex::new(None),
            tree_lock: RwLock::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    fn load_header(bpm: &BufferPoolManager) -> DbResult<PageId> {
        let frame = bpm.fetch_page_or_create(HEADER_PAGE_ID)?;
        let candidate = decode_header(&frame.latch.read());
        bpm.unpin_page(HEADER_PAGE_ID, false)?;
        let Some(root) = candidate.filter(|id| id.is_valid()) else {
            return Ok(PageId::INVALID);
        };
        // A header surviving from an older, smaller tree may point at a
        // page that no longer exists, or one that decodes as something
        // other than a node. Either way, treat the tree as empty rather
        // than propagating a decode error up through `open`.
        match bpm.fetch_page(root) {
            Ok(frame) => {
                let ok = decode_node(&frame.latch.read()).is_ok();
                bpm.unpin_page(root, false)?;
                if ok {
                    Ok(root)
                } else {
                    Self::write_header(bpm, PageId::INVALID)?;
                    Ok(PageId::INVALID)
                }
            }
            Err(_) => {
                Self::write_header(bpm, PageId::INVALID)?;
                Ok(PageId::INVALID)
            }
        }
    }

    fn write_header(bpm: &BufferPoolManager, root: PageId) -> DbResult<()> {
        let frame = bpm.fetch_page_or_create(HEADER_PAGE_ID)?;
        let bytes = encode_header(root)?;
        frame.latch.write()[..bytes.len()].copy_from_slice(&bytes);
        bpm.unpin_page(HEADER_PAGE_ID, true)?;
        bpm.flush_page(HEADER_PAGE_ID)
    }

    fn set_root(&self, root: PageId) -> DbResult<()> {
        *self.root_page_id.write() = root;
        Self::write_header(&self.bpm, root)
    }

    fn read_node(&self, frame: &FrameRef) -> DbResult<BTreeNode> {
        decode_node(&frame.latch.read())
    }

    fn write_node(&self, frame: &FrameRef, node: &BTreeNode) -> DbResult<()> {
        let bytes = encode_node(node)?;
        let mut guard = frame.latch.write();
        guard[..bytes.len()].fill(0);
        guard[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn set_parent(&self, child: PageId, parent: PageId) -> DbResult<()> {
        let frame = self.bpm.fetch_page(child)?;
        let mut node = self.read_node(&frame)?;
        node.set_parent_page_id(parent);
        self.write_node(&frame, &node)?;
        self.bpm.unpin_page(child, true)
    }

    fn check_key_kind(&self, key: &Key) -> DbResult<()> {
        let mut guard = self.key_kind.lock();
        match *guard {
            Some(kind) if kind != key.kind() => Err(DbError::Index(format!(
                "index {} is keyed on {kind}, got a {} key",
                self.name,
                key.kind()
            ))),
            Some(_) => Ok(()),
            None => {
                *guard = Some(key.kind());
                Ok(())
            }
        }
    }

    /// `find_leaf`: descend from the root, releasing each internal page's
    /// pin before fetching its child.
    fn find_leaf(&self, key: &Key) -> DbResult<PageId> {
        let mut current = self.root_page_id();
        loop {
            let frame = self.bpm.fetch_page(current)?;
            let node = self.read_node(&frame)?;
            match node {
                BTreeNode::Leaf { .. } => {
                    self.bpm.unpin_page(current, false)?;
                    return Ok(current);
                }
                BTreeNode::Internal { keys, children, .. } => {
                    let idx = keys.partition_point(|k| k <= key);
                    let child = children[idx];
                    self.bpm.unpin_page(current, false)?;
                    current = child;
                }
            }
        }
    }

    /// Point lookup.
    pub fn get(&self, key: &Value) -> DbResult<Option<RecordId>> {
        let key = Key::try_from_value(key)?;
        self.check_key_kind(&key)?;
        let _guard = self.tree_lock.read();
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_id = self.find_leaf(&key)?;
        let frame = self.bpm.fetch_page(leaf_id)?;
        let node = self.read_node(&frame)?;
        self.bpm.unpin_page(leaf_id, false)?;
        let BTreeNode::Leaf { entries, .. } = node else {
            return Err(DbError::Index("find_leaf returned an internal page".into()));
        };
        Ok(entries
            .binary_search_by(|(k, _)| k.cmp(&key))
            .ok()
            .map(|idx| entries[idx].1))
    }

    /// Insert `key -> rid`. Overwrites the value if `key` is already
    /// present. Returns `true` on success (always, barring an error).
    pub fn insert(&self, key: &Value, rid: RecordId, _txn: TxnId) -> DbResult<bool> {
        let key = Key::try_from_value(key)?;
        self.check_key_kind(&key)?;
        let _guard = self.tree_lock.write();

        let root = self.root_page_id();
        if !root.is_valid() {
            let (leaf_id, frame) = self.bpm.new_page()?;
            let node = BTreeNode::Leaf {
                parent_page_id: PageId::INVALID,
                entries: vec![(key, rid)],
                next_page_id: PageId::INVALID,
            };
            self.write_node(&frame, &node)?;
            self.bpm.unpin_page(leaf_id, true)?;
            self.bpm.flush_page(leaf_id)?;
            self.set_root(leaf_id)?;
            tracing::debug!(index = %self.name, leaf = leaf_id.0, "created root leaf");
            return Ok(true);
        }

        if let Some((sep_key, new_child)) = self.insert_recursive(root, key, rid)? {
            let (new_root_id, frame) = self.bpm.new_page()?;
            let node = BTreeNode::Internal {
                parent_page_id: PageId::INVALID,
                keys: vec![sep_key],
                children: vec![root, new_child],
            };
            self.write_node(&frame, &node)?;
            self.bpm.unpin_page(new_root_id, true)?;
            self.bpm.flush_page(new_root_id)?;
            self.set_parent(root, new_root_id)?;
            self.set_parent(new_child, new_root_id)?;
            self.set_root(new_root_id)?;
            tracing::debug!(index = %self.name, new_root = new_root_id.0, "root split");
        }
        Ok(true)
    }

    fn insert_recursive(&self, page_id: PageId, key: Key, rid: RecordId) -> DbResult<Option<(Key, PageId)>> {
        let frame = self.bpm.fetch_page(page_id)?;
        let mut node = self.read_node(&frame)?;

        if let BTreeNode::Leaf { entries, .. } = &mut node {
            match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(idx) => entries[idx].1 = rid,
                Err(idx) => entries.insert(idx, (key, rid)),
            }
            let split = if node.size() > self.max_size {
                Some(self.split_leaf(page_id, &frame, node)?)
            } else {
                self.write_node(&frame, &node)?;
                None
            };
            self.bpm.unpin_page(page_id, true)?;
            return Ok(split);
        }

        let BTreeNode::Internal { keys, children, .. } = &node else {
            unreachable!("leaf case handled above")
        };
        let idx = keys.partition_point(|k| k <= &key);
        let child = children[idx];
        self.bpm.unpin_page(page_id, false)?;

        let Some((sep, new_child)) = self.insert_recursive(child, key, rid)? else {
            return Ok(None);
        };

        let frame = self.bpm.fetch_page(page_id)?;
        let mut node = self.read_node(&frame)?;
        let BTreeNode::Internal { keys, children, .. } = &mut node else {
            return Err(DbError::Index("expected internal page while re-fetching parent".into()));
        };
        keys.insert(idx, sep);
        children.insert(idx + 1, new_child);
        let split = if node.size() > self.max_size {
            Some(self.split_internal(page_id, &frame, node)?)
        } else {
            self.write_node(&frame, &node)?;
            None
        };
        self.bpm.unpin_page(page_id, true)?;
        Ok(split)
    }

    fn split_leaf(&self, page_id: PageId, frame: &FrameRef, node: BTreeNode) -> DbResult<(Key, PageId)> {
        let BTreeNode::Leaf {
            parent_page_id,
            mut entries,
            next_page_id,
        } = node
        else {
            unreachable!("caller only passes leaves")
        };
        let s = (entries.len() + 1) / 2;
        let right_entries = entries.split_off(s);
        let sep_key = right_entries[0].0.clone();

        let (new_page_id, new_frame) = self.bpm.new_page()?;
        let right = BTreeNode::Leaf {
            parent_page_id,
            entries: right_entries,
            next_page_id,
        };
        self.write_node(&new_frame, &right)?;
        self.bpm.unpin_page(new_page_id, true)?;
        self.bpm.flush_page(new_page_id)?;

        let left = BTreeNode::Leaf {
            parent_page_id,
            entries,
            next_page_id: new_page_id,
        };
        self.write_node(frame, &left)?;
        self.bpm.flush_page(page_id)?;
        Ok((sep_key, new_page_id))
    }

    fn split_internal(&self, page_id: PageId, frame: &FrameRef, node: BTreeNode) -> DbResult<(Key, PageId)> {
        let BTreeNode::Internal {
            parent_page_id,
            mut keys,
            mut children,
        } = node
        else {
            unreachable!("caller only passes internal pages")
        };
        let s = keys.len() / 2;
        let sep_key = keys[s].clone();
        let right_keys = keys.split_off(s + 1);
        keys.truncate(s);
        let right_children = children.split_off(s + 1);

        let (new_page_id, new_frame) = self.bpm.new_page()?;
        for &child in &right_children {
            self.set_parent(child, new_page_id)?;
        }
        let right = BTreeNode::Internal {
            parent_page_id,
            keys: right_keys,
            children: right_children,
        };
        self.write_node(&new_frame, &right)?;
        self.bpm.unpin_page(new_page_id, true)?;
        self.bpm.flush_page(new_page_id)?;

        let left = BTreeNode::Internal {
            parent_page_id,
            keys,
            children,
        };
        self.write_node(frame, &left)?;
        self.bpm.flush_page(page_id)?;
        Ok((sep_key, new_page_id))
    }

    /// Remove `key`. Returns `false` if it wasn't present.
    pub fn remove(&self, key: &Value, _txn: TxnId) -> DbResult<bool> {
        let key = Key::try_from_value(key)?;
        self.check_key_kind(&key)?;
        let _guard = self.tree_lock.write();

        if self.is_empty() {
            return Ok(false);
        }
        let leaf_id = self.find_leaf(&key)?;
        let frame = self.bpm.fetch_page(leaf_id)?;
        let mut node = self.read_node(&frame)?;
        let BTreeNode::Leaf { entries, parent_page_id, .. } = &mut node else {
            return Err(DbError::Index("find_leaf returned an internal page".into()));
        };
        let Ok(idx) = entries.binary_search_by(|(k, _)| k.cmp(&key)) else {
            self.bpm.unpin_page(leaf_id, false)?;
            return Ok(false);
        };
        entries.remove(idx);
        let is_root = !parent_page_id.is_valid();
        let underfull = node.size() < min_size(self.max_size) && !is_root;
        self.write_node(&frame, &node)?;
        self.bpm.unpin_page(leaf_id, true)?;

        if underfull {
            self.coalesce_or_redistribute(leaf_id)?;
        }
        self.adjust_root()?;
        Ok(true)
    }

    /// After a delete may have emptied the root's sole child out from
    /// under it (internal root at size 0) or the root itself is now an
    /// empty leaf, fix up `root_page_id`.
    fn adjust_root(&self) -> DbResult<()> {
        let root = self.root_page_id();
        if !root.is_valid() {
            return Ok(());
        }
        let frame = self.bpm.fetch_page(root)?;
        let node = self.read_node(&frame)?;
        self.bpm.unpin_page(root, false)?;
        match node {
            BTreeNode::Internal { children, .. } if children.len() == 1 => {
                let only_child = children[0];
                self.bpm.delete_page(root)?;
                self.set_parent(only_child, PageId::INVALID)?;
                self.set_root(only_child)?;
                tracing::debug!(index = %self.name, new_root = only_child.0, "promoted sole child to root");
            }
            BTreeNode::Leaf { entries, .. } if entries.is_empty() => {
                self.bpm.delete_page(root)?;
                self.set_root(PageId::INVALID)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn coalesce_or_redistribute(&self, page_id: PageId) -> DbResult<()> {
        let frame = self.bpm.fetch_page(page_id)?;
        let node = self.read_node(&frame)?;
        let parent_id = node.parent_page_id();
        self.bpm.unpin_page(page_id, false)?;
        if !parent_id.is_valid() {
            return Ok(());
        }

        let parent_frame = self.bpm.fetch_page(parent_id)?;
        let mut parent = self.read_node(&parent_frame)?;
        let BTreeNode::Internal { keys, children, .. } = &mut parent else {
            return Err(DbError::Index("parent page is not internal".into()));
        };
        let my_idx = children
            .iter()
            .position(|&c| c == page_id)
            .expect("node missing from its own parent's child list");

        let (sibling_idx, sibling_is_left) = if my_idx > 0 {
            (my_idx - 1, true)
        } else {
            (my_idx + 1, false)
        };
        let sibling_id = children[sibling_idx];

        let sibling_frame = self.bpm.fetch_page(sibling_id)?;
        let sibling_node = self.read_node(&sibling_frame)?;
        let node_frame = self.bpm.fetch_page(page_id)?;
        let node = self.read_node(&node_frame)?;

        if node.size() + sibling_node.size() < self.max_size {
            let (left_id, left_frame, left_node, right_id, right_node, sep_idx) = if sibling_is_left {
                (sibling_id, &sibling_frame, sibling_node, page_id, node, sibling_idx)
            } else {
                (page_id, &node_frame, node, sibling_id, sibling_node, my_idx)
            };
            self.merge_into_left(left_frame, left_node, right_node, right_id)?;
            self.bpm.unpin_page(left_id, true)?;
            self.bpm.unpin_page(right_id, false)?;
            self.bpm.delete_page(right_id)?;

            keys.remove(sep_idx);
            children.retain(|&c| c != right_id);
            let parent_underfull = parent.size() < min_size(self.max_size) && parent.parent_page_id().is_valid();
            self.write_node(&parent_frame, &parent)?;
            self.bpm.unpin_page(parent_id, true)?;

            if parent_underfull {
                self.coalesce_or_redistribute(parent_id)?;
            }
        } else {
            self.bpm.unpin_page(sibling_id, false)?;
            self.bpm.unpin_page(page_id, false)?;
            self.redistribute(&parent_frame, &mut parent, my_idx, sibling_idx, sibling_is_left)?;
            self.write_node(&parent_frame, &parent)?;
            self.bpm.unpin_page(parent_id, true)?;
        }
        Ok(())
    }

    /// Merge `right` into `left` (already known to fit), fixing the leaf
    /// sibling chain and, for internal pages, re-parenting the moved
    /// children.
    fn merge_into_left(
        &self,
        left_frame: &FrameRef,
        left: BTreeNode,
        right: BTreeNode,
        right_id: PageId,
    ) -> DbResult<()> {
        match (left, right) {
            (
                BTreeNode::Leaf {
                    parent_page_id,
                    mut entries,
                    ..
                },
                BTreeNode::Leaf {
                    entries: right_entries,
                    next_page_id: right_next,
                    ..
                },
            ) => {
                entries.extend(right_entries);
                let merged = BTreeNode::Leaf {
                    parent_page_id,
                    entries,
                    next_page_id: right_next,
                };
                self.write_node(left_frame, &merged)
            }
            (
                BTreeNode::Internal {
                    parent_page_id,
                    mut keys,
                    mut children,
                },
                BTreeNode::Internal {
                    keys: right_keys,
                    children: right_children,
                    ..
                },
            ) => {
                // The separator key being removed from the parent becomes
                // the boundary key between the two halves.
                let sep = self.separator_for(parent_page_id, right_id)?;
                keys.push(sep);
                keys.extend(right_keys);
                let left_id = left_frame.page_id;
                for &child in &right_children {
                    self.set_parent(child, left_id)?;
                }
                children.extend(right_children);
                let merged = BTreeNode::Internal {
                    parent_page_id,
                    keys,
                    children,
                };
                self.write_node(left_frame, &merged)?;
                Ok(())
            }
            _ => Err(DbError::Index("cannot merge a leaf with an internal page".into())),
        }
    }

    fn separator_for(&self, parent_id: PageId, right_child: PageId) -> DbResult<Key> {
        let frame = self.bpm.fetch_page(parent_id)?;
        let node = self.read_node(&frame)?;
        self.bpm.unpin_page(parent_id, false)?;
        let BTreeNode::Internal { keys, children, .. } = node else {
            return Err(DbError::Index("parent page is not internal".into()));
        };
        let idx = children
            .iter()
            .position(|&c| c == right_child)
            .ok_or_else(|| DbError::Index("child not found under its parent".into()))?;
        Ok(keys[idx - 1].clone())
    }

    /// Borrow one entry from `sibling_idx` into the underfull child at
    /// `my_idx`, updating the parent's separator key.
    fn redistribute(
        &self,
        _parent_frame: &FrameRef,
        parent: &mut BTreeNode,
        my_idx: usize,
        sibling_idx: usize,
        sibling_is_left: bool,
    ) -> DbResult<()> {
        let BTreeNode::Internal { keys, children, .. } = parent else {
            return Err(DbError::Index("parent page is not internal".into()));
        };
        let node_id = children[my_idx];
        let sibling_id = children[sibling_idx];
        let sep_idx = if sibling_is_left { my_idx - 1 } else { my_idx };

        let node_frame = self.bpm.fetch_page(node_id)?;
        let mut node = self.read_node(&node_frame)?;
        let sibling_frame = self.bpm.fetch_page(sibling_id)?;
        let mut sibling = self.read_node(&sibling_frame)?;

        match (&mut node, &mut sibling) {
            (BTreeNode::Leaf { entries, .. }, BTreeNode::Leaf { entries: sib_entries, .. }) => {
                if sibling_is_left {
                    let (k, rid) = sib_entries.pop().expect("sibling has an entry to lend");
                    entries.insert(0, (k, rid));
                } else {
                    let (k, rid) = sib_entries.remove(0);
                    entries.push((k, rid));
                }
                keys[sep_idx] = if sibling_is_left {
                    entries[0].0.clone()
                } else {
                    sib_entries[0].0.clone()
                };
            }
            (
                BTreeNode::Internal { keys: node_keys, children: node_children, .. },
                BTreeNode::Internal { keys: sib_keys, children: sib_children, .. },
            ) => {
                if sibling_is_left {
                    let borrowed_child = sib_children.pop().expect("sibling has a child to lend");
                    let borrowed_key = sib_keys.pop().expect("sibling has a key to lend");
                    node_keys.insert(0, keys[sep_idx].clone());
                    node_children.insert(0, borrowed_child);
                    self.set_parent(borrowed_child, node_id)?;
                    keys[sep_idx] = borrowed_key;
                } else {
                    let borrowed_child = sib_children.remove(0);
                    let borrowed_key = sib_keys.remove(0);
                    node_keys.push(keys[sep_idx].clone());
                    node_children.push(borrowed_child);
                    self.set_parent(borrowed_child, node_id)?;
                    keys[sep_idx] = borrowed_key;
                }
            }
            _ => return Err(DbError::Index("sibling pages have mismatched kinds".into())),
        }

        self.write_node(&node_frame, &node)?;
        self.write_node(&sibling_frame, &sibling)?;
        self.bpm.unpin_page(node_id, true)?;
        self.bpm.unpin_page(sibling_id, true)?;
        Ok(())
    }

    /// A cursor positioned at the first entry with key ≥ `key`.
    pub fn iter_from(&self, key: &Value) -> DbResult<LeafCursor<'_>> {
        let key = Key::try_from_value(key)?;
        self.check_key_kind(&key)?;
        let _guard = self.tree_lock.read();
        if self.is_empty() {
            return Ok(LeafCursor {
                index: self,
                page_id: PageId::INVALID,
                slot: 0,
            });
        }
        let leaf_id = self.find_leaf(&key)?;
        let frame = self.bpm.fetch_page(leaf_id)?;
        let node = self.read_node(&frame)?;
        self.bpm.unpin_page(leaf_id, false)?;
        let BTreeNode::Leaf { entries, .. } = node else {
            return Err(DbError::Index("find_leaf returned an internal page".into()));
        };
        let slot = entries.partition_point(|(k, _)| k < &key);
        Ok(LeafCursor {
            index: self,
            page_id: leaf_id,
            slot,
        })
    }
}

/// Forward-only iteration over a leaf chain. Holds no pin between calls
/// to `next` — each call briefly fetches its current leaf under a shared
/// latch.
pub struct LeafCursor<'a> {
    index: &'a BTreeIndex,
    page_id: PageId,
    slot: usize,
}

impl<'a> LeafCursor<'a> {
    pub fn next(&mut self) -> DbResult<Option<(Value, RecordId)>> {
        loop {
            if !self.page_id.is_valid() {
                return Ok(None);
            }
            let frame = self.index.bpm.fetch_page(self.page_id)?;
            let node = self.index.read_node(&frame)?;
            self.index.bpm.unpin_page(self.page_id, false)?;
            let BTreeNode::Leaf { entries, next_page_id, .. } = node else {
                return Err(DbError::Index("leaf cursor landed on an internal page".into()));
            };
            if self.slot < entries.len() {
                let (key, rid) = entries[self.slot].clone();
                self.slot += 1;
                return Ok(Some((key_to_value(key), rid)));
            }
            self.page_id = next_page_id;
            self.slot = 0;
        }
    }
}

fn key_to_value(key: Key) -> Value {
    match key {
        Key::I32(n) => Value::I32(n),
        Key::I64(n) => Value::I64(n),
        Key::F32(f) => Value::F32(f),
        Key::F64(f) => Value::F64(f),
        Key::Str(s) => Value::Str(s),
    }
}
