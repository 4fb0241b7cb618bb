//! B-tree node types and serialization.
//!
//! Every node occupies exactly one block and is identified by its block
//! address. Two node kinds share one header:
//! - Index nodes (level > 0): `(key, child_block)` entries, where `key` is
//!   the smallest key reachable through `child_block`
//! - Leaf nodes (level 0): `(key, id)` entries, doubly-linked with their
//!   siblings for range scans
//!
//! A node is owned by exactly one scope. It is written back by
//! `release`, which consumes it; dropping a dirty node without releasing it
//! discards the changes and logs a warning.

// Entry counts are bounded by the block length, which fits in i32.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::btree::layout::{INDEX_ENTRY_SIZE, ID_SIZE, KEY_SIZE, NODE_HEADER_SIZE, NodeLayout};
use crate::btree::store::NodeStore;
use crate::candidate::Candidate;
use crate::storage::{Block, BlockId, FileError, decode_block_id, encode_block_id};

/// Level of every leaf node.
pub const LEAF_LEVEL: u8 = 0;

/// Node header field offsets.
mod offsets {
    pub const LEVEL: usize = 0;
    pub const NUM_ENTRIES: usize = 1;
    pub const LEFT_SIBLING: usize = 5;
    pub const RIGHT_SIBLING: usize = 9;
}

/// Node kind, derived from the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Index,
    Leaf,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Leaf => write!(f, "leaf"),
        }
    }
}

/// Header shared by both node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub level: u8,
    pub num_entries: usize,
    pub left_sibling: Option<BlockId>,
    pub right_sibling: Option<BlockId>,
}

impl NodeHeader {
    /// Read a node header, rejecting entry counts above `capacity`.
    pub fn from_block(block: BlockId, data: &Block, capacity: usize) -> Result<Self, NodeError> {
        let raw = data.read_i32(offsets::NUM_ENTRIES);
        let num_entries = usize::try_from(raw)
            .ok()
            .filter(|&n| n <= capacity)
            .ok_or(NodeError::EntryCountOutOfRange {
                block,
                num_entries: raw,
                capacity,
            })?;

        Ok(Self {
            level: data.read_u8(offsets::LEVEL),
            num_entries,
            left_sibling: decode_address(block, data.read_i32(offsets::LEFT_SIBLING))?,
            right_sibling: decode_address(block, data.read_i32(offsets::RIGHT_SIBLING))?,
        })
    }

    /// Write a node header to a block.
    pub fn write_to_block(&self, data: &mut Block) {
        data.write_u8(offsets::LEVEL, self.level);
        data.write_i32(offsets::NUM_ENTRIES, self.num_entries as i32);
        data.write_i32(offsets::LEFT_SIBLING, encode_block_id(self.left_sibling));
        data.write_i32(offsets::RIGHT_SIBLING, encode_block_id(self.right_sibling));
    }
}

fn decode_address(block: BlockId, raw: i32) -> Result<Option<BlockId>, NodeError> {
    decode_block_id(raw).map_err(|raw| NodeError::InvalidAddress { block, raw })
}

/// An index (non-leaf) node.
///
/// Entries are appended in ascending key order during bulk load and never
/// inserted mid-array. `key(i)` is the first key reachable from `child(i)`.
#[derive(Debug)]
pub struct IndexNode {
    block: BlockId,
    level: u8,
    left_sibling: Option<BlockId>,
    right_sibling: Option<BlockId>,
    keys: Vec<f32>,
    children: Vec<BlockId>,
    capacity: usize,
    dirty: bool,
}

impl IndexNode {
    /// Allocate a new, empty index node at `level`.
    ///
    /// # Panics
    /// Panics if `level` is the leaf level.
    pub fn init(level: u8, store: &mut NodeStore) -> Result<Self, NodeError> {
        assert!(level > LEAF_LEVEL, "index nodes live above the leaf level");
        let capacity = store.layout().index_capacity();
        let block = store.allocate()?;

        Ok(Self {
            block,
            level,
            left_sibling: None,
            right_sibling: None,
            keys: Vec::with_capacity(capacity),
            children: Vec::with_capacity(capacity),
            capacity,
            dirty: true,
        })
    }

    /// Load an existing index node from `block`.
    pub fn init_restore(store: &mut NodeStore, block: BlockId) -> Result<Self, NodeError> {
        let data = store.read(block)?;
        Self::read_from_block(block, &data, store.layout())
    }

    /// Decode an index node stored at `block`.
    pub fn read_from_block(
        block: BlockId,
        data: &Block,
        layout: &NodeLayout,
    ) -> Result<Self, NodeError> {
        let capacity = layout.index_capacity();
        let header = NodeHeader::from_block(block, data, capacity)?;
        if header.level == LEAF_LEVEL {
            return Err(NodeError::WrongLevel {
                block,
                level: header.level,
                expected: NodeKind::Index,
            });
        }

        let mut keys = Vec::with_capacity(capacity);
        let mut children = Vec::with_capacity(capacity);
        let mut offset = NODE_HEADER_SIZE;

        for _ in 0..header.num_entries {
            keys.push(data.read_f32(offset));
            let raw = data.read_i32(offset + KEY_SIZE);
            let child = decode_address(block, raw)?.ok_or(NodeError::InvalidAddress { block, raw })?;
            children.push(child);
            offset += INDEX_ENTRY_SIZE;
        }

        Ok(Self {
            block,
            level: header.level,
            left_sibling: header.left_sibling,
            right_sibling: header.right_sibling,
            keys,
            children,
            capacity,
            dirty: false,
        })
    }

    /// Encode this node into a fresh block.
    #[must_use]
    pub fn write_to_block(&self, layout: &NodeLayout) -> Block {
        let mut data = Block::zeroed(layout.block_length());
        self.header().write_to_block(&mut data);

        let mut offset = NODE_HEADER_SIZE;
        for (key, child) in self.keys.iter().zip(&self.children) {
            data.write_f32(offset, *key);
            data.write_i32(offset + KEY_SIZE, encode_block_id(Some(*child)));
            offset += INDEX_ENTRY_SIZE;
        }
        data
    }

    /// Append `(key, child)`; the caller feeds keys in ascending order.
    ///
    /// # Panics
    /// Panics if the node is full.
    pub fn add_new_child(&mut self, key: f32, child: BlockId) {
        assert!(
            !self.is_full(),
            "index node {} is full ({} entries)",
            self.block,
            self.capacity
        );
        self.keys.push(key);
        self.children.push(child);
        self.dirty = true;
    }

    /// Position of the last entry whose key is `<= key`, or `None` if `key`
    /// is below every entry.
    #[must_use]
    pub fn find_position_by_key(&self, key: f32) -> Option<usize> {
        self.keys.partition_point(|&k| k <= key).checked_sub(1)
    }

    /// Child to descend into for `key`. Keys below the first separator
    /// still descend into the first child.
    #[must_use]
    pub fn child_for_key(&self, key: f32) -> Option<BlockId> {
        let pos = self.find_position_by_key(key).unwrap_or(0);
        self.children.get(pos).copied()
    }

    /// Load the left sibling, if any.
    pub fn get_left_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        self.left_sibling
            .map(|b| Self::init_restore(store, b))
            .transpose()
    }

    /// Load the right sibling, if any.
    pub fn get_right_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        self.right_sibling
            .map(|b| Self::init_restore(store, b))
            .transpose()
    }

    /// Write the node back if it was modified, then drop it.
    pub fn release(mut self, store: &mut NodeStore) -> Result<(), NodeError> {
        if self.dirty {
            let data = self.write_to_block(store.layout());
            store.write(self.block, &data)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Separator key of entry `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> f32 {
        self.keys[index]
    }

    /// Child block of entry `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> BlockId {
        self.children[index]
    }

    /// Smallest key in the node.
    #[must_use]
    pub fn key_of_node(&self) -> Option<f32> {
        self.keys.first().copied()
    }

    /// Separator keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[f32] {
        &self.keys
    }

    /// Child blocks, parallel to [`IndexNode::keys`].
    #[must_use]
    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    /// Block address of this node.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Level above the leaves, always at least 1.
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Number of `(key, child)` entries.
    #[must_use]
    pub const fn num_entries(&self) -> usize {
        self.keys.len()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.keys.len() >= self.capacity
    }

    /// Whether the node has changes not yet written back.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Address of the left neighbor on the same level.
    #[must_use]
    pub const fn left_sibling(&self) -> Option<BlockId> {
        self.left_sibling
    }

    /// Address of the right neighbor on the same level.
    #[must_use]
    pub const fn right_sibling(&self) -> Option<BlockId> {
        self.right_sibling
    }

    /// Link the left neighbor and mark the node dirty.
    pub const fn set_left_sibling(&mut self, sibling: Option<BlockId>) {
        self.left_sibling = sibling;
        self.dirty = true;
    }

    /// Link the right neighbor and mark the node dirty.
    pub const fn set_right_sibling(&mut self, sibling: Option<BlockId>) {
        self.right_sibling = sibling;
        self.dirty = true;
    }

    const fn header(&self) -> NodeHeader {
        NodeHeader {
            level: self.level,
            num_entries: self.keys.len(),
            left_sibling: self.left_sibling,
            right_sibling: self.right_sibling,
        }
    }
}

impl Drop for IndexNode {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(
                block = self.block,
                level = self.level,
                "index node dropped without release, changes discarded"
            );
        }
    }
}

/// A leaf node holding `(key, id)` entries in ascending key order.
///
/// Keys and ids live in separate regions of the block, each with its own
/// capacity. They are appended in lock-step, so `num_keys == num_entries`.
#[derive(Debug)]
pub struct LeafNode {
    block: BlockId,
    left_sibling: Option<BlockId>,
    right_sibling: Option<BlockId>,
    keys: Vec<f32>,
    ids: Vec<i32>,
    key_capacity: usize,
    capacity: usize,
    dirty: bool,
}

impl LeafNode {
    /// Allocate a new, empty leaf.
    pub fn init(store: &mut NodeStore) -> Result<Self, NodeError> {
        let layout = *store.layout();
        let block = store.allocate()?;

        Ok(Self {
            block,
            left_sibling: None,
            right_sibling: None,
            keys: Vec::with_capacity(layout.leaf_capacity()),
            ids: Vec::with_capacity(layout.leaf_capacity()),
            key_capacity: layout.leaf_key_capacity(),
            capacity: layout.leaf_capacity(),
            dirty: true,
        })
    }

    /// Load an existing leaf from `block`.
    pub fn init_restore(store: &mut NodeStore, block: BlockId) -> Result<Self, NodeError> {
        let data = store.read(block)?;
        Self::read_from_block(block, &data, store.layout())
    }

    /// Decode a leaf stored at `block`.
    pub fn read_from_block(
        block: BlockId,
        data: &Block,
        layout: &NodeLayout,
    ) -> Result<Self, NodeError> {
        let capacity = layout.leaf_capacity();
        let key_capacity = layout.leaf_key_capacity();
        let header = NodeHeader::from_block(block, data, capacity)?;
        if header.level != LEAF_LEVEL {
            return Err(NodeError::WrongLevel {
                block,
                level: header.level,
                expected: NodeKind::Leaf,
            });
        }

        let num_keys = data.read_i32(layout.leaf_num_keys_offset());
        if usize::try_from(num_keys).ok() != Some(header.num_entries) {
            return Err(NodeError::KeyCountMismatch {
                block,
                num_keys,
                num_entries: header.num_entries,
            });
        }

        let keys = (0..header.num_entries)
            .map(|i| data.read_f32(NODE_HEADER_SIZE + i * KEY_SIZE))
            .collect();
        let ids_offset = layout.leaf_ids_offset();
        let ids = (0..header.num_entries)
            .map(|i| data.read_i32(ids_offset + i * ID_SIZE))
            .collect();

        Ok(Self {
            block,
            left_sibling: header.left_sibling,
            right_sibling: header.right_sibling,
            keys,
            ids,
            key_capacity,
            capacity,
            dirty: false,
        })
    }

    /// Encode this leaf into a fresh block.
    #[must_use]
    pub fn write_to_block(&self, layout: &NodeLayout) -> Block {
        let mut data = Block::zeroed(layout.block_length());
        self.header().write_to_block(&mut data);

        for (i, key) in self.keys.iter().enumerate() {
            data.write_f32(NODE_HEADER_SIZE + i * KEY_SIZE, *key);
        }
        data.write_i32(layout.leaf_num_keys_offset(), self.keys.len() as i32);

        let ids_offset = layout.leaf_ids_offset();
        for (i, id) in self.ids.iter().enumerate() {
            data.write_i32(ids_offset + i * ID_SIZE, *id);
        }
        data
    }

    /// Append `(id, key)`; the caller feeds keys in ascending order.
    ///
    /// # Panics
    /// Panics if the leaf is full.
    pub fn add_new_child(&mut self, id: i32, key: f32) {
        assert!(
            !self.is_full(),
            "leaf {} is full ({} entries)",
            self.block,
            self.capacity
        );
        debug_assert!(self.keys.len() < self.key_capacity);
        self.ids.push(id);
        self.keys.push(key);
        self.dirty = true;
    }

    /// Position of the last entry whose key is `<= key`, or `None` if `key`
    /// is below every entry.
    #[must_use]
    pub fn find_position_by_key(&self, key: f32) -> Option<usize> {
        self.keys.partition_point(|&k| k <= key).checked_sub(1)
    }

    /// Load the left sibling, if any.
    pub fn get_left_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        self.left_sibling
            .map(|b| Self::init_restore(store, b))
            .transpose()
    }

    /// Load the right sibling, if any.
    pub fn get_right_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        self.right_sibling
            .map(|b| Self::init_restore(store, b))
            .transpose()
    }

    /// Write the leaf back if it was modified, then drop it.
    pub fn release(mut self, store: &mut NodeStore) -> Result<(), NodeError> {
        if self.dirty {
            let data = self.write_to_block(store.layout());
            store.write(self.block, &data)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Key of entry `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> f32 {
        self.keys[index]
    }

    /// Object id of entry `index`.
    #[must_use]
    pub fn entry_id(&self, index: usize) -> i32 {
        self.ids[index]
    }

    /// Entry `index` as a `(key, id)` record.
    #[must_use]
    pub fn entry(&self, index: usize) -> Candidate {
        Candidate::new(self.keys[index], self.ids[index])
    }

    /// Entries in ascending key order.
    #[must_use]
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = Candidate> + '_ {
        self.keys
            .iter()
            .zip(&self.ids)
            .map(|(&key, &id)| Candidate::new(key, id))
    }

    /// Smallest key in the leaf.
    #[must_use]
    pub fn key_of_node(&self) -> Option<f32> {
        self.keys.first().copied()
    }

    /// Block address of this node.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Number of ids stored.
    #[must_use]
    pub const fn num_entries(&self) -> usize {
        self.ids.len()
    }

    /// Number of keys stored, equal to [`LeafNode::num_entries`].
    #[must_use]
    pub const fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of key slots in the block, at least [`LeafNode::capacity`].
    #[must_use]
    pub const fn key_capacity(&self) -> usize {
        self.key_capacity
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.ids.len() >= self.capacity
    }

    /// Whether the node has changes not yet written back.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Address of the left neighbor on the same level.
    #[must_use]
    pub const fn left_sibling(&self) -> Option<BlockId> {
        self.left_sibling
    }

    /// Address of the right neighbor on the same level.
    #[must_use]
    pub const fn right_sibling(&self) -> Option<BlockId> {
        self.right_sibling
    }

    /// Link the left neighbor and mark the node dirty.
    pub const fn set_left_sibling(&mut self, sibling: Option<BlockId>) {
        self.left_sibling = sibling;
        self.dirty = true;
    }

    /// Link the right neighbor and mark the node dirty.
    pub const fn set_right_sibling(&mut self, sibling: Option<BlockId>) {
        self.right_sibling = sibling;
        self.dirty = true;
    }

    const fn header(&self) -> NodeHeader {
        NodeHeader {
            level: LEAF_LEVEL,
            num_entries: self.ids.len(),
            left_sibling: self.left_sibling,
            right_sibling: self.right_sibling,
        }
    }
}

impl Drop for LeafNode {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(
                block = self.block,
                "leaf node dropped without release, changes discarded"
            );
        }
    }
}

/// A node of either kind, as found at an arbitrary block address.
#[derive(Debug)]
pub enum Node {
    Index(IndexNode),
    Leaf(LeafNode),
}

impl Node {
    /// Load the node at `block`, choosing the kind from its stored level.
    pub fn init_restore(store: &mut NodeStore, block: BlockId) -> Result<Self, NodeError> {
        let data = store.read(block)?;
        if data.read_u8(offsets::LEVEL) == LEAF_LEVEL {
            LeafNode::read_from_block(block, &data, store.layout()).map(Self::Leaf)
        } else {
            IndexNode::read_from_block(block, &data, store.layout()).map(Self::Index)
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Index(_) => NodeKind::Index,
            Self::Leaf(_) => NodeKind::Leaf,
        }
    }

    #[must_use]
    pub const fn block(&self) -> BlockId {
        match self {
            Self::Index(n) => n.block(),
            Self::Leaf(n) => n.block(),
        }
    }

    #[must_use]
    pub const fn level(&self) -> u8 {
        match self {
            Self::Index(n) => n.level(),
            Self::Leaf(_) => LEAF_LEVEL,
        }
    }

    #[must_use]
    pub const fn num_entries(&self) -> usize {
        match self {
            Self::Index(n) => n.num_entries(),
            Self::Leaf(n) => n.num_entries(),
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        match self {
            Self::Index(n) => n.is_full(),
            Self::Leaf(n) => n.is_full(),
        }
    }

    #[must_use]
    pub fn key_of_node(&self) -> Option<f32> {
        match self {
            Self::Index(n) => n.key_of_node(),
            Self::Leaf(n) => n.key_of_node(),
        }
    }

    #[must_use]
    pub fn find_position_by_key(&self, key: f32) -> Option<usize> {
        match self {
            Self::Index(n) => n.find_position_by_key(key),
            Self::Leaf(n) => n.find_position_by_key(key),
        }
    }

    /// Load the left sibling, if any. Siblings share the node's level.
    pub fn get_left_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        match self {
            Self::Index(n) => Ok(n.get_left_sibling(store)?.map(Self::Index)),
            Self::Leaf(n) => Ok(n.get_left_sibling(store)?.map(Self::Leaf)),
        }
    }

    /// Load the right sibling, if any. Siblings share the node's level.
    pub fn get_right_sibling(&self, store: &mut NodeStore) -> Result<Option<Self>, NodeError> {
        match self {
            Self::Index(n) => Ok(n.get_right_sibling(store)?.map(Self::Index)),
            Self::Leaf(n) => Ok(n.get_right_sibling(store)?.map(Self::Leaf)),
        }
    }

    pub fn release(self, store: &mut NodeStore) -> Result<(), NodeError> {
        match self {
            Self::Index(n) => n.release(store),
            Self::Leaf(n) => n.release(store),
        }
    }
}

/// Errors that can occur when working with B-tree nodes.
#[derive(Debug)]
pub enum NodeError {
    /// Block file error.
    File(FileError),
    /// The stored level does not match the expected node kind.
    WrongLevel {
        block: BlockId,
        level: u8,
        expected: NodeKind,
    },
    /// Stored entry count is negative or above the node's capacity.
    EntryCountOutOfRange {
        block: BlockId,
        num_entries: i32,
        capacity: usize,
    },
    /// A leaf's key count disagrees with its entry count.
    KeyCountMismatch {
        block: BlockId,
        num_keys: i32,
        num_entries: usize,
    },
    /// A sibling or child address is not a valid block address.
    InvalidAddress { block: BlockId, raw: i32 },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::WrongLevel {
                block,
                level,
                expected,
            } => write!(f, "block {block}: level {level} is not a valid {expected} level"),
            Self::EntryCountOutOfRange {
                block,
                num_entries,
                capacity,
            } => write!(
                f,
                "block {block}: entry count {num_entries} outside 0..={capacity}"
            ),
            Self::KeyCountMismatch {
                block,
                num_keys,
                num_entries,
            } => write!(
                f,
                "block {block}: {num_keys} keys for {num_entries} entries"
            ),
            Self::InvalidAddress { block, raw } => {
                write!(f, "block {block}: invalid block address {raw}")
            }
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FileError> for NodeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BlockFile;
    use tempfile::{TempDir, tempdir};

    fn test_store(block_length: usize) -> (TempDir, NodeStore) {
        let dir = tempdir().expect("create temp dir");
        let file = BlockFile::create(&dir.path().join("nodes.tree"), block_length)
            .expect("create file");
        let layout = NodeLayout::new(block_length).expect("valid layout");
        (dir, NodeStore::new(file, layout))
    }

    fn filled_leaf(store: &mut NodeStore, n: usize) -> LeafNode {
        let mut leaf = LeafNode::init(store).expect("init leaf");
        for i in 0..n {
            leaf.add_new_child(1000 + i as i32, i as f32 * 0.5);
        }
        leaf
    }

    fn filled_index(store: &mut NodeStore, n: usize) -> IndexNode {
        let mut node = IndexNode::init(2, store).expect("init index");
        for i in 0..n {
            node.add_new_child(i as f32 - 3.0, 40 + i as BlockId);
        }
        node
    }

    #[test]
    fn test_index_roundtrip_at_capacity_boundaries() {
        let (_dir, mut store) = test_store(256);
        let layout = *store.layout();
        let capacity = layout.index_capacity();

        for n in [0, 1, capacity - 1, capacity] {
            let mut node = filled_index(&mut store, n);
            node.set_left_sibling(Some(3));
            node.set_right_sibling(None);

            let data = node.write_to_block(&layout);
            let restored =
                IndexNode::read_from_block(node.block(), &data, &layout).expect("decode");

            assert_eq!(restored.level(), 2);
            assert_eq!(restored.num_entries(), n);
            assert_eq!(restored.left_sibling(), Some(3));
            assert_eq!(restored.right_sibling(), None);
            assert_eq!(restored.keys(), node.keys());
            assert_eq!(restored.children(), node.children());
            assert!(!restored.is_dirty());

            node.release(&mut store).expect("release");
        }
    }

    #[test]
    fn test_leaf_roundtrip_at_capacity_boundaries() {
        let (_dir, mut store) = test_store(256);
        let layout = *store.layout();
        let capacity = layout.leaf_capacity();

        for n in [0, 1, capacity - 1, capacity] {
            let mut leaf = filled_leaf(&mut store, n);
            leaf.set_right_sibling(Some(9));

            let data = leaf.write_to_block(&layout);
            let restored =
                LeafNode::read_from_block(leaf.block(), &data, &layout).expect("decode");

            assert_eq!(restored.num_entries(), n);
            assert_eq!(restored.num_keys(), n);
            assert_eq!(restored.left_sibling(), None);
            assert_eq!(restored.right_sibling(), Some(9));
            let expected: Vec<Candidate> = leaf.entries().collect();
            let actual: Vec<Candidate> = restored.entries().collect();
            assert_eq!(actual, expected);

            leaf.release(&mut store).expect("release");
        }
    }

    #[test]
    fn test_leaf_roundtrip_with_uneven_regions() {
        let dir = tempdir().expect("create temp dir");
        let file = BlockFile::create(&dir.path().join("nodes.tree"), 256).expect("create file");
        let layout = NodeLayout::with_leaf_key_region(256, 64).expect("valid layout");
        let mut store = NodeStore::new(file, layout);
        assert_ne!(layout.leaf_key_capacity(), layout.leaf_id_capacity());

        let leaf = filled_leaf(&mut store, layout.leaf_capacity());
        assert!(leaf.is_full());
        assert_eq!(leaf.key_capacity(), 16);

        let data = leaf.write_to_block(&layout);
        let restored = LeafNode::read_from_block(leaf.block(), &data, &layout).expect("decode");
        assert_eq!(restored.num_entries(), 16);
        assert_eq!(restored.entry(15), leaf.entry(15));

        leaf.release(&mut store).expect("release");
    }

    #[test]
    fn test_leaf_roundtrip_when_ids_bound_capacity() {
        let dir = tempdir().expect("create temp dir");
        let file = BlockFile::create(&dir.path().join("nodes.tree"), 256).expect("create file");
        let layout = NodeLayout::with_leaf_key_region(256, 160).expect("valid layout");
        let mut store = NodeStore::new(file, layout);
        assert!(layout.leaf_key_capacity() > layout.leaf_capacity());
        assert_eq!(layout.leaf_capacity(), layout.leaf_id_capacity());

        let cap = layout.leaf_capacity();
        for n in [0, 1, cap - 1, cap] {
            let leaf = filled_leaf(&mut store, n);
            assert!(leaf.key_capacity() > leaf.capacity());
            assert_eq!(leaf.is_full(), n == cap);

            let data = leaf.write_to_block(&layout);
            let restored =
                LeafNode::read_from_block(leaf.block(), &data, &layout).expect("decode");
            assert_eq!(restored.num_entries(), n);
            assert_eq!(restored.num_keys(), n);
            assert_eq!(restored.capacity(), cap);
            assert!(restored.entries().eq(leaf.entries()));

            leaf.release(&mut store).expect("release");
        }
    }

    #[test]
    fn test_release_persists_dirty_node() {
        let (_dir, mut store) = test_store(128);

        let leaf = filled_leaf(&mut store, 3);
        let block = leaf.block();
        leaf.release(&mut store).expect("release");

        let restored = LeafNode::init_restore(&mut store, block).expect("restore");
        assert_eq!(restored.num_entries(), 3);
        assert_eq!(restored.entry_id(2), 1002);
        assert!((restored.key(2) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_find_position_by_key() {
        let (_dir, mut store) = test_store(128);

        let mut leaf = LeafNode::init(&mut store).expect("init leaf");
        for (id, key) in [(1, 1.0), (2, 3.0), (3, 3.0), (4, 7.0)] {
            leaf.add_new_child(id, key);
        }
        assert_eq!(leaf.find_position_by_key(0.5), None);
        assert_eq!(leaf.find_position_by_key(1.0), Some(0));
        assert_eq!(leaf.find_position_by_key(2.0), Some(0));
        assert_eq!(leaf.find_position_by_key(3.0), Some(2));
        assert_eq!(leaf.find_position_by_key(100.0), Some(3));
        leaf.release(&mut store).expect("release");

        let mut index = IndexNode::init(1, &mut store).expect("init index");
        index.add_new_child(10.0, 0);
        index.add_new_child(20.0, 1);
        index.add_new_child(30.0, 2);
        assert_eq!(index.find_position_by_key(5.0), None);
        assert_eq!(index.child_for_key(5.0), Some(0));
        assert_eq!(index.find_position_by_key(10.0), Some(0));
        assert_eq!(index.find_position_by_key(25.0), Some(1));
        assert_eq!(index.child_for_key(25.0), Some(1));
        assert_eq!(index.find_position_by_key(35.0), Some(2));
        index.release(&mut store).expect("release");
    }

    #[test]
    fn test_sibling_navigation() {
        let (_dir, mut store) = test_store(128);

        let mut left = filled_leaf(&mut store, 2);
        let mut right = filled_leaf(&mut store, 1);
        left.set_right_sibling(Some(right.block()));
        right.set_left_sibling(Some(left.block()));
        let (left_block, right_block) = (left.block(), right.block());
        left.release(&mut store).expect("release");
        right.release(&mut store).expect("release");

        let left = Node::init_restore(&mut store, left_block).expect("restore");
        assert_eq!(left.kind(), NodeKind::Leaf);
        assert!(left.get_left_sibling(&mut store).expect("load").is_none());

        let right = left
            .get_right_sibling(&mut store)
            .expect("load")
            .expect("has right sibling");
        assert_eq!(right.block(), right_block);
        let back = right
            .get_left_sibling(&mut store)
            .expect("load")
            .expect("has left sibling");
        assert_eq!(back.block(), left_block);
    }

    #[test]
    fn test_node_dispatches_on_level() {
        let (_dir, mut store) = test_store(128);

        let index = filled_index(&mut store, 2);
        let block = index.block();
        index.release(&mut store).expect("release");

        let node = Node::init_restore(&mut store, block).expect("restore");
        assert_eq!(node.kind(), NodeKind::Index);
        assert_eq!(node.level(), 2);
        assert_eq!(node.num_entries(), 2);
        assert_eq!(node.key_of_node(), Some(-3.0));
    }

    #[test]
    fn test_decode_detects_wrong_level() {
        let (_dir, mut store) = test_store(128);
        let layout = *store.layout();

        let leaf = filled_leaf(&mut store, 1);
        let data = leaf.write_to_block(&layout);
        leaf.release(&mut store).expect("release");

        let result = IndexNode::read_from_block(0, &data, &layout);
        assert!(matches!(
            result,
            Err(NodeError::WrongLevel {
                expected: NodeKind::Index,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_detects_corrupt_counts() {
        let (_dir, mut store) = test_store(128);
        let layout = *store.layout();

        let leaf = filled_leaf(&mut store, 2);
        let mut data = leaf.write_to_block(&layout);
        leaf.release(&mut store).expect("release");

        data.write_i32(layout.leaf_num_keys_offset(), 1);
        assert!(matches!(
            LeafNode::read_from_block(0, &data, &layout),
            Err(NodeError::KeyCountMismatch { num_keys: 1, .. })
        ));

        data.write_i32(1, 10_000);
        assert!(matches!(
            LeafNode::read_from_block(0, &data, &layout),
            Err(NodeError::EntryCountOutOfRange { num_entries: 10_000, .. })
        ));

        data.write_i32(1, 2);
        data.write_i32(5, -7);
        assert!(matches!(
            LeafNode::read_from_block(0, &data, &layout),
            Err(NodeError::InvalidAddress { raw: -7, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "is full")]
    fn test_add_to_full_leaf_panics() {
        let (_dir, mut store) = test_store(64);
        let capacity = store.layout().leaf_capacity();
        let mut leaf = filled_leaf(&mut store, capacity);
        leaf.add_new_child(0, 100.0);
    }
}
