//! Bulk-loaded B-tree over `f32` keys.
//!
//! The tree is built once from records sorted by key, bottom-up, one level
//! at a time. Leaves and index nodes of the same level are linked through
//! their sibling addresses, so range scans walk the leaf chain instead of
//! re-descending from the root.
//!
//! The tree header (user region of the file's header block) holds:
//! - `root_block`: 4 bytes
//! - `leaf_key_region`: 4 bytes
//! - `block_length`: 4 bytes (copy of the file header's, checked on open)

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::path::{Path, PathBuf};

use crate::btree::layout::{LayoutError, NodeLayout};
use crate::btree::node::{IndexNode, LEAF_LEVEL, LeafNode, Node, NodeError};
use crate::btree::store::NodeStore;
use crate::candidate::Candidate;
use crate::storage::{BlockFile, BlockId, FileError, decode_block_id, encode_block_id};

/// Tree header field offsets within the user header region.
mod offsets {
    pub const ROOT_BLOCK: usize = 0;
    pub const LEAF_KEY_REGION: usize = 4;
    pub const BLOCK_LENGTH: usize = 8;
}

/// Size of the tree header in bytes.
pub const TREE_HEADER_SIZE: usize = 12;

/// Tree-level metadata persisted in the header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub root_block: BlockId,
    pub leaf_key_region: u32,
    pub block_length: u32,
}

impl TreeHeader {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; TREE_HEADER_SIZE] {
        let mut bytes = [0u8; TREE_HEADER_SIZE];
        bytes[offsets::ROOT_BLOCK..offsets::ROOT_BLOCK + 4]
            .copy_from_slice(&encode_block_id(Some(self.root_block)).to_le_bytes());
        bytes[offsets::LEAF_KEY_REGION..offsets::LEAF_KEY_REGION + 4]
            .copy_from_slice(&self.leaf_key_region.to_le_bytes());
        bytes[offsets::BLOCK_LENGTH..offsets::BLOCK_LENGTH + 4]
            .copy_from_slice(&self.block_length.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BTreeError> {
        let field = |offset: usize| -> Result<[u8; 4], BTreeError> {
            bytes
                .get(offset..offset + 4)
                .and_then(|b| b.try_into().ok())
                .ok_or(BTreeError::HeaderTooShort { len: bytes.len() })
        };

        let raw_root = i32::from_le_bytes(field(offsets::ROOT_BLOCK)?);
        let root_block = decode_block_id(raw_root)
            .ok()
            .flatten()
            .ok_or(BTreeError::InvalidRoot {
                root_block: raw_root,
            })?;

        Ok(Self {
            root_block,
            leaf_key_region: u32::from_le_bytes(field(offsets::LEAF_KEY_REGION)?),
            block_length: u32::from_le_bytes(field(offsets::BLOCK_LENGTH)?),
        })
    }
}

/// Direction of a leaf-chain scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Entries with keys above the start key, ascending.
    Ascending,
    /// Entries with keys at or below the start key, descending.
    Descending,
}

/// Shape of a freshly bulk-loaded tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLoadSummary {
    pub num_entries: usize,
    pub num_leaves: usize,
    /// Number of levels, leaves included.
    pub height: usize,
    pub root_block: BlockId,
}

/// Contiguous block range holding one level of the tree.
#[derive(Debug, Clone, Copy)]
struct LevelRange {
    start: BlockId,
    end: BlockId,
    num_nodes: usize,
}

/// A B-tree stored in a block file.
///
/// The root is cached in memory once loaded and released on
/// [`BTree::delete_root`], [`BTree::close`], or drop.
#[derive(Debug)]
pub struct BTree {
    store: NodeStore,
    root_block: BlockId,
    root: Option<Node>,
    closed: bool,
}

impl BTree {
    /// Create a new tree file with an empty root.
    pub fn create(path: &Path, layout: NodeLayout) -> Result<Self, BTreeError> {
        let file = BlockFile::create(path, layout.block_length())?;
        let mut store = NodeStore::new(file, layout);

        // Empty level-0 placeholder until the first bulk load.
        let root = LeafNode::init(&mut store)?;
        let root_block = root.block();
        root.release(&mut store)?;

        let mut tree = Self {
            store,
            root_block,
            root: None,
            closed: false,
        };
        tree.write_header()?;

        tracing::debug!(
            path = %path.display(),
            block_length = layout.block_length(),
            leaf_key_region = layout.leaf_key_region(),
            "created tree"
        );
        Ok(tree)
    }

    /// Open an existing tree file. The root is loaded lazily.
    pub fn open(path: &Path) -> Result<Self, BTreeError> {
        let file = BlockFile::open(path).map_err(|e| match e {
            FileError::NotFound(path) => BTreeError::StorageNotFound(path),
            e => BTreeError::File(e),
        })?;

        let header = TreeHeader::from_bytes(file.read_header())?;
        if header.block_length as usize != file.block_length() {
            return Err(BTreeError::BlockLengthMismatch {
                file: file.block_length(),
                header: header.block_length,
            });
        }
        if header.root_block >= file.num_blocks() {
            return Err(BTreeError::InvalidRoot {
                root_block: encode_block_id(Some(header.root_block)),
            });
        }
        let layout =
            NodeLayout::with_leaf_key_region(file.block_length(), header.leaf_key_region as usize)?;

        tracing::info!(
            path = %path.display(),
            root_block = header.root_block,
            num_blocks = file.num_blocks(),
            "restored tree"
        );

        Ok(Self {
            store: NodeStore::new(file, layout),
            root_block: header.root_block,
            root: None,
            closed: false,
        })
    }

    /// Build the tree from records sorted ascending by key.
    ///
    /// Sortedness is a precondition and is only checked in debug builds.
    /// At most two nodes of the level under construction and one node of
    /// the level below are in memory at any time.
    pub fn bulk_load(&mut self, records: &[Candidate]) -> Result<BulkLoadSummary, BTreeError> {
        debug_assert!(
            records.is_sorted_by(|a, b| a.key <= b.key),
            "bulk load input must be sorted by key"
        );
        self.delete_root()?;

        let mut range = self.load_leaves(records)?;
        let num_leaves = range.num_nodes;
        tracing::debug!(
            level = LEAF_LEVEL,
            nodes = range.num_nodes,
            start_block = range.start,
            end_block = range.end,
            "built leaf level"
        );

        let mut level = LEAF_LEVEL;
        while range.start != range.end {
            level += 1;
            range = self.load_index_level(range, level)?;
            tracing::debug!(
                level,
                nodes = range.num_nodes,
                start_block = range.start,
                end_block = range.end,
                "built index level"
            );
        }

        self.root_block = range.start;
        self.write_header()?;

        let summary = BulkLoadSummary {
            num_entries: records.len(),
            num_leaves,
            height: usize::from(level) + 1,
            root_block: self.root_block,
        };
        tracing::info!(
            num_entries = summary.num_entries,
            num_leaves = summary.num_leaves,
            height = summary.height,
            root_block = summary.root_block,
            "bulk load complete"
        );
        Ok(summary)
    }

    /// Stream records into a chain of leaves.
    fn load_leaves(&mut self, records: &[Candidate]) -> Result<LevelRange, BTreeError> {
        let store = &mut self.store;
        let mut current = LeafNode::init(store)?;
        let start = current.block();
        let mut num_nodes = 1;

        for record in records {
            if current.is_full() {
                let mut next = LeafNode::init(store)?;
                current.set_right_sibling(Some(next.block()));
                next.set_left_sibling(Some(current.block()));
                std::mem::replace(&mut current, next).release(store)?;
                num_nodes += 1;
            }
            current.add_new_child(record.id, record.key);
        }

        let end = current.block();
        current.release(store)?;
        Ok(LevelRange {
            start,
            end,
            num_nodes,
        })
    }

    /// Build one index level over the nodes in `below`.
    fn load_index_level(&mut self, below: LevelRange, level: u8) -> Result<LevelRange, BTreeError> {
        let store = &mut self.store;
        let mut current = IndexNode::init(level, store)?;
        let start = current.block();
        let mut num_nodes = 1;

        for block in below.start..=below.end {
            let child = Node::init_restore(store, block)?;
            let key = child.key_of_node().ok_or(BTreeError::EmptyNode { block })?;
            child.release(store)?;

            if current.is_full() {
                let mut next = IndexNode::init(level, store)?;
                current.set_right_sibling(Some(next.block()));
                next.set_left_sibling(Some(current.block()));
                std::mem::replace(&mut current, next).release(store)?;
                num_nodes += 1;
            }
            current.add_new_child(key, block);
        }

        let end = current.block();
        current.release(store)?;
        Ok(LevelRange {
            start,
            end,
            num_nodes,
        })
    }

    /// Load the root into the cache if it is not there yet.
    pub fn load_root(&mut self) -> Result<&Node, BTreeError> {
        let root = match self.root.take() {
            Some(root) => root,
            None => Node::init_restore(&mut self.store, self.root_block)?,
        };
        Ok(&*self.root.insert(root))
    }

    /// The cached root, if loaded.
    #[must_use]
    pub const fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Release the cached root, writing it back if modified.
    pub fn delete_root(&mut self) -> Result<(), BTreeError> {
        if let Some(root) = self.root.take() {
            root.release(&mut self.store)?;
        }
        Ok(())
    }

    /// Descend from the root to the leaf that covers `key`.
    ///
    /// Keys below every separator descend into the first child, so the
    /// leftmost leaf is reached for them.
    pub fn find_leaf(&mut self, key: f32) -> Result<LeafNode, BTreeError> {
        let (mut block, mut level) = match &self.root {
            Some(Node::Index(index)) => (descend(index, key)?, index.level() - 1),
            Some(Node::Leaf(_)) => {
                return Ok(LeafNode::init_restore(&mut self.store, self.root_block)?);
            }
            // An uncached leaf root is returned without caching it.
            None => match Node::init_restore(&mut self.store, self.root_block)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Index(index) => {
                    let next = (descend(&index, key)?, index.level() - 1);
                    self.root = Some(Node::Index(index));
                    next
                }
            },
        };

        loop {
            match Node::init_restore(&mut self.store, block)? {
                Node::Leaf(leaf) if level == LEAF_LEVEL => return Ok(leaf),
                Node::Index(index) if index.level() == level => {
                    block = descend(&index, key)?;
                    level -= 1;
                }
                node => {
                    return Err(BTreeError::LevelMismatch {
                        block,
                        expected: level,
                        actual: node.level(),
                    });
                }
            }
        }
    }

    /// Scan the leaf chain from `key` in the given direction.
    ///
    /// The two directions split the tree: `Ascending` yields every entry
    /// with a key above `key`, `Descending` every entry at or below it.
    pub fn scan_from(
        &mut self,
        key: f32,
        direction: ScanDirection,
    ) -> Result<LeafCursor<'_>, BTreeError> {
        let leaf = self.find_leaf(key)?;
        // Ascending starts after the position, descending at it. Both are
        // expressed as the count of entries at or below `key`.
        let offset = leaf.find_position_by_key(key).map_or(0, |pos| pos + 1);

        Ok(LeafCursor {
            store: &mut self.store,
            leaf: Some(leaf),
            direction,
            offset,
        })
    }

    /// Count all entries by walking the leaf chain.
    pub fn count(&mut self) -> Result<usize, BTreeError> {
        let mut count = 0;
        let mut leaf = Some(self.find_leaf(f32::NEG_INFINITY)?);

        while let Some(current) = leaf {
            count += current.num_entries();
            leaf = current.get_right_sibling(&mut self.store)?;
        }
        Ok(count)
    }

    /// Number of levels, leaves included.
    pub fn height(&mut self) -> Result<usize, BTreeError> {
        Ok(usize::from(self.load_root()?.level()) + 1)
    }

    #[must_use]
    pub const fn root_block(&self) -> BlockId {
        self.root_block
    }

    #[must_use]
    pub const fn layout(&self) -> &NodeLayout {
        self.store.layout()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.file().path()
    }

    /// Persist the header, release the root, and sync the file.
    pub fn close(mut self) -> Result<(), BTreeError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), BTreeError> {
        self.closed = true;
        self.delete_root()?;
        self.write_header()?;
        self.store.file_mut().sync()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), BTreeError> {
        let layout = *self.store.layout();
        let header = TreeHeader {
            root_block: self.root_block,
            leaf_key_region: layout.leaf_key_region() as u32,
            block_length: layout.block_length() as u32,
        };
        self.store.file_mut().write_header(&header.to_bytes())?;
        Ok(())
    }
}

impl Drop for BTree {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shutdown() {
            tracing::error!(
                path = %self.store.file().path().display(),
                error = %e,
                "failed to close tree"
            );
        }
    }
}

fn descend(index: &IndexNode, key: f32) -> Result<BlockId, BTreeError> {
    index.child_for_key(key).ok_or_else(|| BTreeError::EmptyNode {
        block: index.block(),
    })
}

/// Cursor over the leaf chain, holding one leaf in memory at a time.
pub struct LeafCursor<'a> {
    store: &'a mut NodeStore,
    leaf: Option<LeafNode>,
    direction: ScanDirection,
    /// Ascending: index of the next entry. Descending: entries left in the
    /// current leaf.
    offset: usize,
}

impl LeafCursor<'_> {
    /// Get the next entry.
    pub fn next_entry(&mut self) -> Result<Option<Candidate>, BTreeError> {
        loop {
            let Some(leaf) = &self.leaf else {
                return Ok(None);
            };

            let next = match self.direction {
                ScanDirection::Ascending => {
                    if self.offset < leaf.num_entries() {
                        let entry = leaf.entry(self.offset);
                        self.offset += 1;
                        return Ok(Some(entry));
                    }
                    leaf.get_right_sibling(self.store)?
                }
                ScanDirection::Descending => {
                    if self.offset > 0 {
                        self.offset -= 1;
                        return Ok(Some(leaf.entry(self.offset)));
                    }
                    leaf.get_left_sibling(self.store)?
                }
            };

            self.offset = match (self.direction, &next) {
                (ScanDirection::Descending, Some(leaf)) => leaf.num_entries(),
                _ => 0,
            };
            self.leaf = next;
        }
    }

    #[must_use]
    pub const fn direction(&self) -> ScanDirection {
        self.direction
    }
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// File I/O error.
    File(FileError),
    /// Node error.
    Node(NodeError),
    /// Invalid layout constants.
    Layout(LayoutError),
    /// No tree file at the given path.
    StorageNotFound(PathBuf),
    /// Tree header region too short to decode.
    HeaderTooShort { len: usize },
    /// Tree header disagrees with the file header.
    BlockLengthMismatch { file: usize, header: u32 },
    /// Root address is not an allocated block.
    InvalidRoot { root_block: i32 },
    /// An index node or bulk-load child has no entries.
    EmptyNode { block: BlockId },
    /// A child is not one level below its parent.
    LevelMismatch {
        block: BlockId,
        expected: u8,
        actual: u8,
    },
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Layout(e) => write!(f, "layout error: {e}"),
            Self::StorageNotFound(path) => {
                write!(f, "tree file not found: {}", path.display())
            }
            Self::HeaderTooShort { len } => {
                write!(f, "tree header region too short: {len} bytes")
            }
            Self::BlockLengthMismatch { file, header } => write!(
                f,
                "tree header block length {header} does not match file block length {file}"
            ),
            Self::InvalidRoot { root_block } => write!(f, "invalid root block {root_block}"),
            Self::EmptyNode { block } => write!(f, "node at block {block} has no entries"),
            Self::LevelMismatch {
                block,
                expected,
                actual,
            } => write!(
                f,
                "node at block {block} has level {actual}, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FileError> for BTreeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<LayoutError> for BTreeError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}
