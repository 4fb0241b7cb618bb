//! Bulk-loaded B-tree over hash projection values.
//!
//! # Structure
//!
//! The tree consists of:
//! - Index nodes: store separator keys and child block addresses
//! - Leaf nodes: store `(key, id)` pairs, doubly-linked for range scans
//!
//! Every level is a contiguous run of blocks, written bottom-up by
//! [`BTree::bulk_load`].
//!
//! # Usage
//!
//! ```
//! use hashindex::Candidate;
//! use hashindex::btree::{BTree, NodeLayout, ScanDirection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let layout = NodeLayout::new(4096)?;
//! let mut tree = BTree::create(&dir.path().join("hash.tree"), layout)?;
//!
//! let records: Vec<Candidate> = (0..1000).map(|i| Candidate::new(i as f32 * 0.5, i)).collect();
//! let summary = tree.bulk_load(&records)?;
//! assert_eq!(summary.num_leaves, 2);
//! assert_eq!(summary.height, 2);
//!
//! let mut cursor = tree.scan_from(10.0, ScanDirection::Ascending)?;
//! assert_eq!(cursor.next_entry()?.map(|c| c.id), Some(21));
//!
//! tree.close()?;
//! # Ok(())
//! # }
//! ```

mod layout;
mod node;
mod store;
mod tree;

pub use layout::{
    ID_SIZE, INDEX_ENTRY_SIZE, KEY_SIZE, LayoutError, MIN_INDEX_CAPACITY, NODE_HEADER_SIZE,
    NodeLayout,
};
pub use node::{IndexNode, LEAF_LEVEL, LeafNode, Node, NodeError, NodeHeader, NodeKind};
pub use store::NodeStore;
pub use tree::{
    BTree, BTreeError, BulkLoadSummary, LeafCursor, ScanDirection, TREE_HEADER_SIZE, TreeHeader,
};
