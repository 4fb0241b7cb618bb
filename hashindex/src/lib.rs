//! Disk-backed index over hash projection values.
//!
//! Projection values (`f32` keys) computed for a point set are bulk-loaded
//! into a B-tree keyed by value, mapping each key to its object id. Queries
//! descend to the leaf covering a projected query value and walk the leaf
//! chain outward, collecting the closest keys in a [`MinKList`].
//!
//! Components:
//! - `storage`: paged block file with a checksummed header block
//! - `btree`: node codec, bulk load, and leaf-chain scans
//! - `topk`: bounded list of the k smallest keys seen
//! - `search`: nearest-key lookup combining the two

pub mod btree;
pub mod candidate;
pub mod config;
pub mod search;
pub mod storage;
pub mod topk;

pub use btree::{BTree, BTreeError, BulkLoadSummary, NodeLayout, ScanDirection};
pub use candidate::Candidate;
pub use topk::MinKList;
