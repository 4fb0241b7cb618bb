//! Node capacities derived from the block length.
//!
//! Node header layout (shared by both node kinds):
//! - `level`: 1 byte (0 = leaf)
//! - `num_entries`: 4 bytes
//! - `left_sibling`: 4 bytes (-1 if none)
//! - `right_sibling`: 4 bytes (-1 if none)
//!
//! Total: 13 bytes
//!
//! Index payload: `num_entries` x (`f32` key, `i32` child block).
//!
//! Leaf payload:
//! - keys region: `leaf_key_region` bytes of `f32` keys
//! - `num_keys`: 4 bytes
//! - ids region: the rest of the block, `i32` object ids
//!
//! Nothing here is stored in the node blocks themselves. Both constants are
//! kept in the tree header so a reopened tree derives the same capacities.

/// Size of the shared node header in bytes.
pub const NODE_HEADER_SIZE: usize = 1 + 3 * 4;

/// Encoded size of a key.
pub const KEY_SIZE: usize = 4;

/// Encoded size of an object id or a child block address.
pub const ID_SIZE: usize = 4;

/// Index entry: key + child block.
pub const INDEX_ENTRY_SIZE: usize = KEY_SIZE + ID_SIZE;

/// Smallest index fan-out that still lets bulk load converge to one root.
pub const MIN_INDEX_CAPACITY: usize = 2;

/// Fixed per-tree layout constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    block_length: usize,
    leaf_key_region: usize,
}

impl NodeLayout {
    /// Layout with the leaf payload split evenly between keys and ids.
    pub const fn new(block_length: usize) -> Result<Self, LayoutError> {
        let payload = block_length.saturating_sub(NODE_HEADER_SIZE + 4);
        let leaf_key_region = (payload / (KEY_SIZE + ID_SIZE)) * KEY_SIZE;
        Self::with_leaf_key_region(block_length, leaf_key_region)
    }

    /// Layout with an explicit size, in bytes, for the leaf keys region.
    pub const fn with_leaf_key_region(
        block_length: usize,
        leaf_key_region: usize,
    ) -> Result<Self, LayoutError> {
        if block_length.saturating_sub(NODE_HEADER_SIZE) / INDEX_ENTRY_SIZE < MIN_INDEX_CAPACITY {
            return Err(LayoutError::BlockTooSmall { block_length });
        }
        if leaf_key_region == 0
            || !leaf_key_region.is_multiple_of(KEY_SIZE)
            || NODE_HEADER_SIZE + leaf_key_region + 4 + ID_SIZE > block_length
        {
            return Err(LayoutError::InvalidKeyRegion {
                block_length,
                leaf_key_region,
            });
        }
        Ok(Self {
            block_length,
            leaf_key_region,
        })
    }

    #[must_use]
    pub const fn block_length(&self) -> usize {
        self.block_length
    }

    /// Bytes reserved for keys in a leaf.
    #[must_use]
    pub const fn leaf_key_region(&self) -> usize {
        self.leaf_key_region
    }

    /// Maximum entries in an index node.
    #[must_use]
    pub const fn index_capacity(&self) -> usize {
        (self.block_length - NODE_HEADER_SIZE) / INDEX_ENTRY_SIZE
    }

    /// Number of key slots in a leaf.
    #[must_use]
    pub const fn leaf_key_capacity(&self) -> usize {
        self.leaf_key_region / KEY_SIZE
    }

    /// Number of id slots in a leaf.
    #[must_use]
    pub const fn leaf_id_capacity(&self) -> usize {
        (self.block_length - NODE_HEADER_SIZE - self.leaf_key_region - 4) / ID_SIZE
    }

    /// Maximum entries in a leaf. Keys and ids are appended in lock-step,
    /// so the smaller of the two regions bounds the leaf.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        let keys = self.leaf_key_capacity();
        let ids = self.leaf_id_capacity();
        if keys < ids { keys } else { ids }
    }

    /// Offset of the `num_keys` field in a leaf block.
    #[must_use]
    pub const fn leaf_num_keys_offset(&self) -> usize {
        NODE_HEADER_SIZE + self.leaf_key_region
    }

    /// Offset of the first id in a leaf block.
    #[must_use]
    pub const fn leaf_ids_offset(&self) -> usize {
        self.leaf_num_keys_offset() + 4
    }
}

/// Errors for layouts that cannot hold a usable tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Index nodes would hold fewer than two entries.
    BlockTooSmall { block_length: usize },
    /// Leaf key region is empty, misaligned, or leaves no room for ids.
    InvalidKeyRegion {
        block_length: usize,
        leaf_key_region: usize,
    },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockTooSmall { block_length } => write!(
                f,
                "block length {block_length} holds fewer than {MIN_INDEX_CAPACITY} index entries"
            ),
            Self::InvalidKeyRegion {
                block_length,
                leaf_key_region,
            } => write!(
                f,
                "leaf key region of {leaf_key_region} bytes does not fit a {block_length}-byte block"
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_layout_capacities() {
        let layout = NodeLayout::new(49).expect("valid layout");
        assert_eq!(layout.leaf_key_region(), 16);
        assert_eq!(layout.index_capacity(), 4);
        assert_eq!(layout.leaf_key_capacity(), 4);
        assert_eq!(layout.leaf_id_capacity(), 4);
        assert_eq!(layout.leaf_capacity(), 4);
    }

    #[test]
    fn test_4k_layout() {
        let layout = NodeLayout::new(4096).expect("valid layout");
        assert_eq!(layout.index_capacity(), 510);
        assert_eq!(layout.leaf_key_capacity(), 509);
        assert_eq!(layout.leaf_id_capacity(), 510);
        assert_eq!(layout.leaf_capacity(), 509);
        assert!(layout.leaf_ids_offset() + layout.leaf_id_capacity() * ID_SIZE <= 4096);
    }

    #[test]
    fn test_uneven_key_region() {
        // Fewer key slots than id slots: keys bound the leaf.
        let layout = NodeLayout::with_leaf_key_region(4096, 1024).expect("valid layout");
        assert_eq!(layout.leaf_key_capacity(), 256);
        assert_eq!(layout.leaf_id_capacity(), 763);
        assert_eq!(layout.leaf_capacity(), 256);

        // Fewer id slots than key slots: ids bound the leaf.
        let layout = NodeLayout::with_leaf_key_region(4096, 3072).expect("valid layout");
        assert_eq!(layout.leaf_key_capacity(), 768);
        assert_eq!(layout.leaf_id_capacity(), 251);
        assert_eq!(layout.leaf_capacity(), 251);
    }

    #[test]
    fn test_rejects_unusable_layouts() {
        assert_eq!(
            NodeLayout::new(20),
            Err(LayoutError::BlockTooSmall { block_length: 20 })
        );
        assert_eq!(
            NodeLayout::with_leaf_key_region(8, 4),
            Err(LayoutError::BlockTooSmall { block_length: 8 })
        );
        assert_eq!(
            NodeLayout::with_leaf_key_region(0, 4),
            Err(LayoutError::BlockTooSmall { block_length: 0 })
        );
        assert!(matches!(
            NodeLayout::with_leaf_key_region(4096, 6),
            Err(LayoutError::InvalidKeyRegion { .. })
        ));
        assert!(matches!(
            NodeLayout::with_leaf_key_region(4096, 4080),
            Err(LayoutError::InvalidKeyRegion { .. })
        ));
        assert!(matches!(
            NodeLayout::with_leaf_key_region(4096, 0),
            Err(LayoutError::InvalidKeyRegion { .. })
        ));
    }
}
