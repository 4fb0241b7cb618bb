//! The block file paired with the layout its nodes are encoded with.

use crate::btree::layout::NodeLayout;
use crate::storage::{Block, BlockFile, BlockId, FileError};

/// Everything a node needs to allocate, load, and flush itself.
///
/// Nodes never keep a reference to the store; each operation borrows it for
/// the duration of the call.
#[derive(Debug)]
pub struct NodeStore {
    file: BlockFile,
    layout: NodeLayout,
}

impl NodeStore {
    #[must_use]
    pub const fn new(file: BlockFile, layout: NodeLayout) -> Self {
        Self { file, layout }
    }

    #[must_use]
    pub const fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    #[must_use]
    pub const fn file(&self) -> &BlockFile {
        &self.file
    }

    pub const fn file_mut(&mut self) -> &mut BlockFile {
        &mut self.file
    }

    /// Reserve a fresh zeroed block and return its address.
    pub fn allocate(&mut self) -> Result<BlockId, FileError> {
        let empty = Block::zeroed(self.layout.block_length());
        self.file.append_block(&empty)
    }

    pub fn read(&mut self, block: BlockId) -> Result<Block, FileError> {
        self.file.read_block(block)
    }

    pub fn write(&mut self, block: BlockId, data: &Block) -> Result<(), FileError> {
        self.file.write_block(block, data)
    }
}
