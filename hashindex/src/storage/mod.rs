//! Block store for the hash index.
//!
//! A single file made of fixed-length blocks. The block length is chosen at
//! creation time and recorded in the header block.
//!
//! # File Format
//!
//! - Block at file offset 0: header block (file header + user header region)
//! - Data blocks 0..N: tree nodes, appended sequentially
//!
//! # Usage
//!
//! ```no_run
//! use hashindex::storage::{Block, BlockFile};
//! # fn main() -> Result<(), hashindex::storage::FileError> {
//! let path = std::path::Path::new("/tmp/example.tree");
//! let mut file = BlockFile::create(path, 4096)?;
//!
//! let mut block = Block::zeroed(file.block_length());
//! block.write_f32(0, 0.25);
//! let address = file.append_block(&block)?;
//!
//! file.write_header(&address.to_le_bytes())?;
//! file.sync()?;
//! # Ok(())
//! # }
//! ```

mod block;
mod file;
mod header;

pub use block::{Block, BlockId, NO_BLOCK, decode_block_id, encode_block_id};
pub use file::{BlockFile, FileError};
pub use header::{FILE_HEADER_SIZE, FileHeader, HeaderError, MIN_BLOCK_LENGTH};
