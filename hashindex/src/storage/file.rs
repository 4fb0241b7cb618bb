//! Block file I/O operations.
//!
//! This module handles reading and writing fixed-length blocks to the tree
//! file. Block addresses are 0-based and do not include the header block,
//! so data block `b` lives at byte offset `(b + 1) * block_length`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::block::{Block, BlockId};
use crate::storage::header::{FILE_HEADER_SIZE, FileHeader, HeaderError, MIN_BLOCK_LENGTH};

/// A paged file with a fixed block length and one reserved header block.
pub struct BlockFile {
    file: File,
    path: PathBuf,
    header: FileHeader,
    /// Cached user header region (everything after the file header prefix).
    user_header: Vec<u8>,
}

impl BlockFile {
    /// Create a new block file at the given path.
    ///
    /// Returns an error if the file already exists or the block length is
    /// too small to hold the file header.
    pub fn create(path: &Path, block_length: usize) -> Result<Self, FileError> {
        if path.exists() {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }
        let block_length = u32::try_from(block_length)
            .ok()
            .filter(|&len| len as usize >= MIN_BLOCK_LENGTH)
            .ok_or(FileError::InvalidBlockLength(block_length))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(FileError::Io)?;

        let header = FileHeader::new(block_length);
        let mut this = Self {
            file,
            path: path.to_path_buf(),
            user_header: vec![0u8; header.user_region_len()],
            header,
        };
        this.write_header_block()?;
        this.sync()?;

        Ok(this)
    }

    /// Open an existing block file.
    ///
    /// A missing file is reported as [`FileError::NotFound`] so callers can
    /// tell "no such tree" apart from I/O failures.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        if !path.exists() {
            return Err(FileError::NotFound(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        // The block length is only known after reading the fixed prefix.
        let mut prefix = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut prefix).map_err(FileError::Io)?;
        let header = FileHeader::from_prefix(&prefix).map_err(FileError::Header)?;

        let mut buf = vec![0u8; header.block_length as usize];
        file.seek(SeekFrom::Start(0)).map_err(FileError::Io)?;
        file.read_exact(&mut buf).map_err(FileError::Io)?;
        let block = Block::from_vec(buf);
        let header = FileHeader::from_block(&block).map_err(FileError::Header)?;

        let expected = (u64::from(header.num_blocks) + 1) * u64::from(header.block_length);
        let actual = file.metadata().map_err(FileError::Io)?.len();
        if actual < expected {
            return Err(FileError::Truncated { expected, actual });
        }

        let user_header = block
            .read_bytes(FILE_HEADER_SIZE, header.user_region_len())
            .to_vec();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            user_header,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of every block in bytes.
    #[must_use]
    pub const fn block_length(&self) -> usize {
        self.header.block_length as usize
    }

    /// Number of allocated data blocks.
    #[must_use]
    pub const fn num_blocks(&self) -> u32 {
        self.header.num_blocks
    }

    /// Get the user header region.
    #[must_use]
    pub fn read_header(&self) -> &[u8] {
        &self.user_header
    }

    /// Replace the user header region and write the header block to disk.
    ///
    /// `bytes` shorter than the region are zero-padded.
    pub fn write_header(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        let region = self.header.user_region_len();
        if bytes.len() > region {
            return Err(FileError::HeaderTooLarge {
                len: bytes.len(),
                max: region,
            });
        }
        self.user_header.fill(0);
        self.user_header[..bytes.len()].copy_from_slice(bytes);
        self.write_header_block()
    }

    /// Read a data block from the file.
    pub fn read_block(&mut self, block: BlockId) -> Result<Block, FileError> {
        self.check_bounds(block)?;

        let mut buf = Block::zeroed(self.block_length());
        self.file
            .seek(SeekFrom::Start(self.offset_of(block)))
            .map_err(FileError::Io)?;
        self.file
            .read_exact(buf.as_bytes_mut())
            .map_err(FileError::Io)?;

        Ok(buf)
    }

    /// Write a data block to the file.
    pub fn write_block(&mut self, block: BlockId, data: &Block) -> Result<(), FileError> {
        self.check_bounds(block)?;
        self.check_length(data)?;

        self.file
            .seek(SeekFrom::Start(self.offset_of(block)))
            .map_err(FileError::Io)?;
        self.file.write_all(data.as_bytes()).map_err(FileError::Io)?;

        Ok(())
    }

    /// Append a new data block at the end of the file.
    ///
    /// Returns the address of the new block. Addresses are handed out
    /// sequentially, so consecutive calls return consecutive addresses.
    pub fn append_block(&mut self, data: &Block) -> Result<BlockId, FileError> {
        self.check_length(data)?;

        let block = self.header.num_blocks;
        let next = block.checked_add(1).ok_or(FileError::OutOfBlocks)?;

        self.file
            .seek(SeekFrom::Start(self.offset_of(block)))
            .map_err(FileError::Io)?;
        self.file.write_all(data.as_bytes()).map_err(FileError::Io)?;

        // Counted only once the block is on disk.
        self.header.num_blocks = next;
        Ok(block)
    }

    /// Write the header block and sync all pending writes to disk.
    pub fn sync(&mut self) -> Result<(), FileError> {
        self.write_header_block()?;
        self.file.sync_all().map_err(FileError::Io)
    }

    fn write_header_block(&mut self) -> Result<(), FileError> {
        let block = self.header.to_block(&self.user_header);
        self.file.seek(SeekFrom::Start(0)).map_err(FileError::Io)?;
        self.file
            .write_all(block.as_bytes())
            .map_err(FileError::Io)?;
        Ok(())
    }

    const fn check_bounds(&self, block: BlockId) -> Result<(), FileError> {
        if block >= self.header.num_blocks {
            return Err(FileError::BlockOutOfBounds {
                block,
                num_blocks: self.header.num_blocks,
            });
        }
        Ok(())
    }

    fn check_length(&self, data: &Block) -> Result<(), FileError> {
        if data.len() != self.block_length() {
            return Err(FileError::WrongBlockLength {
                expected: self.block_length(),
                actual: data.len(),
            });
        }
        Ok(())
    }

    fn offset_of(&self, block: BlockId) -> u64 {
        (u64::from(block) + 1) * u64::from(self.header.block_length)
    }
}

impl std::fmt::Debug for BlockFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFile")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur during file operations.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// File does not exist.
    NotFound(PathBuf),
    /// Header block error.
    Header(HeaderError),
    /// Block length too small to hold the file header.
    InvalidBlockLength(usize),
    /// Block address out of bounds.
    BlockOutOfBounds { block: BlockId, num_blocks: u32 },
    /// Buffer length does not match the file's block length.
    WrongBlockLength { expected: usize, actual: usize },
    /// User header bytes do not fit in the header block.
    HeaderTooLarge { len: usize, max: usize },
    /// File is shorter than its header claims.
    Truncated { expected: u64, actual: u64 },
    /// Block address space exhausted.
    OutOfBlocks,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
            Self::NotFound(p) => write!(f, "tree file {} does not exist", p.display()),
            Self::Header(e) => write!(f, "header error: {e}"),
            Self::InvalidBlockLength(len) => {
                write!(f, "invalid block length {len} (minimum {MIN_BLOCK_LENGTH})")
            }
            Self::BlockOutOfBounds { block, num_blocks } => {
                write!(f, "block {block} out of bounds (total blocks: {num_blocks})")
            }
            Self::WrongBlockLength { expected, actual } => {
                write!(f, "block buffer is {actual} bytes, expected {expected}")
            }
            Self::HeaderTooLarge { len, max } => {
                write!(f, "user header is {len} bytes, at most {max} fit")
            }
            Self::Truncated { expected, actual } => {
                write!(f, "file truncated: {actual} bytes, expected at least {expected}")
            }
            Self::OutOfBlocks => write!(f, "block address space exhausted"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Header(e) => Some(e),
            _ => None,
        }
    }
}
