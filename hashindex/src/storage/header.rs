//! File header structure and serialization.
//!
//! The file header occupies the start of the header block (file offset 0).
//! The rest of the header block is the user header region, owned by
//! whatever structure lives in the file (the B-tree stores its root there).

// Block lengths and block counts are bounded by u32 on disk.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::block::Block;

/// Magic number identifying a hash index tree file: "HIDXBTRE"
pub const MAGIC: [u8; 8] = *b"HIDXBTRE";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the file header prefix in bytes.
pub const FILE_HEADER_SIZE: usize = 24;

/// Smallest block length a file may be created with.
pub const MIN_BLOCK_LENGTH: usize = 40;

/// File header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const BLOCK_LENGTH: usize = 12;
    pub const NUM_BLOCKS: usize = 16;
    pub const CHECKSUM: usize = 20;
    // 24..block_length: user header region
}

/// Metadata describing the block file itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version number.
    pub format_version: u32,
    /// Length of every block in bytes, header block included.
    pub block_length: u32,
    /// Number of allocated data blocks (the header block is not counted).
    pub num_blocks: u32,
}

impl FileHeader {
    /// Create a header for a fresh file with no data blocks.
    #[must_use]
    pub const fn new(block_length: u32) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            block_length,
            num_blocks: 0,
        }
    }

    /// Size of the user header region for this block length.
    #[must_use]
    pub const fn user_region_len(&self) -> usize {
        self.block_length as usize - FILE_HEADER_SIZE
    }

    /// Serialize the header and the user region into a full header block.
    ///
    /// `user` is truncated or zero-padded to the user region length.
    #[must_use]
    pub fn to_block(&self, user: &[u8]) -> Block {
        let mut block = Block::zeroed(self.block_length as usize);

        block.write_bytes(offsets::MAGIC, &MAGIC);
        block.write_u32(offsets::FORMAT_VERSION, self.format_version);
        block.write_u32(offsets::BLOCK_LENGTH, self.block_length);
        block.write_u32(offsets::NUM_BLOCKS, self.num_blocks);

        let n = user.len().min(self.user_region_len());
        block.write_bytes(FILE_HEADER_SIZE, &user[..n]);

        let checksum = compute_checksum(&block);
        block.write_u32(offsets::CHECKSUM, checksum);
        block
    }

    /// Parse just the fixed prefix, before the block length is known.
    ///
    /// Validates magic, version and block length but not the checksum,
    /// which covers the whole block.
    pub fn from_prefix(prefix: &[u8; FILE_HEADER_SIZE]) -> Result<Self, HeaderError> {
        let block = Block::from_vec(prefix.to_vec());

        let mut magic = [0u8; 8];
        magic.copy_from_slice(block.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let format_version = block.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(format_version));
        }

        let block_length = block.read_u32(offsets::BLOCK_LENGTH);
        if (block_length as usize) < MIN_BLOCK_LENGTH {
            return Err(HeaderError::InvalidBlockLength(block_length));
        }

        Ok(Self {
            format_version,
            block_length,
            num_blocks: block.read_u32(offsets::NUM_BLOCKS),
        })
    }

    /// Deserialize a header from a full header block, verifying the checksum.
    pub fn from_block(block: &Block) -> Result<Self, HeaderError> {
        if block.len() < MIN_BLOCK_LENGTH {
            return Err(HeaderError::InvalidBlockLength(block.len() as u32));
        }
        let mut prefix = [0u8; FILE_HEADER_SIZE];
        prefix.copy_from_slice(block.read_bytes(0, FILE_HEADER_SIZE));
        let header = Self::from_prefix(&prefix)?;

        if header.block_length as usize != block.len() {
            return Err(HeaderError::InvalidBlockLength(header.block_length));
        }

        let expected = block.read_u32(offsets::CHECKSUM);
        let actual = compute_checksum(block);
        if expected != actual {
            return Err(HeaderError::ChecksumMismatch { expected, actual });
        }

        Ok(header)
    }
}

/// CRC32 of the header block with the checksum field treated as zero.
fn compute_checksum(block: &Block) -> u32 {
    let bytes = block.as_bytes();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..offsets::CHECKSUM]);
    hasher.update(&[0u8; 4]);
    hasher.update(&bytes[offsets::CHECKSUM + 4..]);
    hasher.finalize()
}

/// Errors that can occur when reading a file header.
#[derive(Debug)]
pub enum HeaderError {
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Block length too small or inconsistent with the header block.
    InvalidBlockLength(u32),
    /// Header block checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::InvalidBlockLength(len) => write!(f, "invalid block length: {len}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "header checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
                )
            }
        }
    }
}

impl std::error::Error for HeaderError {}
