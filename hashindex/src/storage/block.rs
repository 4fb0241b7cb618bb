//! Block buffers and addresses for the block store.
//!
//! A block is the unit of I/O and the identity of a tree node. The block
//! length is chosen when the file is created and stays fixed for the life of
//! the file.

/// A data block address (0-indexed, allocated sequentially).
pub type BlockId = u32;

/// On-disk encoding of "no block" in sibling and root fields.
pub const NO_BLOCK: i32 = -1;

/// Encode an optional block address as the on-disk `i32`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn encode_block_id(block: Option<BlockId>) -> i32 {
    match block {
        Some(b) => b as i32,
        None => NO_BLOCK,
    }
}

/// Decode an on-disk `i32` block address.
///
/// Returns `Err(raw)` for negative values other than the sentinel.
#[allow(clippy::cast_sign_loss)]
pub const fn decode_block_id(raw: i32) -> Result<Option<BlockId>, i32> {
    if raw == NO_BLOCK {
        Ok(None)
    } else if raw < 0 {
        Err(raw)
    } else {
        Ok(Some(raw as BlockId))
    }
}

/// An owned buffer holding exactly one block.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    data: Box<[u8]>,
}

impl Block {
    /// Create a new zeroed block of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Wrap raw bytes read from the file.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            data: bytes.into_boxed_slice(),
        }
    }

    /// Length of the block in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw block data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable access to the raw block data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a u32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.word(offset))
    }

    /// Write a u32 (little-endian) at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an i32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.word(offset))
    }

    /// Write an i32 (little-endian) at the given offset.
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an f32 (little-endian bit pattern) at the given offset.
    #[must_use]
    pub fn read_f32(&self, offset: usize) -> f32 {
        f32::from_le_bytes(self.word(offset))
    }

    /// Write an f32 (little-endian bit pattern) at the given offset.
    pub fn write_f32(&mut self, offset: usize, value: f32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn word(&self, offset: usize) -> [u8; 4] {
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = self.data.len().min(16);
        f.debug_struct("Block")
            .field("len", &self.data.len())
            .field("first_bytes", &&self.data[..shown])
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_read_write() {
        let mut block = Block::zeroed(64);

        block.write_u8(0, 0xFF);
        assert_eq!(block.read_u8(0), 0xFF);

        block.write_u32(4, 0x1234_5678);
        assert_eq!(block.read_u32(4), 0x1234_5678);

        block.write_i32(8, -42);
        assert_eq!(block.read_i32(8), -42);

        block.write_f32(12, -1.5);
        assert!((block.read_f32(12) - -1.5).abs() < f32::EPSILON);

        block.write_bytes(40, b"hello");
        assert_eq!(block.read_bytes(40, 5), b"hello");
    }

    #[test]
    fn test_block_id_sentinel() {
        assert_eq!(encode_block_id(None), NO_BLOCK);
        assert_eq!(encode_block_id(Some(7)), 7);
        assert_eq!(decode_block_id(NO_BLOCK), Ok(None));
        assert_eq!(decode_block_id(7), Ok(Some(7)));
        assert_eq!(decode_block_id(-5), Err(-5));
    }
}
