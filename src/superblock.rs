//! on-disk geometry, derived from two persisted numbers

use anyhow::{ensure, Result};
use byte_unit::Byte;

use crate::codec::{Dec, Enc};
use crate::wal::Block;
use crate::{BLOCK_SIZE, ITEMS_PER_BITMAP};

/// layout of the logical disk:
/// `[ superblock | block bitmaps | inode table | data blocks ]`
///
/// only `num_inodes` and `num_block_bitmaps` are persisted (in block 0);
/// every other field is recomputed on open, so identical persisted bytes
/// always derive identical geometry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuperBlock {
    /// length of the inode table in blocks, persisted
    pub num_inodes: u64,
    /// length of the bitmap region in blocks, persisted
    pub num_block_bitmaps: u64,
    /// first block of the bitmap region
    pub block_alloc_base: u64,
    /// first block of the inode table
    pub inode_base: u64,
    /// first block of the data region
    pub data_base: u64,
    /// highest disk size the layout can address
    pub fs_size: u64,
}

impl SuperBlock {
    /// choose a geometry for a disk of `disk_size` blocks
    pub fn new(disk_size: u64) -> Result<Self> {
        // this isn't the precise threshold, but anything smaller has no
        // room for a data region
        ensure!(
            disk_size >= 10,
            "disk too small: {} blocks, need at least 10 ({})",
            disk_size,
            Byte::from_bytes(10 * BLOCK_SIZE as u128).get_appropriate_unit(true),
        );
        let num_inodes = (disk_size - 2) / 4;
        let num_block_bitmaps =
            (disk_size - 1 - num_inodes).div_ceil(ITEMS_PER_BITMAP as u64);
        let mut sb = SuperBlock {
            num_inodes,
            num_block_bitmaps,
            ..SuperBlock::default()
        };
        sb.compute_fields();
        Ok(sb)
    }

    fn compute_fields(&mut self) {
        self.block_alloc_base = 1;
        self.inode_base = self.block_alloc_base + self.num_block_bitmaps;
        self.data_base = self.inode_base + self.num_inodes;
        self.fs_size = self.data_base + self.num_block_bitmaps * ITEMS_PER_BITMAP as u64;
    }

    pub fn encode(&self) -> Block {
        let mut enc = Enc::new();
        enc.put_int(self.num_inodes);
        enc.put_int(self.num_block_bitmaps);
        enc.finish()
    }

    pub fn decode(b: &Block) -> Self {
        let mut dec = Dec::new(b);
        let mut sb = SuperBlock {
            num_inodes: dec.get_int(),
            num_block_bitmaps: dec.get_int(),
            ..SuperBlock::default()
        };
        sb.compute_fields();
        sb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_for_10000_blocks() {
        let sb = SuperBlock::new(10_000).unwrap();
        assert_eq!(sb.num_inodes, 2499);
        assert_eq!(sb.num_block_bitmaps, 1);
        assert_eq!(sb.block_alloc_base, 1);
        assert_eq!(sb.inode_base, 2);
        assert_eq!(sb.data_base, 2501);
        assert_eq!(sb.fs_size, 2501 + ITEMS_PER_BITMAP as u64);
    }

    #[test]
    fn test_bitmap_region_covers_the_disk() {
        // large enough to need more than one bitmap block
        let disk_size = 200_000;
        let sb = SuperBlock::new(disk_size).unwrap();
        assert!(sb.num_block_bitmaps > 1);
        assert!(sb.fs_size >= disk_size);
    }

    #[test]
    fn test_smallest_accepted_disk() {
        let sb = SuperBlock::new(10).unwrap();
        assert_eq!(sb.num_inodes, 2);
        assert!(sb.data_base < 10);
    }

    #[test]
    fn test_too_small_disk_is_rejected() {
        assert!(SuperBlock::new(9).is_err());
        assert!(SuperBlock::new(0).is_err());
    }

    #[test]
    fn test_encode_decode_identity() {
        let sb = SuperBlock::new(10_000).unwrap();
        assert_eq!(SuperBlock::decode(&sb.encode()), sb);
    }
}
