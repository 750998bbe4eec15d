//! dense bit allocator over whole bitmap blocks
//!
//! the allocator hands out abstract ids; it does not know which disk
//! blocks its bits stand for. it reads the log only when opened and writes
//! only when flushed into a transaction, so callers can treat an instance
//! as a private copy and drop it to undo every mutation.

use bitvec::prelude::*;

use crate::wal::{zero_block, Txn, Wal};
use crate::{BLOCK_SIZE, ITEMS_PER_BITMAP};

/// allocation bitmap spanning a run of whole disk blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
    blocks: usize,
}

impl Bitmap {
    /// a fresh bitmap of `blocks` zeroed blocks
    pub fn init(blocks: usize) -> Self {
        Bitmap {
            bits: BitVec::repeat(false, blocks * ITEMS_PER_BITMAP),
            blocks,
        }
    }

    /// read `blocks` bitmap blocks starting at logical block `at`
    pub fn open<L: Wal>(log: &L, at: u64, blocks: usize) -> Self {
        let mut bits = BitVec::with_capacity(blocks * ITEMS_PER_BITMAP);
        for i in 0..blocks {
            let b = log.read(at + i as u64);
            bits.extend_from_raw_slice(&b[..]);
        }
        Bitmap { bits, blocks }
    }

    /// buffer every bitmap block into `txn` starting at logical block `at`
    pub fn flush(&self, txn: &mut Txn, at: u64) {
        for (i, chunk) in self.bits.as_raw_slice().chunks(BLOCK_SIZE).enumerate() {
            let mut b = zero_block();
            b.copy_from_slice(chunk);
            txn.write(at + i as u64, b);
        }
    }

    /// allocate the lowest clear bit, or `None` when every bit is set
    pub fn alloc(&mut self) -> Option<u64> {
        let off = self.bits.first_zero()?;
        self.bits.set(off, true);
        Some(off as u64)
    }

    /// clear bit `off`; the bit must be set
    pub fn free(&mut self, off: u64) {
        let off = off as usize;
        assert!(off < self.bits.len(), "free of out-of-range id {off}");
        assert!(self.bits[off], "double free of id {off}");
        self.bits.set(off, false);
    }

    /// total ids tracked
    pub fn size(&self) -> u64 {
        (self.blocks * ITEMS_PER_BITMAP) as u64
    }

    /// ids still free
    pub fn free_count(&self) -> u64 {
        self.bits.count_zeros() as u64
    }
}
