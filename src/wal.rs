//! interface to the write-ahead log that owns the disk
//!
//! the filesystem stages every mutation into a [Txn] and commits once;
//! the log applies a committed transaction atomically. reads return
//! committed state only, including while a transaction is open.

use crate::BLOCK_SIZE;

/// one disk block
pub type Block = Box<[u8; BLOCK_SIZE]>;

/// a zeroed block
pub fn zero_block() -> Block {
    Box::new([0u8; BLOCK_SIZE])
}

/// the log interface the filesystem consumes
pub trait Wal {
    /// total logical block count
    fn size(&self) -> u64;

    /// read a committed block
    fn read(&self, bnum: u64) -> Block;

    /// open a transaction
    fn begin(&self) -> Txn;

    /// atomically make all writes buffered in `txn` durable
    fn commit(&mut self, txn: Txn);
}

/// a group of block writes that become durable together
///
/// dropping a transaction without committing abandons it; committed state
/// is untouched
#[derive(Default)]
pub struct Txn {
    writes: Vec<(u64, Block)>,
}

impl Txn {
    pub fn new() -> Self {
        Txn::default()
    }

    /// buffer a write; visible only after commit
    pub fn write(&mut self, bnum: u64, b: Block) {
        self.writes.push((bnum, b));
    }

    /// the buffered writes in order; later writes to a block supersede
    /// earlier ones
    pub fn into_writes(self) -> Vec<(u64, Block)> {
        self.writes
    }
}

/// an in-memory log, enough to run the filesystem without a durable disk
pub struct MemWal {
    blocks: Vec<Block>,
}

impl MemWal {
    pub fn new(size: u64) -> Self {
        MemWal {
            blocks: (0..size).map(|_| zero_block()).collect(),
        }
    }
}

impl Wal for MemWal {
    fn size(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn read(&self, bnum: u64) -> Block {
        self.blocks[bnum as usize].clone()
    }

    fn begin(&self) -> Txn {
        Txn::new()
    }

    fn commit(&mut self, txn: Txn) {
        for (bnum, b) in txn.into_writes() {
            self.blocks[bnum as usize] = b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(x: u8) -> Block {
        Box::new([x; BLOCK_SIZE])
    }

    #[test]
    fn test_fresh_log_is_zeroed() {
        let log = MemWal::new(4);
        assert_eq!(log.size(), 4);
        assert!(log.read(3).iter().all(|&x| x == 0));
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let mut log = MemWal::new(4);
        let mut txn = log.begin();
        txn.write(1, block_of(0xaa));
        txn.write(3, block_of(0xbb));
        log.commit(txn);
        assert_eq!(log.read(1)[0], 0xaa);
        assert_eq!(log.read(3)[0], 0xbb);
        assert_eq!(log.read(2)[0], 0);
    }

    #[test]
    fn test_reads_see_committed_state_only() {
        let mut log = MemWal::new(2);
        let mut txn = log.begin();
        txn.write(0, block_of(0xaa));
        // not yet committed
        assert_eq!(log.read(0)[0], 0);
        log.commit(txn);
        assert_eq!(log.read(0)[0], 0xaa);
    }

    #[test]
    fn test_abandoned_txn_leaves_no_trace() {
        let mut log = MemWal::new(2);
        {
            let mut txn = log.begin();
            txn.write(0, block_of(0xcc));
            // dropped without commit
        }
        assert_eq!(log.read(0)[0], 0);
        log.commit(log.begin());
        assert_eq!(log.read(0)[0], 0);
    }

    #[test]
    fn test_last_write_to_a_block_wins() {
        let mut log = MemWal::new(1);
        let mut txn = log.begin();
        txn.write(0, block_of(1));
        txn.write(0, block_of(2));
        log.commit(txn);
        assert_eq!(log.read(0)[0], 2);
    }

    #[test]
    #[should_panic]
    fn test_read_out_of_range_panics() {
        let log = MemWal::new(2);
        log.read(2);
    }
}
