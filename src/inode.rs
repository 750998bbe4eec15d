//! inode representation and its one-block codec

use crate::codec::{Dec, Enc};
use crate::wal::Block;
use crate::NUM_DIRECT;

/// 1-based inode number; 0 is invalid
pub type Inum = u64;

/// absolute data-block number; 0 marks an unused direct slot
pub type Bnum = u64;

/// what an inode currently holds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    Free,
    Dir,
    File,
}

impl From<InodeKind> for u64 {
    fn from(kind: InodeKind) -> u64 {
        match kind {
            InodeKind::Free => 0,
            InodeKind::Dir => 1,
            InodeKind::File => 2,
        }
    }
}

impl InodeKind {
    fn from_raw(x: u64) -> Self {
        match x {
            0 => InodeKind::Free,
            1 => InodeKind::Dir,
            2 => InodeKind::File,
            _ => panic!("corrupt inode: unknown kind tag {x}"),
        }
    }
}

/// the attributes the filesystem maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub is_dir: bool,
}

/// one inode; fills exactly one block on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub kind: InodeKind,
    /// generation counter, not yet maintained
    pub gen: u64,
    /// logical size in bytes
    pub nbytes: u64,
    /// direct block pointers, one per block offset within the file
    pub direct: [Bnum; NUM_DIRECT],
}

impl Inode {
    pub fn new(kind: InodeKind) -> Self {
        Inode {
            kind,
            gen: 0,
            nbytes: 0,
            direct: [0; NUM_DIRECT],
        }
    }

    /// translate a block offset within the file to its disk block
    ///
    /// the only offset-to-block translation there is; no indirect blocks
    pub fn btoa(&self, boff: u64) -> Bnum {
        assert!((boff as usize) < NUM_DIRECT, "invalid block offset {boff}");
        self.direct[boff as usize]
    }

    pub fn encode(&self) -> Block {
        let mut enc = Enc::new();
        enc.put_int(self.kind.into());
        enc.put_int(self.gen);
        enc.put_int(self.nbytes);
        enc.put_ints(&self.direct);
        enc.finish()
    }

    pub fn decode(b: &Block) -> Self {
        let mut dec = Dec::new(b);
        let kind = InodeKind::from_raw(dec.get_int());
        let gen = dec.get_int();
        let nbytes = dec.get_int();
        let direct = dec
            .get_ints(NUM_DIRECT)
            .try_into()
            .expect("direct table length mismatch");
        Inode {
            kind,
            gen,
            nbytes,
            direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_identity() {
        let mut ino = Inode::new(InodeKind::File);
        ino.gen = 7;
        ino.nbytes = 12_345;
        ino.direct[0] = 2501;
        ino.direct[1] = 2502;
        ino.direct[NUM_DIRECT - 1] = 9999;
        assert_eq!(Inode::decode(&ino.encode()), ino);
    }

    #[test]
    fn test_fresh_inode_is_empty() {
        let ino = Inode::new(InodeKind::Dir);
        assert_eq!(ino.nbytes, 0);
        assert!(ino.direct.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(u64::from(InodeKind::Free), 0);
        assert_eq!(u64::from(InodeKind::Dir), 1);
        assert_eq!(u64::from(InodeKind::File), 2);
    }

    #[test]
    fn test_btoa_reads_direct_slot() {
        let mut ino = Inode::new(InodeKind::File);
        ino.direct[3] = 77;
        assert_eq!(ino.btoa(3), 77);
        assert_eq!(ino.btoa(4), 0);
    }

    #[test]
    #[should_panic(expected = "invalid block offset")]
    fn test_btoa_past_direct_limit_panics() {
        Inode::new(InodeKind::File).btoa(NUM_DIRECT as u64);
    }

    #[test]
    #[should_panic(expected = "unknown kind tag")]
    fn test_unknown_kind_tag_panics() {
        let mut ino = Inode::new(InodeKind::File);
        ino.gen = 0;
        let mut b = ino.encode();
        b[0] = 9;
        Inode::decode(&b);
    }
}
