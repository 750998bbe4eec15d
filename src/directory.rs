//! directory entries and their one-block codec
//!
//! a directory's data is a sequence of entry records, one record per
//! block; its size is therefore always a whole number of blocks

use crate::codec::{Dec, Enc};
use crate::inode::Inum;
use crate::wal::Block;
use crate::MAX_NAME_LEN;

/// a single directory entry
///
/// any record whose valid byte is 0 is a free slot, whatever the other
/// fields say
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEnt {
    pub valid: bool,
    pub name: String,
    pub i: Inum,
}

impl DirEnt {
    /// the record written into a freed slot
    pub fn empty() -> Self {
        DirEnt::default()
    }

    pub fn encode(&self) -> Block {
        assert!(
            self.name.len() <= MAX_NAME_LEN,
            "directory entry name too long"
        );
        let mut enc = Enc::new();
        enc.put_string(&self.name);
        enc.put_bool(self.valid);
        enc.put_int(self.i);
        enc.finish()
    }

    pub fn decode(b: &Block) -> Self {
        let mut dec = Dec::new(b);
        let name = dec.get_string();
        let valid = dec.get_bool();
        let i = dec.get_int();
        DirEnt { valid, name, i }
    }
}
