//! a small crash-consistent filesystem layered over an append-only
//! write-ahead log
//!
//! the log exposes a block-addressed logical disk with this layout:
//!
//! ```text
//! [ superblock | block bitmaps | inode table | data blocks ]
//! ```
//!
//! every mutation is staged into one transaction and committed atomically,
//! so a crash between operations leaves either the pre-state or the complete
//! post-state visible.

pub mod bitmap;
pub mod codec;
pub mod directory;
pub mod fs;
pub mod inode;
pub mod superblock;
pub mod wal;

pub use fs::Fs;
pub use inode::{Attr, Bnum, Inode, InodeKind, Inum};
pub use superblock::SuperBlock;
pub use wal::{Block, MemWal, Txn, Wal};

/// size of one disk block in bytes
pub const BLOCK_SIZE: usize = 4096;

/// direct block pointers per inode; an inode fills exactly one block,
/// so there are (4096 - 3 * 8) / 8 of them
pub const NUM_DIRECT: usize = (BLOCK_SIZE - 24) / 8;

/// bits tracked by one bitmap block
pub const ITEMS_PER_BITMAP: usize = BLOCK_SIZE * 8;

/// maximum directory entry name length in bytes
pub const MAX_NAME_LEN: usize = BLOCK_SIZE - 1 - 8;

/// inode number of the root directory
pub const ROOT_INODE: Inum = 1;
