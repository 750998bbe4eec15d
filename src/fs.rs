//! the transactional filesystem core
//!
//! every mutating call opens one transaction, stages its whole effect
//! (bitmap, inode and data blocks) and commits once. reads inside a
//! transaction return committed state only, so no routine may depend on
//! reading back a block it staged in the same transaction.

use anyhow::{ensure, Result};
use log::{debug, info};

use crate::bitmap::Bitmap;
use crate::directory::DirEnt;
use crate::inode::{Attr, Inode, InodeKind, Inum};
use crate::superblock::SuperBlock;
use crate::wal::{zero_block, Block, Txn, Wal};
use crate::{BLOCK_SIZE, NUM_DIRECT, ROOT_INODE};

const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

/// a filesystem over a write-ahead log
///
/// holds the log and an immutable copy of the superblock; the allocation
/// bitmap is deliberately not cached here. each mutating call re-reads it
/// from committed state inside its own transaction, so there is never a
/// split view between memory and disk.
pub struct Fs<L: Wal> {
    log: L,
    sb: SuperBlock,
}

/// construction
impl<L: Wal> Fs<L> {
    /// format a fresh filesystem onto `log`
    ///
    /// lays down the superblock, an empty bitmap, a root directory and a
    /// fully initialised table of free inodes, all in one transaction
    pub fn new_fs(mut log: L) -> Result<Self> {
        let sb = SuperBlock::new(log.size())?;
        info!(
            "formatting filesystem: {} inodes, {} bitmap blocks, data region at block {}",
            sb.num_inodes, sb.num_block_bitmaps, sb.data_base
        );
        let bitmap = Bitmap::init(sb.num_block_bitmaps as usize);
        let mut txn = log.begin();
        txn.write(0, sb.encode());
        bitmap.flush(&mut txn, sb.block_alloc_base);
        txn.write(sb.inode_base, Inode::new(InodeKind::Dir).encode());
        let free = Inode::new(InodeKind::Free).encode();
        for i in 2..=sb.num_inodes {
            txn.write(sb.inode_base + (i - 1), free.clone());
        }
        log.commit(txn);
        Ok(Fs { log, sb })
    }

    /// open an existing filesystem from block 0 of `log`
    pub fn open_fs(log: L) -> Result<Self> {
        let sb = SuperBlock::decode(&log.read(0));
        ensure!(
            sb.num_inodes > 0 && sb.data_base <= log.size(),
            "no filesystem found on this log"
        );
        info!(
            "opened filesystem: {} inodes, data region at block {}",
            sb.num_inodes, sb.data_base
        );
        Ok(Fs { log, sb })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    /// give the log back, consuming the filesystem
    pub fn into_log(self) -> L {
        self.log
    }
}

/// inode table access
impl<L: Wal> Fs<L> {
    fn get_inode(&self, i: Inum) -> Inode {
        assert!(i != 0, "0 is an invalid inode number");
        assert!(i <= self.sb.num_inodes, "invalid inode number {i}");
        Inode::decode(&self.log.read(self.sb.inode_base + (i - 1)))
    }

    fn flush_inode(&self, txn: &mut Txn, i: Inum, ino: &Inode) {
        txn.write(self.sb.inode_base + (i - 1), ino.encode());
    }

    /// the smallest free inode, by linear scan of committed state
    fn find_free_inode(&self) -> Option<(Inum, Inode)> {
        (1..=self.sb.num_inodes)
            .map(|i| (i, self.get_inode(i)))
            .find(|(_, ino)| ino.kind == InodeKind::Free)
    }

    /// unlink aftermath: return the inode's blocks to the allocator and
    /// mark the slot free, inside the caller's transaction
    fn reclaim_inode(&self, txn: &mut Txn, i: Inum, mut ino: Inode) {
        self.shrink_inode(txn, &mut ino, 0);
        ino.kind = InodeKind::Free;
        self.flush_inode(txn, i, &ino);
    }
}

/// data region access through an inode's direct table
impl<L: Wal> Fs<L> {
    fn read_block(&self, ino: &Inode, boff: u64) -> Block {
        let bnum = ino.btoa(boff);
        assert!(bnum != 0, "read of unallocated block offset {boff}");
        self.log.read(bnum)
    }

    fn put_block(&self, txn: &mut Txn, ino: &Inode, boff: u64, b: Block) {
        let bnum = ino.btoa(boff);
        assert!(bnum != 0, "write of unallocated block offset {boff}");
        txn.write(bnum, b);
    }

    fn open_bitmap(&self) -> Bitmap {
        Bitmap::open(
            &self.log,
            self.sb.block_alloc_base,
            self.sb.num_block_bitmaps as usize,
        )
    }

    /// grow `ino` to `new_len` bytes, allocating data blocks as needed
    ///
    /// operates on a private copy of the bitmap and flushes it only once
    /// the whole growth has succeeded; a false return leaves the
    /// transaction untouched (the caller discards the inode)
    fn grow_inode(&self, txn: &mut Txn, ino: &mut Inode, new_len: u64) -> bool {
        assert!(ino.nbytes <= new_len, "grow_inode requires a larger length");
        let old_blks = ino.nbytes.div_ceil(BLOCK_SIZE_U64);
        let new_blks = new_len.div_ceil(BLOCK_SIZE_U64);
        if new_blks as usize > NUM_DIRECT {
            return false;
        }
        if new_blks > old_blks {
            let mut bitmap = self.open_bitmap();
            for b in old_blks..new_blks {
                // the bitmap's last block covers more ids than the data
                // region has blocks; ids past the end of the disk count
                // as exhaustion
                let bnum = match bitmap.alloc() {
                    Some(off) if self.sb.data_base + off < self.log.size() => {
                        self.sb.data_base + off
                    }
                    _ => {
                        debug!("grow to {new_blks} blocks failed: out of data blocks");
                        return false;
                    }
                };
                ino.direct[b as usize] = bnum;
            }
            bitmap.flush(txn, self.sb.block_alloc_base);
        }
        ino.nbytes = new_len;
        true
    }

    /// shrink `ino` to `new_len` bytes, freeing the blocks past the end
    fn shrink_inode(&self, txn: &mut Txn, ino: &mut Inode, new_len: u64) {
        assert!(new_len <= ino.nbytes, "shrink_inode requires a smaller length");
        let old_blks = ino.nbytes.div_ceil(BLOCK_SIZE_U64);
        let new_blks = new_len.div_ceil(BLOCK_SIZE_U64);
        if new_blks < old_blks {
            let mut bitmap = self.open_bitmap();
            for b in new_blks..old_blks {
                bitmap.free(ino.btoa(b) - self.sb.data_base);
                ino.direct[b as usize] = 0;
            }
            bitmap.flush(txn, self.sb.block_alloc_base);
        }
        ino.nbytes = new_len;
    }
}

/// directory scan, link and unlink
impl<L: Wal> Fs<L> {
    /// find `name` in `dir`: the child inum and the entry's block offset
    fn dir_lookup(&self, dir: &Inode, name: &str) -> Option<(Inum, u64)> {
        for b in 0..dir.nbytes / BLOCK_SIZE_U64 {
            let ent = DirEnt::decode(&self.read_block(dir, b));
            if ent.valid && ent.name == name {
                return Some((ent.i, b));
            }
        }
        None
    }

    /// the first free entry slot, growing the directory by one block when
    /// every slot is taken
    fn find_free_dir_ent(&self, txn: &mut Txn, dir: &mut Inode) -> Option<u64> {
        let blocks = dir.nbytes / BLOCK_SIZE_U64;
        for b in 0..blocks {
            if !DirEnt::decode(&self.read_block(dir, b)).valid {
                return Some(b);
            }
        }
        if !self.grow_inode(txn, dir, dir.nbytes + BLOCK_SIZE_U64) {
            return None;
        }
        Some(blocks)
    }

    /// stage a live entry into slot `boff` of `dir`
    fn write_link(&self, txn: &mut Txn, dir: &Inode, boff: u64, name: &str, i: Inum) {
        assert!(dir.kind == InodeKind::Dir, "link target must be a directory");
        assert!(i != 0 && i <= self.sb.num_inodes, "invalid inode number {i}");
        let ent = DirEnt {
            valid: true,
            name: name.to_owned(),
            i,
        };
        self.put_block(txn, dir, boff, ent.encode());
    }

    /// link `name` to inode `i` in a free slot of `dir`
    fn create_link(&self, txn: &mut Txn, dir: &mut Inode, name: &str, i: Inum) -> Option<u64> {
        let boff = self.find_free_dir_ent(txn, dir)?;
        self.write_link(txn, dir, boff, name, i);
        Some(boff)
    }

    fn is_dir_empty(&self, dir: &Inode) -> bool {
        (0..dir.nbytes / BLOCK_SIZE_U64)
            .all(|b| !DirEnt::decode(&self.read_block(dir, b)).valid)
    }

    /// names of all valid entries, in block order
    fn read_dir_entries(&self, dir: &Inode) -> Vec<String> {
        (0..dir.nbytes / BLOCK_SIZE_U64)
            .map(|b| DirEnt::decode(&self.read_block(dir, b)))
            .filter(|ent| ent.valid)
            .map(|ent| ent.name)
            .collect()
    }
}

/// the public api
impl<L: Wal> Fs<L> {
    /// the inode number of the filesystem root, always a directory
    pub fn root_inode(&self) -> Inum {
        ROOT_INODE
    }

    /// attributes of inode `i`, or `None` when the inode is free
    pub fn get_attr(&self, i: Inum) -> Option<Attr> {
        match self.get_inode(i).kind {
            InodeKind::Free => None,
            kind => Some(Attr {
                is_dir: kind == InodeKind::Dir,
            }),
        }
    }

    /// the inum `name` refers to in directory `dir_i`, if any
    pub fn lookup(&self, dir_i: Inum, name: &str) -> Option<Inum> {
        let dir = self.get_inode(dir_i);
        assert!(dir.kind == InodeKind::Dir, "lookup requires a directory");
        self.dir_lookup(&dir, name).map(|(i, _)| i)
    }

    /// create an empty file named `name` in directory `dir_i`
    ///
    /// a checked create fails when the name is taken. an unchecked create
    /// replaces an existing file (unlinking and reclaiming it) but will
    /// not replace a directory.
    pub fn create(&mut self, dir_i: Inum, name: &str, unchecked: bool) -> Option<Inum> {
        self.create_node(dir_i, name, unchecked, InodeKind::File)
    }

    /// create an empty subdirectory named `name` in directory `dir_i`
    pub fn mkdir(&mut self, dir_i: Inum, name: &str) -> Option<Inum> {
        self.create_node(dir_i, name, false, InodeKind::Dir)
    }

    fn create_node(
        &mut self,
        dir_i: Inum,
        name: &str,
        unchecked: bool,
        kind: InodeKind,
    ) -> Option<Inum> {
        debug!("create {kind:?} {name:?} in dir {dir_i} (unchecked: {unchecked})");
        let mut txn = self.log.begin();
        let mut dir = self.get_inode(dir_i);
        assert!(dir.kind == InodeKind::Dir, "create requires a directory");
        let mut reuse = None;
        match self.dir_lookup(&dir, name) {
            Some((old_i, boff)) if unchecked => {
                let old = self.get_inode(old_i);
                assert!(
                    old.kind != InodeKind::Free,
                    "directory entry points at a free inode"
                );
                if old.kind == InodeKind::Dir {
                    return None;
                }
                self.reclaim_inode(&mut txn, old_i, old);
                // the committed entry still looks valid to a scan, so the
                // new link reuses its slot instead of searching for one
                reuse = Some(boff);
            }
            Some(_) => return None,
            None => {}
        }
        let Some((i, mut ino)) = self.find_free_inode() else {
            debug!("create {name:?} failed: inode table full");
            return None;
        };
        match reuse {
            Some(boff) => self.write_link(&mut txn, &dir, boff, name, i),
            None => {
                self.create_link(&mut txn, &mut dir, name, i)?;
            }
        }
        ino.kind = kind;
        self.flush_inode(&mut txn, dir_i, &dir);
        self.flush_inode(&mut txn, i, &ino);
        self.log.commit(txn);
        Some(i)
    }

    /// read `len` bytes at byte offset `off` from file `i`
    ///
    /// reads never cross the end of the file; a range past `nbytes` fails
    /// outright rather than returning a short read
    pub fn read(&self, i: Inum, off: u64, len: u64) -> Option<Vec<u8>> {
        let ino = self.get_inode(i);
        if ino.kind != InodeKind::File {
            return None;
        }
        if off.checked_add(len).map_or(true, |end| end > ino.nbytes) {
            return None;
        }
        let mut data = Vec::with_capacity(len as usize);
        let mut pos = off;
        while (data.len() as u64) < len {
            let b = self.read_block(&ino, pos / BLOCK_SIZE_U64);
            let start = (pos % BLOCK_SIZE_U64) as usize;
            let take = (len as usize - data.len()).min(BLOCK_SIZE - start);
            data.extend_from_slice(&b[start..start + take]);
            pos += take as u64;
        }
        Some(data)
    }

    /// write `data` into file `i` at byte offset `off`, growing the file
    /// when the write reaches past its current end
    pub fn write(&mut self, i: Inum, off: u64, data: &[u8]) -> bool {
        debug!("write {} bytes at offset {off} to inode {i}", data.len());
        if data.is_empty() {
            return true;
        }
        let mut txn = self.log.begin();
        let mut ino = self.get_inode(i);
        if ino.kind != InodeKind::File {
            return false;
        }
        let Some(end) = off.checked_add(data.len() as u64) else {
            return false;
        };
        let old_nbytes = ino.nbytes;
        if end > old_nbytes && !self.grow_inode(&mut txn, &mut ino, end) {
            return false;
        }
        let old_blks = old_nbytes.div_ceil(BLOCK_SIZE_U64);
        // blocks the growth added but the data below never touches (a
        // seek past the end left a gap): stage them as zeros so recycled
        // blocks cannot leak their previous contents
        for b in old_blks..(off / BLOCK_SIZE_U64).min(end.div_ceil(BLOCK_SIZE_U64)) {
            self.put_block(&mut txn, &ino, b, zero_block());
        }
        let mut pos = off;
        let mut written = 0;
        while written < data.len() {
            let boff = pos / BLOCK_SIZE_U64;
            let start = (pos % BLOCK_SIZE_U64) as usize;
            let take = (data.len() - written).min(BLOCK_SIZE - start);
            let mut b = if start == 0 && take == BLOCK_SIZE {
                // fully overwritten, nothing to preserve
                zero_block()
            } else if boff < old_blks {
                self.read_block(&ino, boff)
            } else {
                // freshly allocated block: logically zero, never the
                // stale committed contents of a recycled block
                zero_block()
            };
            b[start..start + take].copy_from_slice(&data[written..written + take]);
            self.put_block(&mut txn, &ino, boff, b);
            pos += take as u64;
            written += take;
        }
        if ino.nbytes != old_nbytes {
            self.flush_inode(&mut txn, i, &ino);
        }
        self.log.commit(txn);
        true
    }

    /// names of all entries in directory `i`, snapshot at invocation
    pub fn readdir(&self, i: Inum) -> Vec<String> {
        let dir = self.get_inode(i);
        assert!(dir.kind == InodeKind::Dir, "readdir requires a directory");
        self.read_dir_entries(&dir)
    }

    /// unlink `name` from directory `dir_i` and reclaim the child
    ///
    /// fails when the name is absent or the child is a non-empty
    /// directory; the child's inode and data blocks return to their
    /// allocators in the same transaction as the unlink
    pub fn remove(&mut self, dir_i: Inum, name: &str) -> bool {
        debug!("remove {name:?} from dir {dir_i}");
        let mut txn = self.log.begin();
        let dir = self.get_inode(dir_i);
        assert!(dir.kind == InodeKind::Dir, "remove requires a directory");
        let Some((child_i, boff)) = self.dir_lookup(&dir, name) else {
            return false;
        };
        let child = self.get_inode(child_i);
        assert!(
            child.kind != InodeKind::Free,
            "directory entry points at a free inode"
        );
        if child.kind == InodeKind::Dir && !self.is_dir_empty(&child) {
            return false;
        }
        self.put_block(&mut txn, &dir, boff, DirEnt::empty().encode());
        self.reclaim_inode(&mut txn, child_i, child);
        self.log.commit(txn);
        true
    }
}
