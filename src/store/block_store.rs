//! `StringBlockStore`: a free-list allocator over fixed 16-byte nodes,
//! embedded in one growable file mapping (spec §4.1).
//!
//! The mapping's address can move on every grow, so nothing here ever keeps
//! a raw pointer or slice alive across a `grow_by` call — every access goes
//! back through `self.mmap` freshly sliced by node index (Design Notes §9).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bytemuck::{bytes_of, from_bytes, from_bytes_mut};
use memmap2::MmapMut;

use crate::errors::{Result, StoreError};
use crate::store::layout::{
    block_count, file_size, nodes_offset, ChainBlock, Entry, Header, ENTRY_SIZE, HEADER_SIZE,
    NODE_SIZE, SMALL_PAYLOAD, TERMINAL_PAYLOAD,
};

pub struct StringBlockStore {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
    row_count: usize,
}

impl StringBlockStore {
    /// Creates a fresh column file sized for `row_count` rows, each owning a
    /// single-block chain of length 0 (spec §3 "Initial state at creation").
    pub fn create<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                StoreError::StorageFailure(format!("create {}: {e}", path.display()))
            })?;
        let size = file_size(row_count, row_count);
        file.set_len(size as u64).map_err(|e| {
            StoreError::StorageFailure(format!("ftruncate {}: {e}", path.display()))
        })?;
        let mut mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| StoreError::StorageFailure(format!("mmap {}: {e}", path.display())))?
        };

        *from_bytes_mut::<Header>(&mut mmap[..HEADER_SIZE]) = Header {
            free_start: 0,
            free_count: 0,
        };
        for i in 0..row_count {
            let off = HEADER_SIZE + i * ENTRY_SIZE;
            *from_bytes_mut::<Entry>(&mut mmap[off..off + ENTRY_SIZE]) = Entry {
                link: i as i32,
                length: 0,
            };
        }
        mmap.flush()
            .map_err(|e| StoreError::StorageFailure(format!("msync {}: {e}", path.display())))?;

        log::info!(
            "created string column store {} ({} rows, {} bytes)",
            path.display(),
            row_count,
            size
        );
        Ok(Self {
            file,
            mmap,
            path,
            row_count,
        })
    }

    /// Opens an existing column file. `row_count` comes from the dataset's
    /// manifest-fixed length, not from the file itself.
    pub fn open<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::StorageFailure(format!("open {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::StorageFailure(format!("stat {}: {e}", path.display())))?
            .len() as usize;
        let min_len = HEADER_SIZE + row_count * ENTRY_SIZE;
        if len < min_len || (len - min_len) % NODE_SIZE != 0 {
            return Err(StoreError::ManifestCorrupt(format!(
                "string column {} has size {len}, inconsistent with {row_count} rows",
                path.display()
            )));
        }
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| StoreError::StorageFailure(format!("mmap {}: {e}", path.display())))?
        };
        Ok(Self {
            file,
            mmap,
            path,
            row_count,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn file_len(&self) -> usize {
        self.mmap.len()
    }

    pub fn node_count(&self) -> usize {
        (self.mmap.len() - nodes_offset(self.row_count)) / NODE_SIZE
    }

    pub fn header(&self) -> Header {
        *from_bytes(&self.mmap[..HEADER_SIZE])
    }

    pub fn set_header(&mut self, header: Header) {
        self.mmap[..HEADER_SIZE].copy_from_slice(bytes_of(&header));
    }

    pub fn entry(&self, row: usize) -> Entry {
        let off = HEADER_SIZE + row * ENTRY_SIZE;
        *from_bytes(&self.mmap[off..off + ENTRY_SIZE])
    }

    pub fn set_entry(&mut self, row: usize, entry: Entry) {
        let off = HEADER_SIZE + row * ENTRY_SIZE;
        self.mmap[off..off + ENTRY_SIZE].copy_from_slice(bytes_of(&entry));
    }

    fn node_offset(&self, node: i32) -> usize {
        nodes_offset(self.row_count) + node as usize * NODE_SIZE
    }

    pub fn read_chain_block(&self, node: i32) -> ChainBlock {
        let off = self.node_offset(node);
        *from_bytes(&self.mmap[off..off + NODE_SIZE])
    }

    pub fn write_chain_block(&mut self, node: i32, link: i32, payload: &[u8]) {
        debug_assert!(payload.len() <= SMALL_PAYLOAD);
        let mut small = [0u8; SMALL_PAYLOAD];
        small[..payload.len()].copy_from_slice(payload);
        let off = self.node_offset(node);
        self.mmap[off..off + NODE_SIZE].copy_from_slice(bytes_of(&ChainBlock { link, small }));
    }

    pub fn read_terminal(&self, node: i32) -> [u8; TERMINAL_PAYLOAD] {
        let off = self.node_offset(node);
        let mut buf = [0u8; TERMINAL_PAYLOAD];
        buf.copy_from_slice(&self.mmap[off..off + TERMINAL_PAYLOAD]);
        buf
    }

    pub fn write_terminal(&mut self, node: i32, payload: &[u8]) {
        debug_assert!(payload.len() <= TERMINAL_PAYLOAD);
        let mut buf = [0u8; TERMINAL_PAYLOAD];
        buf[..payload.len()].copy_from_slice(payload);
        let off = self.node_offset(node);
        self.mmap[off..off + TERMINAL_PAYLOAD].copy_from_slice(&buf);
    }

    /// Ensures at least `k` free nodes exist, growing the file if needed.
    pub fn allocate_chain_end(&mut self, k: usize) -> Result<()> {
        let have = self.header().free_count as usize;
        if have < k {
            self.grow_by(k - have)?;
        }
        Ok(())
    }

    /// Idempotent batch-precompute form of [`Self::allocate_chain_end`] (spec §4.1).
    pub fn reserve(&mut self, k: usize) -> Result<()> {
        self.allocate_chain_end(k)
    }

    /// Grows the node region by `n` blocks and appends them to the free
    /// list in ascending index order. Syncs synchronously first so a crash
    /// mid-remap leaves a consistent smaller file (spec §4.1).
    pub fn grow_by(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.mmap
            .flush()
            .map_err(|e| StoreError::StorageFailure(format!("msync {}: {e}", self.path.display())))?;

        let old_node_count = self.node_count();
        let new_len = self.mmap.len() + n * NODE_SIZE;
        self.file.set_len(new_len as u64).map_err(|e| {
            StoreError::StorageFailure(format!("ftruncate {}: {e}", self.path.display()))
        })?;
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).map_err(|e| {
                StoreError::StorageFailure(format!("mremap {}: {e}", self.path.display()))
            })?
        };

        let first_new = old_node_count as i32;
        let last_new = (old_node_count + n - 1) as i32;
        for idx in first_new..last_new {
            self.write_chain_block(idx, idx + 1, &[]);
        }

        let mut header = self.header();
        if header.free_count == 0 {
            header.free_start = first_new;
        } else {
            let tail = self.free_list_tail(header.free_start, header.free_count as usize);
            // last_new's link must be the previous free-tail's link (list end marker).
            let list_end = self.read_chain_block(tail).link;
            self.write_chain_block(tail, first_new, &[]);
            self.write_chain_block(last_new, list_end, &[]);
        }
        header.free_count += n as i32;
        self.set_header(header);

        self.mmap.flush_async().map_err(|e| {
            StoreError::StorageFailure(format!("msync {}: {e}", self.path.display()))
        })?;
        log::debug!(
            "grew string column store {} by {n} blocks ({old_node_count} -> {})",
            self.path.display(),
            old_node_count + n
        );
        Ok(())
    }

    fn free_list_tail(&self, head: i32, count: usize) -> i32 {
        let mut node = head;
        for _ in 1..count {
            node = self.read_chain_block(node).link;
        }
        node
    }

    /// Pops and returns the head of the free list. Undefined if empty
    /// (spec §4.1); debug builds assert instead of reading garbage.
    pub fn pop_free(&mut self) -> i32 {
        let mut header = self.header();
        debug_assert!(header.free_count > 0, "pop_free on empty free list");
        let head = header.free_start;
        header.free_start = self.read_chain_block(head).link;
        header.free_count -= 1;
        self.set_header(header);
        head
    }

    /// Prepends an already-linked run `head -> .. -> tail` onto the free list.
    pub fn push_free_range(&mut self, head: i32, tail: i32, count: usize) {
        let mut header = self.header();
        let tail_small = self.read_chain_block(tail).small;
        self.write_chain_block(tail, header.free_start, &tail_small);
        header.free_start = head;
        header.free_count += count as i32;
        self.set_header(header);
    }

    pub fn flush_async(&self) -> Result<()> {
        self.mmap
            .flush_async()
            .map_err(|e| StoreError::StorageFailure(format!("msync {}: {e}", self.path.display())))
    }

    /// Total node count implied by a row's stored `Length` (spec §4.2's `B_old`/`B_new`).
    pub fn blocks_for(length: i32) -> i32 {
        block_count(length)
    }
}
