//! `StringColumn`: a fixed-length vector of variable-length byte strings,
//! layered on [`StringBlockStore`] (spec §4.2).

use std::path::Path;

use crate::errors::Result;
use crate::store::block_store::StringBlockStore;
use crate::store::layout::{block_count, Entry, SMALL_PAYLOAD, TERMINAL_PAYLOAD};

pub struct StringColumn {
    store: StringBlockStore,
}

impl StringColumn {
    pub fn create<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        Ok(Self {
            store: StringBlockStore::create(path, row_count)?,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        Ok(Self {
            store: StringBlockStore::open(path, row_count)?,
        })
    }

    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    fn in_range(&self, i: usize) -> bool {
        i < self.store.row_count()
    }

    /// Returns `Entries[i].Length`. Out-of-range `i` returns 0, the same
    /// value returned for a genuinely empty string (spec §9 Open Questions —
    /// this crate keeps the original's ambiguity rather than adding a
    /// separate bounds-check signal, since no caller in this crate needs to
    /// distinguish the two).
    pub fn get_length(&mut self, i: usize) -> usize {
        if !self.in_range(i) {
            return 0;
        }
        self.store.entry(i).length.max(0) as usize
    }

    /// Writes exactly `get_length(i)` bytes into `out`. Out-of-range `i` is
    /// a silent no-op.
    pub fn get_value(&mut self, i: usize, out: &mut Vec<u8>) {
        out.clear();
        if !self.in_range(i) {
            return;
        }
        let entry = self.store.entry(i);
        let mut length = entry.length;
        out.reserve(length.max(0) as usize);
        let mut node = entry.link;
        while length > TERMINAL_PAYLOAD as i32 {
            let block = self.store.read_chain_block(node);
            out.extend_from_slice(&block.small);
            length -= SMALL_PAYLOAD as i32;
            node = block.link;
        }
        let terminal = self.store.read_terminal(node);
        out.extend_from_slice(&terminal[..length.max(0) as usize]);
    }

    /// Pure function: block-count delta implied by changing row `i`'s
    /// length from its current stored value to `new_length`.
    pub fn extend_hint(&self, i: usize, new_length: i32) -> i32 {
        let old_length = if self.in_range(i) {
            self.store.entry(i).length
        } else {
            0
        };
        block_count(new_length) - block_count(old_length)
    }

    /// Forwards to [`StringBlockStore::reserve`] for `additional` more blocks.
    pub fn extend(&mut self, additional: usize) -> Result<()> {
        self.store.reserve(additional)
    }

    /// Replaces row `i`'s value with `value` (spec §4.2, "the heart of the design").
    pub fn set(&mut self, i: usize, value: &[u8]) -> Result<()> {
        if !self.in_range(i) {
            return Ok(());
        }
        let old_entry = self.store.entry(i);
        let old_blocks = block_count(old_entry.length);
        let new_blocks = block_count(value.len() as i32);

        self.store.set_entry(
            i,
            Entry {
                link: old_entry.link,
                length: value.len() as i32,
            },
        );

        if old_blocks > new_blocks {
            self.shrink(old_entry.link, value, new_blocks, old_blocks - new_blocks)?;
        } else if old_blocks < new_blocks {
            self.grow_chain(old_entry.link, value, old_blocks, new_blocks - old_blocks)?;
        } else {
            self.overwrite_in_place(old_entry.link, value);
        }

        self.store.flush_async()
    }

    fn overwrite_in_place(&mut self, head: i32, value: &[u8]) {
        let mut node = head;
        let mut rest = value;
        while rest.len() > TERMINAL_PAYLOAD {
            let link = self.store.read_chain_block(node).link;
            self.store.write_chain_block(node, link, &rest[..SMALL_PAYLOAD]);
            rest = &rest[SMALL_PAYLOAD..];
            node = link;
        }
        self.store.write_terminal(node, rest);
    }

    fn shrink(&mut self, head: i32, value: &[u8], new_blocks: i32, freed: i32) -> Result<()> {
        let mut node = head;
        let mut rest = value;
        for _ in 1..new_blocks {
            let link = self.store.read_chain_block(node).link;
            self.store.write_chain_block(node, link, &rest[..SMALL_PAYLOAD]);
            rest = &rest[SMALL_PAYLOAD..];
            node = link;
        }
        // `node` is now the new terminal; its old Link field heads the
        // surplus run being returned to the free list.
        let surplus_head = self.store.read_chain_block(node).link;
        self.store.write_terminal(node, rest);

        let mut tail = surplus_head;
        for _ in 1..freed {
            tail = self.store.read_chain_block(tail).link;
        }
        self.store.push_free_range(surplus_head, tail, freed as usize);
        Ok(())
    }

    fn grow_chain(
        &mut self,
        head: i32,
        value: &[u8],
        old_blocks: i32,
        need: i32,
    ) -> Result<()> {
        self.store.allocate_chain_end(need as usize)?;

        // Walk the first `old_blocks - 1` existing blocks, writing 12-byte
        // chunks; `node` ends on the existing chain's terminal block.
        let mut node = head;
        let mut rest = value;
        for _ in 1..old_blocks {
            let link = self.store.read_chain_block(node).link;
            self.store.write_chain_block(node, link, &rest[..SMALL_PAYLOAD]);
            rest = &rest[SMALL_PAYLOAD..];
            node = link;
        }

        // Splice the old terminal into the free list; it becomes a regular
        // middle block for whatever tail of `rest` still needs writing.
        let free_start = self.store.header().free_start;
        let small = self.store.read_chain_block(node).small;
        self.store.write_chain_block(node, free_start, &small);

        while rest.len() > TERMINAL_PAYLOAD {
            let link = self.store.read_chain_block(node).link;
            self.store.write_chain_block(node, link, &rest[..SMALL_PAYLOAD]);
            rest = &rest[SMALL_PAYLOAD..];
            node = link;
        }

        // `node` is now the new terminal, popped off the free list.
        let mut header = self.store.header();
        header.free_start = self.store.read_chain_block(node).link;
        header.free_count -= need;
        self.store.set_header(header);

        self.store.write_terminal(node, rest);
        Ok(())
    }
}
