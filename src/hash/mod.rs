//! A disk-resident linear-probing hash index.
//!
//! The whole structure lives in buffer-managed pages: a header page
//! recording the capacity and the ordered block page list, and a run of
//! block pages holding the slot array. Every access pins pages through the
//! buffer pool, uses them, and unpins; the index keeps no page cache of
//! its own.
//!
//! Keys hash to a home slot (`hash mod capacity`); lookup, insert, and
//! remove probe linearly from there, crossing block boundaries, skipping
//! tombstones, and stopping at the first never-occupied slot or the end of
//! the table. A full table doubles its capacity in place and rehashes.

use crate::{
    buffer::{BufferPoolManager, Frame},
    catalog::Catalog,
    keys::{KeyHasher, Storable},
    page::PageId,
};
use anyhow::{bail, ensure, Context, Result};
use parking_lot::RwLock;
use std::{marker::PhantomData, sync::Arc};
use tracing::trace;

pub use block_page::{block_array_size, block_capacity, BlockView, BlockViewMut};
pub use header_page::{HeaderView, HeaderViewMut, MAX_BLOCK_NUM};

mod block_page;
mod header_page;

#[cfg(test)]
mod tests;

/// A linear-probing hash table over fixed-size keys and values, stored in
/// buffer-managed pages.
///
/// Multimap semantics: distinct values under one key coexist; inserting an
/// exactly duplicate `(key, value)` pair fails.
pub struct LinearProbeHashTable<K, V, H> {
    bpm: Arc<BufferPoolManager>,
    header_page_id: PageId,
    hasher: H,
    // The table latch: capacity and the block latch array mutate only
    // under it exclusively; probes hold it shared.
    state: RwLock<TableState>,
    _marker: PhantomData<fn() -> (K, V)>,
}

struct TableState {
    size: usize,
    block_latches: Vec<RwLock<()>>,
}

enum InsertOutcome {
    Inserted,
    Duplicate,
    Full,
}

impl<K, V, H> LinearProbeHashTable<K, V, H>
where
    K: Storable,
    V: Storable,
    H: KeyHasher<K>,
{
    /// Create a table with `num_buckets` slots and register it in the
    /// catalog under `name`.
    ///
    /// Allocates the header page and every block page through the buffer
    /// pool. Fails if the name is already taken.
    pub fn create(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        num_buckets: usize,
        hasher: H,
    ) -> Result<Self> {
        ensure!(num_buckets > 0, "hash table requires at least one bucket");
        let cap = block_capacity::<K, V>();
        let num_blocks = num_buckets.div_ceil(cap);
        ensure!(
            num_blocks <= MAX_BLOCK_NUM,
            "{} buckets need more block pages than a header can list",
            num_buckets
        );

        let header_frame = bpm
            .new_page()?
            .context("buffer pool exhausted allocating header page")?;
        let header_page_id = header_frame.page_id();

        let registered = Catalog::new(bpm.clone()).insert_record(name, header_page_id)?;
        ensure!(registered, "index {:?} already exists", name);

        let lsn = bpm.log_manager().map(|log| log.next_lsn()).unwrap_or(0);
        {
            let mut data = header_frame.write();
            let mut header = HeaderViewMut::new(&mut data);
            header.set_page_id(header_page_id);
            header.set_lsn(lsn);
            header.set_size(num_buckets as u64);
            for _ in 0..num_blocks {
                let block_frame = bpm
                    .new_page()?
                    .context("buffer pool exhausted allocating block page")?;
                header.add_block_page_id(block_frame.page_id());
                bpm.unpin_page(block_frame.page_id(), false);
            }
        }
        bpm.unpin_page(header_page_id, true);
        trace!(name, header_page_id = header_page_id.0, num_buckets, "created hash table");

        Ok(LinearProbeHashTable {
            bpm,
            header_page_id,
            hasher,
            state: RwLock::new(TableState {
                size: num_buckets,
                block_latches: new_block_latches(num_blocks),
            }),
            _marker: PhantomData,
        })
    }

    /// Open the table registered in the catalog under `name`, rebuilding
    /// the in-memory state from its header page.
    ///
    /// Returns `None` if no such name is registered.
    pub fn open(name: &str, bpm: Arc<BufferPoolManager>, hasher: H) -> Result<Option<Self>> {
        let Some(header_page_id) = Catalog::new(bpm.clone()).get_record(name)? else {
            return Ok(None);
        };
        let header_frame = bpm
            .fetch_page(header_page_id)?
            .context("buffer pool exhausted fetching header page")?;
        let (size, num_blocks) = {
            let data = header_frame.read();
            let header = HeaderView::new(&data);
            (header.size() as usize, header.num_blocks() as usize)
        };
        bpm.unpin_page(header_page_id, false);
        ensure!(
            num_blocks == size.div_ceil(block_capacity::<K, V>()),
            "header of {:?} does not match this key/value instantiation",
            name
        );

        Ok(Some(LinearProbeHashTable {
            bpm,
            header_page_id,
            hasher,
            state: RwLock::new(TableState {
                size,
                block_latches: new_block_latches(num_blocks),
            }),
            _marker: PhantomData,
        }))
    }

    /// Collect every value stored under the key, in probe order.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let state = self.state.read();
        let header_frame = self.fetch(self.header_page_id)?;
        let result = self.probe_get(&state, &header_frame, key);
        self.bpm.unpin_page(self.header_page_id, false);
        result
    }

    /// Insert the pair, growing the table as needed.
    ///
    /// Returns `false` if the exact `(key, value)` pair is already present.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        loop {
            let observed = {
                let state = self.state.read();
                let header_frame = self.fetch(self.header_page_id)?;
                let outcome = self.probe_insert(&state, &header_frame, key, value);
                self.bpm.unpin_page(self.header_page_id, false);
                match outcome? {
                    InsertOutcome::Inserted => return Ok(true),
                    InsertOutcome::Duplicate => return Ok(false),
                    InsertOutcome::Full => state.size,
                }
            };
            self.resize(observed)?;
        }
    }

    /// Remove the exact pair, leaving a tombstone in its slot.
    ///
    /// Returns `false` if the pair is not present.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let state = self.state.read();
        let header_frame = self.fetch(self.header_page_id)?;
        let result = self.probe_remove(&state, &header_frame, key, value);
        self.bpm.unpin_page(self.header_page_id, false);
        result
    }

    /// Double the capacity in place: collect every live pair, wipe the
    /// blocks (reclaiming all tombstones), append fresh blocks, and
    /// rehash.
    ///
    /// `old_capacity` is the capacity the caller observed; if the table
    /// has already grown past it, another writer resized first and this
    /// call does nothing.
    pub fn resize(&self, old_capacity: usize) -> Result<()> {
        let mut state = self.state.write();
        if state.size > old_capacity {
            return Ok(());
        }
        let cap = block_capacity::<K, V>();
        let header_frame = self.fetch(self.header_page_id)?;

        // Collect all live pairs and wipe every block.
        let mut pairs: Vec<(K, V)> = Vec::new();
        let num_blocks = state.block_latches.len();
        for block_idx in 0..num_blocks {
            let block_page_id = {
                let data = header_frame.read();
                HeaderView::new(&data).block_page_id(block_idx)
            };
            let block_frame = self.fetch(block_page_id)?;
            let _latch = state.block_latches[block_idx].write();
            {
                let mut data = block_frame.write();
                {
                    let block = BlockView::<K, V>::new(&data);
                    for offset in 0..cap {
                        if block.is_readable(offset) {
                            pairs.push((block.key_at(offset), block.value_at(offset)));
                        }
                    }
                }
                BlockViewMut::<K, V>::new(&mut data).reset();
            }
            drop(_latch);
            self.bpm.unpin_page(block_page_id, true);
        }

        // Double the capacity and append the blocks the new size needs.
        state.size *= 2;
        let new_blocks = state.size.div_ceil(cap);
        ensure!(
            new_blocks <= MAX_BLOCK_NUM,
            "resize to {} slots needs more block pages than a header can list",
            state.size
        );
        {
            let mut data = header_frame.write();
            let mut header = HeaderViewMut::new(&mut data);
            header.set_size(state.size as u64);
            for _ in num_blocks..new_blocks {
                let block_frame = self
                    .bpm
                    .new_page()?
                    .context("buffer pool exhausted allocating block page")?;
                header.add_block_page_id(block_frame.page_id());
                self.bpm.unpin_page(block_frame.page_id(), false);
            }
        }
        state.block_latches = new_block_latches(new_blocks);
        trace!(capacity = state.size, blocks = new_blocks, "resized hash table");

        // Rehash; the freshly doubled table cannot run out of slots here.
        for (key, value) in &pairs {
            match self.probe_insert(&state, &header_frame, key, value)? {
                InsertOutcome::Inserted => {}
                InsertOutcome::Duplicate => {}
                InsertOutcome::Full => bail!("hash table full immediately after resize"),
            }
        }
        self.bpm.unpin_page(self.header_page_id, true);
        Ok(())
    }

    /// The current logical capacity in slots.
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// The page id of the table's header page.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn fetch(&self, page_id: PageId) -> Result<Arc<Frame>> {
        self.bpm
            .fetch_page(page_id)?
            .with_context(|| format!("buffer pool exhausted fetching page {}", page_id))
    }

    fn home_slot(&self, key: &K, size: usize) -> (usize, usize) {
        let cap = block_capacity::<K, V>();
        let slot = self.hasher.hash(key) as usize % size;
        (slot / cap, slot % cap)
    }

    fn probe_get(&self, state: &TableState, header_frame: &Frame, key: &K) -> Result<Vec<V>> {
        let cap = block_capacity::<K, V>();
        let (mut block_idx, mut offset) = self.home_slot(key, state.size);
        let mut result = Vec::new();

        while block_idx < state.block_latches.len() {
            let block_page_id = {
                let data = header_frame.read();
                HeaderView::new(&data).block_page_id(block_idx)
            };
            let block_frame = self.fetch(block_page_id)?;
            let mut stop = false;
            {
                let _latch = state.block_latches[block_idx].read();
                let data = block_frame.read();
                let block = BlockView::<K, V>::new(&data);
                while offset < cap && block_idx * cap + offset < state.size {
                    if !block.is_occupied(offset) {
                        stop = true;
                        break;
                    }
                    if block.is_readable(offset) && block.key_at(offset) == *key {
                        result.push(block.value_at(offset));
                    }
                    offset += 1;
                }
                if block_idx * cap + offset >= state.size {
                    stop = true;
                }
            }
            self.bpm.unpin_page(block_page_id, false);
            if stop {
                break;
            }
            block_idx += 1;
            offset = 0;
        }
        Ok(result)
    }

    fn probe_insert(
        &self,
        state: &TableState,
        header_frame: &Frame,
        key: &K,
        value: &V,
    ) -> Result<InsertOutcome> {
        let cap = block_capacity::<K, V>();
        let (mut block_idx, mut offset) = self.home_slot(key, state.size);

        while block_idx < state.block_latches.len() {
            let block_page_id = {
                let data = header_frame.read();
                HeaderView::new(&data).block_page_id(block_idx)
            };
            let block_frame = self.fetch(block_page_id)?;
            let mut outcome = None;
            {
                let _latch = state.block_latches[block_idx].write();
                let mut data = block_frame.write();
                let mut block = BlockViewMut::<K, V>::new(&mut data);
                while offset < cap && block_idx * cap + offset < state.size {
                    if !block.view().is_occupied(offset) {
                        block.insert(offset, key, value);
                        outcome = Some(InsertOutcome::Inserted);
                        break;
                    }
                    if block.view().is_readable(offset)
                        && block.view().key_at(offset) == *key
                        && block.view().value_at(offset) == *value
                    {
                        outcome = Some(InsertOutcome::Duplicate);
                        break;
                    }
                    offset += 1;
                }
            }
            let inserted = matches!(outcome, Some(InsertOutcome::Inserted));
            self.bpm.unpin_page(block_page_id, inserted);
            match outcome {
                Some(outcome) => return Ok(outcome),
                None if block_idx * cap + offset >= state.size => return Ok(InsertOutcome::Full),
                None => {
                    block_idx += 1;
                    offset = 0;
                }
            }
        }
        Ok(InsertOutcome::Full)
    }

    fn probe_remove(
        &self,
        state: &TableState,
        header_frame: &Frame,
        key: &K,
        value: &V,
    ) -> Result<bool> {
        let cap = block_capacity::<K, V>();
        let (mut block_idx, mut offset) = self.home_slot(key, state.size);

        while block_idx < state.block_latches.len() {
            let block_page_id = {
                let data = header_frame.read();
                HeaderView::new(&data).block_page_id(block_idx)
            };
            let block_frame = self.fetch(block_page_id)?;
            let mut removed = false;
            let mut stop = false;
            {
                let _latch = state.block_latches[block_idx].write();
                let mut data = block_frame.write();
                let mut block = BlockViewMut::<K, V>::new(&mut data);
                while offset < cap && block_idx * cap + offset < state.size {
                    if !block.view().is_occupied(offset) {
                        stop = true;
                        break;
                    }
                    if block.view().is_readable(offset)
                        && block.view().key_at(offset) == *key
                        && block.view().value_at(offset) == *value
                    {
                        block.remove(offset);
                        removed = true;
                        stop = true;
                        break;
                    }
                    offset += 1;
                }
                if block_idx * cap + offset >= state.size {
                    stop = true;
                }
            }
            self.bpm.unpin_page(block_page_id, removed);
            if stop {
                return Ok(removed);
            }
            block_idx += 1;
            offset = 0;
        }
        Ok(false)
    }
}

fn new_block_latches(num_blocks: usize) -> Vec<RwLock<()>> {
    (0..num_blocks).map(|_| RwLock::new(())).collect()
}
