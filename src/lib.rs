#![warn(missing_docs)]

//! An educational storage-engine core: a fixed-size page buffer pool with
//! second-chance clock replacement, and a disk-resident linear-probing
//! hash index layered on top of it.
//!
//! The stack, bottom up: [`DiskManager`] owns a flat paging file and hands
//! out page ids; [`BufferPoolManager`] caches pages in a fixed frame
//! array, evicting through [`ClockReplacer`] and writing dirty frames
//! back; [`LinearProbeHashTable`] keeps its entire state, header and slot
//! blocks alike, in buffer-managed pages. [`Storage`] wires the pieces
//! together over a database directory.

use anyhow::{Context, Result};
use std::sync::Arc;

pub use buffer::{BufferPoolManager, ClockReplacer, Frame, FrameId};
pub use catalog::{Catalog, CATALOG_PAGE_ID};
pub use disk::DiskManager;
pub use hash::{
    block_array_size, block_capacity, BlockView, BlockViewMut, HeaderView, HeaderViewMut,
    LinearProbeHashTable, MAX_BLOCK_NUM,
};
pub use keys::{BytesKey, IdentityHasher, KeyHasher, Rid, SeededFxHasher, Storable};
pub use metrics::Metrics;
pub use options::Options;
pub use page::{PageBuf, PageId, PAGE_SIZE};
pub use wal::{LogManager, INVALID_LSN};

mod buffer;
mod catalog;
mod disk;
mod hash;
mod keys;
mod metrics;
mod options;
mod page;
mod wal;

/// A handle to an open database: the paging file, the buffer pool over it,
/// and the catalog on page 0. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    disk: Arc<DiskManager>,
    log: Arc<LogManager>,
    bpm: Arc<BufferPoolManager>,
    hash_seed: [u8; 16],
}

impl Storage {
    /// Open the database at `options.path`, creating the directory, the
    /// paging file, and the catalog page on first open.
    pub fn open(options: Options) -> Result<Self> {
        std::fs::create_dir_all(&options.path)
            .with_context(|| format!("creating database directory {}", options.path.display()))?;
        let disk = Arc::new(DiskManager::open(&options.path)?);
        let log = Arc::new(LogManager::new());
        let bpm = Arc::new(BufferPoolManager::new(
            options.pool_size,
            disk.clone(),
            Some(log.clone()),
            Metrics::new(options.metrics),
        ));

        if disk.num_allocated() == 0 {
            // Fresh database: page 0 becomes the catalog. A zeroed page is
            // an empty record array.
            let frame = bpm
                .new_page()?
                .context("buffer pool exhausted formatting catalog page")?;
            debug_assert_eq!(frame.page_id(), CATALOG_PAGE_ID);
            bpm.unpin_page(frame.page_id(), true);
        }

        Ok(Storage {
            disk,
            log,
            bpm,
            hash_seed: options.hash_seed,
        })
    }

    /// The buffer pool.
    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// The disk manager backing the buffer pool.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// The log manager.
    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log
    }

    /// A handle to the named-index registry on page 0.
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.bpm.clone())
    }

    /// Create a hash index named `name` with `num_buckets` slots, keyed by
    /// the database's seeded hash family.
    pub fn create_index<K, V>(
        &self,
        name: &str,
        num_buckets: usize,
    ) -> Result<LinearProbeHashTable<K, V, SeededFxHasher>>
    where
        K: Storable,
        V: Storable,
    {
        LinearProbeHashTable::create(
            name,
            self.bpm.clone(),
            num_buckets,
            SeededFxHasher::new(self.hash_seed),
        )
    }

    /// Open the hash index registered under `name`, or `None` if there is
    /// no such index.
    pub fn open_index<K, V>(
        &self,
        name: &str,
    ) -> Result<Option<LinearProbeHashTable<K, V, SeededFxHasher>>>
    where
        K: Storable,
        V: Storable,
    {
        LinearProbeHashTable::open(name, self.bpm.clone(), SeededFxHasher::new(self.hash_seed))
    }

    /// Flush every resident page and sync the paging file.
    pub fn sync(&self) -> Result<()> {
        self.bpm.flush_all_pages()?;
        self.disk.sync()
    }
}
