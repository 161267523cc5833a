//! The buffer pool: a fixed array of page-sized frames, a page table
//! mapping resident pages to frames, and clock replacement for the rest.
//!
//! All page accesses in the crate funnel through [`BufferPoolManager`]:
//! callers pin a page with [`BufferPoolManager::fetch_page`] or
//! [`BufferPoolManager::new_page`], read or mutate the payload through the
//! frame's latch, and release the pin with
//! [`BufferPoolManager::unpin_page`]. A pinned frame is never evicted; an
//! unpinned one is a replacement candidate and may be written back and
//! rebound to another page at any time.

use crate::{
    disk::DiskManager,
    metrics::Metrics,
    page::{PageBuf, PageId},
    wal::LogManager,
};
use anyhow::Result;
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{collections::VecDeque, sync::Arc};
use tracing::{trace, warn};

pub use clock_replacer::ClockReplacer;

mod clock_replacer;


/// Index of a frame within the buffer pool, in `[0, pool_size)`.
pub type FrameId = usize;

/// A buffer pool frame: one page's payload plus residency metadata.
pub struct Frame {
    id: FrameId,
    meta: Mutex<FrameMeta>,
    data: RwLock<PageBuf>,
}

struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new(id: FrameId) -> Self {
        Frame {
            id,
            meta: Mutex::new(FrameMeta {
                page_id: PageId::INVALID,
                pin_count: 0,
                is_dirty: false,
            }),
            data: RwLock::new(PageBuf::zeroed()),
        }
    }

    /// The frame's index in the pool.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The page currently bound to this frame, or [`PageId::INVALID`].
    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    /// The number of outstanding pins.
    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Whether the in-memory payload is ahead of the on-disk image.
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Latch the payload for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.data.read()
    }

    /// Latch the payload for writing.
    ///
    /// Mutations are made durable by unpinning with `is_dirty = true`.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageBuf> {
        self.data.write()
    }
}

/// The buffer pool manager.
pub struct BufferPoolManager {
    frames: Vec<Arc<Frame>>,
    // The pool latch: page table and free list mutate only under it.
    inner: Mutex<PoolInner>,
    replacer: ClockReplacer,
    disk: Arc<DiskManager>,
    log: Option<Arc<LogManager>>,
    metrics: Metrics,
}

struct PoolInner {
    page_table: FxHashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames over the given disk manager.
    pub fn new(
        pool_size: usize,
        disk: Arc<DiskManager>,
        log: Option<Arc<LogManager>>,
        metrics: Metrics,
    ) -> Self {
        assert!(pool_size > 0, "buffer pool requires at least one frame");
        BufferPoolManager {
            frames: (0..pool_size).map(|id| Arc::new(Frame::new(id))).collect(),
            inner: Mutex::new(PoolInner {
                page_table: FxHashMap::default(),
                // Initially, every frame is in the free list.
                free_list: (0..pool_size).collect(),
            }),
            replacer: ClockReplacer::new(pool_size),
            disk,
            log,
            metrics,
        }
    }

    /// The number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// The log manager threaded through at construction, if any.
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log.as_ref()
    }

    /// The pool's counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Pin the page, bringing it into a frame if it is not resident.
    ///
    /// Returns `None` when every frame is pinned. The caller owns one pin
    /// on the returned frame and must release it with [`Self::unpin_page`].
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<Frame>>> {
        if !page_id.is_valid() {
            warn!(page_id = page_id.0, "fetch of invalid page id");
            return Ok(None);
        }
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            self.metrics.record_fetch(false);
            let frame = &self.frames[frame_id];
            frame.meta.lock().pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(Some(frame.clone()));
        }

        self.metrics.record_fetch(true);
        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id];
        {
            let mut meta = frame.meta.lock();
            meta.page_id = page_id;
            meta.pin_count = 1;
            meta.is_dirty = false;
        }
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        // The table already reflects the new binding; the read happens last.
        let mut data = frame.data.write();
        self.disk.read_page(page_id, &mut data)?;
        Ok(Some(frame.clone()))
    }

    /// Allocate a fresh page and pin it into a zero-filled frame.
    ///
    /// Returns `None` when every frame is pinned, without allocating. The
    /// new page's identifier is readable from the returned frame.
    pub fn new_page(&self) -> Result<Option<Arc<Frame>>> {
        let mut inner = self.inner.lock();
        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let page_id = self.disk.allocate_page()?;
        let frame = &self.frames[frame_id];
        {
            let mut meta = frame.meta.lock();
            meta.page_id = page_id;
            meta.pin_count = 1;
            meta.is_dirty = false;
        }
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        frame.data.write().fill(0);
        trace!(page_id = page_id.0, frame_id, "bound fresh page");
        Ok(Some(frame.clone()))
    }

    /// Release one pin on the page.
    ///
    /// The dirty flag is a sticky OR: once any unpin passes `true`, a later
    /// `false` does not clear it. Returns `false` if the page is not
    /// resident or its pin count is already zero; the frame is unchanged in
    /// that case.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            warn!(page_id = page_id.0, "unpin of non-resident page");
            return false;
        };
        let frame = &self.frames[frame_id];
        let mut meta = frame.meta.lock();
        if meta.pin_count == 0 {
            return false;
        }
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write the page's in-memory image to disk.
    ///
    /// Returns `false` if the page is not resident. The dirty bit is left
    /// as is; on return the on-disk image equals the in-memory image.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id];
        let meta = frame.meta.lock();
        if meta.page_id != page_id {
            warn!(
                frame_id,
                page_id = page_id.0,
                "page table entry points at a frame bound elsewhere"
            );
            return Ok(false);
        }
        let data = frame.data.read();
        self.disk.write_page(page_id, &data)?;
        Ok(true)
    }

    /// Drop the page from the pool and deallocate it on disk.
    ///
    /// Returns `true` if the page was not resident (nothing to do) or was
    /// dropped; `false` if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id];
        let mut meta = frame.meta.lock();
        if meta.pin_count > 0 {
            return Ok(false);
        }
        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        inner.free_list.push_back(frame_id);
        meta.page_id = PageId::INVALID;
        meta.is_dirty = false;
        frame.data.write().fill(0);
        self.disk.deallocate_page(page_id);
        trace!(page_id = page_id.0, frame_id, "deleted page");
        Ok(true)
    }

    /// Flush every resident page.
    ///
    /// The resident set is snapshotted under the pool latch and the latch
    /// released before any I/O, so other operations make progress while
    /// the flushes run.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let inner = self.inner.lock();
            inner.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// The pin count of a resident page, or `None` if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id].meta.lock().pin_count)
    }

    // Take a frame to (re)bind: the free list first, then a clock victim
    // with write-back of its dirty payload. `None` means all frames pinned.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let Some(frame_id) = self.replacer.victim() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id];
        let meta = frame.meta.lock();
        debug_assert_eq!(meta.pin_count, 0);
        if meta.is_dirty {
            let data = frame.data.read();
            self.disk.write_page(meta.page_id, &data)?;
            trace!(
                page_id = meta.page_id.0,
                frame_id,
                "wrote back dirty page on eviction"
            );
        }
        self.metrics.record_eviction();
        inner.page_table.remove(&meta.page_id);
        Ok(Some(frame_id))
    }
}
