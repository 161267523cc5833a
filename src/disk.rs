//! The file-backed paging device consumed by the buffer pool.
//!
//! One flat file, `db.pages`, holds every page at offset
//! `page_id * PAGE_SIZE`. Allocation is sequential and grows the file so
//! that an allocated page always reads back as zeroes before its first
//! write.

#[cfg(not(target_family = "unix"))]
std::compile_error!("pagebox only supports Unix-based OSs");

use crate::page::{PageId, PAGE_SIZE};
use anyhow::{ensure, Context, Result};
use fxhash::FxHashSet;
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt as _,
    path::Path,
};
use tracing::warn;

/// The disk manager: a page allocator plus raw positional page I/O.
pub struct DiskManager {
    file: File,
    state: Mutex<DiskState>,
}

struct DiskState {
    next_page_id: i32,
    deallocated: FxHashSet<PageId>,
}

impl DiskManager {
    /// Open (or create) the paging file inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join("db.pages");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("opening paging file {}", path.display()))?;

        let len = file.metadata()?.len();
        ensure!(
            len % PAGE_SIZE as u64 == 0,
            "paging file corrupted; length {} is not page-aligned",
            len
        );

        Ok(DiskManager {
            file,
            state: Mutex::new(DiskState {
                next_page_id: (len / PAGE_SIZE as u64) as i32,
                deallocated: FxHashSet::default(),
            }),
        })
    }

    /// Allocate a fresh page identifier, growing the file to cover it.
    ///
    /// Identifiers are handed out sequentially and never reused.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();
        let page_id = PageId(state.next_page_id);
        state.next_page_id += 1;
        self.file
            .set_len(state.next_page_id as u64 * PAGE_SIZE as u64)?;
        Ok(page_id)
    }

    /// Mark a page identifier as free. Further reads or writes of it fail.
    pub fn deallocate_page(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if !state.deallocated.insert(page_id) {
            warn!(page_id = page_id.0, "double deallocation of page");
        }
    }

    /// Read the page into `buf`, which must be exactly `PAGE_SIZE` long.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        ensure!(buf.len() == PAGE_SIZE, "page buffer of wrong length");
        self.validate(page_id)?;
        self.file
            .read_exact_at(buf, page_id.0 as u64 * PAGE_SIZE as u64)
            .with_context(|| format!("reading page {}", page_id))?;
        Ok(())
    }

    /// Write `buf`, which must be exactly `PAGE_SIZE` long, to the page.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        ensure!(buf.len() == PAGE_SIZE, "page buffer of wrong length");
        self.validate(page_id)?;
        self.file
            .write_all_at(buf, page_id.0 as u64 * PAGE_SIZE as u64)
            .with_context(|| format!("writing page {}", page_id))?;
        Ok(())
    }

    /// Flush the paging file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// The number of identifiers handed out so far.
    pub fn num_allocated(&self) -> u32 {
        self.state.lock().next_page_id as u32
    }

    fn validate(&self, page_id: PageId) -> Result<()> {
        let state = self.state.lock();
        ensure!(
            page_id.is_valid() && page_id.0 < state.next_page_id,
            "page {} was never allocated",
            page_id
        );
        ensure!(
            !state.deallocated.contains(&page_id),
            "page {} was deallocated",
            page_id
        );
        Ok(())
    }
}
