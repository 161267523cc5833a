//! The database's root registry, stored on the well-known page 0.
//!
//! A flat record array mapping index names to header page ids:
//!
//! ```text
//! 0   record_count: u32
//! 4   records: [(name: [u8; 32], page_id: i32); MAX_RECORDS]
//! ```
//!
//! Names are zero-padded to 32 bytes. All access goes through the buffer
//! pool, pin-use-unpin, like any other page.

use crate::{
    buffer::{BufferPoolManager, Frame},
    page::{PageId, PAGE_SIZE},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

/// The page id the catalog lives at.
pub const CATALOG_PAGE_ID: PageId = PageId(0);

const NAME_LEN: usize = 32;
const RECORD_SIZE: usize = NAME_LEN + 4;
const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

/// The maximum number of records the catalog page can hold.
pub const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// A handle to the named-index registry on page 0.
#[derive(Clone)]
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
}

impl Catalog {
    /// Create a handle over the given buffer pool.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Catalog { bpm }
    }

    /// Register `name -> page_id`.
    ///
    /// Returns `false` if the name is empty, over-long, already taken, or
    /// the page is full.
    pub fn insert_record(&self, name: &str, page_id: PageId) -> Result<bool> {
        if name.is_empty() || name.len() > NAME_LEN {
            warn!(name, "catalog record name must be 1 to 32 bytes");
            return Ok(false);
        }
        let frame = self.fetch()?;
        let inserted = {
            let mut data = frame.write();
            let count = record_count(&data);
            if find_record(&data, name).is_some() {
                false
            } else if count >= MAX_RECORDS {
                warn!("catalog page is full");
                false
            } else {
                let offset = RECORDS_OFFSET + count * RECORD_SIZE;
                data[offset..offset + NAME_LEN].copy_from_slice(&padded_name(name));
                data[offset + NAME_LEN..offset + RECORD_SIZE].copy_from_slice(&page_id.encode());
                set_record_count(&mut data, count + 1);
                true
            }
        };
        self.bpm.unpin_page(CATALOG_PAGE_ID, inserted);
        Ok(inserted)
    }

    /// Look the name up. Returns `None` if it is not registered.
    pub fn get_record(&self, name: &str) -> Result<Option<PageId>> {
        if name.is_empty() || name.len() > NAME_LEN {
            return Ok(None);
        }
        let frame = self.fetch()?;
        let found = {
            let data = frame.read();
            find_record(&data, name).map(|index| {
                let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_LEN;
                PageId::decode(&data[offset..])
            })
        };
        self.bpm.unpin_page(CATALOG_PAGE_ID, false);
        Ok(found)
    }

    /// Unregister the name, compacting the record array.
    ///
    /// Returns `false` if the name is not registered.
    pub fn delete_record(&self, name: &str) -> Result<bool> {
        if name.is_empty() || name.len() > NAME_LEN {
            return Ok(false);
        }
        let frame = self.fetch()?;
        let deleted = {
            let mut data = frame.write();
            match find_record(&data, name) {
                None => false,
                Some(index) => {
                    let count = record_count(&data);
                    let start = RECORDS_OFFSET + (index + 1) * RECORD_SIZE;
                    let end = RECORDS_OFFSET + count * RECORD_SIZE;
                    let dest = RECORDS_OFFSET + index * RECORD_SIZE;
                    data.copy_within(start..end, dest);
                    data[end - RECORD_SIZE..end].fill(0);
                    set_record_count(&mut data, count - 1);
                    true
                }
            }
        };
        self.bpm.unpin_page(CATALOG_PAGE_ID, deleted);
        Ok(deleted)
    }

    /// The number of registered records.
    pub fn num_records(&self) -> Result<usize> {
        let frame = self.fetch()?;
        let count = record_count(&frame.read());
        self.bpm.unpin_page(CATALOG_PAGE_ID, false);
        Ok(count)
    }

    fn fetch(&self) -> Result<Arc<Frame>> {
        self.bpm
            .fetch_page(CATALOG_PAGE_ID)?
            .context("buffer pool exhausted fetching catalog page")
    }
}

fn record_count(data: &[u8]) -> usize {
    u32::from_le_bytes(data[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().unwrap()) as usize
}

fn set_record_count(data: &mut [u8], count: usize) {
    data[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&(count as u32).to_le_bytes());
}

fn padded_name(name: &str) -> [u8; NAME_LEN] {
    let mut padded = [0u8; NAME_LEN];
    padded[..name.len()].copy_from_slice(name.as_bytes());
    padded
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    let padded = padded_name(name);
    (0..record_count(data)).find(|&index| {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        data[offset..offset + NAME_LEN] == padded
    })
}
