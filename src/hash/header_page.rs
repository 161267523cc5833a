//! The hash table's header page layout.
//!
//! One page holding the index's own page id, an LSN, the logical capacity
//! in slots, and the ordered list of block page ids. Bit-exact layout,
//! little-endian:
//!
//! ```text
//! 0   page_id: i32
//! 4   lsn: i32
//! 8   size: u64            logical capacity in slots
//! 16  next_ind: u64        number of block page ids in use
//! 24  block_page_ids: [i32; MAX_BLOCK_NUM]
//! ```

use crate::page::{PageId, PAGE_SIZE};
use tracing::warn;

const PAGE_ID_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;
const SIZE_OFFSET: usize = 8;
const NEXT_IND_OFFSET: usize = 16;
const BLOCKS_OFFSET: usize = 24;

/// The maximum number of block page ids a header page can hold.
pub const MAX_BLOCK_NUM: usize = (PAGE_SIZE - BLOCKS_OFFSET) / 4;

/// Read-only view over a header page's payload.
pub struct HeaderView<'a> {
    data: &'a [u8],
}

impl<'a> HeaderView<'a> {
    /// Wrap a page payload. Panics unless it is exactly one page long.
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        HeaderView { data }
    }

    /// The page id this header was written to.
    pub fn page_id(&self) -> PageId {
        PageId::decode(&self.data[PAGE_ID_OFFSET..])
    }

    /// The log sequence number stamped at creation.
    pub fn lsn(&self) -> i32 {
        i32::from_le_bytes(self.data[LSN_OFFSET..LSN_OFFSET + 4].try_into().unwrap())
    }

    /// The table's logical capacity in slots.
    pub fn size(&self) -> u64 {
        u64::from_le_bytes(self.data[SIZE_OFFSET..SIZE_OFFSET + 8].try_into().unwrap())
    }

    /// The number of block pages registered.
    pub fn num_blocks(&self) -> u64 {
        u64::from_le_bytes(
            self.data[NEXT_IND_OFFSET..NEXT_IND_OFFSET + 8]
                .try_into()
                .unwrap(),
        )
    }

    /// The page id of the `index`th block, or [`PageId::INVALID`] if the
    /// index is out of range.
    pub fn block_page_id(&self, index: usize) -> PageId {
        if index >= self.num_blocks() as usize {
            warn!(
                index,
                num_blocks = self.num_blocks(),
                "block index out of range"
            );
            return PageId::INVALID;
        }
        PageId::decode(&self.data[BLOCKS_OFFSET + index * 4..])
    }
}

/// Mutable view over a header page's payload.
pub struct HeaderViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderViewMut<'a> {
    /// Wrap a page payload. Panics unless it is exactly one page long.
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        HeaderViewMut { data }
    }

    /// Reborrow as a read-only view.
    pub fn view(&self) -> HeaderView<'_> {
        HeaderView { data: &*self.data }
    }

    /// Record the page id this header lives at.
    pub fn set_page_id(&mut self, page_id: PageId) {
        self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].copy_from_slice(&page_id.encode());
    }

    /// Stamp the log sequence number.
    pub fn set_lsn(&mut self, lsn: i32) {
        self.data[LSN_OFFSET..LSN_OFFSET + 4].copy_from_slice(&lsn.to_le_bytes());
    }

    /// Record the table's logical capacity in slots.
    pub fn set_size(&mut self, size: u64) {
        self.data[SIZE_OFFSET..SIZE_OFFSET + 8].copy_from_slice(&size.to_le_bytes());
    }

    /// Append a block page id to the ordered list. A full header is left
    /// unchanged.
    pub fn add_block_page_id(&mut self, page_id: PageId) {
        let next_ind = self.view().num_blocks() as usize;
        if next_ind >= MAX_BLOCK_NUM {
            warn!("hash table header page is full");
            return;
        }
        self.data[BLOCKS_OFFSET + next_ind * 4..BLOCKS_OFFSET + next_ind * 4 + 4]
            .copy_from_slice(&page_id.encode());
        self.data[NEXT_IND_OFFSET..NEXT_IND_OFFSET + 8]
            .copy_from_slice(&((next_ind + 1) as u64).to_le_bytes());
    }
}
