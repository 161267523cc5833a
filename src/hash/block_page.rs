//! The hash table's block page layout.
//!
//! One page holds a fixed-count array of `(key, value)` slots followed by
//! two parallel bitmaps over the array:
//!
//! ```text
//! 0                     array: [(K, V); CAPACITY]
//! CAPACITY * entry      occupied bitmap, ceil(CAPACITY / 8) bytes
//! ...                   readable bitmap, ceil(CAPACITY / 8) bytes
//! ```
//!
//! `occupied` marks a slot that has ever held a pair; `readable` marks one
//! that holds a live pair now. A slot with `occupied` set and `readable`
//! clear is a tombstone: probes continue past it, inserts do not land on
//! it, and only a block reset during resize reclaims it. The invariant
//! `readable[i] implies occupied[i]` holds at all times.

use crate::{keys::Storable, page::PAGE_SIZE};
use bitvec::prelude::*;
use std::marker::PhantomData;
use tracing::warn;

/// The number of slots a block page holds for entries of the given encoded
/// size: the largest count whose array and two bitmaps fit in one page.
pub const fn block_array_size(entry_size: usize) -> usize {
    4 * PAGE_SIZE / (4 * entry_size + 1)
}

/// The slot count for a concrete `(K, V)` instantiation.
pub fn block_capacity<K: Storable, V: Storable>() -> usize {
    Layout::<K, V>::CAPACITY
}

struct Layout<K, V>(PhantomData<(K, V)>);

impl<K: Storable, V: Storable> Layout<K, V> {
    const ENTRY_SIZE: usize = K::SIZE + V::SIZE;
    const CAPACITY: usize = block_array_size(Self::ENTRY_SIZE);
    const BITMAP_BYTES: usize = (Self::CAPACITY + 7) / 8;
    const OCCUPIED_OFFSET: usize = Self::CAPACITY * Self::ENTRY_SIZE;
    const READABLE_OFFSET: usize = Self::OCCUPIED_OFFSET + Self::BITMAP_BYTES;

    fn check(index: usize) -> bool {
        if index >= Self::CAPACITY {
            warn!(index, capacity = Self::CAPACITY, "slot index out of range");
            return false;
        }
        true
    }
}

/// Read-only view over a block page's payload.
pub struct BlockView<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Storable, V: Storable> BlockView<'a, K, V> {
    /// Wrap a page payload. Panics unless it is exactly one page long.
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        debug_assert!(Layout::<K, V>::READABLE_OFFSET + Layout::<K, V>::BITMAP_BYTES <= PAGE_SIZE);
        BlockView {
            data,
            _marker: PhantomData,
        }
    }

    /// Whether the slot has ever held a pair.
    pub fn is_occupied(&self, index: usize) -> bool {
        if !Layout::<K, V>::check(index) {
            return false;
        }
        self.occupied_bits()[index]
    }

    /// Whether the slot holds a live pair now.
    pub fn is_readable(&self, index: usize) -> bool {
        if !Layout::<K, V>::check(index) {
            return false;
        }
        self.readable_bits()[index]
    }

    /// The key stored at the slot; the default key if out of range.
    pub fn key_at(&self, index: usize) -> K {
        if !Layout::<K, V>::check(index) {
            return K::default();
        }
        K::read_from(&self.data[index * Layout::<K, V>::ENTRY_SIZE..][..K::SIZE])
    }

    /// The value stored at the slot; the default value if out of range.
    pub fn value_at(&self, index: usize) -> V {
        if !Layout::<K, V>::check(index) {
            return V::default();
        }
        V::read_from(&self.data[index * Layout::<K, V>::ENTRY_SIZE + K::SIZE..][..V::SIZE])
    }

    fn occupied_bits(&self) -> &BitSlice<u8, Lsb0> {
        let offset = Layout::<K, V>::OCCUPIED_OFFSET;
        self.data[offset..offset + Layout::<K, V>::BITMAP_BYTES].view_bits()
    }

    fn readable_bits(&self) -> &BitSlice<u8, Lsb0> {
        let offset = Layout::<K, V>::READABLE_OFFSET;
        self.data[offset..offset + Layout::<K, V>::BITMAP_BYTES].view_bits()
    }
}

/// Mutable view over a block page's payload.
pub struct BlockViewMut<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Storable, V: Storable> BlockViewMut<'a, K, V> {
    /// Wrap a page payload. Panics unless it is exactly one page long.
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        BlockViewMut {
            data,
            _marker: PhantomData,
        }
    }

    /// Reborrow as a read-only view.
    pub fn view(&self) -> BlockView<'_, K, V> {
        BlockView {
            data: &*self.data,
            _marker: PhantomData,
        }
    }

    /// Store a pair at the slot. Fails on an occupied slot (live or
    /// tombstoned) and out-of-range indexes.
    pub fn insert(&mut self, index: usize, key: &K, value: &V) -> bool {
        if !Layout::<K, V>::check(index) {
            return false;
        }
        if self.view().is_occupied(index) {
            return false;
        }
        let entry = index * Layout::<K, V>::ENTRY_SIZE;
        key.write_to(&mut self.data[entry..][..K::SIZE]);
        value.write_to(&mut self.data[entry + K::SIZE..][..V::SIZE]);
        self.occupied_bits_mut().set(index, true);
        self.readable_bits_mut().set(index, true);
        true
    }

    /// Clear the slot's readable bit, leaving a tombstone. The occupied bit
    /// stays set so probes continue past the slot.
    pub fn remove(&mut self, index: usize) {
        if !Layout::<K, V>::check(index) {
            return;
        }
        self.readable_bits_mut().set(index, false);
    }

    /// Zero the whole page: every slot becomes empty, tombstones included.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    fn occupied_bits_mut(&mut self) -> &mut BitSlice<u8, Lsb0> {
        let offset = Layout::<K, V>::OCCUPIED_OFFSET;
        self.data[offset..offset + Layout::<K, V>::BITMAP_BYTES].view_bits_mut()
    }

    fn readable_bits_mut(&mut self) -> &mut BitSlice<u8, Lsb0> {
        let offset = Layout::<K, V>::READABLE_OFFSET;
        self.data[offset..offset + Layout::<K, V>::BITMAP_BYTES].view_bits_mut()
    }
}
