//! Fixed-size key/value codecs and the key-hash families used by the hash
//! index.
//!
//! Everything stored in a block page must have a fixed encoded size known
//! at compile time; [`Storable`] is that contract. Key equality is plain
//! `PartialEq` and key hashing goes through [`KeyHasher`], so the index can
//! be instantiated with a seeded production hasher or the deterministic
//! identity hasher used by tests.

use crate::page::PageId;
use fxhash::FxHasher;
use std::hash::Hasher as _;

/// A fixed-size, byte-codable type that can live in an on-disk slot.
pub trait Storable: Copy + Default + PartialEq {
    /// The encoded size in bytes.
    const SIZE: usize;

    /// Encode into `buf`, which is at least `SIZE` bytes.
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from `buf`, which is at least `SIZE` bytes.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_storable_int {
    ($($t:ty),*) => {
        $(
            impl Storable for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Self {
                    <$t>::from_le_bytes(buf[..Self::SIZE].try_into().unwrap())
                }
            }
        )*
    };
}

impl_storable_int!(i32, i64, u32, u64);

/// A record identifier: the page a tuple lives on plus its slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    /// The page holding the record.
    pub page_id: PageId,
    /// The record's slot within that page.
    pub slot: u32,
}

impl Rid {
    /// Create a record identifier.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Rid { page_id, slot }
    }
}

impl Default for Rid {
    fn default() -> Self {
        Rid {
            page_id: PageId::INVALID,
            slot: 0,
        }
    }
}

impl Storable for Rid {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.encode());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Rid {
            page_id: PageId::decode(&buf[0..4]),
            slot: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        }
    }
}

/// A fixed-width byte-string key, zero-padded on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesKey<const N: usize>(pub [u8; N]);

impl<const N: usize> BytesKey<N> {
    /// Build a key from up to `N` bytes, padding with zeroes.
    ///
    /// Panics if `bytes` is longer than `N`.
    pub fn new(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= N, "key longer than {} bytes", N);
        let mut key = [0u8; N];
        key[..bytes.len()].copy_from_slice(bytes);
        BytesKey(key)
    }
}

impl<const N: usize> Default for BytesKey<N> {
    fn default() -> Self {
        BytesKey([0u8; N])
    }
}

impl<const N: usize> Storable for BytesKey<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.0);
    }

    fn read_from(buf: &[u8]) -> Self {
        BytesKey(buf[..N].try_into().unwrap())
    }
}

/// A family of hash functions over keys.
pub trait KeyHasher<K> {
    /// Hash the key to a 64-bit value.
    fn hash(&self, key: &K) -> u64;
}

/// The default key-hash family: FxHash over the key's encoded bytes, mixed
/// with a per-database seed so that slot layouts differ between databases.
#[derive(Clone)]
pub struct SeededFxHasher {
    seed: [u8; 16],
}

impl SeededFxHasher {
    /// Create a hasher from a 16-byte seed.
    pub fn new(seed: [u8; 16]) -> Self {
        SeededFxHasher { seed }
    }
}

impl<K: Storable> KeyHasher<K> for SeededFxHasher {
    fn hash(&self, key: &K) -> u64 {
        let mut buf = vec![0u8; K::SIZE];
        key.write_to(&mut buf);
        let mut hasher = FxHasher::default();
        hasher.write(&self.seed);
        hasher.write(&buf);
        hasher.finish()
    }
}

/// Integer keys hash to themselves. Deterministic slot placement for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher<i32> for IdentityHasher {
    fn hash(&self, key: &i32) -> u64 {
        *key as u64
    }
}

impl KeyHasher<i64> for IdentityHasher {
    fn hash(&self, key: &i64) -> u64 {
        *key as u64
    }
}

impl KeyHasher<u32> for IdentityHasher {
    fn hash(&self, key: &u32) -> u64 {
        *key as u64
    }
}

impl KeyHasher<u64> for IdentityHasher {
    fn hash(&self, key: &u64) -> u64 {
        *key
    }
}
