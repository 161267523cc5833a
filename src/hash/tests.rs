use super::{block_capacity, BlockViewMut, HeaderView, HeaderViewMut, LinearProbeHashTable};
use crate::{
    buffer::BufferPoolManager,
    disk::DiskManager,
    keys::IdentityHasher,
    metrics::Metrics,
    page::{PageId, PAGE_SIZE},
};
use std::sync::Arc;

fn make_pool(pool_size: usize) -> (Arc<BufferPoolManager>, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::open(temp_dir.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(
        pool_size,
        disk,
        None,
        Metrics::new(false),
    ));
    // Page 0 is the catalog; a zeroed page is an empty record array.
    let frame = bpm.new_page().unwrap().unwrap();
    assert_eq!(frame.page_id(), PageId(0));
    bpm.unpin_page(frame.page_id(), true);
    (bpm, temp_dir)
}

fn make_table(
    num_buckets: usize,
) -> (
    LinearProbeHashTable<i32, i32, IdentityHasher>,
    Arc<BufferPoolManager>,
    tempfile::TempDir,
) {
    let (bpm, temp_dir) = make_pool(16);
    let table =
        LinearProbeHashTable::create("idx", bpm.clone(), num_buckets, IdentityHasher).unwrap();
    (table, bpm, temp_dir)
}

#[test]
fn block_page_layout_is_bit_exact() {
    let cap = block_capacity::<i32, i32>();
    // (i32, i32) entries: 4 * 4096 / (4 * 8 + 1).
    assert_eq!(cap, 496);

    let mut page = vec![0u8; PAGE_SIZE];
    let mut block = BlockViewMut::<i32, i32>::new(&mut page);
    assert!(block.insert(0, &0x11223344, &0x55667788));
    assert!(block.insert(3, &-1, &7));

    let array_bytes = cap * 8;
    let bitmap_bytes = (cap + 7) / 8;
    assert_eq!(&page[0..4], &0x11223344i32.to_le_bytes());
    assert_eq!(&page[4..8], &0x55667788i32.to_le_bytes());
    assert_eq!(&page[24..28], &(-1i32).to_le_bytes());
    // Slots 0 and 3 set in both bitmaps: 0b0000_1001.
    assert_eq!(page[array_bytes], 0b0000_1001);
    assert_eq!(page[array_bytes + bitmap_bytes], 0b0000_1001);
}

#[test]
fn block_page_insert_remove_state_machine() {
    let mut page = vec![0u8; PAGE_SIZE];
    let mut block = BlockViewMut::<i32, i32>::new(&mut page);

    // Empty -> Live.
    assert!(!block.view().is_occupied(5));
    assert!(block.insert(5, &50, &500));
    assert!(block.view().is_occupied(5));
    assert!(block.view().is_readable(5));
    assert_eq!(block.view().key_at(5), 50);
    assert_eq!(block.view().value_at(5), 500);

    // Live -> Tombstone: occupied stays set.
    block.remove(5);
    assert!(block.view().is_occupied(5));
    assert!(!block.view().is_readable(5));

    // A tombstone is not reused by insert.
    assert!(!block.insert(5, &51, &501));
    assert_eq!(block.view().key_at(5), 50);

    // Tombstone -> Empty only through reset.
    block.reset();
    assert!(!block.view().is_occupied(5));
    assert!(block.insert(5, &51, &501));
}

#[test]
fn block_page_bounds_are_checked() {
    let cap = block_capacity::<i32, i32>();
    let mut page = vec![0u8; PAGE_SIZE];
    let mut block = BlockViewMut::<i32, i32>::new(&mut page);

    assert!(!block.insert(cap, &1, &2));
    block.remove(cap);
    assert!(!block.view().is_occupied(cap));
    assert!(!block.view().is_readable(cap));
    assert_eq!(block.view().key_at(cap), 0);
    assert_eq!(block.view().value_at(cap), 0);
}

#[test]
fn header_page_layout_is_bit_exact() {
    let mut page = vec![0u8; PAGE_SIZE];
    let mut header = HeaderViewMut::new(&mut page);
    header.set_page_id(PageId(9));
    header.set_lsn(3);
    header.set_size(1024);
    header.add_block_page_id(PageId(10));
    header.add_block_page_id(PageId(11));

    assert_eq!(&page[0..4], &9i32.to_le_bytes());
    assert_eq!(&page[4..8], &3i32.to_le_bytes());
    assert_eq!(&page[8..16], &1024u64.to_le_bytes());
    assert_eq!(&page[16..24], &2u64.to_le_bytes());
    assert_eq!(&page[24..28], &10i32.to_le_bytes());
    assert_eq!(&page[28..32], &11i32.to_le_bytes());

    let header = HeaderView::new(&page);
    assert_eq!(header.page_id(), PageId(9));
    assert_eq!(header.lsn(), 3);
    assert_eq!(header.size(), 1024);
    assert_eq!(header.num_blocks(), 2);
    assert_eq!(header.block_page_id(0), PageId(10));
    assert_eq!(header.block_page_id(1), PageId(11));
    assert_eq!(header.block_page_id(2), PageId::INVALID);
}

#[test]
fn lookup_probes_past_tombstones() {
    let (table, _bpm, _dir) = make_table(4);

    // All three hash to slot 0 and occupy slots 0, 1, 2.
    assert!(table.insert(&0, &100).unwrap());
    assert!(table.insert(&4, &101).unwrap());
    assert!(table.insert(&8, &102).unwrap());

    assert!(table.remove(&4, &101).unwrap());
    // The probe for 8 must cross the tombstone in slot 1.
    assert_eq!(table.get_value(&8).unwrap(), vec![102]);
    assert_eq!(table.get_value(&4).unwrap(), Vec::<i32>::new());
}

#[test]
fn duplicate_pairs_are_rejected() {
    let (table, _bpm, _dir) = make_table(4);

    assert!(table.insert(&3, &7).unwrap());
    assert!(!table.insert(&3, &7).unwrap());
    assert_eq!(table.get_value(&3).unwrap(), vec![7]);

    // Distinct values under the same key coexist.
    assert!(table.insert(&3, &8).unwrap());
    let mut values = table.get_value(&3).unwrap();
    values.sort();
    assert_eq!(values, vec![7, 8]);
}

#[test]
fn lookup_stops_at_first_empty_slot() {
    let (table, _bpm, _dir) = make_table(4);

    assert!(table.insert(&1, &10).unwrap());
    // Key 5 shares the home slot with 1; slot 2 is empty, so the probe
    // ends without wrapping.
    assert_eq!(table.get_value(&5).unwrap(), Vec::<i32>::new());
}

#[test]
fn exact_fill_triggers_resize_and_insert_succeeds() {
    let (table, _bpm, _dir) = make_table(4);

    for key in [0, 4, 8, 12] {
        assert!(table.insert(&key, &(key * 10)).unwrap());
    }
    assert_eq!(table.size(), 4);

    // The table holds exactly 4 slots; one more distinct insert must grow
    // it and then land.
    assert!(table.insert(&16, &160).unwrap());
    assert_eq!(table.size(), 8);

    for key in [0, 4, 8, 12, 16] {
        assert_eq!(table.get_value(&key).unwrap(), vec![key * 10]);
    }
}

#[test]
fn resize_reclaims_tombstones() {
    let (table, _bpm, _dir) = make_table(4);

    for key in [0, 4, 8, 12] {
        assert!(table.insert(&key, &1).unwrap());
    }
    for key in [4, 8, 12] {
        assert!(table.remove(&key, &1).unwrap());
    }
    // Three tombstones remain; growing the table wipes them.
    table.resize(4).unwrap();
    assert_eq!(table.size(), 8);
    assert_eq!(table.get_value(&0).unwrap(), vec![1]);
    for key in [4, 8, 12] {
        assert_eq!(table.get_value(&key).unwrap(), Vec::<i32>::new());
        // The slots are empty again, not tombstoned, so re-inserting works
        // without another resize.
        assert!(table.insert(&key, &2).unwrap());
    }
    assert_eq!(table.size(), 8);
}

#[test]
fn stale_resize_request_is_a_no_op() {
    let (table, _bpm, _dir) = make_table(4);
    table.resize(4).unwrap();
    assert_eq!(table.size(), 8);
    // A caller that observed the pre-grow capacity does not double again.
    table.resize(4).unwrap();
    assert_eq!(table.size(), 8);
}

#[test]
fn probe_crosses_block_boundaries() {
    let cap = block_capacity::<i32, i32>();
    let num_buckets = cap + 4;
    let (table, _bpm, _dir) = make_table(num_buckets);

    // Both keys hash to the last slot of block 0; the second one must
    // spill into block 1.
    let home = (cap - 1) as i32;
    let colliding = home + num_buckets as i32;
    assert!(table.insert(&home, &1).unwrap());
    assert!(table.insert(&colliding, &2).unwrap());

    assert_eq!(table.get_value(&home).unwrap(), vec![1]);
    assert_eq!(table.get_value(&colliding).unwrap(), vec![2]);
    assert!(table.remove(&colliding, &2).unwrap());
    assert_eq!(table.get_value(&colliding).unwrap(), Vec::<i32>::new());
}

#[test]
fn insert_get_remove_round_trip() {
    let (table, _bpm, _dir) = make_table(8);

    assert!(table.insert(&5, &55).unwrap());
    assert_eq!(table.get_value(&5).unwrap(), vec![55]);
    assert!(table.remove(&5, &55).unwrap());
    assert_eq!(table.get_value(&5).unwrap(), Vec::<i32>::new());
    assert!(!table.remove(&5, &55).unwrap());
}

#[test]
fn open_by_name_rebuilds_the_table() {
    let (bpm, _dir) = make_pool(16);
    let table =
        LinearProbeHashTable::<i32, i32, _>::create("orders", bpm.clone(), 4, IdentityHasher)
            .unwrap();
    for key in [0, 4, 8, 12, 16] {
        assert!(table.insert(&key, &(key + 1)).unwrap());
    }
    let grown_size = table.size();
    let header_page_id = table.header_page_id();
    drop(table);

    let table = LinearProbeHashTable::<i32, i32, _>::open("orders", bpm.clone(), IdentityHasher)
        .unwrap()
        .unwrap();
    assert_eq!(table.size(), grown_size);
    assert_eq!(table.header_page_id(), header_page_id);
    for key in [0, 4, 8, 12, 16] {
        assert_eq!(table.get_value(&key).unwrap(), vec![key + 1]);
    }

    assert!(
        LinearProbeHashTable::<i32, i32, _>::open("missing", bpm, IdentityHasher)
            .unwrap()
            .is_none()
    );
}

#[test]
fn duplicate_index_name_is_rejected() {
    let (bpm, _dir) = make_pool(16);
    let _table =
        LinearProbeHashTable::<i32, i32, _>::create("idx", bpm.clone(), 4, IdentityHasher).unwrap();
    assert!(
        LinearProbeHashTable::<i32, i32, _>::create("idx", bpm, 4, IdentityHasher).is_err()
    );
}

#[test]
fn concurrent_writers_survive_resizes() {
    let (table, _bpm, _dir) = make_table(4);
    let threads = 4i32;
    let per_thread = 64i32;

    std::thread::scope(|scope| {
        for thread in 0..threads {
            let table = &table;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let key = thread * per_thread + i;
                    assert!(table.insert(&key, &(key * 2)).unwrap());
                }
            });
        }
    });

    for key in 0..threads * per_thread {
        assert_eq!(table.get_value(&key).unwrap(), vec![key * 2]);
    }
}

#[test]
fn concurrent_readers_and_removers_agree() {
    let (table, _bpm, _dir) = make_table(64);
    for key in 0..64 {
        assert!(table.insert(&key, &key).unwrap());
    }

    std::thread::scope(|scope| {
        // Removers take the even keys; readers hammer the odd ones.
        scope.spawn(|| {
            for key in (0..64).step_by(2) {
                assert!(table.remove(&key, &key).unwrap());
            }
        });
        for _ in 0..2 {
            scope.spawn(|| {
                for key in (1..64).step_by(2) {
                    assert_eq!(table.get_value(&key).unwrap(), vec![key]);
                }
            });
        }
    });

    for key in 0..64 {
        let expected = if key % 2 == 0 { vec![] } else { vec![key] };
        assert_eq!(table.get_value(&key).unwrap(), expected);
    }
}
