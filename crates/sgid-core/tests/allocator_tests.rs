//! Integration tests for identifier allocation under concurrent access.
//!
//! The concurrency tests fail against a read-max-then-insert allocator:
//! racing threads see the same maximum and either collide or duplicate.

use sgid_core::{
    CategoryPair, MemorySequenceStore, RecordIdentifierAllocator, SequenceStore, SgidError,
    SqliteSequenceStore,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

fn create_test_db() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

fn open_store(dir: &Path) -> SqliteSequenceStore {
    SqliteSequenceStore::open_at(&dir.join("identifiers.db")).unwrap()
}

/// Run `THREADS` workers, each allocating `PER_THREAD` records in the pair
/// chosen by `pair_for`, and return every sequence number handed out.
fn hammer<S>(
    allocators: Vec<RecordIdentifierAllocator<S>>,
    pair_for: fn(usize) -> (u32, u32),
) -> Vec<((u32, u32), u64)>
where
    S: SequenceStore + 'static,
{
    let barrier = Arc::new(Barrier::new(allocators.len()));
    let handles: Vec<_> = allocators
        .into_iter()
        .enumerate()
        .map(|(t, alloc)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let (first, second) = pair_for(t);
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| {
                        let key = format!("record-{}-{}", t, i);
                        let seq = alloc.allocate(&key, first, second).unwrap();
                        ((first, second), seq)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

fn assert_gap_free(results: &[((u32, u32), u64)], pair: (u32, u32), expected: usize) {
    let seqs: Vec<u64> = results
        .iter()
        .filter(|(p, _)| *p == pair)
        .map(|(_, s)| *s)
        .collect();
    let unique: BTreeSet<u64> = seqs.iter().copied().collect();
    assert_eq!(seqs.len(), expected, "wrong count for {:?}", pair);
    assert_eq!(unique.len(), expected, "duplicate sequence in {:?}", pair);
    assert_eq!(
        unique,
        (1..=expected as u64).collect::<BTreeSet<_>>(),
        "gap in {:?}",
        pair
    );
}

#[test]
fn test_concurrent_same_pair_shared_handle() {
    let temp_dir = create_test_db();
    let alloc = RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path())));

    let results = hammer(vec![alloc.clone(); THREADS], |_| (1, 2));
    assert_gap_free(&results, (1, 2), THREADS * PER_THREAD);
    assert!(alloc.store().audit().unwrap().is_consistent());
}

#[test]
fn test_concurrent_same_pair_separate_handles() {
    let temp_dir = create_test_db();
    // One connection per worker, as separate host processes would have.
    let allocators: Vec<_> = (0..THREADS)
        .map(|_| RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path()))))
        .collect();

    let results = hammer(allocators, |_| (4, 11));
    assert_gap_free(&results, (4, 11), THREADS * PER_THREAD);

    let store = open_store(temp_dir.path());
    let report = store.audit().unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.total_rows, (THREADS * PER_THREAD) as u64);
}

#[test]
fn test_concurrent_distinct_pairs_sqlite() {
    let temp_dir = create_test_db();
    let alloc = RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path())));

    let results = hammer(vec![alloc; THREADS], |t| ((t % 2) as u32, 5));
    assert_gap_free(&results, (0, 5), THREADS / 2 * PER_THREAD);
    assert_gap_free(&results, (1, 5), THREADS / 2 * PER_THREAD);
}

#[test]
fn test_concurrent_distinct_pairs_memory() {
    let alloc = RecordIdentifierAllocator::new(Arc::new(MemorySequenceStore::new()));

    let results = hammer(vec![alloc; THREADS], |t| ((t % 4) as u32, 99));
    for first in 0..4 {
        assert_gap_free(&results, (first, 99), THREADS / 4 * PER_THREAD);
    }
}

#[test]
fn test_lookup_matches_allocation_inputs() {
    let temp_dir = create_test_db();
    let alloc = RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path())));

    let cases = [(0, 0), (1, 2), (12, 34), (99, 99), (1, 2)];
    for (i, (first, second)) in cases.iter().enumerate() {
        let key = format!("rec-{}", i);
        let seq = alloc.allocate(&key, *first, *second).unwrap();
        let id = alloc.lookup(&key).unwrap();

        assert_eq!(id.len(), 20);
        assert_eq!(&id[0..2], format!("{:02}", first));
        assert_eq!(&id[2..4], format!("{:02}", second));
        assert_eq!(id[4..19].parse::<u64>().unwrap(), seq);
        assert!(id.ends_with('A'));
    }
    assert_eq!(alloc.lookup("rec-4").unwrap(), "0102000000000000002A");
}

#[test]
fn test_duplicate_allocation_survives_reopen() {
    let temp_dir = create_test_db();
    {
        let alloc = RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path())));
        assert_eq!(alloc.allocate("rec-1", 3, 7).unwrap(), 1);
    }

    let alloc = RecordIdentifierAllocator::new(Arc::new(open_store(temp_dir.path())));
    let err = alloc.allocate("rec-1", 3, 7).unwrap_err();
    assert!(matches!(err, SgidError::DuplicateAllocation { .. }));
    assert_eq!(alloc.lookup("rec-1").unwrap(), "0307000000000000001A");
    assert_eq!(alloc.allocate("rec-2", 3, 7).unwrap(), 2);
}

#[test]
fn test_wide_category_rejected_by_every_backend() {
    let temp_dir = create_test_db();
    let stores: Vec<Arc<dyn SequenceStore>> = vec![
        Arc::new(open_store(temp_dir.path())),
        Arc::new(MemorySequenceStore::new()),
    ];

    for store in stores {
        let alloc = RecordIdentifierAllocator::new(store);
        for (first, second) in [(100, 4), (4, 100), (u32::MAX, 0)] {
            let err = alloc.allocate("wide", first, second).unwrap_err();
            assert!(matches!(err, SgidError::FormatOverflow { .. }));
        }
        assert!(alloc.store().rows_for_key("wide").unwrap().is_empty());
        assert_eq!(alloc.store().audit().unwrap().total_rows, 0);

        // The key was never taken, and every issued identifier is full width.
        alloc.allocate("wide", 99, 4).unwrap();
        assert_eq!(alloc.lookup("wide").unwrap(), "9904000000000000001A");
    }
}

#[test]
fn test_allocator_over_trait_object() {
    let store: Arc<dyn SequenceStore> = Arc::new(MemorySequenceStore::new());
    let alloc = RecordIdentifierAllocator::new(store);

    alloc.allocate("rec-1", 5, 5).unwrap();
    let rows = alloc
        .store()
        .sequences_for_pair(CategoryPair::new(5, 5).unwrap())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record_key, "rec-1");
}
