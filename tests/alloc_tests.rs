//! Tables backed by a caller-supplied allocator: every byte of group and
//! value storage must come from it and return to it.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

use sparsemap_rs::allocator_api2::alloc::{AllocError, Allocator, Global};
use sparsemap_rs::{SparseMap, SparseSet};

/// Delegates to the global allocator while tracking the number of live
/// allocations and bytes; lets tests prove the table never allocates behind
/// the allocator's back and never leaks.
#[derive(Clone, Default)]
struct CountingAlloc {
    live: Arc<AtomicIsize>,
    bytes: Arc<AtomicIsize>,
    total_allocs: Arc<AtomicUsize>,
}

impl CountingAlloc {
    fn live(&self) -> isize {
        self.live.load(Ordering::Relaxed)
    }

    fn bytes(&self) -> isize {
        self.bytes.load(Ordering::Relaxed)
    }

    fn total_allocs(&self) -> usize {
        self.total_allocs.load(Ordering::Relaxed)
    }
}

unsafe impl Allocator for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let block = Global.allocate(layout)?;
        self.live.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size() as isize, Ordering::Relaxed);
        self.total_allocs.fetch_add(1, Ordering::Relaxed);
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(layout.size() as isize, Ordering::Relaxed);
        Global.deallocate(ptr, layout);
    }
}

#[test]
fn test_map_in_custom_allocator() {
    let alloc = CountingAlloc::default();
    let mut map: SparseMap<u64, u64, ahash::RandomState, CountingAlloc> =
        SparseMap::with_capacity_and_hasher_in(8, ahash::RandomState::new(), alloc.clone());
    assert!(alloc.total_allocs() > 0, "group array not drawn from the allocator");

    map.extend([(0u64, 1u64), (2, 3), (4, 5), (6, 7), (8, 9)]);
    assert_eq!(map.len(), 5);
    for (k, v) in [(0u64, 1u64), (2, 3), (4, 5), (6, 7), (8, 9)] {
        assert_eq!(map.get(&k), Some(&v));
    }
    assert!(alloc.live() > 0);
    assert!(alloc.bytes() > 0);

    drop(map);
    assert_eq!(alloc.live(), 0, "allocation leaked");
    assert_eq!(alloc.bytes(), 0, "byte accounting unbalanced");
}

#[test]
fn test_allocator_balances_through_churn_and_rehash() {
    let alloc = CountingAlloc::default();
    let mut set: SparseSet<u64, ahash::RandomState, CountingAlloc> =
        SparseSet::with_capacity_and_hasher_in(0, ahash::RandomState::new(), alloc.clone());

    for i in 0..2000u64 {
        set.insert(i).unwrap();
    }
    for i in 0..1000u64 {
        assert!(set.remove(&i));
    }
    set.shrink_to_fit().unwrap();
    for i in 1000..2000u64 {
        assert!(set.contains(&i));
    }

    drop(set);
    assert_eq!(alloc.live(), 0);
    assert_eq!(alloc.bytes(), 0);
}

#[test]
fn test_clear_releases_value_buffers() {
    let alloc = CountingAlloc::default();
    let mut set: SparseSet<String, ahash::RandomState, CountingAlloc> =
        SparseSet::with_capacity_and_hasher_in(64, ahash::RandomState::new(), alloc.clone());
    let after_build = alloc.live();

    for i in 0..64u64 {
        set.insert(format!("entry-{i}")).unwrap();
    }
    assert!(alloc.live() > after_build);

    // Clear drops values and their buffers but keeps the group array.
    set.clear();
    assert_eq!(alloc.live(), after_build);

    drop(set);
    assert_eq!(alloc.live(), 0);
}

#[test]
fn test_clone_allocates_from_target_allocator() {
    let alloc = CountingAlloc::default();
    let mut set: SparseSet<u64, ahash::RandomState, CountingAlloc> =
        SparseSet::with_capacity_and_hasher_in(0, ahash::RandomState::new(), alloc.clone());
    for i in 0..100u64 {
        set.insert(i).unwrap();
    }

    let live_before = alloc.live();
    let copy = set.clone();
    assert!(alloc.live() > live_before, "clone did not allocate");
    assert_eq!(copy, set);

    drop(copy);
    assert_eq!(alloc.live(), live_before);
    drop(set);
    assert_eq!(alloc.live(), 0);
}
