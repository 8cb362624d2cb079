//! Hash-table engine: an ordered run of sparse groups plus the probing,
//! growth and rehash machinery shared by the map and set facades.

use std::alloc::Layout;
use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use allocator_api2::alloc::Allocator;

use crate::bits::BitBlock;
use crate::error::Error;
use crate::growth::{GrowthPolicy, Probing};
use crate::sparse::{SparseGroup, Sparsity};

/// Default load-factor ceiling: rehash once more than half the logical
/// buckets hold a value.
pub(crate) const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.5;

/// Position of a live entry: (group index, slot within the group).
pub(crate) type Pos = (usize, u32);

// ================================================================================================
// KEY SELECTION
// ================================================================================================

/// Extracts the hashed-and-compared key from a stored value.
///
/// Sets store bare keys; maps store `(key, value)` pairs and hash only the
/// first component.
pub(crate) trait KeySelect<T> {
    type Key;

    fn key(value: &T) -> &Self::Key;
}

/// The stored value is the key (set facade).
pub(crate) struct IdentityKey;

impl<T> KeySelect<T> for IdentityKey {
    type Key = T;

    #[inline(always)]
    fn key(value: &T) -> &T {
        value
    }
}

/// The stored value is a `(key, mapped)` pair (map facade).
pub(crate) struct PairKey;

impl<K, V> KeySelect<(K, V)> for PairKey {
    type Key = K;

    #[inline(always)]
    fn key(value: &(K, V)) -> &K {
        &value.0
    }
}

// ================================================================================================
// GROUP ARRAY
// ================================================================================================

/// Fixed-length array of sparse groups, allocated through the table's
/// allocator. Like the groups themselves it stores no allocator; the owner
/// passes one to every operation that needs memory.
pub(crate) struct Groups<T, B: BitBlock> {
    ptr: NonNull<SparseGroup<T, B>>,
    len: usize,
}

unsafe impl<T: Send, B: BitBlock> Send for Groups<T, B> {}
unsafe impl<T: Sync, B: BitBlock> Sync for Groups<T, B> {}

impl<T, B: BitBlock> Groups<T, B> {
    pub(crate) fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocate `len` empty groups; the final one carries the iteration
    /// sentinel flag.
    pub(crate) fn new_in<A: Allocator>(alloc: &A, len: usize) -> Result<Self, Error> {
        if len == 0 {
            return Ok(Self::empty());
        }
        let layout = Layout::array::<SparseGroup<T, B>>(len).map_err(|_| Error::OutOfMemory)?;
        let ptr: NonNull<SparseGroup<T, B>> = match alloc.allocate(layout) {
            Ok(block) => block.cast(),
            Err(_) => return Err(Error::OutOfMemory),
        };
        for i in 0..len {
            unsafe { ptr.as_ptr().add(i).write(SparseGroup::empty(i == len - 1)) };
        }
        Ok(Self { ptr, len })
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[SparseGroup<T, B>] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [SparseGroup<T, B>] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Free the array itself. Every group must already be empty (cleared or
    /// buffer-disposed); their destructors run here.
    pub(crate) fn dealloc_in<A: Allocator>(&mut self, alloc: &A) {
        if self.len == 0 {
            return;
        }
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            let layout = Layout::array::<SparseGroup<T, B>>(self.len).unwrap();
            alloc.deallocate(self.ptr.cast(), layout);
        }
        self.ptr = NonNull::dangling();
        self.len = 0;
    }
}

/// Frees a freshly built group array if the rehash that fills it fails or
/// unwinds. The values it holds still live in the old table, so buffers are
/// released without running destructors.
struct SpillGuard<'a, T, B: BitBlock, A: Allocator> {
    groups: &'a mut Groups<T, B>,
    alloc: &'a A,
}

impl<T, B: BitBlock, A: Allocator> Drop for SpillGuard<'_, T, B, A> {
    fn drop(&mut self) {
        for group in self.groups.as_mut_slice() {
            group.dispose_buffer(self.alloc);
        }
        self.groups.dealloc_in(self.alloc);
    }
}

/// Tears down a group array that owns its values (clone and deserialize
/// paths): values are dropped, buffers and the array freed.
pub(crate) struct ClearOnDrop<'a, T, B: BitBlock, A: Allocator> {
    pub(crate) groups: &'a mut Groups<T, B>,
    pub(crate) alloc: &'a A,
}

impl<T, B: BitBlock, A: Allocator> Drop for ClearOnDrop<'_, T, B, A> {
    fn drop(&mut self) {
        for group in self.groups.as_mut_slice() {
            group.clear(self.alloc);
        }
        self.groups.dealloc_in(self.alloc);
    }
}

// ================================================================================================
// ENGINE
// ================================================================================================

/// The open-addressed hash table over sparse groups.
///
/// All policy choices (key selection, hashing, allocation, growth, probing,
/// sparsity) are type parameters, so the hot paths monomorphize without
/// per-call dispatch.
pub(crate) struct SparseHash<T, KS, S, A, G, P, SP>
where
    A: Allocator,
    SP: Sparsity,
{
    groups: Groups<T, SP::Block>,
    bucket_count: usize,
    size: usize,
    deleted: usize,
    max_load_factor: f32,
    load_threshold: usize,
    policy: G,
    build_hasher: S,
    alloc: A,
    _marker: PhantomData<(KS, P)>,
}

impl<T, KS, S, A, G, P, SP> SparseHash<T, KS, S, A, G, P, SP>
where
    KS: KeySelect<T>,
    KS::Key: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Logical buckets per group.
    const WIDTH: usize = <SP::Block as BitBlock>::BITS as usize;

    pub(crate) fn new_in(build_hasher: S, alloc: A, policy: G) -> Self {
        let (policy, bucket_count) = match policy.for_bucket_count(0) {
            Ok(bound) => bound,
            Err(_) => unreachable!("zero buckets is always representable"),
        };
        Self {
            groups: Groups::empty(),
            bucket_count,
            size: 0,
            deleted: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            load_threshold: 0,
            policy,
            build_hasher,
            alloc,
            _marker: PhantomData,
        }
    }

    // ============================================================================================
    // ACCESSORS
    // ============================================================================================

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline(always)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub(crate) fn load_factor(&self) -> f32 {
        if self.bucket_count == 0 {
            0.0
        } else {
            self.size as f32 / self.bucket_count as f32
        }
    }

    #[inline(always)]
    pub(crate) fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Set the load-factor ceiling, clamped into `(0, 1]`. Takes effect on
    /// the next growth decision.
    pub(crate) fn set_max_load_factor(&mut self, lf: f32) {
        debug_assert!(lf > 0.0 && lf <= 1.0, "load factor must be in (0, 1]");
        self.max_load_factor = lf.clamp(f32::MIN_POSITIVE, 1.0);
        self.load_threshold = Self::threshold_for(self.bucket_count, self.max_load_factor);
    }

    #[inline(always)]
    pub(crate) fn hasher(&self) -> &S {
        &self.build_hasher
    }

    #[inline(always)]
    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline(always)]
    pub(crate) fn growth_policy(&self) -> &G {
        &self.policy
    }

    #[inline(always)]
    pub(crate) fn groups(&self) -> &[SparseGroup<T, SP::Block>] {
        self.groups.as_slice()
    }

    #[inline(always)]
    pub(crate) fn value_at(&self, (group, slot): Pos) -> &T {
        self.groups.as_slice()[group].value(slot)
    }

    #[inline(always)]
    pub(crate) fn value_at_mut(&mut self, (group, slot): Pos) -> &mut T {
        self.groups.as_mut_slice()[group].value_mut(slot)
    }

    #[inline(always)]
    fn split(bucket: usize) -> Pos {
        (bucket / Self::WIDTH, (bucket % Self::WIDTH) as u32)
    }

    #[inline(always)]
    fn threshold_for(bucket_count: usize, lf: f32) -> usize {
        (bucket_count as f64 * lf as f64) as usize
    }

    #[inline(always)]
    fn hash_of<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.build_hasher.hash_one(key)
    }

    // ============================================================================================
    // LOOKUP
    // ============================================================================================

    /// Walk the probe sequence for `key`. Deleted slots keep the walk going;
    /// the first free slot proves absence. The walk is bounded by the bucket
    /// count, which both probing strategies cover exactly once per cycle.
    pub(crate) fn find<Q>(&self, key: &Q) -> Option<Pos>
    where
        KS::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.size == 0 {
            return None;
        }
        let hash = self.hash_of(key);
        let groups = self.groups.as_slice();
        let mut bucket = self.policy.bucket_for_hash(hash);
        let mut probe = P::default();
        for _ in 0..self.bucket_count {
            let (group_index, slot) = Self::split(bucket);
            let group = &groups[group_index];
            if group.has_value(slot) {
                if KS::key(group.value(slot)).borrow() == key {
                    return Some((group_index, slot));
                }
            } else if !group.has_deleted(slot) {
                return None;
            }
            bucket = self.policy.wrap(bucket.wrapping_add(probe.next_stride()));
        }
        None
    }

    // ============================================================================================
    // INSERT / ERASE
    // ============================================================================================

    /// Insert a value keyed by `KS::key(&value)`.
    ///
    /// Returns the entry position plus `None` when a new entry was created.
    /// When an equal key is already present the table is left untouched and
    /// the offered value is handed back (`Some(value)`), so callers decide
    /// whether to drop it or assign it over the existing entry. Grows (or
    /// purges deleted markers) before probing, so one insert performs at
    /// most one rehash.
    pub(crate) fn insert(&mut self, value: T) -> Result<(Pos, Option<T>), Error> {
        if self.size + 1 > self.load_threshold {
            self.grow()?;
        } else if self.size + self.deleted + 1 > self.bucket_count {
            // The table is clogged with deleted markers; rebuild at the same
            // size to restore short probe sequences and a free slot.
            self.rehash_to(self.bucket_count)?;
        }

        let hash = self.hash_of(KS::key(&value));
        let mut bucket = self.policy.bucket_for_hash(hash);
        let mut probe = P::default();
        let mut reusable: Option<usize> = None;
        for _ in 0..self.bucket_count {
            let (group_index, slot) = Self::split(bucket);
            let group = &self.groups.as_slice()[group_index];
            if group.has_value(slot) {
                if KS::key(group.value(slot)) == KS::key(&value) {
                    return Ok(((group_index, slot), Some(value)));
                }
            } else if group.has_deleted(slot) {
                // Candidate for reuse, but only after the rest of the probe
                // sequence proves the key absent.
                if reusable.is_none() {
                    reusable = Some(bucket);
                }
            } else {
                let target = reusable.unwrap_or(bucket);
                return self.commit_insert(target, value);
            }
            bucket = self.policy.wrap(bucket.wrapping_add(probe.next_stride()));
        }

        // A full cycle saw no free slot and no match: every remaining
        // non-value bucket is a deleted marker, and at least one exists
        // because size < bucket_count.
        match reusable {
            Some(target) => self.commit_insert(target, value),
            None => unreachable!("probe cycle ended with no free or deleted bucket"),
        }
    }

    fn commit_insert(&mut self, bucket: usize, value: T) -> Result<(Pos, Option<T>), Error> {
        let (group_index, slot) = Self::split(bucket);
        let group = &mut self.groups.as_mut_slice()[group_index];
        group.ensure_room(&self.alloc)?;
        if group.has_deleted(slot) {
            self.deleted -= 1;
        }
        group.insert_at(slot, value);
        self.size += 1;
        Ok(((group_index, slot), None))
    }

    /// Assign a new value into an occupied position, returning the old one.
    /// The caller guarantees the keys are equal, so no re-probing happens.
    pub(crate) fn replace_at(&mut self, (group, slot): Pos, value: T) -> T {
        self.groups.as_mut_slice()[group].replace(slot, value)
    }

    /// Remove the entry at a known position, leaving a deleted marker so
    /// later lookups keep probing through it.
    pub(crate) fn erase_at(&mut self, (group, slot): Pos) -> T {
        let value = self.groups.as_mut_slice()[group].erase(&self.alloc, slot);
        self.size -= 1;
        self.deleted += 1;
        value
    }

    /// Position of `key`, or [`Error::KeyAbsent`] when lookups demand
    /// presence.
    pub(crate) fn require<Q>(&self, key: &Q) -> Result<Pos, Error>
    where
        KS::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).ok_or(Error::KeyAbsent)
    }

    /// Remove by key; returns the value if it was present.
    pub(crate) fn erase<Q>(&mut self, key: &Q) -> Option<T>
    where
        KS::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).map(|pos| self.erase_at(pos))
    }

    /// Drop every entry, keeping the current bucket count.
    pub(crate) fn clear(&mut self) {
        let (groups, alloc) = (&mut self.groups, &self.alloc);
        for group in groups.as_mut_slice() {
            group.clear(alloc);
        }
        self.size = 0;
        self.deleted = 0;
    }

    /// Keep only values for which `keep` returns true. The predicate may
    /// mutate values (but, through the facades, never keys).
    pub(crate) fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        let (groups, alloc) = (&mut self.groups, &self.alloc);
        let mut erased = 0usize;
        for group in groups.as_mut_slice() {
            let mut slot_cursor = 0u32;
            while let Some(slot) = group.present_bits().next_set(slot_cursor) {
                if !keep(group.value_mut(slot)) {
                    let _ = group.erase(alloc, slot);
                    erased += 1;
                }
                slot_cursor = slot + 1;
            }
        }
        self.size -= erased;
        self.deleted += erased;
    }

    // ============================================================================================
    // GROWTH AND REHASH
    // ============================================================================================

    /// Smallest policy-valid bucket count whose load threshold admits
    /// `entries` values.
    fn bucket_count_for(&self, entries: usize) -> Result<usize, Error> {
        let wanted = (entries as f64 / self.max_load_factor as f64).ceil() as usize;
        let (_, mut count) = self.policy.for_bucket_count(wanted)?;
        // Float rounding can leave the threshold one short; step once more
        // if so.
        while Self::threshold_for(count, self.max_load_factor) < entries {
            count = self.policy.next_bucket_count(count)?;
            let (_, rounded) = self.policy.for_bucket_count(count)?;
            count = rounded;
        }
        Ok(count)
    }

    fn grow(&mut self) -> Result<(), Error> {
        let wanted = self.bucket_count_for(self.size + 1)?;
        let next = self.policy.next_bucket_count(self.bucket_count)?;
        self.rehash_to(wanted.max(next))
    }

    /// Ensure space for `additional` more entries without rehashing.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let entries = self
            .size
            .checked_add(additional)
            .ok_or(Error::LengthExceeded {
                requested: usize::MAX,
                max: self.policy.max_bucket_count(),
            })?;
        let target = self.bucket_count_for(entries)?;
        if target > self.bucket_count {
            self.rehash_to(target)?;
        }
        Ok(())
    }

    /// Rebuild with at least `min_bucket_count` buckets (never fewer than
    /// the current size requires). `rehash(0)` shrinks to fit.
    pub(crate) fn rehash(&mut self, min_bucket_count: usize) -> Result<(), Error> {
        let needed = if self.size == 0 {
            0
        } else {
            self.bucket_count_for(self.size)?
        };
        let (_, requested) = self.policy.for_bucket_count(min_bucket_count)?;
        self.rehash_to(requested.max(needed))
    }

    /// Allocate a fresh group vector sized for `min_bucket_count`, re-probe
    /// every live entry into it, and swap. On failure the old table is
    /// untouched and the partial new vector is torn down.
    fn rehash_to(&mut self, min_bucket_count: usize) -> Result<(), Error> {
        let (new_policy, new_count) = self.policy.for_bucket_count(min_bucket_count)?;
        debug_assert!(Self::threshold_for(new_count, self.max_load_factor) >= self.size);

        let group_count = new_count.div_ceil(Self::WIDTH);
        let mut new_groups: Groups<T, SP::Block> = Groups::new_in(&self.alloc, group_count)?;
        {
            let guard = SpillGuard {
                groups: &mut new_groups,
                alloc: &self.alloc,
            };
            for old_group in self.groups.as_slice() {
                let mut slot_cursor = 0u32;
                while let Some(slot) = old_group.present_bits().next_set(slot_cursor) {
                    slot_cursor = slot + 1;
                    let hash = self.build_hasher.hash_one(KS::key(old_group.value(slot)));
                    let mut bucket = new_policy.bucket_for_hash(hash);
                    let mut probe = P::default();
                    let mut placed = false;
                    for _ in 0..new_count {
                        let (group_index, new_slot) = Self::split(bucket);
                        let target = &mut guard.groups.as_mut_slice()[group_index];
                        if !target.has_value(new_slot) {
                            target.ensure_room(&self.alloc)?;
                            // The old group keeps a bitwise copy until its
                            // buffer is disposed below; exactly one side is
                            // ever dropped.
                            target.insert_at(new_slot, unsafe { old_group.read_out(slot) });
                            placed = true;
                            break;
                        }
                        bucket = new_policy.wrap(bucket.wrapping_add(probe.next_stride()));
                    }
                    debug_assert!(placed, "rehash probe cycle found no free bucket");
                }
            }
            mem::forget(guard);
        }

        // Rehash is the one point where group buffers are trimmed to their
        // exact population.
        for group in new_groups.as_mut_slice() {
            group.shrink_to_fit(&self.alloc);
        }

        let mut old_groups = mem::replace(&mut self.groups, new_groups);
        for group in old_groups.as_mut_slice() {
            group.dispose_buffer(&self.alloc);
        }
        old_groups.dealloc_in(&self.alloc);

        self.bucket_count = new_count;
        self.policy = new_policy;
        self.deleted = 0;
        self.load_threshold = Self::threshold_for(new_count, self.max_load_factor);
        Ok(())
    }

    // ============================================================================================
    // ITERATION AND COMPARISON
    // ============================================================================================

    pub(crate) fn iter(&self) -> RawIter<'_, T, SP::Block> {
        RawIter {
            groups: self.groups.as_slice(),
            group_index: 0,
            slot_cursor: 0,
            remaining: self.size,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> RawIterMut<'_, T, SP::Block> {
        RawIterMut {
            groups: self.groups.ptr,
            group_index: 0,
            slot_cursor: 0,
            remaining: self.size,
            _marker: PhantomData,
        }
    }

    /// Order-independent content equality.
    pub(crate) fn content_eq(&self, other: &Self) -> bool
    where
        T: PartialEq,
    {
        if self.size != other.size {
            return false;
        }
        self.iter().all(|value| {
            other
                .find(KS::key(value))
                .is_some_and(|pos| other.value_at(pos) == value)
        })
    }

    // ============================================================================================
    // CODEC SUPPORT
    // ============================================================================================

    /// Reassemble a table from deserialized parts. The caller guarantees the
    /// groups are internally consistent with `bucket_count` and `size`.
    pub(crate) fn assemble(
        groups: Groups<T, SP::Block>,
        bucket_count: usize,
        size: usize,
        deleted: usize,
        max_load_factor: f32,
        policy: G,
        build_hasher: S,
        alloc: A,
    ) -> Self {
        let load_threshold = Self::threshold_for(bucket_count, max_load_factor);
        Self {
            groups,
            bucket_count,
            size,
            deleted,
            max_load_factor,
            load_threshold,
            policy,
            build_hasher,
            alloc,
            _marker: PhantomData,
        }
    }
}

impl<T, KS, S, A, G, P, SP> Drop for SparseHash<T, KS, S, A, G, P, SP>
where
    A: Allocator,
    SP: Sparsity,
{
    fn drop(&mut self) {
        let (groups, alloc) = (&mut self.groups, &self.alloc);
        for group in groups.as_mut_slice() {
            group.clear(alloc);
        }
        groups.dealloc_in(alloc);
    }
}

impl<T, KS, S, A, G, P, SP> Clone for SparseHash<T, KS, S, A, G, P, SP>
where
    T: Clone,
    KS: KeySelect<T>,
    KS::Key: Hash + Eq,
    S: BuildHasher + Clone,
    A: Allocator + Clone,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn clone(&self) -> Self {
        let mut groups = match Groups::new_in(&self.alloc, self.groups.len()) {
            Ok(groups) => groups,
            Err(_) => clone_alloc_failure(),
        };

        // On a panicking `T::clone`, finished groups own their values and
        // must be dropped for real.
        {
            let guard = ClearOnDrop {
                groups: &mut groups,
                alloc: &self.alloc,
            };
            for (index, group) in self.groups.as_slice().iter().enumerate() {
                match group.clone_in(&self.alloc) {
                    Ok(copy) => guard.groups.as_mut_slice()[index] = copy,
                    Err(_) => clone_alloc_failure(),
                }
            }
            mem::forget(guard);
        }

        Self::assemble(
            groups,
            self.bucket_count,
            self.size,
            self.deleted,
            self.max_load_factor,
            self.policy.clone(),
            self.build_hasher.clone(),
            self.alloc.clone(),
        )
    }
}

#[cold]
fn clone_alloc_failure() -> ! {
    panic!("allocation failed while cloning a sparse table");
}

/// For the infallible facade surfaces (constructors, `Extend`,
/// `FromIterator`) that cannot return the error.
pub(crate) fn infallible(result: Result<(), Error>) {
    if let Err(err) = result {
        panic!("sparse table allocation failed: {err}");
    }
}

// SAFETY: the engine owns its storage exclusively; sharing rules follow the
// stored values.
unsafe impl<T, KS, S, A, G, P, SP> Send for SparseHash<T, KS, S, A, G, P, SP>
where
    T: Send,
    S: Send,
    A: Allocator + Send,
    G: Send,
    SP: Sparsity,
{
}

unsafe impl<T, KS, S, A, G, P, SP> Sync for SparseHash<T, KS, S, A, G, P, SP>
where
    T: Sync,
    S: Sync,
    A: Allocator + Sync,
    G: Sync,
    SP: Sparsity,
{
}

// ================================================================================================
// RAW ITERATORS
// ================================================================================================

/// Shared iterator over every live value, in group-then-slot order.
///
/// Advance scans the current group's bitmap for the next set bit; the final
/// group's sentinel flag ends the scan without an index comparison per step.
pub(crate) struct RawIter<'a, T, B: BitBlock> {
    groups: &'a [SparseGroup<T, B>],
    group_index: usize,
    slot_cursor: u32,
    remaining: usize,
}

impl<'a, T, B: BitBlock> Iterator for RawIter<'a, T, B> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            let group = &self.groups[self.group_index];
            if let Some(slot) = group.present_bits().next_set(self.slot_cursor) {
                self.slot_cursor = slot + 1;
                self.remaining -= 1;
                return Some(group.value(slot));
            }
            if group.is_last() {
                return None;
            }
            self.group_index += 1;
            self.slot_cursor = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, B: BitBlock> ExactSizeIterator for RawIter<'_, T, B> {}

/// Mutable sibling of [`RawIter`].
pub(crate) struct RawIterMut<'a, T, B: BitBlock> {
    groups: NonNull<SparseGroup<T, B>>,
    group_index: usize,
    slot_cursor: u32,
    remaining: usize,
    _marker: PhantomData<&'a mut SparseGroup<T, B>>,
}

impl<'a, T, B: BitBlock> Iterator for RawIterMut<'a, T, B> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            // SAFETY: `remaining > 0` proves the index is still inside the
            // table, and each value is yielded exactly once.
            let group = unsafe { &mut *self.groups.as_ptr().add(self.group_index) };
            if let Some(slot) = group.present_bits().next_set(self.slot_cursor) {
                self.slot_cursor = slot + 1;
                self.remaining -= 1;
                return Some(unsafe { &mut *(group.value_mut(slot) as *mut T) });
            }
            if group.is_last() {
                return None;
            }
            self.group_index += 1;
            self.slot_cursor = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, B: BitBlock> ExactSizeIterator for RawIterMut<'_, T, B> {}
