//! `SparseSet`: the key-only facade over the sparse hash engine.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::io::{Read, Write};
use std::mem;

use ahash::RandomState;
use allocator_api2::alloc::{Allocator, Global};

use crate::codec::ValueCodec;
use crate::error::Error;
use crate::growth::{GrowthPolicy, PowerOfTwoGrowth, Probing, QuadraticProbing};
use crate::sparse::{HighSparsity, Sparsity};
use crate::table::{infallible, IdentityKey, RawIter, SparseHash};

/// Memory-efficient hash set; the key-only sibling of
/// [`SparseMap`](crate::SparseMap) with the same storage scheme and the same
/// configuration surface.
pub struct SparseSet<
    K,
    S = RandomState,
    A = Global,
    G = PowerOfTwoGrowth,
    P = QuadraticProbing,
    SP = HighSparsity,
> where
    A: Allocator,
    SP: Sparsity,
{
    table: SparseHash<K, IdentityKey, S, A, G, P, SP>,
}

impl<K: Hash + Eq> SparseSet<K> {
    /// Create an empty set with the default configuration.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty set preallocated for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, S, A, G, P, SP> SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Create an empty set using the provided hasher.
    pub fn with_hasher(hasher: S) -> Self
    where
        A: Default,
    {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Create an empty set with the specified capacity and hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self
    where
        A: Default,
    {
        Self::with_capacity_and_hasher_in(capacity, hasher, A::default())
    }

    /// Create an empty set inside the given allocator.
    pub fn with_capacity_and_hasher_in(capacity: usize, hasher: S, alloc: A) -> Self {
        Self::with_growth_policy_in(capacity, hasher, G::default(), alloc)
    }

    /// Create an empty set with an explicitly configured growth policy.
    ///
    /// # Panics
    ///
    /// Panics if the initial preallocation fails.
    pub fn with_growth_policy_in(capacity: usize, hasher: S, policy: G, alloc: A) -> Self {
        let mut set = Self {
            table: SparseHash::new_in(hasher, alloc, policy),
        };
        if capacity > 0 {
            infallible(set.table.reserve(capacity));
        }
        set
    }

    // ============================================================================================
    // SIZE AND CONFIGURATION
    // ============================================================================================

    /// Number of values in the set.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the set contains no values.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of logical buckets.
    #[inline(always)]
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Current `len / bucket_count` ratio.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Load-factor ceiling that triggers growth. Defaults to 0.5.
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Set the load-factor ceiling; values outside `(0, 1]` are clamped.
    pub fn set_max_load_factor(&mut self, lf: f32) {
        self.table.set_max_load_factor(lf);
    }

    /// The set's hasher.
    pub fn hasher(&self) -> &S {
        self.table.hasher()
    }

    /// The set's allocator.
    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    // ============================================================================================
    // LOOKUP AND MUTATION
    // ============================================================================================

    /// Whether `value` is in the set.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(value).is_some()
    }

    /// Returns the stored value equal to `value`, if any.
    pub fn get<Q>(&self, value: &Q) -> Option<&K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(value).map(|pos| self.table.value_at(pos))
    }

    /// Insert a value; returns whether it was newly added.
    ///
    /// An equal value already present is kept and the offered one dropped.
    /// Fails with [`Error::OutOfMemory`] or [`Error::LengthExceeded`]
    /// without modifying the set.
    pub fn insert(&mut self, value: K) -> Result<bool, Error> {
        let (_, rejected) = self.table.insert(value)?;
        Ok(rejected.is_none())
    }

    /// Remove `value`; returns whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.erase(value).is_some()
    }

    /// Remove and return the stored value equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.erase(value)
    }

    /// Drop every value. Bucket count is unchanged.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Keep only the values for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.table.retain(|value| keep(&*value));
    }

    /// Make room for at least `additional` more values.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table.reserve(additional)
    }

    /// Rebuild with at least `min_bucket_count` buckets; `rehash(0)` shrinks
    /// to the smallest bucket count admitting the current size.
    pub fn rehash(&mut self, min_bucket_count: usize) -> Result<(), Error> {
        self.table.rehash(min_bucket_count)
    }

    /// Shrink the bucket count (and every group buffer) to fit the current
    /// values.
    pub fn shrink_to_fit(&mut self) -> Result<(), Error> {
        self.table.rehash(0)
    }

    /// Exchange the full contents and configuration of two sets.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Iterator over the values, in unspecified order.
    pub fn iter(&self) -> Iter<'_, K, SP> {
        Iter {
            inner: self.table.iter(),
        }
    }

    // ============================================================================================
    // SERIALIZATION
    // ============================================================================================

    /// Write the set to `writer`, encoding values through `codec`.
    pub fn serialize<C, W>(&self, codec: &mut C, writer: &mut W) -> Result<(), Error>
    where
        C: ValueCodec<K>,
        W: Write,
    {
        self.table.serialize_into(codec, writer, 0)
    }

    /// Like [`Self::serialize`] with a caller-chosen hasher fingerprint.
    pub fn serialize_with_id<C, W>(
        &self,
        codec: &mut C,
        writer: &mut W,
        hash_id: u64,
    ) -> Result<(), Error>
    where
        C: ValueCodec<K>,
        W: Write,
    {
        self.table.serialize_into(codec, writer, hash_id)
    }

    /// Read a set back from `reader`; see
    /// [`SparseMap::deserialize`](crate::SparseMap::deserialize) for the
    /// meaning of `hash_compatible`.
    pub fn deserialize<C, R>(
        codec: &mut C,
        reader: &mut R,
        hash_compatible: bool,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<K>,
        R: Read,
        S: Default,
        A: Default,
    {
        Self::deserialize_with_hasher(codec, reader, hash_compatible, S::default())
    }

    /// [`Self::deserialize`] with an explicit hasher instance.
    pub fn deserialize_with_hasher<C, R>(
        codec: &mut C,
        reader: &mut R,
        hash_compatible: bool,
        hasher: S,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<K>,
        R: Read,
        A: Default,
    {
        Ok(Self {
            table: SparseHash::deserialize_from(
                codec,
                reader,
                hash_compatible,
                None,
                hasher,
                A::default(),
            )?,
        })
    }

    /// Fast-mode deserialization that additionally checks the stream's
    /// stored fingerprint against `expected_hash_id`.
    pub fn deserialize_with_id<C, R>(
        codec: &mut C,
        reader: &mut R,
        expected_hash_id: u64,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<K>,
        R: Read,
        S: Default,
        A: Default,
    {
        Ok(Self {
            table: SparseHash::deserialize_from(
                codec,
                reader,
                true,
                Some(expected_hash_id),
                S::default(),
                A::default(),
            )?,
        })
    }
}

// ================================================================================================
// STANDARD TRAIT IMPLEMENTATIONS
// ================================================================================================

impl<K, S, A, G, P, SP> Default for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, S, A, G, P, SP> fmt::Debug for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq + fmt::Debug,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, S, A, G, P, SP> PartialEq for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Content equality, independent of insertion order, bucket count and
    /// deletion history.
    fn eq(&self, other: &Self) -> bool {
        self.table.content_eq(&other.table)
    }
}

impl<K, S, A, G, P, SP> Eq for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
}

impl<K, S, A, G, P, SP> Clone for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
    A: Allocator + Clone,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

impl<K, S, A, G, P, SP> Extend<K> for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Panics on allocation failure; use [`SparseSet::insert`] to handle it.
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for value in iter {
            infallible(self.insert(value).map(|_| ()));
        }
    }
}

impl<K, S, A, G, P, SP> FromIterator<K> for SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

impl<'a, K, S, A, G, P, SP> IntoIterator for &'a SparseSet<K, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    type Item = &'a K;
    type IntoIter = Iter<'a, K, SP>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the values of a [`SparseSet`].
pub struct Iter<'a, K, SP: Sparsity = HighSparsity> {
    inner: RawIter<'a, K, SP::Block>,
}

impl<'a, K, SP: Sparsity> Iterator for Iter<'a, K, SP> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, SP: Sparsity> ExactSizeIterator for Iter<'_, K, SP> {}
