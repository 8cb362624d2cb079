//! `SparseMap`: the key → value facade over the sparse hash engine.

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
use crate::table::{infallible, PairKey, RawIter, RawIterMut, SparseHash};

/// Memory-efficient hash map with near one word of overhead per empty
/// bucket.
///
/// Entries live in sparse groups: a bitmap plus a value buffer sized to the
/// group's actual population. Lookup stays O(1) amortized; the trade is that
/// inserting into a populated group shifts part of one small buffer.
///
/// The hasher, allocator, growth policy, probing strategy and sparsity are
/// type parameters fixed at construction. The defaults (ahash, global
/// allocator, power-of-two growth, quadratic probing, 64-slot groups) are
/// right for most uses.
pub struct SparseMap<
    K,
    V,
    S = RandomState,
    A = Global,
    G = PowerOfTwoGrowth,
    P = QuadraticProbing,
    SP = HighSparsity,
> where
    A: Allocator,
    SP: Sparsity,
{
    table: SparseHash<(K, V), PairKey, S, A, G, P, SP>,
}

impl<K: Hash + Eq, V> SparseMap<K, V> {
    /// Create an empty map with the default configuration.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty map preallocated for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S, A, G, P, SP> SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Create an empty map using the provided hasher.
    ///
    /// Changing the hasher of an existing map is not supported because it
    /// would invalidate every bucket placement.
    pub fn with_hasher(hasher: S) -> Self
    where
        A: Default,
    {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Create an empty map with the specified capacity and hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self
    where
        A: Default,
    {
        Self::with_capacity_and_hasher_in(capacity, hasher, A::default())
    }

    /// Create an empty map inside the given allocator.
    ///
    /// Every byte the map ever touches (group headers and value buffers) is
    /// obtained from `alloc`, so the map can live in an arena or a shared
    /// memory segment.
    pub fn with_capacity_and_hasher_in(capacity: usize, hasher: S, alloc: A) -> Self {
        Self::with_growth_policy_in(capacity, hasher, G::default(), alloc)
    }

    /// Create an empty map with an explicitly configured growth policy,
    /// e.g. [`ModGrowth::new`](crate::ModGrowth::new) with a custom factor.
    ///
    /// # Panics
    ///
    /// Panics if the initial preallocation fails.
    pub fn with_growth_policy_in(capacity: usize, hasher: S, policy: G, alloc: A) -> Self {
        let mut map = Self {
            table: SparseHash::new_in(hasher, alloc, policy),
        };
        if capacity > 0 {
            infallible(map.table.reserve(capacity));
        }
        map
    }

    // ============================================================================================
    // SIZE AND CONFIGURATION
    // ============================================================================================

    /// Number of entries in the map.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the map contains no entries.
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

    /// The map's hasher.
    pub fn hasher(&self) -> &S {
        self.table.hasher()
    }

    /// The map's allocator.
    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    // ============================================================================================
    // LOOKUP
    // ============================================================================================

    /// Returns a reference to the value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(key).map(|pos| &self.table.value_at(pos).1)
    }

    /// Returns the stored key and value for `key`, if present.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(key).map(|pos| {
            let (k, v) = self.table.value_at(pos);
            (k, v)
        })
    }

    /// Returns a mutable reference to the value for `key`, if present.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .find(key)
            .map(|pos| &mut self.table.value_at_mut(pos).1)
    }

    /// Like [`Self::get`] but demands presence: absent keys are an
    /// [`Error::KeyAbsent`] instead of `None`.
    pub fn at<Q>(&self, key: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let pos = self.table.require(key)?;
        Ok(&self.table.value_at(pos).1)
    }

    /// Mutable sibling of [`Self::at`].
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let pos = self.table.require(key)?;
        Ok(&mut self.table.value_at_mut(pos).1)
    }

    /// Whether `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(key).is_some()
    }

    // ============================================================================================
    // MUTATION
    // ============================================================================================

    /// Insert a key-value pair.
    ///
    /// If the key already exists the entry is overwritten (key included) and
    /// the old value returned. Fails with [`Error::OutOfMemory`] or
    /// [`Error::LengthExceeded`] without modifying the map.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        match self.table.insert((key, value))? {
            (_, None) => Ok(None),
            (pos, Some(pair)) => {
                let (_, old) = self.table.replace_at(pos, pair);
                Ok(Some(old))
            }
        }
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.erase(key).map(|(_, v)| v)
    }

    /// Remove `key`, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.erase(key)
    }

    /// Drop every entry. Bucket count is unchanged.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.table.retain(|pair| {
            let (key, value) = pair;
            keep(&*key, value)
        });
    }

    /// Make room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table.reserve(additional)
    }

    /// Rebuild with at least `min_bucket_count` buckets; `rehash(0)` shrinks
    /// to the smallest bucket count admitting the current size.
    pub fn rehash(&mut self, min_bucket_count: usize) -> Result<(), Error> {
        self.table.rehash(min_bucket_count)
    }

    /// Shrink the bucket count (and every group buffer) to fit the current
    /// entries.
    pub fn shrink_to_fit(&mut self) -> Result<(), Error> {
        self.table.rehash(0)
    }

    /// Exchange the full contents and configuration of two maps.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    // ============================================================================================
    // ITERATION
    // ============================================================================================

    /// Iterator over `(&key, &value)` pairs, in unspecified order.
    pub fn iter(&self) -> Iter<'_, K, V, SP> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Iterator over `(&key, &mut value)` pairs.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V, SP> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V, SP> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// Iterator over the values.
    pub fn values(&self) -> Values<'_, K, V, SP> {
        Values {
            inner: self.table.iter(),
        }
    }

    /// Iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V, SP> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    // ============================================================================================
    // SERIALIZATION
    // ============================================================================================

    /// Write the map to `writer`, encoding entries through `codec`.
    pub fn serialize<C, W>(&self, codec: &mut C, writer: &mut W) -> Result<(), Error>
    where
        C: ValueCodec<(K, V)>,
        W: Write,
    {
        self.table.serialize_into(codec, writer, 0)
    }

    /// Like [`Self::serialize`], stamping a caller-chosen fingerprint of the
    /// hasher/equality/policy identity into the stream. Fast-mode loading
    /// via [`Self::deserialize_with_id`] refuses a mismatching fingerprint.
    pub fn serialize_with_id<C, W>(
        &self,
        codec: &mut C,
        writer: &mut W,
        hash_id: u64,
    ) -> Result<(), Error>
    where
        C: ValueCodec<(K, V)>,
        W: Write,
    {
        self.table.serialize_into(codec, writer, hash_id)
    }

    /// Read a map back from `reader`.
    ///
    /// With `hash_compatible` the stored bucket layout is trusted verbatim;
    /// only use it when the writing map had the same hasher, growth policy
    /// and sparsity. Without it every entry is re-inserted through this
    /// map's own configuration, which is always correct.
    pub fn deserialize<C, R>(
        codec: &mut C,
        reader: &mut R,
        hash_compatible: bool,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<(K, V)>,
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
        C: ValueCodec<(K, V)>,
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
        C: ValueCodec<(K, V)>,
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

impl<K, V, S, A, G, P, SP> Default for SparseMap<K, V, S, A, G, P, SP>
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

impl<K, V, S, A, G, P, SP> fmt::Debug for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, A, G, P, SP> PartialEq for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    V: PartialEq,
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

impl<K, V, S, A, G, P, SP> Eq for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
}

impl<K, V, S, A, G, P, SP> Clone for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq + Clone,
    V: Clone,
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

impl<K, V, S, A, G, P, SP> Extend<(K, V)> for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    /// Panics on allocation failure; use [`SparseMap::insert`] to handle it.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            infallible(self.insert(key, value).map(|_| ()));
        }
    }
}

impl<K, V, S, A, G, P, SP> FromIterator<(K, V)> for SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<'a, K, V, S, A, G, P, SP> IntoIterator for &'a SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, SP>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, A, G, P, SP> IntoIterator for &'a mut SparseMap<K, V, S, A, G, P, SP>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
    G: GrowthPolicy,
    P: Probing<G>,
    SP: Sparsity,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V, SP>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// ================================================================================================
// ITERATORS
// ================================================================================================

/// Iterator over the entries of a [`SparseMap`].
pub struct Iter<'a, K, V, SP: Sparsity = HighSparsity> {
    inner: RawIter<'a, (K, V), SP::Block>,
}

impl<'a, K, V, SP: Sparsity> Iterator for Iter<'a, K, V, SP> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, SP: Sparsity> ExactSizeIterator for Iter<'_, K, V, SP> {}

/// Mutable iterator over the entries of a [`SparseMap`].
pub struct IterMut<'a, K, V, SP: Sparsity = HighSparsity> {
    inner: RawIterMut<'a, (K, V), SP::Block>,
}

impl<'a, K, V, SP: Sparsity> Iterator for IterMut<'a, K, V, SP> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (&*key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, SP: Sparsity> ExactSizeIterator for IterMut<'_, K, V, SP> {}

/// Iterator over the keys of a [`SparseMap`].
pub struct Keys<'a, K, V, SP: Sparsity = HighSparsity> {
    inner: RawIter<'a, (K, V), SP::Block>,
}

impl<'a, K, V, SP: Sparsity> Iterator for Keys<'a, K, V, SP> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, SP: Sparsity> ExactSizeIterator for Keys<'_, K, V, SP> {}

/// Iterator over the values of a [`SparseMap`].
pub struct Values<'a, K, V, SP: Sparsity = HighSparsity> {
    inner: RawIter<'a, (K, V), SP::Block>,
}

impl<'a, K, V, SP: Sparsity> Iterator for Values<'a, K, V, SP> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, SP: Sparsity> ExactSizeIterator for Values<'_, K, V, SP> {}

/// Iterator over mutable value references of a [`SparseMap`].
pub struct ValuesMut<'a, K, V, SP: Sparsity = HighSparsity> {
    inner: RawIterMut<'a, (K, V), SP::Block>,
}

impl<'a, K, V, SP: Sparsity> Iterator for ValuesMut<'a, K, V, SP> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, SP: Sparsity> ExactSizeIterator for ValuesMut<'_, K, V, SP> {}
