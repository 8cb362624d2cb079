//! Exercises every growth policy / probing / sparsity combination, with a
//! focus on the lazy-deletion invariant: after any interleaving of inserts
//! and erasures, every still-live key must remain findable.

use std::collections::HashSet;
use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use rand::prelude::*;
use sparsemap_rs::allocator_api2::alloc::Global;
use sparsemap_rs::{
    LinearProbing, LowSparsity, MediumSparsity, ModGrowth, PowerOfTwoGrowth, PrimeGrowth,
    QuadraticProbing, SparseSet,
};

macro_rules! churn_test {
    ($name:ident, $ty:ty) => {
        #[test]
        fn $name() {
            let mut set: $ty = Default::default();
            let mut mirror: HashSet<u64> = HashSet::new();
            let mut rng = StdRng::seed_from_u64(0x5eed);

            for step in 0..4000usize {
                let key = rng.gen_range(0..600u64);
                if rng.gen_bool(0.5) {
                    assert_eq!(set.insert(key).unwrap(), mirror.insert(key));
                } else {
                    assert_eq!(set.remove(&key), mirror.remove(&key));
                }
                assert_eq!(set.len(), mirror.len());

                if step % 512 == 0 {
                    for key in &mirror {
                        assert!(set.contains(key), "live key {key} lost at step {step}");
                    }
                }
            }

            assert_eq!(set.len(), mirror.len());
            for key in 0..600u64 {
                assert_eq!(set.contains(&key), mirror.contains(&key), "key {key}");
            }
            assert_eq!(set.iter().count(), set.len());
        }
    };
}

churn_test!(test_churn_pow2_quadratic, SparseSet<u64>);
churn_test!(
    test_churn_pow2_linear,
    SparseSet<u64, RandomState, Global, PowerOfTwoGrowth, LinearProbing>
);
churn_test!(
    test_churn_prime_linear,
    SparseSet<u64, RandomState, Global, PrimeGrowth, LinearProbing>
);
churn_test!(
    test_churn_mod_linear,
    SparseSet<u64, RandomState, Global, ModGrowth, LinearProbing>
);
churn_test!(
    test_churn_medium_sparsity,
    SparseSet<u64, RandomState, Global, PowerOfTwoGrowth, QuadraticProbing, MediumSparsity>
);
churn_test!(
    test_churn_low_sparsity,
    SparseSet<u64, RandomState, Global, PowerOfTwoGrowth, QuadraticProbing, LowSparsity>
);

// Hashes a u64 key to itself so bucket placement is fully deterministic.
#[derive(Default, Clone)]
struct IdentityHasher {
    value: u64,
}

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.value
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut buf = [0u8; 8];
        let take = bytes.len().min(8);
        buf[..take].copy_from_slice(&bytes[..take]);
        self.value = u64::from_le_bytes(buf);
    }
}

#[derive(Default, Clone)]
struct IdentityBuild;

impl BuildHasher for IdentityBuild {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher::default()
    }
}

type PinnedSet = SparseSet<u64, IdentityBuild, Global, PowerOfTwoGrowth, LinearProbing>;

#[test]
fn test_fully_dense_group_across_width_boundary() {
    // Identity hashing pins key k to bucket k, so 0..64 fills group 0 of a
    // 128-bucket table completely and 64/65 land at the start of group 1.
    let mut set = PinnedSet::with_capacity_and_hasher(64, IdentityBuild);
    assert_eq!(set.bucket_count(), 128);
    for key in 0..66u64 {
        assert!(set.insert(key).unwrap());
    }
    for key in 0..66u64 {
        assert!(set.contains(&key));
    }

    // Erase and re-insert across the group boundary.
    for key in [0u64, 31, 32, 63, 64, 65] {
        assert!(set.remove(&key));
    }
    assert_eq!(set.len(), 60);
    for key in [0u64, 31, 32, 63, 64, 65] {
        assert!(!set.contains(&key));
        assert!(set.insert(key).unwrap());
    }
    for key in 0..66u64 {
        assert!(set.contains(&key));
    }
}

#[test]
fn test_collision_chain_survives_middle_erasure() {
    let mut set = PinnedSet::with_capacity_and_hasher(8, IdentityBuild);
    let buckets = set.bucket_count() as u64;

    // Three keys pinned to the same bucket probe linearly into a chain.
    let colliding = [5u64, 5 + buckets, 5 + 2 * buckets];
    for key in colliding {
        assert!(set.insert(key).unwrap());
    }
    // Erasing the middle of the chain must not hide the tail.
    assert!(set.remove(&colliding[1]));
    assert!(set.contains(&colliding[0]));
    assert!(set.contains(&colliding[2]));

    // The deleted slot is reused rather than extending the chain.
    assert!(set.insert(colliding[1]).unwrap());
    for key in colliding {
        assert!(set.contains(&key));
    }
}

#[test]
fn test_threshold_boundary_triggers_exactly_one_rehash() {
    let mut set: SparseSet<u64> = SparseSet::new();
    set.reserve(8).unwrap();
    assert_eq!(set.bucket_count(), 16);

    // Default max load factor 0.5: sixteen buckets admit exactly eight
    // values without growing.
    for key in 0..8u64 {
        set.insert(key).unwrap();
        assert_eq!(set.bucket_count(), 16);
    }
    set.insert(8).unwrap();
    assert_eq!(set.bucket_count(), 32);
    assert_eq!(set.len(), 9);
}

#[test]
fn test_load_factor_one_fills_every_bucket() {
    let mut set: SparseSet<u64> = SparseSet::new();
    set.set_max_load_factor(1.0);
    set.reserve(64).unwrap();
    assert_eq!(set.bucket_count(), 64);

    for key in 0..64u64 {
        set.insert(key).unwrap();
    }
    assert_eq!(set.bucket_count(), 64);
    assert_eq!(set.len(), 64);
    assert!((set.load_factor() - 1.0).abs() < f32::EPSILON);

    // Probing a completely full table for an absent key must terminate.
    assert!(!set.contains(&1000));
    for key in 0..64u64 {
        assert!(set.contains(&key));
    }
}

#[test]
fn test_heavy_tombstone_churn_stays_bounded() {
    let mut set: SparseSet<u64> = SparseSet::new();
    for round in 0..10_000u64 {
        let key = round % 8;
        set.insert(key).unwrap();
        assert!(set.remove(&key));
    }
    assert!(set.is_empty());
    // Deleted markers are purged on rebuild, so the table never grows past
    // a handful of buckets for an 8-key working set.
    assert!(set.bucket_count() <= 64, "bucket count {}", set.bucket_count());
}

#[test]
fn test_mod_growth_custom_factor() {
    let mut set: SparseSet<u64, RandomState, Global, ModGrowth, LinearProbing> =
        SparseSet::with_growth_policy_in(0, RandomState::new(), ModGrowth::new(2, 1), Global);
    for key in 0..300u64 {
        assert!(set.insert(key).unwrap());
    }
    assert_eq!(set.len(), 300);
    for key in 0..300u64 {
        assert!(set.contains(&key));
    }
    assert!(!set.contains(&300));
}

#[test]
fn test_rehash_and_shrink_to_fit() {
    let mut set: SparseSet<u64> = SparseSet::new();
    for key in 0..1000u64 {
        set.insert(key).unwrap();
    }
    for key in 100..1000u64 {
        set.remove(&key);
    }
    let before = set.bucket_count();
    set.shrink_to_fit().unwrap();
    assert!(set.bucket_count() < before);
    assert_eq!(set.len(), 100);
    for key in 0..100u64 {
        assert!(set.contains(&key));
    }

    // An explicit rehash to a larger bucket count keeps everything findable.
    set.rehash(4096).unwrap();
    assert!(set.bucket_count() >= 4096);
    for key in 0..100u64 {
        assert!(set.contains(&key));
    }
}

#[test]
fn test_reserve_prevents_rehash() {
    let mut set: SparseSet<u64> = SparseSet::new();
    set.reserve(1000).unwrap();
    let buckets = set.bucket_count();
    for key in 0..1000u64 {
        set.insert(key).unwrap();
    }
    assert_eq!(set.bucket_count(), buckets);
}

#[test]
fn test_empty_table_behaviors() {
    let set: SparseSet<u64> = SparseSet::new();
    assert_eq!(set.len(), 0);
    assert_eq!(set.bucket_count(), 0);
    assert!(!set.contains(&0));
    assert_eq!(set.iter().next(), None);
    assert_eq!(set.load_factor(), 0.0);
}
