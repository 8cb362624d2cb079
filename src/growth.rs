//! Growth policies and probing strategies.
//!
//! A growth policy owns the mapping from a hash to a logical bucket index and
//! the choice of the next bucket count on rehash. Policies are value types
//! fixed at table construction; every hot-path operation on them is
//! branch-free for the chosen variant.

use crate::error::Error;

// ================================================================================================
// GROWTH POLICY TRAIT
// ================================================================================================

/// Maps hashes to bucket indices and drives the rehash schedule.
///
/// `bucket_for_hash` and `next_bucket_count` are pure: calling them never
/// changes the policy. A policy instance is bound to one bucket count;
/// [`GrowthPolicy::for_bucket_count`] produces the instance for a new count.
pub trait GrowthPolicy: Clone + Default {
    /// Code identifying the policy in the serialized stream.
    const POLICY_ID: u8;

    /// Round `min_bucket_count` up to the nearest count the policy supports
    /// and return the policy instance bound to it, keeping any runtime
    /// parameters (such as a growth factor) from `self`.
    ///
    /// A count of zero is always valid and describes an empty table; a
    /// policy bound to zero buckets is never consulted for indexing.
    fn for_bucket_count(&self, min_bucket_count: usize) -> Result<(Self, usize), Error>;

    /// Bucket index in `[0, bucket_count)` for a hash.
    fn bucket_for_hash(&self, hash: u64) -> usize;

    /// Reduce an advanced probe position back into `[0, bucket_count)`.
    fn wrap(&self, raw: usize) -> usize;

    /// Smallest supported bucket count strictly greater than `current`.
    fn next_bucket_count(&self, current: usize) -> Result<usize, Error>;

    /// Smallest nonzero bucket count the policy supports.
    fn min_bucket_count(&self) -> usize;

    /// Largest bucket count the policy supports.
    fn max_bucket_count(&self) -> usize;

    /// Runtime parameters persisted alongside the policy code, if any.
    fn params(&self) -> Option<(u32, u32)> {
        None
    }

    /// Rebuild a policy prototype from persisted parameters.
    fn from_params(params: Option<(u32, u32)>) -> Result<Self, Error> {
        let _ = params;
        Ok(Self::default())
    }
}

// ================================================================================================
// POWER-OF-TWO POLICY
// ================================================================================================

/// Keeps the bucket count a power of two and indexes with a mask.
///
/// The fastest policy, and the only one compatible with
/// [`QuadraticProbing`]. Hashes with weak low bits will cluster; pair it
/// with a real hasher.
#[derive(Clone, Copy, Debug, Default)]
pub struct PowerOfTwoGrowth {
    mask: usize,
}

impl GrowthPolicy for PowerOfTwoGrowth {
    const POLICY_ID: u8 = 0;

    fn for_bucket_count(&self, min_bucket_count: usize) -> Result<(Self, usize), Error> {
        if min_bucket_count == 0 {
            return Ok((Self { mask: 0 }, 0));
        }
        let count = min_bucket_count
            .checked_next_power_of_two()
            .filter(|&n| n <= self.max_bucket_count())
            .ok_or(Error::LengthExceeded {
                requested: min_bucket_count,
                max: self.max_bucket_count(),
            })?;
        Ok((Self { mask: count - 1 }, count))
    }

    #[inline(always)]
    fn bucket_for_hash(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    #[inline(always)]
    fn wrap(&self, raw: usize) -> usize {
        raw & self.mask
    }

    fn next_bucket_count(&self, current: usize) -> Result<usize, Error> {
        if current == 0 {
            return Ok(self.min_bucket_count());
        }
        current
            .checked_mul(2)
            .filter(|&n| n <= self.max_bucket_count())
            .ok_or(Error::LengthExceeded {
                requested: current,
                max: self.max_bucket_count(),
            })
    }

    fn min_bucket_count(&self) -> usize {
        2
    }

    fn max_bucket_count(&self) -> usize {
        1 << (usize::BITS - 1)
    }
}

// ================================================================================================
// PRIME POLICY
// ================================================================================================

/// Ascending bucket counts; must stay in sync with the dispatch in
/// `mod_prime` below.
static PRIMES: [usize; 40] = [
    1,
    5,
    17,
    29,
    37,
    53,
    67,
    79,
    97,
    131,
    193,
    257,
    389,
    521,
    769,
    1031,
    1543,
    2053,
    3079,
    6151,
    12289,
    24593,
    49157,
    98317,
    196613,
    393241,
    786433,
    1572869,
    3145739,
    6291469,
    12582917,
    25165843,
    50331653,
    100663319,
    201326611,
    402653189,
    805306457,
    1610612741,
    3221225473,
    4294967291,
];

/// Modulo by the prime at `index`, written as one branch per prime so the
/// compiler lowers each modulo by a constant into multiply/shift form.
#[inline]
fn mod_prime(index: usize, value: u64) -> usize {
    let m = match index {
        0 => 0,
        1 => value % 5,
        2 => value % 17,
        3 => value % 29,
        4 => value % 37,
        5 => value % 53,
        6 => value % 67,
        7 => value % 79,
        8 => value % 97,
        9 => value % 131,
        10 => value % 193,
        11 => value % 257,
        12 => value % 389,
        13 => value % 521,
        14 => value % 769,
        15 => value % 1031,
        16 => value % 1543,
        17 => value % 2053,
        18 => value % 3079,
        19 => value % 6151,
        20 => value % 12289,
        21 => value % 24593,
        22 => value % 49157,
        23 => value % 98317,
        24 => value % 196613,
        25 => value % 393241,
        26 => value % 786433,
        27 => value % 1572869,
        28 => value % 3145739,
        29 => value % 6291469,
        30 => value % 12582917,
        31 => value % 25165843,
        32 => value % 50331653,
        33 => value % 100663319,
        34 => value % 201326611,
        35 => value % 402653189,
        36 => value % 805306457,
        37 => value % 1610612741,
        38 => value % 3221225473,
        39 => value % 4294967291,
        _ => unreachable!("prime index out of range"),
    };
    m as usize
}

/// Draws bucket counts from a fixed prime table and indexes with a modulo.
///
/// The modulo spreads entropy from all hash bits across the buckets, which
/// tolerates weaker hash functions than masking does.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrimeGrowth {
    index: usize,
}

impl GrowthPolicy for PrimeGrowth {
    const POLICY_ID: u8 = 1;

    fn for_bucket_count(&self, min_bucket_count: usize) -> Result<(Self, usize), Error> {
        if min_bucket_count == 0 {
            return Ok((Self { index: 0 }, 0));
        }
        match PRIMES.iter().position(|&p| p >= min_bucket_count) {
            Some(index) => Ok((Self { index }, PRIMES[index])),
            None => Err(Error::LengthExceeded {
                requested: min_bucket_count,
                max: self.max_bucket_count(),
            }),
        }
    }

    #[inline(always)]
    fn bucket_for_hash(&self, hash: u64) -> usize {
        mod_prime(self.index, hash)
    }

    #[inline(always)]
    fn wrap(&self, raw: usize) -> usize {
        mod_prime(self.index, raw as u64)
    }

    fn next_bucket_count(&self, current: usize) -> Result<usize, Error> {
        if current == 0 {
            return Ok(self.min_bucket_count());
        }
        match PRIMES.iter().position(|&p| p > current) {
            Some(index) => Ok(PRIMES[index]),
            None => Err(Error::LengthExceeded {
                requested: current,
                max: self.max_bucket_count(),
            }),
        }
    }

    fn min_bucket_count(&self) -> usize {
        PRIMES[0]
    }

    fn max_bucket_count(&self) -> usize {
        PRIMES[PRIMES.len() - 1]
    }
}

// ================================================================================================
// MOD POLICY
// ================================================================================================

/// Grows the bucket count by a runtime multiplicative factor and indexes
/// with a runtime modulo.
///
/// The most flexible policy and the slowest: the divisor is not known at
/// compile time. The growth factor is `numerator / denominator` and must be
/// greater than one.
#[derive(Clone, Copy, Debug)]
pub struct ModGrowth {
    bucket_count: usize,
    numerator: u32,
    denominator: u32,
}

impl ModGrowth {
    /// Policy prototype with growth factor `numerator / denominator`.
    ///
    /// # Panics
    ///
    /// Panics if the factor is not greater than one.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        assert!(denominator > 0, "denominator must be nonzero");
        assert!(numerator > denominator, "growth factor must exceed one");
        Self {
            bucket_count: 0,
            numerator,
            denominator,
        }
    }
}

impl Default for ModGrowth {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl GrowthPolicy for ModGrowth {
    const POLICY_ID: u8 = 2;

    fn for_bucket_count(&self, min_bucket_count: usize) -> Result<(Self, usize), Error> {
        let mut policy = *self;
        policy.bucket_count = min_bucket_count;
        Ok((policy, min_bucket_count))
    }

    #[inline(always)]
    fn bucket_for_hash(&self, hash: u64) -> usize {
        debug_assert!(self.bucket_count > 0);
        (hash % self.bucket_count as u64) as usize
    }

    #[inline(always)]
    fn wrap(&self, raw: usize) -> usize {
        debug_assert!(self.bucket_count > 0);
        raw % self.bucket_count
    }

    fn next_bucket_count(&self, current: usize) -> Result<usize, Error> {
        let grown = (current as u128 * self.numerator as u128) / self.denominator as u128;
        let next = grown.max(current as u128 + 1);
        if next > self.max_bucket_count() as u128 {
            return Err(Error::LengthExceeded {
                requested: current,
                max: self.max_bucket_count(),
            });
        }
        Ok(next as usize)
    }

    fn min_bucket_count(&self) -> usize {
        1
    }

    fn max_bucket_count(&self) -> usize {
        usize::MAX
    }

    fn params(&self) -> Option<(u32, u32)> {
        Some((self.numerator, self.denominator))
    }

    fn from_params(params: Option<(u32, u32)>) -> Result<Self, Error> {
        match params {
            Some((num, den)) if den > 0 && num > den => Ok(Self::new(num, den)),
            _ => Err(Error::CorruptStream("invalid mod growth parameters")),
        }
    }
}

// ================================================================================================
// PROBING STRATEGIES
// ================================================================================================

/// Produces the stride between consecutive probe positions.
///
/// A fresh prober is created per lookup; `next_stride` is called once per
/// collision. The strategy is parameterized over the growth policy so that
/// combinations that cannot visit every bucket are rejected at compile
/// time: [`QuadraticProbing`] is only implemented for power-of-two bucket
/// counts.
pub trait Probing<G: GrowthPolicy>: Default {
    /// Distance from the current probe position to the next one.
    fn next_stride(&mut self) -> usize;
}

/// Visits `h, h+1, h+2, ...`; works with every growth policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearProbing;

impl<G: GrowthPolicy> Probing<G> for LinearProbing {
    #[inline(always)]
    fn next_stride(&mut self) -> usize {
        1
    }
}

/// Visits `h, h+1, h+3, h+6, ...` (triangular offsets). Visits every bucket
/// exactly once per cycle when the bucket count is a power of two, which is
/// why it is only available with [`PowerOfTwoGrowth`].
#[derive(Clone, Copy, Debug, Default)]
pub struct QuadraticProbing {
    step: usize,
}

impl Probing<PowerOfTwoGrowth> for QuadraticProbing {
    #[inline(always)]
    fn next_stride(&mut self) -> usize {
        self.step += 1;
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow2_rounds_up_and_doubles() {
        let proto = PowerOfTwoGrowth::default();
        let (_, n) = proto.for_bucket_count(0).unwrap();
        assert_eq!(n, 0);
        let (_, n) = proto.for_bucket_count(3).unwrap();
        assert_eq!(n, 4);
        let (p, n) = proto.for_bucket_count(64).unwrap();
        assert_eq!(n, 64);
        assert_eq!(p.next_bucket_count(64).unwrap(), 128);
        assert_eq!(p.next_bucket_count(0).unwrap(), 2);
    }

    #[test]
    fn pow2_indexes_with_mask() {
        let (p, n) = PowerOfTwoGrowth::default().for_bucket_count(16).unwrap();
        assert_eq!(n, 16);
        for h in [0u64, 1, 15, 16, 17, u64::MAX] {
            assert_eq!(p.bucket_for_hash(h), (h as usize) & 15);
        }
    }

    #[test]
    fn pow2_rejects_overflowing_counts() {
        let proto = PowerOfTwoGrowth::default();
        let too_big = (1usize << (usize::BITS - 1)) + 1;
        assert!(matches!(
            proto.for_bucket_count(too_big),
            Err(Error::LengthExceeded { .. })
        ));
    }

    #[test]
    fn prime_dispatch_matches_runtime_modulo() {
        for (index, &prime) in PRIMES.iter().enumerate() {
            for value in [0u64, 1, 12345, 0xdead_beef_cafe, u64::MAX] {
                assert_eq!(
                    mod_prime(index, value),
                    (value % prime as u64) as usize,
                    "index {index} prime {prime}"
                );
            }
        }
    }

    #[test]
    fn prime_rounds_to_table_entries() {
        let proto = PrimeGrowth::default();
        let (p, n) = proto.for_bucket_count(100).unwrap();
        assert_eq!(n, 131);
        assert_eq!(p.next_bucket_count(131).unwrap(), 193);
        let (_, n) = proto.for_bucket_count(1).unwrap();
        assert_eq!(n, 1);
        assert!(matches!(
            proto.for_bucket_count(usize::MAX),
            Err(Error::LengthExceeded { .. })
        ));
    }

    #[test]
    fn mod_growth_applies_factor() {
        let proto = ModGrowth::new(3, 2);
        let (p, n) = proto.for_bucket_count(10).unwrap();
        assert_eq!(n, 10);
        assert_eq!(p.next_bucket_count(10).unwrap(), 15);
        // Integer truncation must still make progress on tiny counts.
        assert_eq!(p.next_bucket_count(1).unwrap(), 2);
        assert_eq!(p.next_bucket_count(0).unwrap(), 1);
        assert_eq!(p.bucket_for_hash(102), 2);
    }

    #[test]
    fn quadratic_probing_covers_power_of_two_range() {
        let (policy, n) = PowerOfTwoGrowth::default().for_bucket_count(16).unwrap();
        let mut seen = vec![false; n];
        let mut probe = QuadraticProbing::default();
        let mut bucket = policy.bucket_for_hash(7);
        for _ in 0..n {
            seen[bucket] = true;
            bucket = policy.wrap(bucket.wrapping_add(Probing::<PowerOfTwoGrowth>::next_stride(
                &mut probe,
            )));
        }
        assert!(seen.iter().all(|&v| v), "quadratic probe missed a bucket");
    }

    #[test]
    fn linear_probing_strides_by_one() {
        let mut probe = LinearProbing;
        for _ in 0..4 {
            assert_eq!(Probing::<ModGrowth>::next_stride(&mut probe), 1);
        }
    }
}
