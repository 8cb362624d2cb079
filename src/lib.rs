//! Sparse-array-backed hash map and set, tuned for low memory overhead on
//! sparsely populated tables.
//!
//! The logical bucket array of an open-addressed table is split into
//! fixed-width groups; each group stores an occupancy bitmap plus a packed
//! value buffer sized to its actual population, so an empty bucket costs
//! about one bit instead of a full slot. Lookup remains O(1) amortized.
//!
//! [`SparseMap`] and [`SparseSet`] are the two facades. Hashing, allocation,
//! growth policy, probing and group width are all type parameters with
//! sensible defaults; see the type docs for the knobs.

mod bits;
mod error;
mod growth;
mod sparse;
mod table;

pub mod codec;
pub mod map;
pub mod set;

pub use bits::BitBlock;
pub use codec::ValueCodec;
pub use error::Error;
pub use growth::{
    GrowthPolicy, LinearProbing, ModGrowth, PowerOfTwoGrowth, PrimeGrowth, Probing,
    QuadraticProbing,
};
pub use map::SparseMap;
pub use set::SparseSet;
pub use sparse::{HighSparsity, LowSparsity, MediumSparsity, Sparsity};

// Custom allocators implement `allocator_api2::alloc::Allocator`; re-export
// the crate so callers need not depend on it directly.
pub use allocator_api2;
