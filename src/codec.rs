//! Versioned byte-stream serialization of table state.
//!
//! Fixed-width integers are little-endian regardless of host; values go
//! through a caller-supplied [`ValueCodec`]. The layout is:
//!
//! ```text
//! magic    u32   "SPHT"
//! version  u32   1
//! hash_id  u64   caller-chosen hash/equality fingerprint (0 if unused)
//! policy   u8    0 = power-of-two, 1 = prime, 2 = mod (+ num/den as u32s)
//! N        u64   logical bucket count
//! W        u8    group width
//! G        u64   group count = ceil(N / W)
//! max_lf   f32
//! size     u64
//! per group:
//!   present bitmap   ceil(W / 8) bytes
//!   deleted bitmap   ceil(W / 8) bytes
//!   one encoded value per set present bit, in slot order
//! ```
//!
//! The deleted bitmap is part of the format because fast-mode loading
//! restores the probe topology verbatim: a live key whose probe sequence
//! crosses an erased bucket stays reachable only if the erasure mark
//! survives the round trip.

use std::hash::{BuildHasher, Hash};
use std::io::{Read, Write};

use allocator_api2::alloc::Allocator;

use crate::bits::BitBlock;
use crate::error::Error;
use crate::growth::{GrowthPolicy, Probing};
use crate::sparse::Sparsity;
use crate::table::{ClearOnDrop, Groups, KeySelect, SparseHash};

pub(crate) const MAGIC: u32 = u32::from_le_bytes(*b"SPHT");
pub(crate) const VERSION: u32 = 1;

// ================================================================================================
// VALUE CODEC
// ================================================================================================

/// Encodes and decodes stored values for [de]serialization.
///
/// The table never interprets value bytes itself; implement this for the
/// stored type (for a map, the `(key, value)` pair) and keep the two
/// directions in sync. Errors from a codec surface as
/// [`Error::ValueCodec`] or any `Error` the codec returns directly.
pub trait ValueCodec<T> {
    /// Write one value to the stream.
    fn encode<W: Write>(&mut self, value: &T, writer: &mut W) -> Result<(), Error>;

    /// Read one value back. Must consume exactly what `encode` wrote.
    fn decode<R: Read>(&mut self, reader: &mut R) -> Result<T, Error>;
}

// ================================================================================================
// PRIMITIVE READERS AND WRITERS
// ================================================================================================

#[inline]
fn map_read_err(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::CorruptStream("truncated stream")
    } else {
        Error::Io(err)
    }
}

pub(crate) fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), Error> {
    writer.write_all(&[value]).map_err(Error::Io)
}

pub(crate) fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes()).map_err(Error::Io)
}

pub(crate) fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes()).map_err(Error::Io)
}

pub(crate) fn write_f32<W: Write>(writer: &mut W, value: f32) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes()).map_err(Error::Io)
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> Result<u8, Error> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).map_err(map_read_err)?;
    Ok(buf[0])
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(map_read_err)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64, Error> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(map_read_err)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f32<R: Read>(reader: &mut R) -> Result<f32, Error> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(map_read_err)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_bitmap<B: BitBlock, W: Write>(writer: &mut W, bitmap: B) -> Result<(), Error> {
    let bytes = bitmap.to_u128().to_le_bytes();
    writer.write_all(&bytes[..B::BYTES]).map_err(Error::Io)
}

fn read_bitmap<B: BitBlock, R: Read>(reader: &mut R) -> Result<B, Error> {
    let mut bytes = [0u8; 16];
    reader
        .read_exact(&mut bytes[..B::BYTES])
        .map_err(map_read_err)?;
    Ok(B::from_u128(u128::from_le_bytes(bytes)))
}

/// Bitmap of a width known only from the stream header (safe-mode loading,
/// where the writer's sparsity may differ from the loader's).
fn read_bitmap_dyn<R: Read>(reader: &mut R, bytes: usize) -> Result<u128, Error> {
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf[..bytes]).map_err(map_read_err)?;
    Ok(u128::from_le_bytes(buf))
}

fn usize_from(value: u64, what: &'static str) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| Error::CorruptStream(what))
}

/// Everything read before the group payload.
struct Header {
    hash_id: u64,
    policy_code: u8,
    policy_params: Option<(u32, u32)>,
    bucket_count: usize,
    width: u8,
    group_count: usize,
    max_load_factor: f32,
    size: usize,
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, Error> {
    if read_u32(reader)? != MAGIC {
        return Err(Error::CorruptStream("bad magic"));
    }
    if read_u32(reader)? != VERSION {
        return Err(Error::CorruptStream("unsupported version"));
    }
    let hash_id = read_u64(reader)?;
    let policy_code = read_u8(reader)?;
    let policy_params = match policy_code {
        0 | 1 => None,
        2 => Some((read_u32(reader)?, read_u32(reader)?)),
        _ => return Err(Error::CorruptStream("unknown growth policy code")),
    };
    let bucket_count = usize_from(read_u64(reader)?, "bucket count out of range")?;
    let width = read_u8(reader)?;
    let group_count = usize_from(read_u64(reader)?, "group count out of range")?;
    let max_load_factor = read_f32(reader)?;
    let size = usize_from(read_u64(reader)?, "size out of range")?;

    if !matches!(width, 32 | 64 | 128) {
        return Err(Error::CorruptStream("unsupported group width"));
    }
    if group_count != bucket_count.div_ceil(width as usize) {
        return Err(Error::CorruptStream("group count inconsistent with bucket count"));
    }
    if !(max_load_factor > 0.0 && max_load_factor <= 1.0) {
        return Err(Error::CorruptStream("load factor out of range"));
    }
    if size > (bucket_count as f64 * max_load_factor as f64) as usize {
        return Err(Error::CorruptStream("size exceeds load threshold"));
    }
    Ok(Header {
        hash_id,
        policy_code,
        policy_params,
        bucket_count,
        width,
        group_count,
        max_load_factor,
        size,
    })
}

// ================================================================================================
// TABLE SERIALIZATION
// ================================================================================================

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
    pub(crate) fn serialize_into<C, W>(
        &self,
        codec: &mut C,
        writer: &mut W,
        hash_id: u64,
    ) -> Result<(), Error>
    where
        C: ValueCodec<T>,
        W: Write,
    {
        let width = <SP::Block as BitBlock>::BITS;
        write_u32(writer, MAGIC)?;
        write_u32(writer, VERSION)?;
        write_u64(writer, hash_id)?;
        write_u8(writer, G::POLICY_ID)?;
        if let Some((num, den)) = self.growth_policy().params() {
            write_u32(writer, num)?;
            write_u32(writer, den)?;
        }
        write_u64(writer, self.bucket_count() as u64)?;
        write_u8(writer, width as u8)?;
        write_u64(writer, self.groups().len() as u64)?;
        write_f32(writer, self.max_load_factor())?;
        write_u64(writer, self.len() as u64)?;

        for group in self.groups() {
            write_bitmap::<SP::Block, W>(writer, group.present_bits())?;
            write_bitmap::<SP::Block, W>(writer, group.deleted_bits())?;
            let mut cursor = 0u32;
            while let Some(slot) = group.present_bits().next_set(cursor) {
                cursor = slot + 1;
                codec.encode(group.value(slot), writer)?;
            }
        }
        Ok(())
    }

    /// Rebuild a table from a stream written by [`Self::serialize_into`].
    ///
    /// With `hash_compatible` the stored layout is trusted and restored
    /// verbatim (the writer must have used the same hasher, growth policy
    /// and sparsity). Without it, every value is decoded and re-inserted
    /// through `build_hasher` and the current policy, which stays correct
    /// across hash functions at the cost of a full rebuild.
    pub(crate) fn deserialize_from<C, R>(
        codec: &mut C,
        reader: &mut R,
        hash_compatible: bool,
        expected_hash_id: Option<u64>,
        build_hasher: S,
        alloc: A,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<T>,
        R: Read,
    {
        let header = read_header(reader)?;
        if hash_compatible {
            if header.policy_code != G::POLICY_ID {
                return Err(Error::IncompatibleSchema("growth policy mismatch"));
            }
            if header.width as u32 != <SP::Block as BitBlock>::BITS {
                return Err(Error::IncompatibleSchema("group width mismatch"));
            }
            if let Some(expected) = expected_hash_id {
                if header.hash_id != expected {
                    return Err(Error::IncompatibleSchema("hash fingerprint mismatch"));
                }
            }
            Self::deserialize_fast(codec, reader, header, build_hasher, alloc)
        } else {
            Self::deserialize_safe(codec, reader, header, build_hasher, alloc)
        }
    }

    /// Trust the stored layout: restore every group bit-for-bit with
    /// exact-fit buffers and skip rehashing.
    fn deserialize_fast<C, R>(
        codec: &mut C,
        reader: &mut R,
        header: Header,
        build_hasher: S,
        alloc: A,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<T>,
        R: Read,
    {
        let prototype = G::from_params(header.policy_params)?;
        let (policy, rounded) = prototype.for_bucket_count(header.bucket_count)?;
        if rounded != header.bucket_count {
            return Err(Error::CorruptStream("bucket count not valid for policy"));
        }

        let mut groups: Groups<T, SP::Block> = Groups::new_in(&alloc, header.group_count)?;
        let mut live = 0usize;
        let mut deleted = 0usize;
        {
            let guard = ClearOnDrop {
                groups: &mut groups,
                alloc: &alloc,
            };
            for index in 0..header.group_count {
                let present: SP::Block = read_bitmap(reader)?;
                let deleted_bits: SP::Block = read_bitmap(reader)?;
                if present & deleted_bits != SP::Block::EMPTY {
                    return Err(Error::CorruptStream("overlapping group bitmaps"));
                }
                let group = &mut guard.groups.as_mut_slice()[index];
                group.reserve_exact(&alloc, present.count_ones() as usize)?;
                let mut cursor = 0u32;
                while let Some(slot) = present.next_set(cursor) {
                    cursor = slot + 1;
                    // Ascending slot order appends at the end of the packed
                    // buffer, so the restore is linear.
                    group.insert_at(slot, codec.decode(reader)?);
                }
                group.restore_deleted(deleted_bits);
                live += present.count_ones() as usize;
                deleted += deleted_bits.count_ones() as usize;
            }
            if live != header.size {
                return Err(Error::CorruptStream("bitmap population disagrees with size"));
            }
            std::mem::forget(guard);
        }

        Ok(Self::assemble(
            groups,
            header.bucket_count,
            header.size,
            deleted,
            header.max_load_factor,
            policy,
            build_hasher,
            alloc,
        ))
    }

    /// Decode every value and insert it into a fresh table under the
    /// loader's own hasher and policy.
    fn deserialize_safe<C, R>(
        codec: &mut C,
        reader: &mut R,
        header: Header,
        build_hasher: S,
        alloc: A,
    ) -> Result<Self, Error>
    where
        C: ValueCodec<T>,
        R: Read,
    {
        let prototype = if header.policy_code == G::POLICY_ID {
            G::from_params(header.policy_params)?
        } else {
            G::default()
        };
        let mut table = Self::new_in(build_hasher, alloc, prototype);
        table.set_max_load_factor(header.max_load_factor);
        table.reserve(header.size)?;

        let width_bytes = header.width as usize / 8;
        for _ in 0..header.group_count {
            let present = read_bitmap_dyn(reader, width_bytes)?;
            let deleted_bits = read_bitmap_dyn(reader, width_bytes)?;
            if present & deleted_bits != 0 {
                return Err(Error::CorruptStream("overlapping group bitmaps"));
            }
            for _ in 0..present.count_ones() {
                table.insert(codec.decode(reader)?)?;
            }
        }
        if table.len() != header.size {
            return Err(Error::CorruptStream("decoded entry count disagrees with size"));
        }
        Ok(table)
    }
}
