//! Fixed, versioned, little-endian wire types for collective exchanges.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::map_error::BlockMapError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Encode a record slice into an owned byte buffer.
pub fn encode_records<T: Pod>(records: &[T]) -> Vec<u8> {
    cast_slice(records).to_vec()
}

/// Decode a buffer received from `neighbor` into records.
///
/// Received buffers carry no alignment guarantee, so every record is read unaligned.
pub fn decode_records<T: Pod>(bytes: &[u8], neighbor: usize) -> Result<Vec<T>, BlockMapError> {
    let rec = size_of::<T>();
    if bytes.len() % rec != 0 {
        return Err(BlockMapError::BufferSizeMismatch {
            neighbor,
            expected: bytes.len() / rec * rec,
            got: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(rec)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // byte length of the following payload
}
impl WireCount {
    /// Length header for a payload bound for `neighbor`; fails past `u32::MAX` bytes.
    pub fn try_new(n: usize, neighbor: usize) -> Result<Self, BlockMapError> {
        let n = u32::try_from(n).map_err(|_| BlockMapError::BufferSizeMismatch {
            neighbor,
            expected: u32::MAX as usize,
            got: n,
        })?;
        Ok(Self { n_le: n.to_le() })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A single signed value, used by the scalar reductions.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireI64 {
    pub v_le: i64,
}
impl WireI64 {
    pub fn of(v: i64) -> Self {
        Self { v_le: v.to_le() }
    }
    pub fn get(&self) -> i64 {
        i64::from_le(self.v_le)
    }
}

// ===== Construction ========================================================

/// Bit set in [`WireRankSummary::flags_le`] when the rank owns at least one element.
pub const SUMMARY_NONEMPTY: u32 = 1;
/// Bit set when the rank's GIDs are ascending and consecutive.
pub const SUMMARY_CONTIGUOUS: u32 = 1 << 1;
/// Bit set when the rank's construction arguments passed local validation.
pub const SUMMARY_VALID: u32 = 1 << 2;
/// Bit set when every element of the rank has the same size, carried in both size fields.
pub const SUMMARY_CONSTANT: u32 = 1 << 3;

/// Per-rank description gathered once while constructing an arbitrary map.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireRankSummary {
    pub version_le: u16,
    pub _pad0: u16,
    pub flags_le: u32,
    pub num_elements_le: u64,
    pub num_points_le: u64,
    pub min_gid_le: i64,
    pub max_gid_le: i64,
    pub min_size_le: u64,
    pub max_size_le: u64,
}
impl WireRankSummary {
    pub const SIZE: usize = 56;

    pub fn new(
        flags: u32,
        num_elements: usize,
        num_points: usize,
        gids: (i64, i64),
        sizes: (usize, usize),
    ) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            _pad0: 0,
            flags_le: flags.to_le(),
            num_elements_le: (num_elements as u64).to_le(),
            num_points_le: (num_points as u64).to_le(),
            min_gid_le: gids.0.to_le(),
            max_gid_le: gids.1.to_le(),
            min_size_le: (sizes.0 as u64).to_le(),
            max_size_le: (sizes.1 as u64).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn has(&self, flag: u32) -> bool {
        u32::from_le(self.flags_le) & flag != 0
    }
    pub fn num_elements(&self) -> usize {
        u64::from_le(self.num_elements_le) as usize
    }
    pub fn num_points(&self) -> usize {
        u64::from_le(self.num_points_le) as usize
    }
    pub fn gid_range(&self) -> (i64, i64) {
        (i64::from_le(self.min_gid_le), i64::from_le(self.max_gid_le))
    }
    pub fn size_range(&self) -> (usize, usize) {
        (
            u64::from_le(self.min_size_le) as usize,
            u64::from_le(self.max_size_le) as usize,
        )
    }
}

// ===== Directory ===========================================================

/// Registration of one owned element with its directory rank; the owner is the sender.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireDirEntry {
    pub gid_le: i64,
    pub lid_le: u64,
    pub size_le: u64,
}
impl WireDirEntry {
    pub fn new(gid: i64, lid: usize, size: usize) -> Self {
        Self {
            gid_le: gid.to_le(),
            lid_le: (lid as u64).to_le(),
            size_le: (size as u64).to_le(),
        }
    }
    pub fn gid(&self) -> i64 {
        i64::from_le(self.gid_le)
    }
    pub fn lid(&self) -> usize {
        u64::from_le(self.lid_le) as usize
    }
    pub fn size(&self) -> usize {
        u64::from_le(self.size_le) as usize
    }
}

/// Answer to one directory query. Unknown GIDs are encoded as owner `-1`, LID `-1`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireReply {
    pub owner_le: i64,
    pub lid_le: i64,
    pub size_le: i64,
}
impl WireReply {
    pub const NOT_FOUND: i64 = -1;

    pub fn found(owner: usize, lid: usize, size: usize) -> Self {
        Self {
            owner_le: (owner as i64).to_le(),
            lid_le: (lid as i64).to_le(),
            size_le: (size as i64).to_le(),
        }
    }
    pub fn missing() -> Self {
        Self {
            owner_le: Self::NOT_FOUND.to_le(),
            lid_le: Self::NOT_FOUND.to_le(),
            size_le: 0,
        }
    }
    /// `(owner, lid, size)`, or `None` for an unknown GID.
    pub fn decode(&self) -> Option<(usize, usize, usize)> {
        let owner = i64::from_le(self.owner_le);
        let lid = i64::from_le(self.lid_le);
        if owner < 0 || lid < 0 {
            return None;
        }
        Some((owner as usize, lid as usize, i64::from_le(self.size_le) as usize))
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireI64>(), 8);
const_assert_eq!(size_of::<WireRankSummary>(), WireRankSummary::SIZE);
const_assert_eq!(size_of::<WireDirEntry>(), 24);
const_assert_eq!(size_of::<WireReply>(), 24);
