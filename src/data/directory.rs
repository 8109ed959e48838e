//! Distributed GID directory.
//!
//! Answers "which rank owns GID `g`, at which local index, with which size"
//! without any rank holding the whole global table. The GID range
//! `[min_all, max_all]` is cut into one contiguous slice per rank with
//! [`LinearSplit`]; every owner registers its elements with the rank whose
//! slice contains them, and queries are routed the same way.
//!
//! Both [`Directory::build`] and [`Directory::lookup`] are collective.

use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::algs::collective::CollectiveExt;
use crate::algs::communicator::{CollectiveTags, Communicator};
use crate::algs::wire::{WireDirEntry, WireI64, WireReply, decode_records, encode_records};
use crate::data::partition::LocalPartition;
use crate::map_error::BlockMapError;

/// Where a global element lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Owning rank.
    pub owner: usize,
    /// Local index on the owning rank.
    pub lid: usize,
    /// Element size (points).
    pub size: usize,
}

/// How GIDs owned by more than one rank are resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// The lowest owning rank answers lookups; a warning is logged.
    #[default]
    LowestRank,
    /// Building the directory fails with [`BlockMapError::MultipleOwners`] on every rank.
    Reject,
}

/// `len` consecutive indices starting at `first`, cut into `parts` nearly equal
/// contiguous slices; the first `len % parts` slices get one extra index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinearSplit {
    first: i64,
    len: u64,
    parts: usize,
}

impl LinearSplit {
    pub fn new(first: i64, len: u64, parts: usize) -> Self {
        Self {
            first,
            len,
            parts: parts.max(1),
        }
    }

    /// Split covering `[lo, hi]`.
    pub fn covering(lo: i64, hi: i64, parts: usize) -> Self {
        let len = (hi as i128 - lo as i128 + 1).max(0) as u64;
        Self::new(lo, len, parts)
    }

    fn base(&self) -> u64 {
        self.len / self.parts as u64
    }

    fn extra(&self) -> u64 {
        self.len % self.parts as u64
    }

    /// Offset (from `first`) of slice `k`, for `k` in `0..=parts`.
    pub fn offset_of(&self, k: usize) -> u64 {
        let k = k.min(self.parts) as u64;
        k * self.base() + k.min(self.extra())
    }

    /// First index of slice `k`; `part_start(parts)` is one past the end.
    pub fn part_start(&self, k: usize) -> i64 {
        (self.first as i128 + self.offset_of(k) as i128) as i64
    }

    pub fn part_len(&self, k: usize) -> u64 {
        self.offset_of(k + 1) - self.offset_of(k)
    }

    /// Slice containing `index`, or `None` outside the covered range.
    pub fn part_of(&self, index: i64) -> Option<usize> {
        let off = index as i128 - self.first as i128;
        if off < 0 || off >= self.len as i128 {
            return None;
        }
        let off = off as u64;
        let (base, extra) = (self.base(), self.extra());
        let boundary = extra * (base + 1);
        let part = if off < boundary {
            off / (base + 1)
        } else {
            extra + (off - boundary) / base
        };
        Some(part as usize)
    }
}

/// Owner and local index of `gid` in a linear map whose rank `r` owns
/// `[starts[r], starts[r + 1])`.
pub fn linear_lookup(starts: &[i64], gid: i64) -> Option<(usize, usize)> {
    let (&first, &end) = (starts.first()?, starts.last()?);
    if gid < first || gid >= end {
        return None;
    }
    // last rank whose range starts at or before gid; skips empty ranks
    let owner = starts.partition_point(|&s| s <= gid) - 1;
    Some((owner, (gid - starts[owner]) as usize))
}

/// This rank's slice of the distributed directory.
#[derive(Clone, Debug)]
pub struct Directory {
    split: Option<LinearSplit>,
    entries: HashMap<i64, RemoteEntry>,
    one_to_one: bool,
}

impl Directory {
    /// Register every owned element with its directory rank.
    ///
    /// `gid_range` is the global `(min, max)` GID, `None` for an empty map.
    pub fn build<C>(
        comm: &C,
        tags: CollectiveTags,
        partition: &LocalPartition,
        gid_range: Option<(i64, i64)>,
        policy: DuplicatePolicy,
    ) -> Result<Self, BlockMapError>
    where
        C: Communicator + ?Sized,
    {
        let Some((lo, hi)) = gid_range else {
            return Ok(Self {
                split: None,
                entries: HashMap::new(),
                one_to_one: true,
            });
        };
        let size = comm.size();
        let split = LinearSplit::covering(lo, hi, size);

        let mut outgoing: Vec<Vec<WireDirEntry>> = vec![Vec::new(); size];
        for (lid, &gid) in partition.gids().iter().enumerate() {
            let dest = split.part_of(gid).ok_or_else(|| {
                BlockMapError::InvariantViolation(format!(
                    "gid {gid} outside the global range [{lo}, {hi}]"
                ))
            })?;
            let elem_size = partition.element_size(lid).unwrap_or(0);
            outgoing[dest].push(WireDirEntry::new(gid, lid, elem_size));
        }
        let sends: Vec<Vec<u8>> = outgoing.iter().map(|v| encode_records(v)).collect();
        let received = comm.alltoallv(tags, &sends)?;

        let mut entries = HashMap::new();
        let mut shared = HashSet::new();
        // sources arrive in rank order, so the first registration is the lowest owner
        for (src, bytes) in received.iter().enumerate() {
            for rec in decode_records::<WireDirEntry>(bytes, src)? {
                let entry = RemoteEntry {
                    owner: src,
                    lid: rec.lid(),
                    size: rec.size(),
                };
                match entries.entry(rec.gid()) {
                    Entry::Vacant(slot) => {
                        slot.insert(entry);
                    }
                    Entry::Occupied(_) => {
                        shared.insert(rec.gid());
                    }
                }
            }
        }

        let total_shared = comm.sum_all(tags, shared.len() as i64)?;
        if total_shared > 0 {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(BlockMapError::MultipleOwners {
                        count: total_shared as usize,
                    });
                }
                DuplicatePolicy::LowestRank => {
                    if comm.rank() == 0 {
                        log::warn!(
                            "{total_shared} global ID(s) have several owners; the lowest rank answers lookups"
                        );
                    }
                }
            }
        }
        log::debug!(
            "rank {}: directory holds {} of GIDs [{lo}, {hi}]",
            comm.rank(),
            entries.len()
        );
        Ok(Self {
            split: Some(split),
            entries,
            one_to_one: total_shared == 0,
        })
    }

    /// Whether every GID has exactly one owner.
    pub fn is_one_to_one(&self) -> bool {
        self.one_to_one
    }

    /// Number of GIDs this rank answers for.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `gids` against the directory. Collective: every rank must call
    /// it, possibly with an empty list.
    pub fn lookup<C>(
        &self,
        comm: &C,
        tags: CollectiveTags,
        gids: &[i64],
    ) -> Result<Vec<Option<RemoteEntry>>, BlockMapError>
    where
        C: Communicator + ?Sized,
    {
        let size = comm.size();
        let mut out = vec![None; gids.len()];
        let mut queries: Vec<Vec<WireI64>> = vec![Vec::new(); size];
        let mut positions: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (pos, &gid) in gids.iter().enumerate() {
            if let Some(dest) = self.split.and_then(|s| s.part_of(gid)) {
                queries[dest].push(WireI64::of(gid));
                positions[dest].push(pos);
            }
        }
        let sends: Vec<Vec<u8>> = queries.iter().map(|q| encode_records(q)).collect();
        let asked = comm.alltoallv(tags, &sends)?;

        let mut replies = Vec::with_capacity(size);
        for (src, bytes) in asked.iter().enumerate() {
            let answers: Vec<WireReply> = decode_records::<WireI64>(bytes, src)?
                .iter()
                .map(|q| match self.entries.get(&q.get()) {
                    Some(e) => WireReply::found(e.owner, e.lid, e.size),
                    None => WireReply::missing(),
                })
                .collect();
            replies.push(encode_records(&answers));
        }
        let answered = comm.alltoallv(tags, &replies)?;

        for (dest, bytes) in answered.iter().enumerate() {
            let recs = decode_records::<WireReply>(bytes, dest)?;
            if recs.len() != positions[dest].len() {
                return Err(BlockMapError::BufferSizeMismatch {
                    neighbor: dest,
                    expected: positions[dest].len() * std::mem::size_of::<WireReply>(),
                    got: bytes.len(),
                });
            }
            for (&pos, rec) in positions[dest].iter().zip(&recs) {
                out[pos] = rec
                    .decode()
                    .map(|(owner, lid, size)| RemoteEntry { owner, lid, size });
            }
        }
        Ok(out)
    }
}
