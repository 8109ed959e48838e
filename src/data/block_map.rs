//! # BlockMap: distributed map of variable-size blocks
//!
//! A [`BlockMap`] partitions a global index space of *elements* across the
//! ranks of a [`Communicator`]. Every element has a global ID (GID), a local
//! index (LID) on its owning rank, and a size measured in *points*.
//!
//! Four construction modes are available:
//!
//! | constructor | GIDs | element sizes |
//! |---|---|---|
//! | [`BlockMap::uniform`] | contiguous, balanced in rank order | one constant |
//! | [`BlockMap::with_local_count`] | contiguous, caller-chosen counts | one constant |
//! | [`BlockMap::arbitrary`] | caller-supplied, any order | one constant |
//! | [`BlockMap::arbitrary_variable`] | caller-supplied, any order | one per element |
//!
//! Maps are immutable after construction. Queries about owned elements are
//! local; global extrema and counts are reduced once during construction and
//! cached. Remote ownership queries ([`BlockMap::remote_id_list`]) use closed
//! form arithmetic for linear constant-size maps and otherwise a distributed
//! directory built on first use.
//!
//! Methods documented as *collective* must be called by every rank, in the
//! same order.

use std::fmt;
use std::io;

use itertools::Itertools;
use once_cell::sync::OnceCell;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algs::collective::CollectiveExt;
use crate::algs::communicator::{CollectiveTags, Communicator};
use crate::algs::wire::{
    SUMMARY_CONSTANT, SUMMARY_CONTIGUOUS, SUMMARY_NONEMPTY, SUMMARY_VALID, WIRE_VERSION,
    WireRankSummary,
};
use crate::data::directory::{Directory, LinearSplit, linear_lookup};
pub use crate::data::directory::{DuplicatePolicy, RemoteEntry};
use crate::data::partition::{ElementSizes, LocalPartition, positive_size};
use crate::debug_invariants::DebugInvariants;
use crate::map_error::BlockMapError;

/// How a map was constructed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionMode {
    UniformLinear,
    UniformLocalCount,
    ArbitrarySameSize,
    ArbitraryVariableSize,
}

/// Knobs for the collective operations of a [`BlockMap`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockMapConfig {
    /// Tags used by every exchange the map performs.
    pub tags: CollectiveTags,
    /// Resolution of GIDs owned by several ranks.
    pub duplicate_policy: DuplicatePolicy,
}

/// Values reduced over all ranks at construction.
#[derive(Clone, Debug)]
struct GlobalSummary {
    num_elements: usize,
    num_points: usize,
    gid_range: Option<(i64, i64)>,
    size_range: Option<(usize, usize)>,
    /// `rank_starts[r]..rank_starts[r + 1]` are the GIDs of rank `r` in a linear map.
    rank_starts: Option<Vec<i64>>,
    distributed: bool,
}

impl GlobalSummary {
    fn from_ranks<C: Communicator>(
        comm: &C,
        summaries: &[WireRankSummary],
        constant_size: Option<usize>,
    ) -> Result<Self, BlockMapError> {
        let counts: Vec<usize> = summaries.iter().map(WireRankSummary::num_elements).collect();
        let num_elements: usize = counts.iter().sum();

        let nonempty = || summaries.iter().filter(|s| s.has(SUMMARY_NONEMPTY));
        let gid_range = nonempty()
            .map(WireRankSummary::gid_range)
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)));
        let size_range = match constant_size {
            Some(s) => Some((s, s)),
            None => nonempty()
                .map(WireRankSummary::size_range)
                .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h))),
        };
        let num_points = summaries
            .iter()
            .try_fold(0usize, |acc, s| acc.checked_add(s.num_points()))
            .ok_or(BlockMapError::PointCountOverflow {
                elements: num_elements,
                size: size_range.map_or(0, |(_, hi)| hi),
            })?;

        // linear: every rank contiguous and starting where the previous one ended
        let first = gid_range.map_or(0, |(lo, _)| lo);
        let mut starts = Vec::with_capacity(summaries.len() + 1);
        let mut next = first;
        let mut linear = true;
        for s in summaries {
            if s.has(SUMMARY_NONEMPTY) && (!s.has(SUMMARY_CONTIGUOUS) || s.gid_range().0 != next)
            {
                linear = false;
                break;
            }
            starts.push(next);
            next += s.num_elements() as i64;
        }
        starts.push(next);

        Ok(Self {
            num_elements,
            num_points,
            gid_range,
            size_range,
            rank_starts: linear.then_some(starts),
            distributed: is_distributed(comm, &counts, num_elements),
        })
    }
}

fn is_distributed<C: Communicator>(comm: &C, counts: &[usize], total: usize) -> bool {
    comm.distributes() && comm.size() > 1 && counts.iter().any(|&c| c != total)
}

fn check_global_count(value: i64, min: i64) -> Result<(), BlockMapError> {
    if value < min {
        Err(BlockMapError::InvalidGlobalCount { value, min })
    } else {
        Ok(())
    }
}

fn check_supplied_total(supplied: i64, actual: usize) -> Result<(), BlockMapError> {
    if supplied != -1 && supplied != actual as i64 {
        Err(BlockMapError::GlobalCountMismatch {
            supplied,
            actual: actual as i64,
        })
    } else {
        Ok(())
    }
}

fn point_count(elements: usize, size: usize) -> Result<usize, BlockMapError> {
    elements
        .checked_mul(size)
        .ok_or(BlockMapError::PointCountOverflow { elements, size })
}

/// The element size shared by all ranks, or `None` when every rank lists
/// per-element sizes. The result is the same on every rank.
fn agreed_constant_size(summaries: &[WireRankSummary]) -> Result<Option<usize>, BlockMapError> {
    let sizes: Vec<usize> = summaries
        .iter()
        .filter(|s| s.has(SUMMARY_CONSTANT))
        .map(|s| s.size_range().0)
        .collect();
    if sizes.is_empty() {
        return Ok(None);
    }
    if sizes.len() != summaries.len() {
        return Err(BlockMapError::MixedElementSizeKinds {
            constant: sizes.len(),
            ranks: summaries.len(),
        });
    }
    match sizes.into_iter().minmax().into_option() {
        Some((min, max)) if min != max => Err(BlockMapError::ElementSizeMismatch { min, max }),
        range => Ok(range.map(|(size, _)| size)),
    }
}

fn check_index_base(gids: &[i64], index_base: i64) -> Result<(), BlockMapError> {
    match gids.iter().find(|&&g| g < index_base) {
        Some(&gid) => Err(BlockMapError::GidBelowIndexBase { gid, index_base }),
        None => Ok(()),
    }
}

fn rank_summary(partition: &LocalPartition) -> WireRankSummary {
    let mut flags = SUMMARY_VALID;
    if partition.num_elements() > 0 {
        flags |= SUMMARY_NONEMPTY;
    }
    if partition.is_contiguous() {
        flags |= SUMMARY_CONTIGUOUS;
    }
    let sizes = match partition.constant_size() {
        Some(size) => {
            flags |= SUMMARY_CONSTANT;
            (size, size)
        }
        None => partition.size_range().unwrap_or((0, 0)),
    };
    WireRankSummary::new(
        flags,
        partition.num_elements(),
        partition.num_points(),
        partition.gid_range().unwrap_or((0, 0)),
        sizes,
    )
}

/// Gather one summary per rank. A local validation failure is reported only
/// after the gather, so that every rank leaves the collective with an error.
fn gather_summaries<C: Communicator>(
    comm: &C,
    tags: CollectiveTags,
    local: &Result<WireRankSummary, BlockMapError>,
) -> Result<Vec<WireRankSummary>, BlockMapError> {
    let mine = match local {
        Ok(summary) => *summary,
        Err(_) => WireRankSummary::new(0, 0, 0, (0, 0), (0, 0)),
    };
    let summaries = comm.all_gather_records(tags, &mine)?;
    if let Err(err) = local {
        return Err(err.clone());
    }
    for (rank, s) in summaries.iter().enumerate() {
        if s.version() != WIRE_VERSION {
            return Err(BlockMapError::CommError {
                neighbor: rank,
                message: format!("wire version {} (expected {WIRE_VERSION})", s.version()),
            });
        }
        if !s.has(SUMMARY_VALID) {
            return Err(BlockMapError::PeerInvalidArgument { rank });
        }
    }
    Ok(summaries)
}

/// Distributed map of variable-size blocks over the ranks of `C`.
pub struct BlockMap<'c, C: Communicator> {
    comm: &'c C,
    config: BlockMapConfig,
    mode: DistributionMode,
    index_base: i64,
    partition: LocalPartition,
    global: GlobalSummary,
    directory: OnceCell<Directory>,
}

impl<'c, C: Communicator> BlockMap<'c, C> {
    /// `num_global_elements` elements of size `element_size`, spread as evenly as
    /// possible in rank order; the first `n % size` ranks own one extra element.
    ///
    /// Needs no communication.
    pub fn uniform(
        comm: &'c C,
        num_global_elements: i64,
        element_size: i64,
        index_base: i64,
    ) -> Result<Self, BlockMapError> {
        check_global_count(num_global_elements, 0)?;
        let size = positive_size(element_size)?;
        let total = num_global_elements as usize;
        let split = LinearSplit::new(index_base, total as u64, comm.size());
        let rank = comm.rank();
        let partition =
            LocalPartition::contiguous(split.part_start(rank), split.part_len(rank) as usize, size);
        let counts: Vec<usize> = (0..comm.size())
            .map(|r| split.part_len(r) as usize)
            .collect();
        let global = GlobalSummary {
            num_elements: total,
            num_points: point_count(total, size)?,
            gid_range: (total > 0).then(|| (index_base, index_base + total as i64 - 1)),
            size_range: Some((size, size)),
            rank_starts: Some((0..=comm.size()).map(|k| split.part_start(k)).collect()),
            distributed: is_distributed(comm, &counts, total),
        };
        Ok(Self::assemble(
            comm,
            DistributionMode::UniformLinear,
            index_base,
            partition,
            global,
        ))
    }

    /// Contiguous GIDs in rank order, `num_my_elements` on this rank.
    ///
    /// Pass `-1` as `num_global_elements` to have it computed. Collective.
    pub fn with_local_count(
        comm: &'c C,
        num_global_elements: i64,
        num_my_elements: i64,
        element_size: i64,
        index_base: i64,
    ) -> Result<Self, BlockMapError> {
        let config = BlockMapConfig::default();
        let local = (|| -> Result<WireRankSummary, BlockMapError> {
            check_global_count(num_global_elements, -1)?;
            if num_my_elements < 0 {
                return Err(BlockMapError::NegativeLocalCount(num_my_elements));
            }
            let size = positive_size(element_size)?;
            let n = num_my_elements as usize;
            let flags = SUMMARY_VALID | SUMMARY_CONTIGUOUS | SUMMARY_CONSTANT;
            let points = point_count(n, size)?;
            Ok(WireRankSummary::new(flags, n, points, (0, 0), (size, size)))
        })();
        let summaries = gather_summaries(comm, config.tags, &local)?;
        let size = agreed_constant_size(&summaries)?.ok_or_else(|| {
            BlockMapError::InvariantViolation("local-count summary without element size".into())
        })?;

        let counts: Vec<usize> = summaries.iter().map(WireRankSummary::num_elements).collect();
        let total: usize = counts.iter().sum();
        check_supplied_total(num_global_elements, total)?;
        let mut starts = Vec::with_capacity(counts.len() + 1);
        starts.push(index_base);
        for &c in &counts {
            starts.push(starts[starts.len() - 1] + c as i64);
        }
        let rank = comm.rank();
        let partition = LocalPartition::contiguous(starts[rank], counts[rank], size);
        let global = GlobalSummary {
            num_elements: total,
            num_points: point_count(total, size)?,
            gid_range: (total > 0).then(|| (index_base, index_base + total as i64 - 1)),
            size_range: Some((size, size)),
            rank_starts: Some(starts),
            distributed: is_distributed(comm, &counts, total),
        };
        Ok(Self::assemble(
            comm,
            DistributionMode::UniformLocalCount,
            index_base,
            partition,
            global,
        ))
    }

    /// The GIDs in `my_global_elements`, in that local order, all of size
    /// `element_size`. Collective.
    pub fn arbitrary(
        comm: &'c C,
        num_global_elements: i64,
        my_global_elements: &[i64],
        element_size: i64,
        index_base: i64,
    ) -> Result<Self, BlockMapError> {
        let sizes = ElementSizes::constant(element_size);
        Self::from_element_list(
            comm,
            DistributionMode::ArbitrarySameSize,
            num_global_elements,
            my_global_elements,
            sizes,
            index_base,
        )
    }

    /// As [`BlockMap::arbitrary`] with one size per element. The map never reports
    /// a constant element size, even when all sizes are equal. Collective.
    pub fn arbitrary_variable(
        comm: &'c C,
        num_global_elements: i64,
        my_global_elements: &[i64],
        element_sizes: &[i64],
        index_base: i64,
    ) -> Result<Self, BlockMapError> {
        let sizes = ElementSizes::variable(element_sizes, my_global_elements.len());
        Self::from_element_list(
            comm,
            DistributionMode::ArbitraryVariableSize,
            num_global_elements,
            my_global_elements,
            sizes,
            index_base,
        )
    }

    /// Rebuild a map from per-rank snapshots taken with [`BlockMap::local_layout`].
    /// Collective.
    pub fn from_layout(comm: &'c C, layout: &LocalLayout) -> Result<Self, BlockMapError> {
        let sizes = match layout.constant_element_size {
            Some(size) => ElementSizes::constant(size as i64),
            None => {
                let list: Vec<i64> = layout.element_sizes.iter().map(|&s| s as i64).collect();
                ElementSizes::variable(&list, layout.gids.len())
            }
        };
        let mode = match layout.constant_element_size {
            Some(_) => DistributionMode::ArbitrarySameSize,
            None => DistributionMode::ArbitraryVariableSize,
        };
        Self::from_element_list(comm, mode, -1, &layout.gids, sizes, layout.index_base)
    }

    fn from_element_list(
        comm: &'c C,
        mode: DistributionMode,
        num_global_elements: i64,
        gids: &[i64],
        sizes: Result<ElementSizes, BlockMapError>,
        index_base: i64,
    ) -> Result<Self, BlockMapError> {
        let config = BlockMapConfig::default();
        let local = (|| -> Result<LocalPartition, BlockMapError> {
            check_global_count(num_global_elements, -1)?;
            let sizes = sizes?;
            check_index_base(gids, index_base)?;
            LocalPartition::from_gids(gids.to_vec(), sizes)
        })();
        let summary = local.as_ref().map(rank_summary).map_err(Clone::clone);
        let summaries = gather_summaries(comm, config.tags, &summary)?;
        let partition = local?;
        let constant_size = agreed_constant_size(&summaries)?;

        let global = GlobalSummary::from_ranks(comm, &summaries, constant_size)?;
        check_supplied_total(num_global_elements, global.num_elements)?;
        Ok(Self::assemble(comm, mode, index_base, partition, global))
    }

    fn assemble(
        comm: &'c C,
        mode: DistributionMode,
        index_base: i64,
        partition: LocalPartition,
        global: GlobalSummary,
    ) -> Self {
        let map = Self {
            comm,
            config: BlockMapConfig::default(),
            mode,
            index_base,
            partition,
            global,
            directory: OnceCell::new(),
        };
        log::debug!(
            "rank {}: {:?} block map with {} of {} elements, {} of {} points{}",
            comm.rank(),
            mode,
            map.num_my_elements(),
            map.num_global_elements(),
            map.num_my_points(),
            map.num_global_points(),
            if map.linear_map() { ", linear" } else { "" }
        );
        map.debug_assert_invariants();
        map
    }

    /// Replace the configuration used by later collective operations.
    pub fn with_config(mut self, config: BlockMapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BlockMapConfig {
        &self.config
    }

    /// The communicator this map was built on.
    pub fn comm(&self) -> &'c C {
        self.comm
    }

    pub fn mode(&self) -> DistributionMode {
        self.mode
    }

    pub fn index_base(&self) -> i64 {
        self.index_base
    }

    // --- counts ---

    pub fn num_global_elements(&self) -> usize {
        self.global.num_elements
    }

    pub fn num_my_elements(&self) -> usize {
        self.partition.num_elements()
    }

    pub fn num_global_points(&self) -> usize {
        self.global.num_points
    }

    pub fn num_my_points(&self) -> usize {
        self.partition.num_points()
    }

    // --- index conversion ---

    /// Local index of `gid`, or `None` if this rank does not own it.
    pub fn lid(&self, gid: i64) -> Option<usize> {
        self.partition.lid(gid)
    }

    pub fn gid(&self, lid: usize) -> Result<i64, BlockMapError> {
        self.partition.gid(lid).ok_or(BlockMapError::LidOutOfRange {
            lid,
            len: self.num_my_elements(),
        })
    }

    /// Whether this rank owns `gid`.
    pub fn my_gid(&self, gid: i64) -> bool {
        self.lid(gid).is_some()
    }

    /// Whether `lid` is a valid local index.
    pub fn my_lid(&self, lid: usize) -> bool {
        lid < self.num_my_elements()
    }

    /// Element containing local point `point` and the offset inside it.
    pub fn find_local_element_id(&self, point: usize) -> Result<(usize, usize), BlockMapError> {
        self.partition
            .find_point(point)
            .ok_or(BlockMapError::PointOutOfRange {
                point,
                len: self.num_my_points(),
            })
    }

    // --- extrema ---

    /// Smallest GID on any rank; `index_base` for an empty map.
    pub fn min_all_gid(&self) -> i64 {
        self.global.gid_range.map_or(self.index_base, |(lo, _)| lo)
    }

    /// Largest GID on any rank; `index_base - 1` for an empty map.
    pub fn max_all_gid(&self) -> i64 {
        self.global.gid_range.map_or(self.index_base - 1, |(_, hi)| hi)
    }

    pub fn min_my_gid(&self) -> i64 {
        self.partition
            .gid_range()
            .map_or(self.index_base, |(lo, _)| lo)
    }

    pub fn max_my_gid(&self) -> i64 {
        self.partition
            .gid_range()
            .map_or(self.index_base - 1, |(_, hi)| hi)
    }

    pub fn min_lid(&self) -> usize {
        0
    }

    /// Largest valid local index, `None` when this rank owns nothing.
    pub fn max_lid(&self) -> Option<usize> {
        self.num_my_elements().checked_sub(1)
    }

    // --- element sizes ---

    pub fn constant_element_size(&self) -> bool {
        self.partition.constant_size().is_some()
    }

    /// The uniform element size, or `0` for a variable-size map.
    pub fn element_size(&self) -> usize {
        self.partition.constant_size().unwrap_or(0)
    }

    pub fn element_size_of(&self, lid: usize) -> Result<usize, BlockMapError> {
        self.partition
            .element_size(lid)
            .ok_or(BlockMapError::LidOutOfRange {
                lid,
                len: self.num_my_elements(),
            })
    }

    pub fn min_element_size(&self) -> usize {
        self.global.size_range.map_or(0, |(lo, _)| lo)
    }

    pub fn max_element_size(&self) -> usize {
        self.global.size_range.map_or(0, |(_, hi)| hi)
    }

    pub fn min_my_element_size(&self) -> usize {
        self.partition.size_range().map_or(0, |(lo, _)| lo)
    }

    pub fn max_my_element_size(&self) -> usize {
        self.partition.size_range().map_or(0, |(_, hi)| hi)
    }

    pub fn first_point_in_element(&self, lid: usize) -> Result<usize, BlockMapError> {
        self.partition
            .first_point(lid)
            .ok_or(BlockMapError::LidOutOfRange {
                lid,
                len: self.num_my_elements(),
            })
    }

    // --- lists ---

    /// Owned GIDs in local order.
    pub fn my_global_elements(&self) -> &[i64] {
        self.partition.gids()
    }

    pub fn first_point_in_element_list(&self) -> Vec<usize> {
        self.partition.first_point_list()
    }

    pub fn element_size_list(&self) -> Vec<usize> {
        self.partition.element_size_list()
    }

    pub fn point_to_element_list(&self) -> Vec<usize> {
        self.partition.point_to_element_list()
    }

    // --- global structure ---

    /// Whether rank `r` owns exactly the GIDs `[start_r, start_{r+1})`, in order.
    pub fn linear_map(&self) -> bool {
        self.global.rank_starts.is_some()
    }

    /// Whether the elements are spread over several ranks rather than replicated.
    pub fn distributed_global(&self) -> bool {
        self.global.distributed
    }

    fn directory(&self) -> Result<&Directory, BlockMapError> {
        self.directory.get_or_try_init(|| {
            Directory::build(
                self.comm,
                self.config.tags,
                &self.partition,
                self.global.gid_range,
                self.config.duplicate_policy,
            )
        })
    }

    /// Owner, local index and size of every GID in `gids`; `None` for GIDs
    /// outside the map.
    ///
    /// Collective unless the map is linear with a constant element size.
    pub fn remote_id_list(&self, gids: &[i64]) -> Result<Vec<Option<RemoteEntry>>, BlockMapError> {
        match (&self.global.rank_starts, self.partition.constant_size()) {
            (Some(starts), Some(size)) => Ok(linear_remote_ids(starts, size, gids)),
            _ => self.directory()?.lookup(self.comm, self.config.tags, gids),
        }
    }

    /// Whether no GID is owned by more than one rank. Collective on first call
    /// for non-linear maps.
    pub fn is_one_to_one(&self) -> Result<bool, BlockMapError> {
        if self.linear_map() {
            return Ok(true);
        }
        Ok(self.directory()?.is_one_to_one())
    }

    /// Same index base, global counts and size kind, and on every rank the
    /// same GIDs in the same order with the same sizes. Collective unless the
    /// global quantities already differ.
    pub fn same_as(&self, other: &BlockMap<'_, C>) -> Result<bool, BlockMapError> {
        if self.index_base != other.index_base
            || self.num_global_elements() != other.num_global_elements()
            || self.constant_element_size() != other.constant_element_size()
            || self.element_size() != other.element_size()
            || self.num_global_points() != other.num_global_points()
        {
            return Ok(false);
        }
        let local = self.num_my_elements() == other.num_my_elements()
            && self.partition.same_layout(&other.partition);
        self.comm.all_true(self.config.tags, local)
    }

    /// Same number of points globally and on every rank. Collective unless
    /// the global point counts differ.
    pub fn point_same_as(&self, other: &BlockMap<'_, C>) -> Result<bool, BlockMapError> {
        if self.num_global_points() != other.num_global_points() {
            return Ok(false);
        }
        let local = self.num_my_points() == other.num_my_points();
        self.comm.all_true(self.config.tags, local)
    }

    /// Serializable snapshot of this rank's part of the map.
    pub fn local_layout(&self) -> LocalLayout {
        LocalLayout {
            rank: self.comm.rank(),
            num_ranks: self.comm.size(),
            index_base: self.index_base,
            mode: self.mode,
            gids: self.partition.gids().to_vec(),
            constant_element_size: self.partition.constant_size(),
            element_sizes: self.partition.element_size_list(),
        }
    }

    /// Write the report of every rank to `out`, rank after rank. Collective.
    pub fn print<W: io::Write>(&self, out: &mut W) -> Result<(), BlockMapError> {
        let mut written = Ok(());
        for rank in 0..self.comm.size() {
            if rank == self.comm.rank() {
                written = write!(out, "{self}").and_then(|()| out.flush());
            }
            self.comm.barrier(self.config.tags)?;
        }
        Ok(written?)
    }
}

fn linear_remote_ids(starts: &[i64], size: usize, gids: &[i64]) -> Vec<Option<RemoteEntry>> {
    let resolve = |&gid: &i64| {
        linear_lookup(starts, gid).map(|(owner, lid)| RemoteEntry { owner, lid, size })
    };
    #[cfg(feature = "rayon")]
    {
        gids.par_iter().map(resolve).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        gids.iter().map(resolve).collect()
    }
}

impl<C: Communicator> Clone for BlockMap<'_, C> {
    fn clone(&self) -> Self {
        Self {
            comm: self.comm,
            config: self.config,
            mode: self.mode,
            index_base: self.index_base,
            partition: self.partition.clone(),
            global: self.global.clone(),
            directory: self.directory.clone(),
        }
    }
}

impl<C: Communicator> fmt::Debug for BlockMap<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMap")
            .field("rank", &self.comm.rank())
            .field("size", &self.comm.size())
            .field("mode", &self.mode)
            .field("index_base", &self.index_base)
            .field("partition", &self.partition)
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

/// This rank's report: a global header on rank 0, then the local summary and
/// one line per owned element.
impl<C: Communicator> fmt::Display for BlockMap<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = self.comm.rank();
        if rank == 0 {
            writeln!(f)?;
            writeln!(f, "Number of Global Elements  = {}", self.num_global_elements())?;
            writeln!(f, "Number of Global Points    = {}", self.num_global_points())?;
            writeln!(f, "Maximum of all GIDs        = {}", self.max_all_gid())?;
            writeln!(f, "Minimum of all GIDs        = {}", self.min_all_gid())?;
            writeln!(f, "Index Base                 = {}", self.index_base)?;
            if self.constant_element_size() {
                writeln!(f, "Constant Element Size      = {}", self.element_size())?;
            } else {
                writeln!(f, "Variable Element Size")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Number of Local Elements   = {}", self.num_my_elements())?;
        writeln!(f, "Number of Local Points     = {}", self.num_my_points())?;
        writeln!(f, "Maximum of my GIDs         = {}", self.max_my_gid())?;
        writeln!(f, "Minimum of my GIDs         = {}", self.min_my_gid())?;
        writeln!(f)?;

        let variable = !self.constant_element_size();
        write!(f, "{:>14}    {:>14} {:>14} ", "MyPID", "Local Index", "Global Index")?;
        if variable {
            write!(f, "{:>20} {:>14}", "FirstPointInElement", "ElementSize")?;
        }
        writeln!(f)?;
        for (lid, &gid) in self.partition.gids().iter().enumerate() {
            write!(f, "{rank:>14}    {lid:>14} {gid:>14} ")?;
            if variable {
                let first = self.partition.first_point(lid).unwrap_or(0);
                let size = self.partition.element_size(lid).unwrap_or(0);
                write!(f, "{first:>20} {size:>14}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<C: Communicator> DebugInvariants for BlockMap<'_, C> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BlockMap");
    }

    fn validate_invariants(&self) -> Result<(), BlockMapError> {
        self.partition.validate_invariants()?;
        if self.num_my_elements() > self.num_global_elements() {
            return Err(BlockMapError::InvariantViolation(format!(
                "{} local elements exceed {} global elements",
                self.num_my_elements(),
                self.num_global_elements()
            )));
        }
        if let Some((lo, hi)) = self.partition.gid_range() {
            if lo < self.index_base || lo < self.min_all_gid() || hi > self.max_all_gid() {
                return Err(BlockMapError::InvariantViolation(format!(
                    "local GIDs [{lo}, {hi}] outside global range [{}, {}]",
                    self.min_all_gid(),
                    self.max_all_gid()
                )));
            }
        }
        if let Some(starts) = &self.global.rank_starts {
            if starts.len() != self.comm.size() + 1 {
                return Err(BlockMapError::InvariantViolation(format!(
                    "{} rank starts for {} ranks",
                    starts.len(),
                    self.comm.size()
                )));
            }
        }
        Ok(())
    }
}

/// One rank's part of a map, as plain data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLayout {
    pub rank: usize,
    pub num_ranks: usize,
    pub index_base: i64,
    pub mode: DistributionMode,
    /// Owned GIDs in local order.
    pub gids: Vec<i64>,
    /// Set for constant-size maps.
    pub constant_element_size: Option<usize>,
    pub element_sizes: Vec<usize>,
}
