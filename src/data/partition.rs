//! Local partition table: the elements one process owns.
//!
//! A [`LocalPartition`] stores the owned global IDs in local order (position =
//! LID), the element sizes, and the point offsets derived from them. It never
//! communicates; global quantities live in [`BlockMap`](crate::data::block_map::BlockMap).

use hashbrown::HashMap;
use itertools::{Itertools, MinMaxResult};

use crate::debug_invariants::DebugInvariants;
use crate::map_error::BlockMapError;

/// Sizes of the owned elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementSizes {
    /// Every element has the same number of points.
    Constant(usize),
    /// One size per element; `first_points` is the prefix sum with a trailing total.
    Variable {
        sizes: Vec<usize>,
        first_points: Vec<usize>,
    },
}

impl ElementSizes {
    /// Validate a uniform element size.
    pub fn constant(size: i64) -> Result<Self, BlockMapError> {
        positive_size(size).map(ElementSizes::Constant)
    }

    /// Validate a per-element size list for `num_elements` elements.
    pub fn variable(sizes: &[i64], num_elements: usize) -> Result<Self, BlockMapError> {
        if sizes.len() != num_elements {
            return Err(BlockMapError::SizeListLengthMismatch {
                elements: num_elements,
                sizes: sizes.len(),
            });
        }
        let mut checked = Vec::with_capacity(sizes.len());
        let mut first_points = Vec::with_capacity(sizes.len() + 1);
        let mut next = 0usize;
        for (lid, &size) in sizes.iter().enumerate() {
            if size <= 0 {
                return Err(BlockMapError::NonPositiveElementSizeAt { lid, size });
            }
            first_points.push(next);
            next = next
                .checked_add(size as usize)
                .ok_or(BlockMapError::PointCountOverflow {
                    elements: sizes.len(),
                    size: size as usize,
                })?;
            checked.push(size as usize);
        }
        first_points.push(next);
        Ok(ElementSizes::Variable {
            sizes: checked,
            first_points,
        })
    }
}

pub(crate) fn positive_size(size: i64) -> Result<usize, BlockMapError> {
    if size <= 0 {
        Err(BlockMapError::NonPositiveElementSize(size))
    } else {
        Ok(size as usize)
    }
}

/// GID → LID resolution.
#[derive(Clone, Debug)]
enum LidLookup {
    /// GIDs are `first_gid, first_gid + 1, ...` in local order.
    Contiguous { first_gid: i64 },
    Table(HashMap<i64, usize>),
}

/// Per-process table of owned elements.
#[derive(Clone, Debug)]
pub struct LocalPartition {
    gids: Vec<i64>,
    sizes: ElementSizes,
    lookup: LidLookup,
}

impl LocalPartition {
    /// `count` consecutive GIDs starting at `first_gid`, all of size `element_size`.
    pub fn contiguous(first_gid: i64, count: usize, element_size: usize) -> Self {
        Self {
            gids: (0..count as i64).map(|k| first_gid + k).collect(),
            sizes: ElementSizes::Constant(element_size),
            lookup: LidLookup::Contiguous { first_gid },
        }
    }

    /// Owned GIDs in local order; fails on a repeated GID.
    pub fn from_gids(gids: Vec<i64>, sizes: ElementSizes) -> Result<Self, BlockMapError> {
        match &sizes {
            ElementSizes::Constant(size) => {
                if gids.len().checked_mul(*size).is_none() {
                    return Err(BlockMapError::PointCountOverflow {
                        elements: gids.len(),
                        size: *size,
                    });
                }
            }
            ElementSizes::Variable { sizes: list, .. } => {
                if list.len() != gids.len() {
                    return Err(BlockMapError::SizeListLengthMismatch {
                        elements: gids.len(),
                        sizes: list.len(),
                    });
                }
            }
        }
        let lookup = if is_consecutive(&gids) {
            LidLookup::Contiguous {
                first_gid: gids.first().copied().unwrap_or(0),
            }
        } else {
            let mut table = HashMap::with_capacity(gids.len());
            for (lid, &gid) in gids.iter().enumerate() {
                if table.insert(gid, lid).is_some() {
                    return Err(BlockMapError::DuplicateGid(gid));
                }
            }
            LidLookup::Table(table)
        };
        Ok(Self {
            gids,
            sizes,
            lookup,
        })
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.gids.len()
    }

    pub fn num_points(&self) -> usize {
        match &self.sizes {
            ElementSizes::Constant(size) => size * self.gids.len(),
            ElementSizes::Variable { first_points, .. } => {
                first_points.last().copied().unwrap_or(0)
            }
        }
    }

    /// Owned GIDs in local order.
    pub fn gids(&self) -> &[i64] {
        &self.gids
    }

    /// The uniform size, or `None` for a variable-size table.
    pub fn constant_size(&self) -> Option<usize> {
        match self.sizes {
            ElementSizes::Constant(size) => Some(size),
            ElementSizes::Variable { .. } => None,
        }
    }

    pub fn lid(&self, gid: i64) -> Option<usize> {
        match &self.lookup {
            LidLookup::Contiguous { first_gid } => {
                let off = gid.checked_sub(*first_gid)?;
                (off >= 0 && (off as u64) < self.gids.len() as u64).then_some(off as usize)
            }
            LidLookup::Table(table) => table.get(&gid).copied(),
        }
    }

    pub fn gid(&self, lid: usize) -> Option<i64> {
        self.gids.get(lid).copied()
    }

    pub fn element_size(&self, lid: usize) -> Option<usize> {
        if lid >= self.gids.len() {
            return None;
        }
        Some(match &self.sizes {
            ElementSizes::Constant(size) => *size,
            ElementSizes::Variable { sizes, .. } => sizes[lid],
        })
    }

    pub fn first_point(&self, lid: usize) -> Option<usize> {
        if lid >= self.gids.len() {
            return None;
        }
        Some(match &self.sizes {
            ElementSizes::Constant(size) => lid * size,
            ElementSizes::Variable { first_points, .. } => first_points[lid],
        })
    }

    /// Element containing local point `point`, and the offset inside it.
    pub fn find_point(&self, point: usize) -> Option<(usize, usize)> {
        if point >= self.num_points() {
            return None;
        }
        match &self.sizes {
            ElementSizes::Constant(size) => Some((point / size, point % size)),
            ElementSizes::Variable { first_points, .. } => {
                // last element whose first point is <= point
                let lid = first_points.partition_point(|&fp| fp <= point) - 1;
                Some((lid, point - first_points[lid]))
            }
        }
    }

    /// `(min, max)` owned GID.
    pub fn gid_range(&self) -> Option<(i64, i64)> {
        match self.gids.iter().copied().minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(g) => Some((g, g)),
            MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
        }
    }

    /// `(min, max)` element size. A constant-size table reports its size even when empty.
    pub fn size_range(&self) -> Option<(usize, usize)> {
        match &self.sizes {
            ElementSizes::Constant(size) => Some((*size, *size)),
            ElementSizes::Variable { sizes, .. } => match sizes.iter().copied().minmax() {
                MinMaxResult::NoElements => None,
                MinMaxResult::OneElement(s) => Some((s, s)),
                MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
            },
        }
    }

    /// Whether the owned GIDs are ascending and consecutive.
    pub fn is_contiguous(&self) -> bool {
        matches!(self.lookup, LidLookup::Contiguous { .. })
    }

    pub fn first_point_list(&self) -> Vec<usize> {
        (0..self.gids.len())
            .filter_map(|lid| self.first_point(lid))
            .collect()
    }

    pub fn element_size_list(&self) -> Vec<usize> {
        match &self.sizes {
            ElementSizes::Constant(size) => vec![*size; self.gids.len()],
            ElementSizes::Variable { sizes, .. } => sizes.clone(),
        }
    }

    /// For every local point, the LID of the element containing it.
    pub fn point_to_element_list(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.num_points());
        for (lid, size) in self.element_size_list().into_iter().enumerate() {
            out.extend(std::iter::repeat_n(lid, size));
        }
        out
    }

    /// Same GIDs in the same positions with the same sizes.
    pub fn same_layout(&self, other: &LocalPartition) -> bool {
        self.gids == other.gids && self.element_size_list() == other.element_size_list()
    }
}

fn is_consecutive(gids: &[i64]) -> bool {
    gids.iter().tuple_windows().all(|(a, b)| a.checked_add(1) == Some(*b))
}

impl DebugInvariants for LocalPartition {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LocalPartition");
    }

    fn validate_invariants(&self) -> Result<(), BlockMapError> {
        for (lid, &gid) in self.gids.iter().enumerate() {
            if self.lid(gid) != Some(lid) {
                return Err(BlockMapError::InvariantViolation(format!(
                    "gid {gid} at lid {lid} resolves to {:?}",
                    self.lid(gid)
                )));
            }
        }
        if let ElementSizes::Variable {
            sizes,
            first_points,
        } = &self.sizes
        {
            if sizes.len() != self.gids.len() || first_points.len() != sizes.len() + 1 {
                return Err(BlockMapError::InvariantViolation(format!(
                    "{} gids, {} sizes, {} first points",
                    self.gids.len(),
                    sizes.len(),
                    first_points.len()
                )));
            }
            for (lid, size) in sizes.iter().enumerate() {
                if first_points[lid] + size != first_points[lid + 1] {
                    return Err(BlockMapError::InvariantViolation(format!(
                        "first point of element {} is not a prefix sum",
                        lid + 1
                    )));
                }
            }
        }
        Ok(())
    }
}
