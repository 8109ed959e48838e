//! Typed reductions over a [`Communicator`].
//!
//! All methods are collective: every rank must call them in the same order
//! with the same tags.

use bytemuck::Pod;

use crate::algs::communicator::{CollectiveTags, Communicator};
use crate::algs::wire::{WireI64, decode_records, encode_records};
use crate::map_error::BlockMapError;

/// Sum/min/max/and reductions built on [`Communicator::allgather`].
pub trait CollectiveExt: Communicator {
    /// Gather exactly one fixed-size record from every rank, in rank order.
    fn all_gather_records<T: Pod>(
        &self,
        tags: CollectiveTags,
        record: &T,
    ) -> Result<Vec<T>, BlockMapError> {
        let gathered = self.allgather(tags, &encode_records(std::slice::from_ref(record)))?;
        let mut out = Vec::with_capacity(gathered.len());
        for (rank, bytes) in gathered.iter().enumerate() {
            let mut recs = decode_records::<T>(bytes, rank)?;
            if recs.len() != 1 {
                return Err(BlockMapError::BufferSizeMismatch {
                    neighbor: rank,
                    expected: std::mem::size_of::<T>(),
                    got: bytes.len(),
                });
            }
            out.append(&mut recs);
        }
        Ok(out)
    }

    fn all_gather_i64(&self, tags: CollectiveTags, value: i64) -> Result<Vec<i64>, BlockMapError> {
        Ok(self
            .all_gather_records(tags, &WireI64::of(value))?
            .iter()
            .map(WireI64::get)
            .collect())
    }

    fn sum_all(&self, tags: CollectiveTags, value: i64) -> Result<i64, BlockMapError> {
        Ok(self.all_gather_i64(tags, value)?.into_iter().sum())
    }

    fn min_all(&self, tags: CollectiveTags, value: i64) -> Result<i64, BlockMapError> {
        Ok(self
            .all_gather_i64(tags, value)?
            .into_iter()
            .min()
            .unwrap_or(value))
    }

    fn max_all(&self, tags: CollectiveTags, value: i64) -> Result<i64, BlockMapError> {
        Ok(self
            .all_gather_i64(tags, value)?
            .into_iter()
            .max()
            .unwrap_or(value))
    }

    /// Logical AND of `flag` over all ranks.
    fn all_true(&self, tags: CollectiveTags, flag: bool) -> Result<bool, BlockMapError> {
        Ok(self.min_all(tags, flag as i64)? == 1)
    }
}

impl<C: Communicator + ?Sized> CollectiveExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn serial_reductions_are_identity() {
        let tags = CollectiveTags::default();
        assert_eq!(NoComm.sum_all(tags, 42).unwrap(), 42);
        assert_eq!(NoComm.min_all(tags, -3).unwrap(), -3);
        assert_eq!(NoComm.max_all(tags, 7).unwrap(), 7);
        assert!(NoComm.all_true(tags, true).unwrap());
        assert!(!NoComm.all_true(tags, false).unwrap());
    }

    #[test]
    fn four_rank_reductions() {
        let world = ThreadComm::world(4);
        let tags = CollectiveTags::default();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let v = 10 * c.rank() as i64 - 5;
                        (
                            c.sum_all(tags, v).unwrap(),
                            c.min_all(tags, v).unwrap(),
                            c.max_all(tags, v).unwrap(),
                            c.all_true(tags, c.rank() != 2).unwrap(),
                            c.all_gather_i64(tags, c.rank() as i64).unwrap(),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert_eq!(r.0, 40);
            assert_eq!(r.1, -5);
            assert_eq!(r.2, 25);
            assert!(!r.3);
            assert_eq!(r.4, vec![0, 1, 2, 3]);
        }
    }
}
