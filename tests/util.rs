#![allow(dead_code)]
use block_map::algs::communicator::{Communicator, ThreadComm};
use block_map::data::block_map::BlockMap;

/// Run `f` once per rank of a fresh `n`-rank thread world; results in rank order.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    F: Fn(&ThreadComm) -> T + Sync,
    T: Send,
{
    let world = ThreadComm::world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Rank-dependent inputs shared by the map tests.
///
/// Rank `p` owns `4 + p` elements. The GIDs `0..N` are listed in reverse and
/// dealt out in rank order, so no rank owns a contiguous ascending range.
#[derive(Clone, Debug)]
pub struct Setup {
    pub rank: usize,
    pub num_proc: usize,
    pub num_my_el_const: usize,
    pub num_my_el: usize,
    pub num_global_el_const: usize,
    pub num_global_el: usize,
    pub el_size_const: usize,
    pub el_size_list: Vec<i64>,
    pub index_base: i64,
    pub my_global_els: Vec<i64>,
}

/// Position in the reversed GID list where rank `p`'s elements start.
pub fn start_of(p: usize) -> usize {
    4 * p + p * p.saturating_sub(1) / 2
}

impl Setup {
    pub fn new(rank: usize, num_proc: usize) -> Self {
        let num_my_el = 4 + rank;
        let num_global_el: usize = (0..num_proc).map(|p| 4 + p).sum();
        let reversed: Vec<i64> = (0..num_global_el as i64).rev().collect();
        let start = start_of(rank);
        Self {
            rank,
            num_proc,
            num_my_el_const: 4,
            num_my_el,
            num_global_el_const: 4 * num_proc,
            num_global_el,
            el_size_const: 10,
            el_size_list: (5..5 + num_my_el as i64).collect(),
            index_base: 0,
            my_global_els: reversed[start..start + num_my_el].to_vec(),
        }
    }

    pub fn for_comm<C: Communicator>(comm: &C) -> Self {
        Self::new(comm.rank(), comm.size())
    }

    /// Owner, local index and variable size of `gid`.
    pub fn expected_owner(&self, gid: i64) -> (usize, usize, usize) {
        let pos = self.num_global_el - 1 - gid as usize;
        let owner = (0..self.num_proc)
            .rev()
            .find(|&p| start_of(p) <= pos)
            .unwrap();
        let lid = pos - start_of(owner);
        (owner, lid, 5 + lid)
    }
}

/// The four maps: uniform, local-count, arbitrary same-size, arbitrary variable-size.
pub fn four_maps<'c, C: Communicator>(comm: &'c C, s: &Setup) -> [BlockMap<'c, C>; 4] {
    let el_size = s.el_size_const as i64;
    let map1 = BlockMap::uniform(comm, s.num_global_el_const as i64, el_size, s.index_base).unwrap();
    let map2 = BlockMap::with_local_count(
        comm,
        s.num_global_el as i64,
        s.num_my_el as i64,
        el_size,
        s.index_base,
    )
    .unwrap();
    let map3 = BlockMap::arbitrary(
        comm,
        s.num_global_el as i64,
        &s.my_global_els,
        el_size,
        s.index_base,
    )
    .unwrap();
    let map4 = BlockMap::arbitrary_variable(
        comm,
        s.num_global_el as i64,
        &s.my_global_els,
        &s.el_size_list,
        s.index_base,
    )
    .unwrap();
    [map1, map2, map3, map4]
}
