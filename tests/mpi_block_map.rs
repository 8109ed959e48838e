#![cfg(feature = "mpi-support")]
//! Run with `mpirun -n <N> cargo test --features mpi-support --test mpi_block_map`.

mod util;
use util::*;

use block_map::algs::communicator::{Communicator, MpiComm};
use block_map::data::block_map::RemoteEntry;

// MPI can be initialized once per process, so everything lives in one test.
#[test]
fn mpi_block_map_scenario() {
    let comm = MpiComm::new().unwrap();
    let s = Setup::for_comm(&comm);
    let [map1, map2, map3, map4] = four_maps(&comm, &s);

    assert_eq!(map2.num_global_elements(), s.num_global_el);
    assert_eq!(map1.distributed_global(), comm.size() > 1);
    assert!(map2.point_same_as(&map3).unwrap());
    assert_eq!(map1.same_as(&map2).unwrap(), comm.size() == 1);

    let gids: Vec<i64> = (0..s.num_global_el as i64).rev().collect();
    let got = map4.remote_id_list(&gids).unwrap();
    for (gid, entry) in gids.iter().zip(got) {
        let (owner, lid, size) = s.expected_owner(*gid);
        assert_eq!(entry, Some(RemoteEntry { owner, lid, size }));
    }

    let mut out = Vec::new();
    map2.print(&mut out).unwrap();
    let header = if comm.rank() == 0 { 7 } else { 0 };
    assert_eq!(
        String::from_utf8(out).unwrap().lines().count(),
        header + 7 + s.num_my_el
    );
}
