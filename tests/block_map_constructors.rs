mod util;
use util::*;

use block_map::algs::Communicator;
use block_map::algs::communicator::NoComm;
use block_map::data::block_map::{BlockMap, DistributionMode};
use block_map::map_error::{BlockMapError, ErrorKind};

#[test]
fn uniform_serial_eight_by_ten() {
    let map = BlockMap::uniform(&NoComm, 8, 10, 0).unwrap();
    assert_eq!(map.num_global_elements(), 8);
    assert_eq!(map.num_my_elements(), 8);
    assert_eq!(map.num_global_points(), 80);
    assert_eq!(map.num_my_points(), 80);
    assert_eq!(map.element_size(), 10);
    assert_eq!(map.min_all_gid(), 0);
    assert_eq!(map.max_all_gid(), 7);
    assert!(map.constant_element_size());
    assert!(map.linear_map());
    assert_eq!(map.mode(), DistributionMode::UniformLinear);
}

#[test]
fn uniform_spreads_remainder_over_first_ranks() {
    let counts = run_ranks(3, |comm| {
        let map = BlockMap::uniform(comm, 10, 2, 1).unwrap();
        (map.num_my_elements(), map.min_my_gid(), map.max_my_gid())
    });
    assert_eq!(counts, vec![(4, 1, 4), (3, 5, 7), (3, 8, 10)]);
}

#[test]
fn uniform_rejects_bad_arguments() {
    for size in 1..=4 {
        run_ranks(size, |comm| {
            let n = -2 * comm.size() as i64;
            let err = BlockMap::uniform(comm, n, 1, 0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            let err = BlockMap::uniform(comm, 2 * comm.size() as i64, 0, 0).unwrap_err();
            assert_eq!(err, BlockMapError::NonPositiveElementSize(0));
        });
    }
}

#[test]
fn four_modes_agree_with_setup() {
    for size in 1..=4 {
        run_ranks(size, |comm| {
            let s = Setup::for_comm(comm);
            let [map1, map2, map3, map4] = four_maps(comm, &s);

            assert_eq!(map1.num_global_elements(), s.num_global_el_const);
            assert_eq!(map1.num_my_elements(), s.num_my_el_const);
            assert_eq!(map1.element_size(), s.el_size_const);

            for map in [&map2, &map3] {
                assert_eq!(map.num_global_elements(), s.num_global_el);
                assert_eq!(map.num_my_elements(), s.num_my_el);
                assert_eq!(map.element_size(), s.el_size_const);
                assert_eq!(map.index_base(), s.index_base);
            }

            assert_eq!(map4.num_global_elements(), s.num_global_el);
            assert_eq!(map4.num_my_elements(), s.num_my_el);
            assert!(!map4.constant_element_size());
            let expected_points: i64 = s.el_size_list.iter().sum();
            assert_eq!(map4.num_my_points() as i64, expected_points);
            assert_eq!(map4.mode(), DistributionMode::ArbitraryVariableSize);
        });
    }
}

#[test]
fn local_count_computes_missing_global_count() {
    let totals = run_ranks(3, |comm| {
        let map = BlockMap::with_local_count(comm, -1, 2 + comm.rank() as i64, 3, 0).unwrap();
        (map.num_global_elements(), map.min_my_gid())
    });
    assert_eq!(totals, vec![(9, 0), (9, 2), (9, 5)]);
}

#[test]
fn local_count_rejects_bad_arguments() {
    run_ranks(2, |comm| {
        let n = -2 * comm.size() as i64;
        assert_eq!(
            BlockMap::with_local_count(comm, n, 2, 1, 0).unwrap_err(),
            BlockMapError::InvalidGlobalCount { value: n, min: -1 }
        );
        assert_eq!(
            BlockMap::with_local_count(comm, 9, -2, 1, 0).unwrap_err(),
            BlockMapError::NegativeLocalCount(-2)
        );
        assert_eq!(
            BlockMap::with_local_count(comm, 9, 4 + comm.rank() as i64, -1, 0).unwrap_err(),
            BlockMapError::NonPositiveElementSize(-1)
        );
        assert_eq!(
            BlockMap::with_local_count(comm, 10, 4 + comm.rank() as i64, 1, 0).unwrap_err(),
            BlockMapError::GlobalCountMismatch {
                supplied: 10,
                actual: 9
            }
        );
    });
}

#[test]
fn negative_local_count_on_one_rank_fails_everywhere() {
    let errs = run_ranks(3, |comm| {
        let mine = if comm.rank() == 1 { -1 } else { 2 };
        BlockMap::with_local_count(comm, -1, mine, 1, 0).unwrap_err()
    });
    assert_eq!(errs[0], BlockMapError::PeerInvalidArgument { rank: 1 });
    assert_eq!(errs[1], BlockMapError::NegativeLocalCount(-1));
    assert_eq!(errs[2], BlockMapError::PeerInvalidArgument { rank: 1 });
}

#[test]
fn element_size_must_agree_across_ranks() {
    let errs = run_ranks(2, |comm| {
        let size = 1 + comm.rank() as i64;
        let local = BlockMap::with_local_count(comm, -1, 2, size, 0).unwrap_err();
        let first = 2 * comm.rank() as i64;
        let listed = BlockMap::arbitrary(comm, -1, &[first, first + 1], size, 0).unwrap_err();
        (local, listed)
    });
    let expected = BlockMapError::ElementSizeMismatch { min: 1, max: 2 };
    for (local, listed) in errs {
        assert_eq!(local, expected);
        assert_eq!(listed, expected);
        assert_eq!(local.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn empty_rank_still_declares_its_element_size() {
    let errs = run_ranks(3, |comm| {
        let mine = if comm.rank() == 0 { 3 } else { 0 };
        let size = if comm.rank() == 2 { 5 } else { 2 };
        BlockMap::with_local_count(comm, -1, mine, size, 0).unwrap_err()
    });
    for err in errs {
        assert_eq!(err, BlockMapError::ElementSizeMismatch { min: 2, max: 5 });
    }
}

#[test]
fn constant_and_variable_ranks_do_not_mix() {
    let errs = run_ranks(2, |comm| {
        let gid = comm.rank() as i64;
        let built = if comm.rank() == 0 {
            BlockMap::arbitrary(comm, -1, &[gid], 2, 0)
        } else {
            BlockMap::arbitrary_variable(comm, -1, &[gid], &[2], 0)
        };
        built.unwrap_err()
    });
    for err in errs {
        assert_eq!(
            err,
            BlockMapError::MixedElementSizeKinds {
                constant: 1,
                ranks: 2
            }
        );
    }
}

#[test]
fn point_count_overflow_is_rejected() {
    let huge = i64::MAX;
    let overflow = |elements| BlockMapError::PointCountOverflow {
        elements,
        size: huge as usize,
    };
    assert_eq!(BlockMap::uniform(&NoComm, 4, huge, 0).unwrap_err(), overflow(4));
    assert_eq!(
        BlockMap::with_local_count(&NoComm, -1, 4, huge, 0).unwrap_err(),
        overflow(4)
    );
    assert_eq!(
        BlockMap::arbitrary(&NoComm, -1, &[0, 1, 2], huge, 0).unwrap_err(),
        overflow(3)
    );
    assert_eq!(
        BlockMap::arbitrary_variable(&NoComm, -1, &[0, 1, 2], &[huge, huge, huge], 0)
            .unwrap_err(),
        overflow(3)
    );
}

#[test]
fn global_point_overflow_fails_on_every_rank() {
    // each rank's points fit, their sum does not
    let size = 1i64 << 62;
    let errs = run_ranks(2, |comm| {
        let local = BlockMap::with_local_count(comm, -1, 3, size, 0).unwrap_err();
        let first = 3 * comm.rank() as i64;
        let gids = [first, first + 1, first + 2];
        let listed = BlockMap::arbitrary(comm, -1, &gids, size, 0).unwrap_err();
        (local, listed)
    });
    let expected = BlockMapError::PointCountOverflow {
        elements: 6,
        size: size as usize,
    };
    for (local, listed) in errs {
        assert_eq!(local, expected);
        assert_eq!(listed, expected);
    }
}

#[test]
fn arbitrary_rejects_bad_arguments() {
    run_ranks(2, |comm| {
        let s = Setup::for_comm(comm);
        let n = -2 * comm.size() as i64;
        assert!(matches!(
            BlockMap::arbitrary(comm, n, &s.my_global_els, 1, 0).unwrap_err(),
            BlockMapError::InvalidGlobalCount { .. }
        ));
        assert_eq!(
            BlockMap::arbitrary(comm, s.num_global_el as i64, &s.my_global_els, -2, 0)
                .unwrap_err(),
            BlockMapError::NonPositiveElementSize(-2)
        );
        assert_eq!(
            BlockMap::arbitrary(comm, 3, &s.my_global_els, 1, 0).unwrap_err(),
            BlockMapError::GlobalCountMismatch {
                supplied: 3,
                actual: s.num_global_el as i64
            }
        );
    });
}

#[test]
fn gid_below_index_base_is_rejected() {
    let err = BlockMap::arbitrary(&NoComm, -1, &[3, 0, 2], 1, 1).unwrap_err();
    assert_eq!(
        err,
        BlockMapError::GidBelowIndexBase {
            gid: 0,
            index_base: 1
        }
    );
}

#[test]
fn duplicate_gid_within_rank_is_rejected() {
    let err = BlockMap::arbitrary(&NoComm, -1, &[1, 2, 1], 1, 0).unwrap_err();
    assert_eq!(err, BlockMapError::DuplicateGid(1));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn variable_size_list_is_validated() {
    assert_eq!(
        BlockMap::arbitrary_variable(&NoComm, -1, &[0, 1, 2], &[1, 2], 0).unwrap_err(),
        BlockMapError::SizeListLengthMismatch {
            elements: 3,
            sizes: 2
        }
    );
    assert_eq!(
        BlockMap::arbitrary_variable(&NoComm, -1, &[0, 1], &[1, 0], 0).unwrap_err(),
        BlockMapError::NonPositiveElementSizeAt { lid: 1, size: 0 }
    );
}

#[test]
fn variable_sizes_five_to_eight() {
    let map = BlockMap::arbitrary_variable(&NoComm, 4, &[3, 2, 1, 0], &[5, 6, 7, 8], 0).unwrap();
    assert_eq!(map.first_point_in_element_list(), vec![0, 5, 11, 18]);
    assert_eq!(map.num_my_points(), 26);
    assert!(!map.constant_element_size());
    assert_eq!(map.element_size(), 0);
}

#[test]
fn clone_is_same_as_original() {
    for size in 1..=3 {
        run_ranks(size, |comm| {
            let s = Setup::for_comm(comm);
            for map in four_maps(comm, &s) {
                let copy = map.clone();
                assert!(map.same_as(&copy).unwrap());
                assert_eq!(copy.my_global_elements(), map.my_global_elements());
            }
        });
    }
}
