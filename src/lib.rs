#![cfg_attr(docsrs, feature(doc_cfg))]
//! # block-map
//!
//! block-map is a distributed block-indexing directory for scientific codes. A
//! [`BlockMap`](data::block_map::BlockMap) partitions a global index space of
//! variable-size blocks across the ranks of a communicator and answers
//! global-to-local index queries and remote-ownership queries.
//!
//! ## Features
//! - Four construction modes: uniform, uniform with local counts, arbitrary
//!   same-size and arbitrary variable-size element lists
//! - A lazily built distributed directory for remote ownership lookups
//! - Pluggable communication backends (serial, threads, MPI)
//! - Structural comparison of maps (`same_as`, `point_same_as`)
//!
//! ## Usage
//! Add `block-map` as a dependency in your `Cargo.toml` and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! block-map = "0.3"
//! # Optional features:
//! # features = ["mpi-support","rayon"]
//! ```
//!
//! ```
//! use block_map::prelude::*;
//!
//! let comm = NoComm;
//! let map = BlockMap::uniform(&comm, 8, 10, 0)?;
//! assert_eq!(map.num_global_points(), 80);
//! assert_eq!(map.lid(3), Some(3));
//! # Ok::<(), BlockMapError>(())
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod map_error;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collective::CollectiveExt;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{
        CollectiveTags, CommTag, Communicator, NoComm, ThreadComm, Wait,
    };
    pub use crate::data::block_map::{
        BlockMap, BlockMapConfig, DistributionMode, DuplicatePolicy, LocalLayout, RemoteEntry,
    };
    pub use crate::data::gid_list::{parse_gids, try_collect_gids};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::map_error::{BlockMapError, ErrorKind};
}
