//! Data module: partition table, directory and the block map itself

pub mod block_map;
pub mod directory;
pub mod gid_list;
pub mod partition;

pub use block_map::{BlockMap, BlockMapConfig, DistributionMode, LocalLayout};
pub use directory::{DuplicatePolicy, RemoteEntry};
