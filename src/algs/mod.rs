//! Communication layer: backends, typed collectives and wire records.

pub mod collective;
pub mod communicator;
pub mod wire;

pub use collective::CollectiveExt;
pub use communicator::Communicator;
