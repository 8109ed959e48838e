//! BlockMapError: Unified error type for block-map public APIs
//!
//! Every fallible operation in this crate returns `Result<_, BlockMapError>`.
//! Variants carry the offending values so callers can report them; use
//! [`BlockMapError::kind`] to branch on the broad category.

use thiserror::Error;

/// Broad category of a [`BlockMapError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad counts, sizes or element lists passed to a constructor.
    InvalidArgument,
    /// A local, global or point index outside its valid range.
    OutOfRange,
    /// A non-integer entry where a global-ID sequence was expected.
    TypeMismatch,
    /// A peer sent malformed data or never answered.
    Communication,
    /// Writing a report failed.
    Io,
    /// A data structure failed its own consistency checks.
    Internal,
}

/// Unified error type for block-map operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockMapError {
    /// Global element count below the smallest accepted value (`0`, or `-1` where the
    /// constructor computes the count from local counts).
    #[error("invalid number of global elements {value}: must be >= {min}")]
    InvalidGlobalCount { value: i64, min: i64 },
    /// Negative local element count.
    #[error("invalid number of local elements {0}: must be >= 0")]
    NegativeLocalCount(i64),
    /// Uniform element size was zero or negative.
    #[error("invalid element size {0}: must be > 0")]
    NonPositiveElementSize(i64),
    /// One entry of a per-element size list was zero or negative.
    #[error("invalid element size {size} for local element {lid}: must be > 0")]
    NonPositiveElementSizeAt { lid: usize, size: i64 },
    /// Per-element size list length differs from the GID list length.
    #[error("element size list has {sizes} entries but {elements} global elements were given")]
    SizeListLengthMismatch { elements: usize, sizes: usize },
    /// Supplied global count disagrees with the sum of local counts.
    #[error("number of global elements {supplied} does not match the sum of local counts {actual}")]
    GlobalCountMismatch { supplied: i64, actual: i64 },
    /// A GID lies below the index base.
    #[error("global ID {gid} is below the index base {index_base}")]
    GidBelowIndexBase { gid: i64, index_base: i64 },
    /// The same GID appears twice in one process's element list.
    #[error("global ID {0} appears more than once in the local element list")]
    DuplicateGid(i64),
    /// Ranks of a constant-size map passed different element sizes.
    #[error("element size differs between ranks: smallest {min}, largest {max}")]
    ElementSizeMismatch { min: usize, max: usize },
    /// Some ranks described a constant-size map and others a variable-size one.
    #[error("{constant} of {ranks} ranks use a constant element size")]
    MixedElementSizeKinds { constant: usize, ranks: usize },
    /// Number of points does not fit in `usize`.
    #[error("{elements} elements of size {size} overflow the point count")]
    PointCountOverflow { elements: usize, size: usize },
    /// Another rank rejected its own construction arguments.
    #[error("rank {rank} rejected its construction arguments")]
    PeerInvalidArgument { rank: usize },
    /// Directory build found GIDs owned by more than one process under
    /// [`DuplicatePolicy::Reject`](crate::data::directory::DuplicatePolicy::Reject).
    #[error("{count} global ID(s) are owned by more than one process")]
    MultipleOwners { count: usize },
    /// Local index outside `[0, NumMyElements)`.
    #[error("local index {lid} out of range (local element count {len})")]
    LidOutOfRange { lid: usize, len: usize },
    /// Point index outside `[0, NumMyPoints)`.
    #[error("point index {point} out of range (local point count {len})")]
    PointOutOfRange { point: usize, len: usize },
    /// A global-ID entry could not be read as an integer.
    #[error("entry {position} ({value}) is not an integer global ID")]
    NotAnInteger { position: usize, value: String },
    /// Communication with a peer failed.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// Received a buffer whose size does not match the expected record layout.
    #[error("buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// Writing the textual report failed.
    #[error("failed to write report: {0}")]
    Io(String),
    /// Internal consistency check failed.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl BlockMapError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        use BlockMapError::*;
        match self {
            InvalidGlobalCount { .. }
            | NegativeLocalCount(_)
            | NonPositiveElementSize(_)
            | NonPositiveElementSizeAt { .. }
            | SizeListLengthMismatch { .. }
            | GlobalCountMismatch { .. }
            | GidBelowIndexBase { .. }
            | DuplicateGid(_)
            | ElementSizeMismatch { .. }
            | MixedElementSizeKinds { .. }
            | PointCountOverflow { .. }
            | PeerInvalidArgument { .. }
            | MultipleOwners { .. } => ErrorKind::InvalidArgument,
            LidOutOfRange { .. } | PointOutOfRange { .. } => ErrorKind::OutOfRange,
            NotAnInteger { .. } => ErrorKind::TypeMismatch,
            CommError { .. } | BufferSizeMismatch { .. } => ErrorKind::Communication,
            Io(_) => ErrorKind::Io,
            InvariantViolation(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for BlockMapError {
    fn from(err: std::io::Error) -> Self {
        BlockMapError::Io(err.to_string())
    }
}
