use thiserror::Error;

/// Errors shared across the whole workspace. Every boundary-facing call
/// returns one of these; `code()` gives the stable integer used at the
/// C-ABI boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    #[error("graph is empty")]
    NoGraph,
    #[error("no path")]
    NoPath,
    #[error("unknown cost layer: {0}")]
    NoCost(String),
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    #[error("out of range")]
    OutOfRange,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("numeric error: {0}")]
    NumericError(String),
    #[error("generic error: {0}")]
    GenericError(String),
}

impl Error {
    /// Stable integer code for the C-ABI boundary. Matches the table in
    /// the interface spec; `InvalidArgument` reuses `InvalidPointer`'s slot
    /// (both are precondition violations) and `NumericError` reuses
    /// `GenericError`'s, since neither has its own enumerated slot.
    pub fn code(&self) -> i32 {
        match self {
            Error::NotFound => -1,
            Error::InvalidMesh(_) => -2,
            Error::NoGraph => -3,
            Error::NoPath => -4,
            Error::NoCost(_) => -5,
            Error::MissingDependency(_) => -6,
            Error::OutOfRange => -7,
            Error::InvalidArgument(_) => -8,
            Error::NumericError(_) => 0,
            Error::GenericError(_) => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
