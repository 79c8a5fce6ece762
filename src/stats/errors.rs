use crate::stats::PieceIndex;
use thiserror::Error;

/// The stats extension specific result type
pub type Result<T> = std::result::Result<T, Error>;

/// The errors which may occur while exchanging stats with a peer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Indicates that a payload couldn't be parsed
    #[error("failed to parse stats payload, {0}")]
    Parsing(String),
    /// Indicates that an invalid stats size has been declared
    #[error("stats size {0} is invalid")]
    InvalidSize(usize),
    /// Indicates that a declared stats size exceeds the configured maximum
    #[error("stats size of {0} bytes exceeds the maximum of {1} bytes")]
    TooLarge(usize, usize),
    /// Indicates that the stats size has already been declared
    #[error("the stats size has already been declared")]
    AlreadyDeclared,
    /// Indicates that a piece index is outside of the declared range
    #[error("piece index {0} is out of range")]
    OutOfRange(PieceIndex),
    /// Indicates that a piece payload exceeds the piece size
    #[error("piece payload of {0} bytes exceeds the piece size")]
    OversizedPiece(usize),
    /// Indicates that the remote peer doesn't support the stats extension
    #[error("the remote peer doesn't support the stats extension")]
    UnsupportedExtension,
    /// Indicates that the remote peer didn't advertise any stats
    #[error("the remote peer didn't advertise any stats")]
    MissingStatsSize,
    /// Indicates that the identity of the remote peer is unknown
    #[error("the identity of the remote peer is unknown")]
    MissingPeerId,
    /// Indicates that the retry budget of the session has been exhausted
    #[error("the stats retry budget has been exhausted")]
    RetriesExhausted,
    /// Indicates that an io error occurred
    #[error("an io error occurred, {0}")]
    Io(String),
}

impl From<serde_bencode::error::Error> for Error {
    fn from(error: serde_bencode::error::Error) -> Self {
        Self::Parsing(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
