use std::{error::Error, fmt, io};

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, CommErr>;

/// Collective communication failures.
#[derive(Debug)]
pub enum CommErr {
    Io(io::Error),
    RankOutOfRange {
        rank: usize,
        size: usize,
    },
    WorldMismatch {
        rank: usize,
        got: usize,
        expected: usize,
    },
    DuplicateRank(usize),
    LengthMismatch {
        got: usize,
        expected: usize,
    },
    UnexpectedFrame {
        expected: &'static str,
        got: u32,
    },
    Poisoned,
}

impl fmt::Display for CommErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommErr::Io(e) => write!(f, "io error: {e}"),
            CommErr::RankOutOfRange { rank, size } => {
                write!(f, "rank {rank} is out of range for a world of size {size}")
            }
            CommErr::WorldMismatch {
                rank,
                got,
                expected,
            } => write!(
                f,
                "rank {rank} joined with world size {got}, expected {expected}"
            ),
            CommErr::DuplicateRank(rank) => write!(f, "rank {rank} joined the group twice"),
            CommErr::LengthMismatch { got, expected } => write!(
                f,
                "collective buffer length mismatch: got {got}, expected {expected}"
            ),
            CommErr::UnexpectedFrame { expected, got } => {
                write!(f, "expected a {expected} frame, got kind {got}")
            }
            CommErr::Poisoned => write!(
                f,
                "the process group is poisoned, a previous collective failed"
            ),
        }
    }
}

impl Error for CommErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CommErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
