use std::{
    error::Error,
    fmt::{self, Display},
    time::Duration,
};

/// The result type used by the parameter server.
pub type Result<T> = std::result::Result<T, SyncErr>;

/// Errors surfaced to a worker by a pull, a push or a cohort barrier.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncErr {
    /// A barrier wasn't released in time, the arrival was withdrawn.
    Timeout { waited: Duration },
    /// The rank left the cohort or never belonged to it.
    Detached { rank: usize },
    /// Every rank of the cohort was already handed out.
    Full { workers: usize },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

impl Display for SyncErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncErr::Timeout { waited } => write!(f, "barrier timed out after {waited:?}"),
            SyncErr::Detached { rank } => write!(f, "worker {rank} is not part of the cohort"),
            SyncErr::Full { workers } => write!(f, "the cohort is full, all {workers} ranks were assigned"),
            SyncErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
        }
    }
}

impl Error for SyncErr {}
