use std::{error::Error, fmt, io};

use machine_learning::MlErr;
use parameter_server::SyncErr;

use crate::config::ConfigErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures, any of them aborts the epoch in progress.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Config(ConfigErr),
    Ml(MlErr),
    Sync(SyncErr),
    /// A server answered out of protocol.
    Protocol {
        expected: &'static str,
        got: String,
    },
    /// The cancellation signal was observed between two rounds.
    Cancelled {
        epoch: usize,
    },
    /// A worker thread panicked.
    Join(String),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Config(e) => write!(f, "configuration error: {e}"),
            WorkerErr::Ml(e) => write!(f, "model error: {e}"),
            WorkerErr::Sync(e) => write!(f, "synchronization error: {e}"),
            WorkerErr::Protocol { expected, got } => {
                write!(f, "protocol error: expected {expected}, got {got}")
            }
            WorkerErr::Cancelled { epoch } => write!(f, "cancelled during epoch {epoch}"),
            WorkerErr::Join(e) => write!(f, "worker thread failed: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Config(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            WorkerErr::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigErr> for WorkerErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<SyncErr> for WorkerErr {
    fn from(value: SyncErr) -> Self {
        Self::Sync(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
