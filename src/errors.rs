mod storage_errors;

use std::io;

pub use storage_errors::InvalidRunFileName;
pub use storage_errors::RunBoundaryError;

use crate::types::Lsn;
use crate::types::PageId;

/// Every error the archive and restore operations can report.
///
/// The variants map one to one onto the failure classes operators need to
/// tell apart: I/O trouble may be transient, the others are not.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Parse(#[from] RecordParseError),

    #[error(transparent)]
    RunBoundary(#[from] RunBoundaryError),

    #[error(transparent)]
    InvalidRunFileName(#[from] InvalidRunFileName),

    #[error(transparent)]
    NotFound(#[from] PageNotArchived),

    #[error(transparent)]
    IncompleteLogChain(#[from] IncompleteLogChain),

    #[error(transparent)]
    Stopped(#[from] ArchiverStopped),

    #[error(transparent)]
    ProtocolMisuse(#[from] ProtocolMisuse),

    #[error(transparent)]
    Config(#[from] InvalidConfig),
}

impl ArchiveError {
    /// Whether retrying the operation can never succeed because log history
    /// is missing or corrupt.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            ArchiveError::Parse(_)
                | ArchiveError::RunBoundary(_)
                | ArchiveError::IncompleteLogChain(_)
        )
    }
}

impl From<ArchiveError> for io::Error {
    fn from(value: ArchiveError) -> Self {
        match value {
            ArchiveError::Io(e) => e,
            ArchiveError::NotFound(e) => {
                io::Error::new(io::ErrorKind::NotFound, e.to_string())
            }
            ArchiveError::Stopped(e) => {
                io::Error::new(io::ErrorKind::BrokenPipe, e.to_string())
            }
            ArchiveError::ProtocolMisuse(e) => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            ArchiveError::Config(e) => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// A log record header that cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum RecordParseError {
    #[error("Corrupt log record length {length} at {at}: must be in [{min}, {max}]")]
    CorruptLength {
        at: Lsn,
        length: u32,
        min: usize,
        max: usize,
    },

    #[error("Unknown log record kind {kind} at {at}")]
    UnknownKind { at: Lsn, kind: u8 },

    #[error("Log record LSN mismatch: expected {expected}, found {found}")]
    LsnMismatch { expected: Lsn, found: Lsn },
}

impl From<RecordParseError> for io::Error {
    fn from(value: RecordParseError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

/// A probe found no archived record for a page.
///
/// For a plain probe this just means the page was never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("No archived log records for page {pid}")]
pub struct PageNotArchived {
    pub pid: PageId,
}

impl PageNotArchived {
    pub fn new(pid: PageId) -> Self {
        Self { pid }
    }
}

/// The archive does not hold every record needed to rebuild pages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Incomplete log chain: need [{from}, {until}) archived: {reason}")]
pub struct IncompleteLogChain {
    pub from: Lsn,
    pub until: Lsn,
    pub reason: String,
}

impl IncompleteLogChain {
    pub fn new(from: Lsn, until: Lsn, reason: impl ToString) -> Self {
        Self {
            from,
            until,
            reason: reason.to_string(),
        }
    }
}

/// The archiver no longer accepts requests.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Log archiver stopped: {reason}")]
pub struct ArchiverStopped {
    pub reason: String,
}

impl ArchiverStopped {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// An API was used out of order, e.g. starting a second archiver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Protocol misuse: {what}")]
pub struct ProtocolMisuse {
    pub what: String,
}

impl ProtocolMisuse {
    pub fn new(what: impl ToString) -> Self {
        Self {
            what: what.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Invalid config: {reason}")]
pub struct InvalidConfig {
    pub reason: String,
}

impl InvalidConfig {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}
