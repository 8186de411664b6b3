use crate::types::Lsn;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Invalid archive run file name: {bad_file_name}: {reason}")]
pub struct InvalidRunFileName {
    pub bad_file_name: String,
    pub reason: String,
}

impl InvalidRunFileName {
    pub fn new(bad_file_name: impl ToString, reason: impl ToString) -> Self {
        Self {
            bad_file_name: bad_file_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The set of runs in an archive directory is not a gapless cover of the log.
///
/// Nothing can repair this short of re-archiving the affected log range.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum RunBoundaryError {
    #[error("Hole found in run boundaries: previous run ends at {prev_end}, next run begins at {next_begin}")]
    Hole { prev_end: Lsn, next_begin: Lsn },

    #[error("Overlapping runs: previous run ends at {prev_end}, next run begins at {next_begin}")]
    Overlap { prev_end: Lsn, next_begin: Lsn },
}
