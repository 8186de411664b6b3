use std::fmt;
use std::fmt::Formatter;

use crate::num::format_pad9_u64;
use crate::types::Lsn;

/// Counters of a log archiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiverStat {
    /// Number of runs written
    pub runs_written: u64,
    /// Number of page records written into runs
    pub records_archived: u64,
    /// Bytes of page records written into runs
    pub bytes_archived: u64,
    /// Number of records read from the log, page records or not
    pub records_scanned: u64,
    /// Every record before this LSN is in a durable run
    pub next_consumed_lsn: Lsn,
    /// Highest activation target requested so far
    pub requested_lsn: Lsn,
}

impl fmt::Display for ArchiverStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ArchiverStat{{runs: {}, records: {}, bytes: {}, scanned: {}, next_consumed: {}, requested: {}}}",
            self.runs_written,
            format_pad9_u64(self.records_archived),
            format_pad9_u64(self.bytes_archived),
            format_pad9_u64(self.records_scanned),
            self.next_consumed_lsn,
            self.requested_lsn,
        )
    }
}
