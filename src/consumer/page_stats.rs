use std::collections::BTreeMap;
use std::fmt;
use std::io;

use crate::consumer::LogConsumer;
use crate::record::LogRecordRef;
use crate::types::Lsn;
use crate::types::PageId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStat {
    pub records: u64,
    pub bytes: u64,
    pub first_lsn: Lsn,
    pub last_lsn: Lsn,
}

impl fmt::Display for PageStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} volume={} lsn=[{}, {}]",
            self.records, self.bytes, self.first_lsn, self.last_lsn
        )
    }
}

/// Number of records and bytes of log per page.
///
/// Records without a page id are not counted.
#[derive(Debug, Default)]
pub struct PageStatsConsumer {
    pages: BTreeMap<PageId, PageStat>,
}

impl PageStatsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> &BTreeMap<PageId, PageStat> {
        &self.pages
    }

    pub fn get(&self, pid: PageId) -> Option<&PageStat> {
        self.pages.get(&pid)
    }

    pub fn write_to<W: io::Write>(&self, mut w: W) -> Result<(), io::Error> {
        for (pid, stat) in &self.pages {
            writeln!(w, "pid={} {}", pid, stat)?;
        }
        writeln!(w, "TOTAL_PAGES={}", self.pages.len())
    }
}

impl LogConsumer for PageStatsConsumer {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        if rec.null_pid() {
            return Ok(());
        }

        let stat = self.pages.entry(rec.page_id()).or_insert_with(|| PageStat {
            first_lsn: rec.lsn(),
            ..Default::default()
        });

        stat.records += 1;
        stat.bytes += rec.len() as u64;
        stat.first_lsn = std::cmp::min(stat.first_lsn, rec.lsn());
        stat.last_lsn = std::cmp::max(stat.last_lsn, rec.lsn());

        Ok(())
    }
}
