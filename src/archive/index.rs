use std::collections::BTreeMap;

use log::info;

use crate::archive::format::IndexEntry;
use crate::archive::ArchiveDirectory;
use crate::archive::RunId;
use crate::errors::ArchiveError;
use crate::errors::IncompleteLogChain;
use crate::errors::RunBoundaryError;
use crate::types::Lsn;
use crate::types::PageId;

/// Block index of one run: where each block starts and its first page id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIndex {
    pub run_id: RunId,

    /// Non-decreasing in page id, strictly increasing in offset.
    pub entries: Vec<IndexEntry>,

    pub record_count: u64,

    /// Where the blocks end and the index begins in the run file.
    pub index_offset: u64,
}

impl RunIndex {
    /// Offset of the first block that may hold a page in `[first, last]`.
    ///
    /// A page's records may start in the block before the first entry whose
    /// page id is `>= first`, so the probe steps back one entry.
    pub fn probe(&self, first: PageId, last: PageId) -> Option<u64> {
        if self.entries.is_empty() || first > last {
            return None;
        }

        let idx = self.entries.partition_point(|e| e.pid < first);
        let start = idx.saturating_sub(1);

        if self.entries[start].pid > last {
            return None;
        }

        Some(self.entries[start].offset)
    }
}

/// A run and the block offset to start scanning it at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub run_id: RunId,
    pub offset: u64,
}

/// In-memory index over every run of an archive directory, keyed by the run's
/// begin LSN.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    runs: BTreeMap<Lsn, RunIndex>,
}

impl ArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from the runs in `dir`, validating their boundaries.
    pub fn load(dir: &ArchiveDirectory) -> Result<Self, ArchiveError> {
        let run_ids = dir.list_runs()?;
        ArchiveDirectory::validate_runs(&run_ids)?;

        let mut index = Self::new();
        for run_id in run_ids {
            let run = dir.open_run(run_id)?.read_index()?;
            index.runs.insert(run_id.begin, run);
        }

        info!(
            "Archive index loaded: {} runs, covering [{}, {})",
            index.len(),
            index.first_lsn().unwrap_or_default(),
            index.end_lsn().unwrap_or_default()
        );

        Ok(index)
    }

    /// Register a run that continues the runs already indexed.
    pub fn add_run(&mut self, run: RunIndex) -> Result<(), RunBoundaryError> {
        if let Some(end) = self.end_lsn() {
            let begin = run.run_id.begin;
            if end < begin {
                return Err(RunBoundaryError::Hole {
                    prev_end: end,
                    next_begin: begin,
                });
            }
            if end > begin {
                return Err(RunBoundaryError::Overlap {
                    prev_end: end,
                    next_begin: begin,
                });
            }
        }

        self.runs.insert(run.run_id.begin, run);
        Ok(())
    }

    pub fn remove_run(&mut self, run_id: RunId) -> Option<RunIndex> {
        self.runs.remove(&run_id.begin)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> impl Iterator<Item = &RunIndex> {
        self.runs.values()
    }

    pub fn get(&self, run_id: RunId) -> Option<&RunIndex> {
        self.runs.get(&run_id.begin).filter(|r| r.run_id == run_id)
    }

    pub fn first_lsn(&self) -> Option<Lsn> {
        self.runs.values().next().map(|r| r.run_id.begin)
    }

    /// End of the last run: where archiving continues.
    pub fn end_lsn(&self) -> Option<Lsn> {
        self.runs.values().next_back().map(|r| r.run_id.end)
    }

    /// Runs overlapping `[from, until)` that may hold records of pages in
    /// `[first, last]`, in begin LSN order.
    pub fn probe(
        &self,
        first: PageId,
        last: PageId,
        from: Lsn,
        until: Lsn,
    ) -> Vec<ProbeResult> {
        self.runs
            .values()
            .filter(|r| r.run_id.overlaps(from, until))
            .filter_map(|r| {
                r.probe(first, last).map(|offset| ProbeResult {
                    run_id: r.run_id,
                    offset,
                })
            })
            .collect()
    }

    /// Check that the indexed runs cover `[from, until)` without holes.
    pub fn check_coverage(
        &self,
        from: Lsn,
        until: Lsn,
    ) -> Result<(), IncompleteLogChain> {
        if from >= until {
            return Ok(());
        }

        let mut covered = from;
        for r in self.runs.values() {
            if r.run_id.end <= covered {
                continue;
            }
            if r.run_id.begin > covered {
                break;
            }
            covered = r.run_id.end;
            if covered >= until {
                return Ok(());
            }
        }

        Err(IncompleteLogChain::new(
            from,
            until,
            format!("archive runs cover only up to {}", covered),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ArchiveIndex;
    use super::ProbeResult;
    use super::RunIndex;
    use crate::archive::format::IndexEntry;
    use crate::archive::RunId;
    use crate::types::Lsn;
    use crate::types::PageId;

    fn pid(p: u32) -> PageId {
        PageId::new(1, p)
    }

    fn run_index(b: u32, e: u32, entries: &[(u32, u64)]) -> RunIndex {
        RunIndex {
            run_id: RunId::new(Lsn::new(1, b), Lsn::new(1, e)),
            entries: entries
                .iter()
                .map(|(p, off)| IndexEntry::new(pid(*p), *off))
                .collect(),
            record_count: 0,
            index_offset: 0,
        }
    }

    #[test]
    fn test_run_probe() {
        let r = run_index(0, 100, &[(1, 0), (5, 100), (5, 200), (9, 300)]);

        // Before every block
        assert_eq!(None, run_index(0, 100, &[(3, 0)]).probe(pid(1), pid(2)));
        // The page may begin in the block before the first `>=` entry
        assert_eq!(Some(0), r.probe(pid(5), pid(5)));
        assert_eq!(Some(0), r.probe(pid(2), pid(3)));
        assert_eq!(Some(200), r.probe(pid(7), pid(8)));
        assert_eq!(Some(300), r.probe(pid(10), pid(20)));
        assert_eq!(Some(0), r.probe(pid(0), pid(1)));

        assert_eq!(None, run_index(0, 0, &[]).probe(pid(1), pid(1)));
    }

    #[test]
    fn test_add_run_and_probe() {
        let mut index = ArchiveIndex::new();
        index.add_run(run_index(0, 100, &[(1, 0), (4, 50)])).unwrap();
        index.add_run(run_index(100, 200, &[(3, 0)])).unwrap();

        // Hole and overlap are refused
        assert!(index.add_run(run_index(250, 300, &[])).is_err());
        assert!(index.add_run(run_index(150, 300, &[])).is_err());

        assert_eq!(Some(Lsn::new(1, 0)), index.first_lsn());
        assert_eq!(Some(Lsn::new(1, 200)), index.end_lsn());

        let got = index.probe(pid(4), pid(4), Lsn::new(1, 0), Lsn::MAX);
        assert_eq!(
            vec![
                ProbeResult {
                    run_id: RunId::new(Lsn::new(1, 0), Lsn::new(1, 100)),
                    offset: 0
                },
                ProbeResult {
                    run_id: RunId::new(Lsn::new(1, 100), Lsn::new(1, 200)),
                    offset: 0
                },
            ],
            got
        );

        // LSN range restricts the runs
        let got = index.probe(pid(4), pid(4), Lsn::new(1, 100), Lsn::new(1, 150));
        assert_eq!(1, got.len());

        // Page 2 sorts before every block of the second run
        let got = index.probe(pid(2), pid(2), Lsn::new(1, 0), Lsn::MAX);
        assert_eq!(1, got.len());
    }

    #[test]
    fn test_check_coverage() {
        let mut index = ArchiveIndex::new();
        index.add_run(run_index(0, 100, &[])).unwrap();
        index.add_run(run_index(100, 200, &[])).unwrap();

        assert!(index.check_coverage(Lsn::new(1, 0), Lsn::new(1, 200)).is_ok());
        assert!(index.check_coverage(Lsn::new(1, 50), Lsn::new(1, 150)).is_ok());
        assert!(index.check_coverage(Lsn::new(1, 300), Lsn::new(1, 300)).is_ok());

        let err = index
            .check_coverage(Lsn::new(1, 50), Lsn::new(1, 201))
            .unwrap_err();
        assert_eq!(Lsn::new(1, 201), err.until);

        let mut holed = ArchiveIndex::new();
        holed.add_run(run_index(0, 100, &[])).unwrap();
        holed.remove_run(RunId::new(Lsn::new(1, 0), Lsn::new(1, 100)));
        holed.add_run(run_index(100, 200, &[])).unwrap();
        assert!(holed.check_coverage(Lsn::new(1, 0), Lsn::new(1, 200)).is_err());
    }
}
