//! Reading records back out of archive runs.
//!
//! [`RunScanner`] reads one run, [`MergeScanner`] merges several runs into one
//! ordered stream and [`ArchiveScanner`] picks the runs to read, either all of
//! them or only those the index says may hold a page range.

use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::vec;

use log::debug;

use crate::archive::ArchiveDirectory;
use crate::archive::ArchiveIndex;
use crate::archive::ProbeResult;
use crate::archive::RunId;
use crate::archive::RunReader;
use crate::errors::ArchiveError;
use crate::errors::PageNotArchived;
use crate::record::codec;
use crate::record::LogRecord;
use crate::types::Lsn;
use crate::types::PageId;

/// Order of the records produced by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// By `(page id, lsn)`: the order records are stored in a run.
    #[default]
    Page,

    /// By LSN: the order records were written to the log.
    Lsn,
}

/// A stream of records, as produced by every scanner in this module.
pub type RecordStream = Box<dyn Iterator<Item = Result<LogRecord, io::Error>> + Send>;

/// Iterates the records of one run in `(page id, lsn)` order.
pub struct RunScanner {
    reader: RunReader,
    max_record_size: usize,

    pages: Option<(PageId, PageId)>,
    from: Lsn,
    until: Lsn,

    block: Vec<u8>,
    pos: usize,

    /// Offset of the next block to load; `None` at the end of the run.
    next_block: Option<u64>,
    done: bool,
}

impl fmt::Debug for RunScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScanner")
            .field("run_id", &self.reader.run_id())
            .field("pages", &self.pages)
            .field("next_block", &self.next_block)
            .finish()
    }
}

impl RunScanner {
    pub fn open(dir: &ArchiveDirectory, run_id: RunId) -> Result<Self, io::Error> {
        let reader = dir.open_run(run_id)?;

        Ok(Self {
            reader,
            max_record_size: dir.config().max_record_size(),
            pages: None,
            from: Lsn::NULL,
            until: Lsn::MAX,
            block: Vec::with_capacity(dir.config().read_buffer_size()),
            pos: 0,
            next_block: Some(0),
            done: false,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.reader.run_id()
    }

    /// Only yield pages in `[first, last]`, starting at the block at
    /// `offset`, as found by [`RunIndex::probe`](crate::archive::RunIndex::probe).
    pub fn with_pages(mut self, first: PageId, last: PageId, offset: u64) -> Self {
        self.pages = Some((first, last));
        self.next_block = Some(offset);
        self
    }

    /// Only yield records with an LSN in `[from, until)`.
    pub fn with_lsn_range(mut self, from: Lsn, until: Lsn) -> Self {
        self.from = from;
        self.until = until;
        self
    }

    /// Read the selected records and sort them by LSN.
    ///
    /// A run is bounded by the archiver workspace, so it fits in memory.
    pub fn sorted_by_lsn(self) -> Result<Vec<LogRecord>, io::Error> {
        let mut records = self.collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.lsn());
        Ok(records)
    }

    pub fn next_record(&mut self) -> Result<Option<LogRecord>, io::Error> {
        loop {
            if self.done {
                return Ok(None);
            }

            if self.pos >= self.block.len() {
                let Some(offset) = self.next_block else {
                    self.done = true;
                    return Ok(None);
                };

                self.next_block = self.reader.read_block(offset, &mut self.block)?;
                self.pos = 0;

                if self.next_block.is_none() {
                    self.done = true;
                    return Ok(None);
                }
                continue;
            }

            let rest = &self.block[self.pos..];
            let rec = codec::decode(rest, self.max_record_size)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "incomplete record at block position {} of {}",
                        self.pos,
                        self.reader.run_id()
                    ),
                )
            })?;
            self.pos += rec.len();

            if let Some((first, last)) = self.pages {
                let pid = rec.page_id();
                if pid < first {
                    continue;
                }
                if pid > last {
                    self.done = true;
                    return Ok(None);
                }
            }

            if rec.lsn() < self.from || rec.lsn() >= self.until {
                continue;
            }

            return Ok(Some(rec.to_record()));
        }
    }
}

impl Iterator for RunScanner {
    type Item = Result<LogRecord, io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Head record of one merge input.
struct Head {
    key: (PageId, Lsn, usize),
    rec: LogRecord,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// K-way merge of record streams that are each sorted in `order`.
///
/// Equal keys are yielded from the input with the lower begin LSN first.
pub struct MergeScanner {
    order: ScanOrder,
    inputs: Vec<RecordStream>,
    heap: BinaryHeap<Reverse<Head>>,

    /// Error from refilling an input, returned after the record popped
    /// before it.
    pending_error: Option<io::Error>,
    failed: bool,
}

impl fmt::Debug for MergeScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeScanner")
            .field("order", &self.order)
            .field("inputs", &self.inputs.len())
            .field("heads", &self.heap.len())
            .finish()
    }
}

impl MergeScanner {
    /// Build a merge over `inputs`, each tagged with the begin LSN of its run.
    pub fn new(
        order: ScanOrder,
        mut inputs: Vec<(Lsn, RecordStream)>,
    ) -> Result<Self, io::Error> {
        inputs.sort_by_key(|(begin, _)| *begin);

        let mut m = Self {
            order,
            inputs: inputs.into_iter().map(|(_, s)| s).collect(),
            heap: BinaryHeap::new(),
            pending_error: None,
            failed: false,
        };

        for i in 0..m.inputs.len() {
            m.refill(i)?;
        }

        Ok(m)
    }

    pub fn order(&self) -> ScanOrder {
        self.order
    }

    fn refill(&mut self, i: usize) -> Result<(), io::Error> {
        let Some(res) = self.inputs[i].next() else {
            return Ok(());
        };
        let rec = res?;

        let key = match self.order {
            ScanOrder::Page => (rec.page_id(), rec.lsn(), i),
            ScanOrder::Lsn => (PageId::NULL, rec.lsn(), i),
        };
        self.heap.push(Reverse(Head { key, rec }));
        Ok(())
    }
}

impl Iterator for MergeScanner {
    type Item = Result<LogRecord, io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }

        if self.failed {
            return None;
        }

        let Reverse(head) = self.heap.pop()?;

        if let Err(e) = self.refill(head.key.2) {
            self.failed = true;
            self.pending_error = Some(e);
        }

        Some(Ok(head.rec))
    }
}

/// Chooses and opens the runs a scan has to read.
#[derive(Debug, Clone)]
pub struct ArchiveScanner {
    dir: Arc<ArchiveDirectory>,
    index: Arc<RwLock<ArchiveIndex>>,
}

impl ArchiveScanner {
    pub fn new(dir: Arc<ArchiveDirectory>, index: Arc<RwLock<ArchiveIndex>>) -> Self {
        Self { dir, index }
    }

    pub fn directory(&self) -> &Arc<ArchiveDirectory> {
        &self.dir
    }

    pub fn index(&self) -> &Arc<RwLock<ArchiveIndex>> {
        &self.index
    }

    /// Merge every run in the directory.
    ///
    /// Fails with [`RunBoundaryError`](crate::errors::RunBoundaryError) if the
    /// runs do not form a gapless sequence.
    ///
    /// In LSN order the runs do not overlap, so they are read one after
    /// another and only the run being read is held in memory.
    pub fn scan_all(&self, order: ScanOrder) -> Result<MergeScanner, ArchiveError> {
        let runs = self.dir.list_runs()?;
        ArchiveDirectory::validate_runs(&runs)?;

        let inputs = match order {
            ScanOrder::Page => {
                let mut inputs = Vec::with_capacity(runs.len());
                for run_id in runs {
                    let scanner = RunScanner::open(&self.dir, run_id)?;
                    inputs.push((run_id.begin, Box::new(scanner) as RecordStream));
                }
                inputs
            }
            ScanOrder::Lsn => match runs.first().map(|r| r.begin) {
                None => vec![],
                Some(begin) => {
                    let chain = RunChain::new(self.dir.clone(), runs);
                    vec![(begin, Box::new(chain) as RecordStream)]
                }
            },
        };

        Ok(MergeScanner::new(order, inputs)?)
    }

    /// Merge the records of pages `[first, last]` with an LSN in
    /// `[from, until)`, in `(page id, lsn)` order.
    ///
    /// Only runs the index reports for the range are opened, each starting at
    /// the probed block.
    pub fn scan_pages(
        &self,
        first: PageId,
        last: PageId,
        from: Lsn,
        until: Lsn,
    ) -> Result<MergeScanner, ArchiveError> {
        let probes = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            index.probe(first, last, from, until)
        };

        debug!(
            "scan pages [{}, {}] in [{}, {}): {} runs",
            first,
            last,
            from,
            until,
            probes.len()
        );

        let mut inputs = Vec::with_capacity(probes.len());
        for p in probes {
            let scanner = RunScanner::open(&self.dir, p.run_id)?
                .with_pages(first, last, p.offset)
                .with_lsn_range(from, until);
            inputs.push((p.run_id.begin, Box::new(scanner) as RecordStream));
        }

        Ok(MergeScanner::new(ScanOrder::Page, inputs)?)
    }

    /// Runs that may hold records of `pid` in `[from, until)`, with the
    /// offset of the block to start reading at.
    ///
    /// Fails with [`PageNotArchived`] if there is none, e.g. for a page that
    /// was never touched.
    pub fn probe_page(
        &self,
        pid: PageId,
        from: Lsn,
        until: Lsn,
    ) -> Result<Vec<ProbeResult>, PageNotArchived> {
        let probes = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            index.probe(pid, pid, from, until)
        };

        if probes.is_empty() {
            return Err(PageNotArchived::new(pid));
        }
        Ok(probes)
    }
}

/// Consecutive runs read in LSN order, one run at a time.
///
/// A run is opened and sorted only when the previous one is used up.
struct RunChain {
    dir: Arc<ArchiveDirectory>,
    runs: vec::IntoIter<RunId>,
    current: vec::IntoIter<LogRecord>,
    failed: bool,
}

impl RunChain {
    fn new(dir: Arc<ArchiveDirectory>, runs: Vec<RunId>) -> Self {
        Self {
            dir,
            runs: runs.into_iter(),
            current: Vec::new().into_iter(),
            failed: false,
        }
    }

    fn load(&self, run_id: RunId) -> Result<Vec<LogRecord>, io::Error> {
        let records = RunScanner::open(&self.dir, run_id)?.sorted_by_lsn()?;
        debug!("load run {} for LSN scan: {} records", run_id, records.len());
        Ok(records)
    }
}

impl Iterator for RunChain {
    type Item = Result<LogRecord, io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rec) = self.current.next() {
                return Some(Ok(rec));
            }

            if self.failed {
                return None;
            }

            let run_id = self.runs.next()?;
            match self.load(run_id) {
                Ok(records) => self.current = records.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
