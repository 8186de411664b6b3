use std::io;

use crate::archive::ArchiveDirectory;
use crate::archive::RunId;
use crate::archive::RunIndex;
use crate::record::LogRecordRef;
use crate::types::Lsn;
use crate::types::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Idle,
    Filling,
    Flushing,
}

/// Sort key of a record in the arena and where its bytes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    pid: PageId,
    lsn: Lsn,
    offset: usize,
    len: usize,
}

/// Bounded arena that collects the page records of one archiving window and
/// writes them out as one run sorted by `(page id, lsn)`.
#[derive(Debug)]
pub struct ArchiverWorkspace {
    capacity: usize,
    arena: Vec<u8>,
    keys: Vec<Key>,
    state: WorkspaceState,
}

impl ArchiverWorkspace {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            arena: Vec::with_capacity(capacity),
            keys: vec![],
            state: WorkspaceState::Idle,
        }
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of records held.
    pub fn size(&self) -> usize {
        self.arena.len()
    }

    pub fn record_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Copy `rec` into the arena.
    ///
    /// Returns `false` if it does not fit; the caller flushes the workspace
    /// and inserts again.
    pub fn insert(&mut self, rec: LogRecordRef<'_>) -> bool {
        debug_assert_ne!(self.state, WorkspaceState::Flushing);

        if self.arena.len() + rec.len() > self.capacity {
            return false;
        }

        self.keys.push(Key {
            pid: rec.page_id(),
            lsn: rec.lsn(),
            offset: self.arena.len(),
            len: rec.len(),
        });
        self.arena.extend_from_slice(rec.as_bytes());
        self.state = WorkspaceState::Filling;

        true
    }

    /// Sort the held records and write them as run `run_id`, then empty the
    /// workspace.
    ///
    /// On error the records are kept and the state stays `Flushing`.
    pub fn flush_to(
        &mut self,
        dir: &ArchiveDirectory,
        run_id: RunId,
    ) -> Result<RunIndex, io::Error> {
        self.state = WorkspaceState::Flushing;

        self.keys.sort_unstable();

        let mut w = dir.create_run(run_id)?;
        for k in &self.keys {
            let bytes = &self.arena[k.offset..k.offset + k.len];
            w.append(LogRecordRef::new_unchecked(bytes))?;
        }
        let run = w.finish()?;

        self.arena.clear();
        self.keys.clear();
        self.state = WorkspaceState::Idle;

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::ArchiverWorkspace;
    use super::WorkspaceState;
    use crate::archive::ArchiveDirectory;
    use crate::archive::RunId;
    use crate::archive::RunScanner;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::types::Lsn;
    use crate::types::PageId;
    use crate::Config;

    fn rec(page: u32, off: u32) -> LogRecord {
        LogRecord::new(RecordKind::PageUpdate, PageId::new(1, page), 0, &[page as u8; 8])
            .with_lsn(Lsn::new(1, off))
    }

    #[test]
    fn test_insert_until_full() {
        // 40 bytes per record
        let mut ws = ArchiverWorkspace::new(100);
        assert_eq!(WorkspaceState::Idle, ws.state());

        assert!(ws.insert(rec(1, 0).view()));
        assert!(ws.insert(rec(2, 40).view()));
        assert_eq!(WorkspaceState::Filling, ws.state());

        assert!(!ws.insert(rec(3, 80).view()));
        assert_eq!(2, ws.record_count());
        assert_eq!(80, ws.size());
    }

    #[test]
    fn test_flush_sorted() -> Result<(), io::Error> {
        let temp = tempfile::tempdir()?;
        let config = Arc::new(Config {
            block_size: Some(64),
            ..Config::new(temp.path().to_string_lossy(), "log")
        });
        let dir = ArchiveDirectory::open(config)?;

        let mut ws = ArchiverWorkspace::new(1024);
        for (page, off) in [(3, 0), (1, 40), (3, 80), (2, 120), (1, 160)] {
            assert!(ws.insert(rec(page, off).view()));
        }

        let run_id = RunId::new(Lsn::new(1, 0), Lsn::new(1, 200));
        let run = ws.flush_to(&dir, run_id)?;

        assert_eq!(WorkspaceState::Idle, ws.state());
        assert!(ws.is_empty());
        assert_eq!(5, run.record_count);

        let got = RunScanner::open(&dir, run_id)?
            .map(|r| r.map(|r| (r.page_id().page, r.lsn().offset())))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(vec![(1, 40), (1, 160), (2, 120), (3, 0), (3, 80)], got);

        // One record per 64 byte block
        assert_eq!(5, run.entries.len());

        Ok(())
    }
}
