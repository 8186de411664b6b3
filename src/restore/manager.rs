use std::cmp::min;
use std::fmt;
use std::io;
use std::iter::Peekable;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread::JoinHandle;

use log::debug;
use log::error;
use log::info;

use crate::archive::ArchiveScanner;
use crate::archive::MergeScanner;
use crate::config::SweepScheduler;
use crate::errors::ArchiveError;
use crate::errors::IncompleteLogChain;
use crate::errors::InvalidConfig;
use crate::errors::ProtocolMisuse;
use crate::restore::backup::BackupImage;
use crate::restore::page::Page;
use crate::restore::redo::RedoApplier;
use crate::restore::segment::Claim;
use crate::restore::segment::Segment;
use crate::restore::volume::Volume;
use crate::types::Lsn;
use crate::types::PageId;
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    NotStarted,
    InProgress,
    Done,
    Failed,
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How page requests are served while the sweep is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Reconstruct a requested page right away.
    Instant,

    /// Wait for the sweep to reach the requested page.
    Eager,
}

#[derive(Debug, Clone)]
enum Failure {
    Chain(IncompleteLogChain),
    Other(String),
}

impl Failure {
    fn to_error(&self) -> ArchiveError {
        match self {
            Failure::Chain(e) => e.clone().into(),
            Failure::Other(reason) => io::Error::new(
                io::ErrorKind::Other,
                format!("restore failed: {}", reason),
            )
            .into(),
        }
    }
}

#[derive(Debug)]
struct Progress {
    state: RestoreState,
    failure: Option<Failure>,
}

struct RestoreInner {
    scanner: ArchiveScanner,
    volume: Arc<dyn Volume>,
    backup: Option<BackupImage>,
    redo: Arc<dyn RedoApplier>,

    base_lsn: Lsn,
    failure_lsn: Lsn,
    mode: RestoreMode,
    scheduler: SweepScheduler,

    segment_size: u32,
    segments: Vec<Segment>,

    progress: Mutex<Progress>,
    stop: AtomicBool,
    reconstructions: AtomicU64,
}

/// Rebuilds the pages of a failed volume from a base image and the archive.
///
/// Every page is rebuilt from its base image (the backup, or a zeroed page)
/// by applying its archived records in `[base lsn, failure lsn)`. A
/// background sweep restores the whole volume; in [`RestoreMode::Instant`]
/// requested pages are rebuilt on the calling thread before the sweep gets
/// to them. Per-segment bitmaps make sure each page is rebuilt once.
pub struct RestoreManager {
    inner: Arc<RestoreInner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RestoreManager {
    pub fn new(
        config: &Config,
        scanner: ArchiveScanner,
        volume: Arc<dyn Volume>,
        backup: Option<BackupImage>,
        redo: Arc<dyn RedoApplier>,
        failure_lsn: Lsn,
    ) -> Result<Self, ArchiveError> {
        if let Some(b) = &backup {
            if b.page_size() != volume.page_size() || b.page_count() > volume.page_count() {
                return Err(InvalidConfig::new(format!(
                    "backup {} with {} pages of {} bytes does not fit volume {} with {} pages of {} bytes",
                    b.path().display(),
                    b.page_count(),
                    b.page_size(),
                    volume.vol_id(),
                    volume.page_count(),
                    volume.page_size()
                ))
                .into());
            }
        }

        let base_lsn = match &backup {
            Some(b) => b.lsn(),
            None => {
                let index = scanner.index().read().unwrap_or_else(PoisonError::into_inner);
                index.first_lsn().unwrap_or_default()
            }
        };

        let mode = if config.restore_instant() {
            RestoreMode::Instant
        } else {
            RestoreMode::Eager
        };

        let segment_size = config.restore_segment_size();
        let mut segments = vec![];
        let mut first = 0;
        while first < volume.page_count() {
            let n = min(segment_size, volume.page_count() - first);
            segments.push(Segment::new(first, n));
            first += n;
        }

        let inner = RestoreInner {
            scanner,
            volume,
            backup,
            redo,
            base_lsn,
            failure_lsn,
            mode,
            scheduler: config.restore_scheduler(),
            segment_size,
            segments,
            progress: Mutex::new(Progress {
                state: RestoreState::NotStarted,
                failure: None,
            }),
            stop: AtomicBool::new(false),
            reconstructions: AtomicU64::new(0),
        };

        Ok(Self {
            inner: Arc::new(inner),
            sweeper: Mutex::new(None),
        })
    }

    /// Mark the volume failed and start the sweep.
    ///
    /// Fails with [`IncompleteLogChain`] if the archive does not cover
    /// `[base lsn, failure lsn)`.
    pub fn start(&self) -> Result<(), ArchiveError> {
        let inner = &self.inner;

        {
            let mut p = inner.lock_progress();
            if p.state != RestoreState::NotStarted {
                return Err(ProtocolMisuse::new(format!(
                    "restore of volume {} is already {}",
                    inner.volume.vol_id(),
                    p.state
                ))
                .into());
            }

            let coverage = {
                let index = inner.scanner.index().read().unwrap_or_else(PoisonError::into_inner);
                index.check_coverage(inner.base_lsn, inner.failure_lsn)
            };

            if let Err(e) = coverage {
                error!("Restore of volume {} impossible: {}", inner.volume.vol_id(), e);
                p.state = RestoreState::Failed;
                p.failure = Some(Failure::Chain(e.clone()));
                return Err(e.into());
            }

            p.state = RestoreState::InProgress;
        }

        inner.volume.mark_failed();

        info!(
            "Restore of volume {} started: pages: {}, lsn: [{}, {}), mode: {:?}, scheduler: {:?}",
            inner.volume.vol_id(),
            inner.volume.page_count(),
            inner.base_lsn,
            inner.failure_lsn,
            inner.mode,
            inner.scheduler
        );

        let sweeping = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("restore_sweep".to_string())
            .spawn(move || sweeping.run_sweep())?;

        *self.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Return the restored content of `page`.
    ///
    /// In instant mode a page the sweep has not reached yet is rebuilt on the
    /// calling thread; in eager mode the call waits for the sweep.
    pub fn fetch_page(&self, page: u32) -> Result<Page, ArchiveError> {
        let inner = &self.inner;
        inner.check_page(page)?;

        match inner.state() {
            RestoreState::NotStarted => {
                return Err(ProtocolMisuse::new("fetch_page() before start()").into());
            }
            RestoreState::Failed => return Err(inner.failure_error()),
            RestoreState::Done => return Ok(inner.volume.read_page(page)?),
            RestoreState::InProgress => {}
        }

        match inner.mode {
            RestoreMode::Instant => {
                if !inner.segment_of(page).is_restored(page) {
                    inner.restore_range(page, page)?;
                }
            }
            RestoreMode::Eager => {
                let seg = inner.segment_of(page);
                let restored = seg.wait_restored(page, || inner.is_stopped());
                if !restored {
                    return Err(inner.failure_error());
                }
            }
        }

        Ok(inner.volume.read_page(page)?)
    }

    /// Rebuild `page` now unless it is already restored, whatever the mode.
    ///
    /// Returns whether this call rebuilt it.
    pub fn restore_page(&self, page: u32) -> Result<bool, ArchiveError> {
        let inner = &self.inner;
        inner.check_page(page)?;

        if inner.state() == RestoreState::NotStarted {
            return Err(ProtocolMisuse::new("restore_page() before start()").into());
        }

        Ok(inner.restore_range(page, page)? > 0)
    }

    /// Wait for the sweep to finish.
    pub fn wait(&self) -> Result<(), ArchiveError> {
        let handle = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(h) = handle {
            h.join().map_err(|_| {
                io::Error::new(io::ErrorKind::Other, "restore sweep panicked")
            })?;
        }

        match self.inner.state() {
            RestoreState::Failed => Err(self.inner.failure_error()),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> RestoreState {
        self.inner.state()
    }

    pub fn mode(&self) -> RestoreMode {
        self.inner.mode
    }

    pub fn base_lsn(&self) -> Lsn {
        self.inner.base_lsn
    }

    pub fn failure_lsn(&self) -> Lsn {
        self.inner.failure_lsn
    }

    pub fn is_restored(&self, page: u32) -> bool {
        page < self.inner.volume.page_count()
            && self.inner.segment_of(page).is_restored(page)
    }

    pub fn restored_pages(&self) -> u64 {
        self.inner.segments.iter().map(|s| s.restored_count() as u64).sum()
    }

    /// Number of page reconstructions performed, by the sweep or on demand.
    pub fn reconstructions(&self) -> u64 {
        self.inner.reconstructions.load(Ordering::Relaxed)
    }
}

impl Drop for RestoreManager {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::Release);
        for seg in &self.inner.segments {
            seg.wake_all();
        }

        let handle = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(h) = handle {
            let _ = h.join();
        }
    }
}

impl RestoreInner {
    fn lock_progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> RestoreState {
        self.lock_progress().state
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.state() == RestoreState::Failed
    }

    fn failure_error(&self) -> ArchiveError {
        match &self.lock_progress().failure {
            Some(f) => f.to_error(),
            None => io::Error::new(io::ErrorKind::Interrupted, "restore stopped").into(),
        }
    }

    fn check_page(&self, page: u32) -> Result<(), io::Error> {
        if page >= self.volume.page_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "page {} is beyond volume {} of {} pages",
                    page,
                    self.volume.vol_id(),
                    self.volume.page_count()
                ),
            ));
        }
        Ok(())
    }

    fn segment_of(&self, page: u32) -> &Segment {
        &self.segments[(page / self.segment_size) as usize]
    }

    fn run_sweep(&self) {
        let res = self.sweep();

        let mut p = self.lock_progress();
        match res {
            Ok(true) => {
                p.state = RestoreState::Done;
                drop(p);

                self.volume.mark_healthy();
                info!(
                    "Restore of volume {} done: reconstructions: {}",
                    self.volume.vol_id(),
                    self.reconstructions.load(Ordering::Relaxed)
                );
            }
            Ok(false) => {
                drop(p);
                info!("Restore of volume {} stopped", self.volume.vol_id());
            }
            Err(e) => {
                error!("Restore of volume {} failed: {}", self.volume.vol_id(), e);

                p.state = RestoreState::Failed;
                p.failure = Some(match e {
                    ArchiveError::IncompleteLogChain(c) => Failure::Chain(c),
                    other => Failure::Other(other.to_string()),
                });
                drop(p);

                for seg in &self.segments {
                    seg.wake_all();
                }
            }
        }
    }

    /// Returns `false` if stopped before every page is restored.
    fn sweep(&self) -> Result<bool, ArchiveError> {
        match self.scheduler {
            SweepScheduler::Segmented => {
                for seg in &self.segments {
                    if self.stop.load(Ordering::Acquire) {
                        return Ok(false);
                    }
                    if seg.is_done() {
                        continue;
                    }
                    self.restore_range(seg.first_page(), seg.last_page())?;
                }
            }
            SweepScheduler::SinglePass => {
                if let Some(last) = self.segments.last() {
                    self.restore_range(0, last.last_page())?;
                }
            }
        }

        if self.stop.load(Ordering::Acquire) {
            return Ok(false);
        }
        Ok(true)
    }

    /// Rebuild the pages in `[first, last]` that nobody has restored yet,
    /// with one scan over the archive. Returns the number of pages rebuilt.
    fn restore_range(&self, first: u32, last: u32) -> Result<u64, ArchiveError> {
        let vol = self.volume.vol_id();

        let mut records = self
            .scanner
            .scan_pages(
                PageId::new(vol, first),
                PageId::new(vol, last),
                self.base_lsn,
                self.failure_lsn,
            )?
            .peekable();

        let mut rebuilt = 0;
        let mut page = first;

        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let seg = self.segment_of(page);
            let seg_last = min(seg.last_page(), last);

            let mut claimed = vec![];
            let res = self.restore_in_segment(seg, page, seg_last, &mut records, &mut claimed);

            match res {
                Ok(()) => seg.complete(&claimed),
                Err(e) => {
                    seg.abandon(&claimed);
                    return Err(e);
                }
            }

            rebuilt += claimed.len() as u64;

            if seg_last == last {
                break;
            }
            page = seg_last + 1;
        }

        Ok(rebuilt)
    }

    /// Rebuild the unrestored pages in `[first, last]` of one segment and
    /// make them durable. Claimed pages are pushed to `claimed`.
    fn restore_in_segment(
        &self,
        seg: &Segment,
        first: u32,
        last: u32,
        records: &mut Peekable<MergeScanner>,
        claimed: &mut Vec<u32>,
    ) -> Result<(), ArchiveError> {
        let vol = self.volume.vol_id();

        for page in first..=last {
            let pid = PageId::new(vol, page);

            let mut image = match seg.claim(page) {
                Claim::Restored => None,
                Claim::Claimed => {
                    claimed.push(page);
                    Some(self.base_page(pid)?)
                }
            };

            let mut applied = 0;
            loop {
                match records.peek() {
                    Some(Ok(r)) if r.page_id() <= pid => {}
                    Some(Err(_)) => {}
                    _ => break,
                }

                let Some(rec) = records.next() else {
                    break;
                };
                let rec = rec?;

                if let Some(image) = &mut image {
                    if rec.page_id() == pid && self.redo.apply(image, rec.view())? {
                        applied += 1;
                    }
                }
            }

            if let Some(image) = image {
                self.volume.write_page(page, &image)?;
                self.reconstructions.fetch_add(1, Ordering::Relaxed);

                debug!(
                    "Page {} rebuilt: {} records applied, page lsn: {}",
                    pid,
                    applied,
                    image.lsn()
                );
            }
        }

        if !claimed.is_empty() {
            self.volume.sync()?;
        }
        Ok(())
    }

    fn base_page(&self, pid: PageId) -> Result<Page, io::Error> {
        match &self.backup {
            Some(b) if pid.page < b.page_count() => b.read_page(pid.page),
            _ => Ok(Page::new(pid, self.volume.page_size())),
        }
    }
}
