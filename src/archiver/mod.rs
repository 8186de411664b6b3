//! The log archiver: a background worker that drains the durable log into
//! archive runs.
//!
//! Archiving proceeds in windows. The worker copies page records into an
//! [`ArchiverWorkspace`] and closes the window, writing one run, when the
//! workspace is full, when an activation target is reached or on shutdown.
//! Runs produced by one archiver meet end to begin, so together they cover
//! the log without holes.
//!
//! [`LogArchiver::next_consumed_lsn`] is the durability watermark: every
//! record before it is in a run that has been synced and renamed into place.

pub mod stat;
pub mod workspace;
mod worker;

use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::thread::JoinHandle;

pub use stat::ArchiverStat;
pub use workspace::ArchiverWorkspace;
pub use workspace::WorkspaceState;

use crate::archive::ArchiveDirectory;
use crate::archive::ArchiveIndex;
use crate::archiver::worker::ArchiverWorker;
use crate::archiver::worker::Request;
use crate::archiver::worker::Shared;
use crate::consumer::ConsumerSet;
use crate::errors::ArchiveError;
use crate::errors::ArchiverStopped;
use crate::errors::IncompleteLogChain;
use crate::errors::ProtocolMisuse;
use crate::raw_log::LogSource;
use crate::types::Lsn;
use crate::Config;

/// Handle to a running archiver.
///
/// Dropping the handle shuts the worker down and waits for it.
pub struct LogArchiver {
    shared: Arc<Shared>,
    tx: SyncSender<Request>,
    handle: Mutex<Option<JoinHandle<Result<(), ArchiveError>>>>,
}

impl LogArchiver {
    /// Start archiving where the archive in `dir` ends.
    ///
    /// Leftover temporary run files are removed and `index` is reloaded from
    /// the directory. An empty archive starts at the first LSN of the log.
    pub fn start(
        config: Arc<Config>,
        source: Arc<dyn LogSource>,
        dir: Arc<ArchiveDirectory>,
        index: Arc<RwLock<ArchiveIndex>>,
        consumers: ConsumerSet,
    ) -> Result<Self, ArchiveError> {
        config.validate()?;

        if !dir.is_writable() {
            return Err(ProtocolMisuse::new(format!(
                "archive directory {} is opened read-only",
                dir.path().display()
            ))
            .into());
        }

        dir.remove_temp_files()?;

        let loaded = ArchiveIndex::load(&dir)?;
        let first = source.first_lsn()?;

        let start = match loaded.end_lsn() {
            Some(end) => end,
            None => first,
        };

        if start < first {
            return Err(IncompleteLogChain::new(
                start,
                first,
                "log records after the last run have been removed",
            )
            .into());
        }

        *index.write().unwrap_or_else(PoisonError::into_inner) = loaded;

        let shared = Arc::new(Shared::default());
        shared.lock().stat.next_consumed_lsn = start;

        let (tx, rx) = std::sync::mpsc::sync_channel(1024);

        let worker = ArchiverWorker::new(
            config.clone(),
            source,
            dir,
            index,
            consumers,
            shared.clone(),
            rx,
            start,
        );

        let handle = std::thread::Builder::new()
            .name("log_archiver".to_string())
            .spawn(move || worker.run())?;

        log::info!(
            "LogArchiver started at {}, eager: {}",
            start,
            config.eager()
        );

        Ok(Self {
            shared,
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Request that every record with an LSN below `target` be archived.
    ///
    /// Requests are coalesced to the highest target. With `block` this waits
    /// until the watermark reaches `target`.
    pub fn activate(&self, target: Lsn, block: bool) -> Result<(), ArchiveError> {
        let send = {
            let mut p = self.shared.lock();
            Self::check_running(&p)?;

            if target > p.requested {
                p.requested = target;
                true
            } else {
                false
            }
        };

        if send {
            self.tx
                .send(Request::Activate { target })
                .map_err(|_| ArchiverStopped::new("worker exited"))?;
        }

        if !block {
            return Ok(());
        }

        let mut p = self.shared.lock();
        while p.stat.next_consumed_lsn < target {
            if let Some(reason) = &p.stopped {
                return Err(ArchiverStopped::new(format!(
                    "{} before reaching {}",
                    reason, target
                ))
                .into());
            }
            p = self.shared.cond.wait(p).unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Every record before this LSN is in a durable run. Never decreases.
    pub fn next_consumed_lsn(&self) -> Lsn {
        self.shared.lock().stat.next_consumed_lsn
    }

    pub fn stat(&self) -> ArchiverStat {
        let p = self.shared.lock();
        ArchiverStat {
            requested_lsn: p.requested,
            ..p.stat.clone()
        }
    }

    /// Whether the worker has exited, after a shutdown or a failure.
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped.is_some()
    }

    /// Ask the worker to flush what it has consumed and quit.
    ///
    /// Does not wait; see [`join`](Self::join). Calling it again is a no-op.
    pub fn shutdown(&self) {
        {
            let mut p = self.shared.lock();
            if p.shutting_down {
                return;
            }
            p.shutting_down = true;
        }

        // The worker may have failed already and dropped the receiver.
        let _ = self.tx.send(Request::Shutdown);
    }

    /// Wait for the worker to exit and return its result.
    ///
    /// Only the first call observes the worker's own error; later calls
    /// report that it stopped.
    pub fn join(&self) -> Result<(), ArchiveError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(h) = handle {
            return h
                .join()
                .map_err(|_| ArchiverStopped::new("worker panicked"))?;
        }

        let p = self.shared.lock();
        if p.failed {
            let reason = p.stopped.clone().unwrap_or_default();
            return Err(ArchiverStopped::new(reason).into());
        }
        Ok(())
    }

    fn check_running(p: &worker::Progress) -> Result<(), ArchiveError> {
        if p.shutting_down {
            return Err(ProtocolMisuse::new("activate() after shutdown()").into());
        }
        if let Some(reason) = &p.stopped {
            return Err(ArchiverStopped::new(reason).into());
        }
        Ok(())
    }
}

impl Drop for LogArchiver {
    fn drop(&mut self) {
        self.shutdown();
        if let Err(e) = self.join() {
            log::warn!("LogArchiver stopped with error: {}", e);
        }
    }
}
