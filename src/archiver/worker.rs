use std::io;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockWriteGuard;

use log::debug;
use log::error;
use log::info;

use crate::archive::ArchiveDirectory;
use crate::archive::ArchiveIndex;
use crate::archive::RunId;
use crate::archiver::stat::ArchiverStat;
use crate::archiver::workspace::ArchiverWorkspace;
use crate::consumer::ConsumerSet;
use crate::errors::ArchiveError;
use crate::errors::RecordParseError;
use crate::log_scanner::LogScanner;
use crate::raw_log::LogSource;
use crate::record::RecordKind;
use crate::types::Lsn;
use crate::Config;

pub(crate) enum Request {
    /// Archive every record before `target`.
    Activate { target: Lsn },

    /// Flush what has been consumed and quit.
    Shutdown,
}

/// Progress published by the worker, guarded by [`Shared::progress`].
#[derive(Debug, Default)]
pub(crate) struct Progress {
    pub(crate) stat: ArchiverStat,

    /// Highest target passed to `activate()`.
    pub(crate) requested: Lsn,

    /// `shutdown()` has been called.
    pub(crate) shutting_down: bool,

    /// The worker has exited; holds the reason.
    pub(crate) stopped: Option<String>,

    /// The worker exited with an error.
    pub(crate) failed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) progress: Mutex<Progress>,

    /// Notified whenever the watermark advances or the worker exits.
    pub(crate) cond: Condvar,
}

impl Shared {
    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The archiving loop, run on its own thread.
pub(crate) struct ArchiverWorker {
    config: Arc<Config>,
    source: Arc<dyn LogSource>,
    dir: Arc<ArchiveDirectory>,
    index: Arc<RwLock<ArchiveIndex>>,
    consumers: ConsumerSet,
    shared: Arc<Shared>,
    rx: Receiver<Request>,

    scanner: LogScanner,
    workspace: ArchiverWorkspace,
    block: Vec<u8>,

    /// Next byte to read from the log.
    read_pos: Lsn,

    /// LSN of the next record to consume.
    expected: Lsn,

    /// Begin of the run being collected.
    window_begin: Lsn,

    /// Highest activation target received.
    target: Lsn,

    shutdown: bool,
    stat: ArchiverStat,
}

impl ArchiverWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<Config>,
        source: Arc<dyn LogSource>,
        dir: Arc<ArchiveDirectory>,
        index: Arc<RwLock<ArchiveIndex>>,
        consumers: ConsumerSet,
        shared: Arc<Shared>,
        rx: Receiver<Request>,
        start: Lsn,
    ) -> Self {
        let stat = ArchiverStat {
            next_consumed_lsn: start,
            ..Default::default()
        };

        Self {
            scanner: LogScanner::new(config.max_record_size()),
            workspace: ArchiverWorkspace::new(config.workspace_size()),
            block: vec![0; config.block_size()],
            config,
            source,
            dir,
            index,
            consumers,
            shared,
            rx,
            read_pos: start,
            expected: start,
            window_begin: start,
            target: Lsn::NULL,
            shutdown: false,
            stat,
        }
    }

    pub(crate) fn run(mut self) -> Result<(), ArchiveError> {
        let res = self.run_inner();

        let reason = match &res {
            Ok(()) => {
                info!("LogArchiver quit at {}", self.window_begin);
                "shut down".to_string()
            }
            Err(e) => {
                error!("LogArchiver failed at {}: {}", self.expected, e);
                e.to_string()
            }
        };

        {
            let mut p = self.shared.lock();
            p.stat = self.stat.clone();
            p.stopped = Some(reason);
            p.failed = res.is_err();
        }
        self.shared.cond.notify_all();

        res
    }

    fn run_inner(&mut self) -> Result<(), ArchiveError> {
        loop {
            self.drain_requests();
            if self.shutdown {
                break;
            }

            if self.target_reached() {
                self.flush_window(self.expected)?;
            }

            let durable = self.source.durable_lsn();
            let wanted = self.config.eager() || self.expected < self.target;

            let progressed = if self.expected < durable && wanted {
                self.archive_block()?
            } else {
                false
            };

            if !progressed {
                self.wait_request();
            }
        }

        if self.window_begin < self.expected {
            self.flush_window(self.expected)?;
        }
        self.consumers.finalize()?;

        Ok(())
    }

    fn handle_request(&mut self, req: Request) {
        match req {
            Request::Activate { target } => {
                if target > self.target {
                    debug!("LogArchiver activated up to {}", target);
                    self.target = target;
                }
            }
            Request::Shutdown => {
                self.shutdown = true;
            }
        }
    }

    fn drain_requests(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(req) => self.handle_request(req),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    info!("LogArchiver input channel closed, quit");
                    self.shutdown = true;
                    return;
                }
            }
        }
    }

    /// Sleep until a request arrives or the poll interval passes.
    fn wait_request(&mut self) {
        match self.rx.recv_timeout(self.config.poll_interval()) {
            Ok(req) => self.handle_request(req),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("LogArchiver input channel closed, quit");
                self.shutdown = true;
            }
        }
    }

    fn target_reached(&self) -> bool {
        self.target > self.window_begin && self.expected >= self.target
    }

    /// Read one block at `read_pos` and consume the records completed by it.
    ///
    /// Returns `false` if nothing could be read.
    fn archive_block(&mut self) -> Result<bool, ArchiveError> {
        let n = self.source.read_at(self.read_pos, &mut self.block)?;
        if n == 0 {
            return Ok(false);
        }
        self.read_pos = self.read_pos.advance(n as u64);

        let mut pos = 0;
        let mut end_of_partition = false;

        while let Some(rec) = self.scanner.next_logrec(&self.block[..n], &mut pos)? {
            if rec.lsn() != self.expected {
                return Err(RecordParseError::LsnMismatch {
                    expected: self.expected,
                    found: rec.lsn(),
                }
                .into());
            }

            self.consumers.handle(rec)?;
            self.stat.records_scanned += 1;

            let next = rec.next_lsn();
            let is_skip = rec.kind() == RecordKind::Skip;

            if !is_skip && !rec.null_pid() && !self.workspace.insert(rec) {
                let rec = rec.to_record();

                if self.workspace.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "record of {} bytes at {} does not fit in workspace of {} bytes",
                            rec.len(),
                            rec.lsn(),
                            self.workspace.capacity()
                        ),
                    )
                    .into());
                }

                // Close the window right before this record.
                self.flush_window(rec.lsn())?;
                self.workspace.insert(rec.view());
            }

            self.expected = next;

            if self.target_reached() {
                self.flush_window(self.expected)?;
            }

            if is_skip {
                end_of_partition = true;
                break;
            }
        }

        if end_of_partition {
            self.scanner.reset();
            self.read_pos = self.expected;
        }

        self.shared.lock().stat.records_scanned = self.stat.records_scanned;
        Ok(true)
    }

    /// Write the workspace as run `[window_begin, end)`, register it and
    /// advance the watermark to `end`.
    fn flush_window(&mut self, end: Lsn) -> Result<(), ArchiveError> {
        let run_id = RunId::new(self.window_begin, end);
        let bytes = self.workspace.size() as u64;

        let run = self.workspace.flush_to(&self.dir, run_id)?;
        let records = run.record_count;

        self.write_index().add_run(run)?;

        self.window_begin = end;
        self.stat.runs_written += 1;
        self.stat.records_archived += records;
        self.stat.bytes_archived += bytes;
        self.stat.next_consumed_lsn = end;

        self.shared.lock().stat = self.stat.clone();
        self.shared.cond.notify_all();

        info!(
            "Archived {}: records: {}, bytes: {}",
            run_id, records, bytes
        );
        Ok(())
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, ArchiveIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}
