use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use log::info;

use crate::archive::ArchiveDirectory;
use crate::archive::ArchiveIndex;
use crate::archive::ArchiveScanner;
use crate::archiver::LogArchiver;
use crate::consumer::ConsumerSet;
use crate::errors::ArchiveError;
use crate::errors::ProtocolMisuse;
use crate::raw_log::LogSource;
use crate::restore::BackupImage;
use crate::restore::RedoApplier;
use crate::restore::RestoreManager;
use crate::restore::Volume;
use crate::types::Lsn;
use crate::Config;

/// Owns the pieces of log archiving and restore for one log: the log source,
/// the archive directory, the shared archive index and at most one archiver.
pub struct StorageEngine {
    config: Arc<Config>,
    source: Arc<dyn LogSource>,
    dir: Arc<ArchiveDirectory>,
    index: Arc<RwLock<ArchiveIndex>>,
    archiver: Mutex<Option<Arc<LogArchiver>>>,
}

impl StorageEngine {
    /// Open the archive directory for writing and load its index.
    pub fn open(
        config: Arc<Config>,
        source: Arc<dyn LogSource>,
    ) -> Result<Self, ArchiveError> {
        config.validate()?;

        let dir = ArchiveDirectory::open(config.clone())?;
        let index = ArchiveIndex::load(&dir)?;

        info!(
            "StorageEngine opened: archive: {}, log: {}",
            config.archive_dir, config.log_dir
        );

        Ok(Self {
            config,
            source,
            dir: Arc::new(dir),
            index: Arc::new(RwLock::new(index)),
            archiver: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn log_source(&self) -> &Arc<dyn LogSource> {
        &self.source
    }

    pub fn directory(&self) -> &Arc<ArchiveDirectory> {
        &self.dir
    }

    pub fn index(&self) -> &Arc<RwLock<ArchiveIndex>> {
        &self.index
    }

    /// Start the one archiver of this engine.
    pub fn start_archiver(
        &self,
        consumers: ConsumerSet,
    ) -> Result<Arc<LogArchiver>, ArchiveError> {
        let mut slot = self.archiver.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ProtocolMisuse::new("archiver already started").into());
        }

        let archiver = Arc::new(LogArchiver::start(
            self.config.clone(),
            self.source.clone(),
            self.dir.clone(),
            self.index.clone(),
            consumers,
        )?);

        *slot = Some(archiver.clone());
        Ok(archiver)
    }

    pub fn archiver(&self) -> Option<Arc<LogArchiver>> {
        self.archiver.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn archive_scanner(&self) -> ArchiveScanner {
        ArchiveScanner::new(self.dir.clone(), self.index.clone())
    }

    /// Start restoring `volume`, which failed when the log was at
    /// `failure_lsn`.
    ///
    /// With a running archiver, the log up to `failure_lsn` is archived
    /// first.
    pub fn restore(
        &self,
        volume: Arc<dyn Volume>,
        backup: Option<BackupImage>,
        redo: Arc<dyn RedoApplier>,
        failure_lsn: Lsn,
    ) -> Result<RestoreManager, ArchiveError> {
        if let Some(archiver) = self.archiver() {
            let durable = self.source.durable_lsn();
            if failure_lsn > durable {
                return Err(ProtocolMisuse::new(format!(
                    "failure lsn {} is beyond the durable log end {}",
                    failure_lsn, durable
                ))
                .into());
            }
            archiver.activate(failure_lsn, true)?;
        }

        let mgr = RestoreManager::new(
            &self.config,
            self.archive_scanner(),
            volume,
            backup,
            redo,
            failure_lsn,
        )?;
        mgr.start()?;

        Ok(mgr)
    }

    /// Stop the archiver, if any, and wait for it.
    pub fn shutdown(&self) -> Result<(), ArchiveError> {
        let Some(archiver) = self.archiver() else {
            return Ok(());
        };

        archiver.shutdown();
        archiver.join()
    }
}
