use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::errors::ArchiveError;
use crate::raw_log::LogWriter;
use crate::restore::FileVolume;
use crate::testing::VOL;
use crate::Config;
use crate::StorageEngine;

/// A log directory and an archive directory in a temp dir, with sizes small
/// enough for a test to fill several partitions and runs.
pub(crate) struct TestContext {
    pub(crate) config: Config,

    temp_dir: TempDir,
}

impl TestContext {
    pub(crate) fn new() -> Result<TestContext, io::Error> {
        let temp_dir = tempfile::tempdir()?;

        let config = Config {
            block_size: Some(256),
            workspace_size: Some(1024),
            max_record_size: Some(256),
            read_buffer_size: Some(256),
            poll_interval_ms: Some(1),
            partition_size: Some(4096),
            page_size: Some(64),
            restore_segment_size: Some(4),
            ..Config::new(
                temp_dir.path().join("archive").display(),
                temp_dir.path().join("log").display(),
            )
        };

        Ok(TestContext { config, temp_dir })
    }

    pub(crate) fn arc_config(&self) -> Arc<Config> {
        Arc::new(self.config.clone())
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub(crate) fn new_log_writer(&self) -> Result<LogWriter, io::Error> {
        LogWriter::open(self.arc_config())
    }

    /// An engine reading the log `w` writes.
    pub(crate) fn new_engine(&self, w: &LogWriter) -> Result<StorageEngine, ArchiveError> {
        StorageEngine::open(self.arc_config(), Arc::new(w.log_dir()))
    }

    pub(crate) fn new_volume(&self, page_count: u32) -> Result<Arc<FileVolume>, io::Error> {
        let v = FileVolume::create(
            self.path("volume"),
            VOL,
            self.config.page_size(),
            page_count,
        )?;
        Ok(Arc::new(v))
    }
}
