use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::InvalidConfig;
use crate::record::HEADER_SIZE;

/// How the background restore sweep walks a failed volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepScheduler {
    /// Restore segment after segment, probing the archive index once per
    /// segment.
    #[default]
    Segmented,

    /// Restore the whole volume with one merged scan over the archive.
    SinglePass,
}

/// Configuration for the log archiver and restore.
///
/// Optional parameters are `Option<T>` in this struct, and default values are
/// evaluated when a getter method is called.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Directory holding the archive run files.
    pub archive_dir: String,

    /// Directory holding the recovery log partitions `log.<N>`.
    pub log_dir: String,

    /// Size of a log read block, and the target size of a block in a run.
    pub block_size: Option<usize>,

    /// Capacity of the in-memory sort arena, i.e. the largest run.
    pub workspace_size: Option<usize>,

    /// Upper bound of a single log record, header included.
    ///
    /// A length field beyond this is treated as corruption.
    pub max_record_size: Option<usize>,

    /// Size of the read buffer used when scanning run files.
    pub read_buffer_size: Option<usize>,

    /// How long the archiver sleeps when it has caught up with the durable
    /// end of the log.
    pub poll_interval_ms: Option<u64>,

    /// Keep archiving durable log without waiting for an activation.
    pub eager: Option<bool>,

    /// Maximum size of a log partition file written by `LogWriter`.
    pub partition_size: Option<u64>,

    /// Size of a database page.
    pub page_size: Option<usize>,

    /// Number of pages restored together as one segment.
    pub restore_segment_size: Option<u32>,

    /// Serve page requests before the whole-volume sweep reaches them.
    pub restore_instant: Option<bool>,

    pub restore_scheduler: Option<SweepScheduler>,
}

impl Config {
    /// Creates a new Config with the archive and log directories and default
    /// values for everything else.
    pub fn new(archive_dir: impl ToString, log_dir: impl ToString) -> Self {
        Self {
            archive_dir: archive_dir.to_string(),
            log_dir: log_dir.to_string(),
            ..Default::default()
        }
    }

    /// Returns the block size in bytes (defaults to 1MB)
    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(1024 * 1024)
    }

    /// Returns the sort arena capacity in bytes (defaults to 64MB)
    pub fn workspace_size(&self) -> usize {
        self.workspace_size.unwrap_or(64 * 1024 * 1024)
    }

    /// Returns the largest acceptable log record (defaults to 64KB)
    pub fn max_record_size(&self) -> usize {
        self.max_record_size.unwrap_or(64 * 1024)
    }

    /// Returns the run read buffer size in bytes (defaults to 1MB)
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size.unwrap_or(1024 * 1024)
    }

    /// Returns the archiver polling interval (defaults to 10ms)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(10))
    }

    /// Returns whether the archiver runs eagerly (defaults to false)
    pub fn eager(&self) -> bool {
        self.eager.unwrap_or(false)
    }

    /// Returns the log partition size in bytes (defaults to 1GB)
    pub fn partition_size(&self) -> u64 {
        self.partition_size.unwrap_or(1024 * 1024 * 1024)
    }

    /// Returns the page size in bytes (defaults to 8KB)
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(8192)
    }

    /// Returns the number of pages per restore segment (defaults to 1024)
    pub fn restore_segment_size(&self) -> u32 {
        self.restore_segment_size.unwrap_or(1024)
    }

    /// Returns whether instant restore is enabled (defaults to true)
    pub fn restore_instant(&self) -> bool {
        self.restore_instant.unwrap_or(true)
    }

    /// Returns the restore sweep scheduler (defaults to `Segmented`)
    pub fn restore_scheduler(&self) -> SweepScheduler {
        self.restore_scheduler.unwrap_or_default()
    }

    pub fn archive_path(&self) -> &Path {
        Path::new(&self.archive_dir)
    }

    /// Returns the path of log partition `partition`: `<log_dir>/log.<N>`.
    pub fn partition_path(&self, partition: u32) -> PathBuf {
        Path::new(&self.log_dir).join(Self::partition_file_name(partition))
    }

    pub fn partition_file_name(partition: u32) -> String {
        format!("log.{}", partition)
    }

    /// Checks that the knobs are consistent with each other.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let max_rec = self.max_record_size();

        if max_rec < HEADER_SIZE {
            return Err(InvalidConfig::new(format!(
                "max_record_size {} is smaller than the record header {}",
                max_rec, HEADER_SIZE
            )));
        }

        if self.block_size() < HEADER_SIZE {
            return Err(InvalidConfig::new(format!(
                "block_size {} is smaller than the record header {}",
                self.block_size(),
                HEADER_SIZE
            )));
        }

        if self.workspace_size() < max_rec {
            return Err(InvalidConfig::new(format!(
                "workspace_size {} cannot hold a record of max_record_size {}",
                self.workspace_size(),
                max_rec
            )));
        }

        if self.partition_size() > u32::MAX as u64
            || self.partition_size() < (2 * max_rec) as u64
        {
            return Err(InvalidConfig::new(format!(
                "partition_size {} must be in [2 * max_record_size, 4GB)",
                self.partition_size()
            )));
        }

        if self.page_size() < crate::restore::page::PAGE_HEADER_SIZE * 2 {
            return Err(InvalidConfig::new(format!(
                "page_size {} is too small",
                self.page_size()
            )));
        }

        if self.restore_segment_size() == 0 {
            return Err(InvalidConfig::new("restore_segment_size is 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::new("arch", "log");
        assert!(config.validate().is_ok());
        assert_eq!(
            std::path::Path::new("log").join("log.3"),
            config.partition_path(3)
        );
    }

    #[test]
    fn test_validate_rejects_inconsistent_sizes() {
        let config = Config {
            workspace_size: Some(1024),
            max_record_size: Some(4096),
            ..Config::new("arch", "log")
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_record_size: Some(8),
            ..Config::new("arch", "log")
        };
        assert!(config.validate().is_err());

        let config = Config {
            partition_size: Some(8 * 1024 * 1024 * 1024),
            ..Config::new("arch", "log")
        };
        assert!(config.validate().is_err());

        let config = Config {
            restore_segment_size: Some(0),
            ..Config::new("arch", "log")
        };
        assert!(config.validate().is_err());
    }
}
