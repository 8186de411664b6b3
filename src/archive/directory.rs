use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use codeq::error_context_ext::ErrorContextExt;
use log::info;
use log::warn;

use crate::archive::lock::DirLock;
use crate::archive::RunId;
use crate::archive::RunReader;
use crate::archive::RunWriter;
use crate::errors::InvalidRunFileName;
use crate::errors::RunBoundaryError;
use crate::types::Lsn;
use crate::Config;

/// The set of run files in `Config::archive_dir`.
///
/// This is the only place run files are created and deleted. A directory
/// opened with [`open`](Self::open) holds the directory lock; one opened with
/// [`open_read_only`](Self::open_read_only) can only read runs.
#[derive(Debug)]
pub struct ArchiveDirectory {
    config: Arc<Config>,
    lock: Option<DirLock>,
}

impl ArchiveDirectory {
    /// Open for writing: create the directory if missing and take the lock.
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        fs::create_dir_all(&config.archive_dir)
            .context(|| format!("create archive dir {}", config.archive_dir))?;

        let lock = DirLock::new(config.archive_path())?;

        Ok(Self {
            config,
            lock: Some(lock),
        })
    }

    pub fn open_read_only(config: Arc<Config>) -> Result<Self, io::Error> {
        let meta = fs::metadata(&config.archive_dir)
            .context(|| format!("open archive dir {}", config.archive_dir))?;

        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", config.archive_dir),
            ));
        }

        Ok(Self { config, lock: None })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.config.archive_path()
    }

    pub fn is_writable(&self) -> bool {
        self.lock.is_some()
    }

    pub fn run_path(&self, run_id: RunId) -> PathBuf {
        self.path().join(run_id.file_name())
    }

    /// Names of every file in the directory except the lock file.
    pub fn list_files(&self) -> Result<Vec<String>, io::Error> {
        let entries = fs::read_dir(self.path())
            .context(|| format!("read archive dir {}", self.path().display()))?;

        let mut names = vec![];
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == DirLock::LOCK_FILE_NAME {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Parse the begin (`is_end == false`) or end LSN of a run file name.
    pub fn parse_lsn(
        file_name: &str,
        is_end: bool,
    ) -> Result<Lsn, InvalidRunFileName> {
        RunId::parse_lsn(file_name, is_end)
    }

    /// Every run in the directory, sorted by begin LSN.
    pub fn list_runs(&self) -> Result<Vec<RunId>, io::Error> {
        let mut runs = vec![];

        for name in self.list_files()? {
            if name.ends_with(RunId::TEMP_SUFFIX) {
                continue;
            }

            match RunId::parse_file_name(&name) {
                Ok(run_id) => runs.push(run_id),
                Err(err) => {
                    warn!("Ignore invalid archive file name: '{}': {}", name, err);
                }
            }
        }

        runs.sort();
        Ok(runs)
    }

    /// Check that consecutive runs meet exactly: `runs[i].end == runs[i+1].begin`.
    ///
    /// `runs` must be sorted by begin LSN.
    pub fn validate_runs(runs: &[RunId]) -> Result<(), RunBoundaryError> {
        for w in runs.windows(2) {
            let (prev, next) = (w[0], w[1]);

            if prev.end < next.begin {
                return Err(RunBoundaryError::Hole {
                    prev_end: prev.end,
                    next_begin: next.begin,
                });
            }
            if prev.end > next.begin {
                return Err(RunBoundaryError::Overlap {
                    prev_end: prev.end,
                    next_begin: next.begin,
                });
            }
        }
        Ok(())
    }

    pub fn create_run(&self, run_id: RunId) -> Result<RunWriter, io::Error> {
        self.check_writable("create run")?;
        RunWriter::create(
            self.path().to_path_buf(),
            run_id,
            self.config.block_size(),
        )
    }

    pub fn open_run(&self, run_id: RunId) -> Result<RunReader, io::Error> {
        RunReader::open(&self.run_path(run_id), run_id)
    }

    pub fn delete_run(&self, run_id: RunId) -> Result<(), io::Error> {
        self.check_writable("delete run")?;

        let path = self.run_path(run_id);
        fs::remove_file(&path).context(|| format!("remove {}", path.display()))?;
        self.sync_dir()?;

        info!("Archive run deleted: {}", run_id);
        Ok(())
    }

    /// Remove the temporary files of runs that were being written when the
    /// process stopped. Returns the number of files removed.
    pub fn remove_temp_files(&self) -> Result<usize, io::Error> {
        self.check_writable("remove temp files")?;

        let mut removed = 0;
        for name in self.list_files()? {
            if !name.ends_with(RunId::TEMP_SUFFIX) {
                continue;
            }

            let path = self.path().join(&name);
            warn!("Remove unfinished archive run: {}", path.display());
            fs::remove_file(&path)
                .context(|| format!("remove {}", path.display()))?;
            removed += 1;
        }

        if removed > 0 {
            self.sync_dir()?;
        }
        Ok(removed)
    }

    fn sync_dir(&self) -> Result<(), io::Error> {
        File::open(self.path())?.sync_all()
    }

    fn check_writable(&self, what: &str) -> Result<(), io::Error> {
        if self.is_writable() {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!(
                "cannot {}: archive directory {} is opened read-only",
                what,
                self.path().display()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::ArchiveDirectory;
    use crate::archive::RunId;
    use crate::errors::RunBoundaryError;
    use crate::types::Lsn;
    use crate::Config;

    fn run(b: u32, e: u32) -> RunId {
        RunId::new(Lsn::new(1, b), Lsn::new(1, e))
    }

    #[test]
    fn test_validate_runs() {
        assert_eq!(Ok(()), ArchiveDirectory::validate_runs(&[]));
        assert_eq!(
            Ok(()),
            ArchiveDirectory::validate_runs(&[run(0, 10), run(10, 20)])
        );

        assert_eq!(
            Err(RunBoundaryError::Hole {
                prev_end: Lsn::new(1, 10),
                next_begin: Lsn::new(1, 12)
            }),
            ArchiveDirectory::validate_runs(&[run(0, 10), run(12, 20)])
        );

        assert_eq!(
            Err(RunBoundaryError::Overlap {
                prev_end: Lsn::new(1, 10),
                next_begin: Lsn::new(1, 8)
            }),
            ArchiveDirectory::validate_runs(&[run(0, 10), run(8, 20)])
        );
    }

    #[test]
    fn test_list_and_cleanup() -> Result<(), io::Error> {
        let temp = tempfile::tempdir()?;
        let config = Arc::new(Config::new(
            temp.path().join("arch").to_string_lossy(),
            temp.path().join("log").to_string_lossy(),
        ));

        let dir = ArchiveDirectory::open(config.clone())?;

        dir.create_run(run(10, 20))?.finish()?;
        dir.create_run(run(0, 10))?.finish()?;

        // An unfinished run and an unrelated file
        let _unfinished = dir.create_run(run(20, 30))?;
        fs::write(dir.path().join("notes.txt"), b"x")?;

        assert_eq!(vec![run(0, 10), run(10, 20)], dir.list_runs()?);
        assert_eq!(4, dir.list_files()?.len());

        assert_eq!(1, dir.remove_temp_files()?);
        assert_eq!(3, dir.list_files()?.len());

        dir.delete_run(run(0, 10))?;
        assert_eq!(vec![run(10, 20)], dir.list_runs()?);

        // A read-only handle cannot modify the directory.
        let ro = ArchiveDirectory::open_read_only(config.clone())?;
        assert_eq!(vec![run(10, 20)], ro.list_runs()?);
        assert_eq!(
            io::ErrorKind::PermissionDenied,
            ro.delete_run(run(10, 20)).unwrap_err().kind()
        );

        // A second writer is refused while the first holds the lock.
        assert!(ArchiveDirectory::open(config.clone()).is_err());
        drop(dir);
        assert!(ArchiveDirectory::open(config).is_ok());

        Ok(())
    }
}
