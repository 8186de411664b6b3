use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use fs2::FileExt;
use log::info;

/// Exclusive lock on an archive directory, held while a writer owns it.
///
/// Only one process or handle may create and delete runs in a directory.
#[derive(Debug)]
pub(crate) struct DirLock {
    path: PathBuf,
    f: File,
}

impl DirLock {
    pub const LOCK_FILE_NAME: &'static str = "LOCK";

    pub(crate) fn new(dir: &Path) -> Result<Self, io::Error> {
        let path = dir.join(Self::LOCK_FILE_NAME);

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        f.try_lock_exclusive().map_err(|e| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "Archive directory '{}' is already locked by another archiver; \
                    error:({})",
                    dir.display(),
                    e
                ),
            )
        })?;

        info!("Archive directory lock acquired: {}", path.display());

        Ok(Self { path, f })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.f.unlock();
        info!("Archive directory lock released: {}", self.path.display());
    }
}
