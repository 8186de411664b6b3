use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::archive::ArchiveDirectory;
use crate::archive::RunId;
use crate::archive::RunScanner;
use crate::consumer::ConsumerSet;
use crate::consumer::RunFileScanner;
use crate::consumer::VerifyConsumer;
use crate::dump_writer;
use crate::errors::ArchiveError;
use crate::record::LogRecord;
use crate::Config;

/// Human readable listing and verification of an archive directory.
///
/// Opens the directory read-only, so it can run next to an archiver.
pub struct ArchiveDump {
    dir: Arc<ArchiveDirectory>,
}

impl ArchiveDump {
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        let dir = ArchiveDirectory::open_read_only(config)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn write_to_string(&self) -> Result<String, io::Error> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    pub fn write<W: io::Write>(&self, mut w: W) -> Result<(), io::Error> {
        writeln!(&mut w, "LogArchive:")?;
        self.write_with(w, dump_writer::multiline_string)
    }

    /// Call `write_record` for every record of every run, in file order.
    ///
    /// An error reading a run is passed to `write_record` and ends that run.
    pub fn write_with<W: io::Write, D>(
        &self,
        mut w: W,
        write_record: D,
    ) -> Result<(), io::Error>
    where
        D: Fn(&mut W, RunId, u64, Result<LogRecord, io::Error>) -> Result<(), io::Error>,
    {
        for run_id in self.dir.list_runs()? {
            let scanner = match RunScanner::open(&self.dir, run_id) {
                Ok(s) => s,
                Err(e) => {
                    write_record(&mut w, run_id, 0, Err(e))?;
                    continue;
                }
            };

            for (i, res) in scanner.enumerate() {
                write_record(&mut w, run_id, i as u64, res)?;
            }
        }
        Ok(())
    }

    /// Check run boundaries and, run by run, the record order and LSN
    /// bounds. Violations are written to `w`.
    ///
    /// Returns whether the archive is consistent.
    pub fn verify<W: io::Write>(&self, mut w: W) -> Result<bool, ArchiveError> {
        let runs = self.dir.list_runs()?;

        if let Err(e) = ArchiveDirectory::validate_runs(&runs) {
            writeln!(w, "Run boundaries: {}", e)?;
            return Ok(false);
        }

        let verify = Arc::new(Mutex::new(VerifyConsumer::for_runs()));
        let mut consumers = ConsumerSet::new().with_any(verify.clone());
        RunFileScanner::new(self.dir.clone()).scan(&mut consumers)?;

        let verify = verify.lock().unwrap_or_else(PoisonError::into_inner);
        for e in verify.errors() {
            writeln!(w, "{}", e)?;
        }
        writeln!(
            w,
            "Verified {} runs, {} records, {} errors",
            runs.len(),
            verify.count(),
            verify.errors().len()
        )?;

        Ok(verify.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::ArchiveDump;
    use crate::archive::ArchiveDirectory;
    use crate::archive::RunId;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::types::Lsn;
    use crate::types::PageId;
    use crate::Config;

    #[test]
    fn test_dump_and_verify() -> Result<(), io::Error> {
        let temp = tempfile::tempdir()?;
        let config = Arc::new(Config::new(temp.path().to_string_lossy(), "log"));

        {
            let dir = ArchiveDirectory::open(config.clone())?;
            let run_id = RunId::new(Lsn::new(1, 0), Lsn::new(1, 80));
            let mut w = dir.create_run(run_id)?;
            for (page, off) in [(1, 40), (2, 0)] {
                let r = LogRecord::new(RecordKind::PageUpdate, PageId::new(1, page), 0, b"12345678")
                    .with_lsn(Lsn::new(1, off));
                w.append(r.view())?;
            }
            w.finish()?;
        }

        let dump = ArchiveDump::open(config.clone())?;
        assert_eq!(
            indoc! {"
                LogArchive:
                RunId[1.0, 1.80)
                  R-00000: 1.40 page_update pid=1.1 len=40
                  R-00001: 1.0 page_update pid=1.2 len=40
            "},
            dump.write_to_string()?
        );

        let mut out = Vec::new();
        assert!(dump.verify(&mut out).map_err(io::Error::from)?);
        assert_eq!(
            "Verified 1 runs, 2 records, 0 errors\n",
            String::from_utf8(out).unwrap()
        );

        // A hole
        {
            let dir = ArchiveDirectory::open(config.clone())?;
            let run_id = RunId::new(Lsn::new(1, 100), Lsn::new(1, 120));
            dir.create_run(run_id)?.finish()?;
        }

        let mut out = Vec::new();
        assert!(!dump.verify(&mut out).map_err(io::Error::from)?);

        Ok(())
    }
}
