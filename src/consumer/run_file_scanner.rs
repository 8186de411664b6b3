use std::sync::Arc;

use crate::archive::ArchiveDirectory;
use crate::archive::RunScanner;
use crate::consumer::ConsumerSet;
use crate::errors::ArchiveError;

/// Feeds the records of every archive run, one run after another, to
/// consumers.
///
/// Each run is announced with `new_file(<run file name>)` and its records are
/// delivered in the `(page id, lsn)` order they are stored in.
#[derive(Debug)]
pub struct RunFileScanner {
    dir: Arc<ArchiveDirectory>,
}

impl RunFileScanner {
    pub fn new(dir: Arc<ArchiveDirectory>) -> Self {
        Self { dir }
    }

    /// Returns the number of records delivered.
    pub fn scan(&self, consumers: &mut ConsumerSet) -> Result<u64, ArchiveError> {
        let mut count = 0;

        for run_id in self.dir.list_runs()? {
            consumers.new_file(&run_id.file_name())?;

            for rec in RunScanner::open(&self.dir, run_id)? {
                let rec = rec?;
                consumers.handle(rec.view())?;
                count += 1;
            }
        }

        consumers.finalize()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::RunFileScanner;
    use crate::archive::ArchiveDirectory;
    use crate::archive::RunId;
    use crate::consumer::ConsumerSet;
    use crate::consumer::PrintConsumer;
    use crate::consumer::VerifyConsumer;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::types::Lsn;
    use crate::types::PageId;
    use crate::Config;

    #[test]
    fn test_scan_runs() -> Result<(), io::Error> {
        let temp = tempfile::tempdir()?;
        let config = Arc::new(Config::new(temp.path().to_string_lossy(), "log"));
        let dir = Arc::new(ArchiveDirectory::open(config)?);

        let runs = [
            (RunId::new(Lsn::new(1, 0), Lsn::new(1, 100)), [(2, 0), (5, 40)]),
            (RunId::new(Lsn::new(1, 100), Lsn::new(1, 200)), [(1, 150), (2, 100)]),
        ];
        for (run_id, recs) in runs {
            let mut w = dir.create_run(run_id)?;
            for (page, off) in recs {
                let r = LogRecord::new(RecordKind::PageUpdate, PageId::new(1, page), 0, b"")
                    .with_lsn(Lsn::new(1, off));
                w.append(r.view())?;
            }
            w.finish()?;
        }

        let verify = Arc::new(Mutex::new(VerifyConsumer::for_runs()));
        let print = Arc::new(Mutex::new(PrintConsumer::new(Vec::new())));
        let mut consumers = ConsumerSet::new()
            .with_any(verify.clone())
            .with_any(print.clone());

        let n = RunFileScanner::new(dir).scan(&mut consumers).map_err(io::Error::from)?;
        assert_eq!(4, n);

        let verify = verify.lock().unwrap();
        assert!(verify.is_ok(), "{:?}", verify.errors());

        let out = String::from_utf8(print.lock().unwrap().get_ref().clone()).unwrap();
        let files = out.lines().filter(|l| l.starts_with("run-")).count();
        assert_eq!(2, files);

        Ok(())
    }
}
