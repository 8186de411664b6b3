//! The recovery log as a sequence of partition files `log.<N>`.
//!
//! Partition `N` holds the records with LSNs `N.0 .. N.<file size>`. A
//! partition is closed by a `Skip` record; the log continues at `<N+1>.0`.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use codeq::error_context_ext::ErrorContextExt;
use log::info;
use log::warn;

use crate::record::LogRecord;
use crate::record::RecordKind;
use crate::record::HEADER_SIZE;
use crate::types::Lsn;
use crate::types::PageId;
use crate::Config;

/// Read access to the durable part of the recovery log.
pub trait LogSource: Send + Sync {
    /// LSN of the first record still present in the log.
    fn first_lsn(&self) -> Result<Lsn, io::Error>;

    /// Every byte before this LSN is durable and may be read.
    fn durable_lsn(&self) -> Lsn;

    /// Read bytes starting at `lsn` into `buf`.
    ///
    /// A read never crosses the end of the partition `lsn` belongs to, nor the
    /// durable LSN. Returns the number of bytes read; `0` when nothing durable
    /// is stored at `lsn`.
    fn read_at(&self, lsn: Lsn, buf: &mut [u8]) -> Result<usize, io::Error>;
}

/// Reader of the partition files in `Config::log_dir`.
#[derive(Debug, Clone)]
pub struct LogDir {
    config: Arc<Config>,

    /// Shared with a [`LogWriter`] appending to the same directory.
    durable: Arc<AtomicU64>,

    /// The most recently read partition file.
    current: Arc<Mutex<Option<(u32, File)>>>,
}

impl LogDir {
    /// Open an existing log directory.
    ///
    /// The durable LSN is the end of the last partition file.
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        let partitions = Self::list_partitions(&config)?;

        let durable = match partitions.last() {
            Some(p) => {
                let path = config.partition_path(*p);
                let len = fs::metadata(&path)
                    .context(|| format!("stat {}", path.display()))?
                    .len();
                Lsn::new(*p, len as u32)
            }
            None => Lsn::new(1, 0),
        };

        Ok(Self::with_durable(
            config,
            Arc::new(AtomicU64::new(durable.0)),
        ))
    }

    fn with_durable(config: Arc<Config>, durable: Arc<AtomicU64>) -> Self {
        Self {
            config,
            durable,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Partition numbers present in the log directory, ascending.
    pub fn list_partitions(config: &Config) -> Result<Vec<u32>, io::Error> {
        let entries = fs::read_dir(&config.log_dir)
            .context(|| format!("read log dir {}", config.log_dir))?;

        let mut partitions = vec![];
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let fn_str = file_name.to_string_lossy();

            let parsed = fn_str
                .strip_prefix("log.")
                .and_then(|n| n.parse::<u32>().ok());

            match parsed {
                Some(p) if p > 0 => partitions.push(p),
                _ => {
                    warn!("Ignore non-log file in log dir: '{}'", fn_str);
                }
            }
        }

        partitions.sort();
        Ok(partitions)
    }

    /// Length of partition `p` on disk.
    pub fn partition_len(&self, p: u32) -> Result<u64, io::Error> {
        let path = self.config.partition_path(p);
        let meta =
            fs::metadata(&path).context(|| format!("stat {}", path.display()))?;
        Ok(meta.len())
    }

    fn open_partition(&self, p: u32) -> Result<File, io::Error> {
        let path = self.config.partition_path(p);
        File::open(&path).context(|| format!("open {}", path.display()))
    }
}

impl LogSource for LogDir {
    fn first_lsn(&self) -> Result<Lsn, io::Error> {
        let partitions = Self::list_partitions(&self.config)?;
        let first = partitions.first().copied().unwrap_or(1);
        Ok(Lsn::new(first, 0))
    }

    fn durable_lsn(&self) -> Lsn {
        Lsn(self.durable.load(Ordering::Acquire))
    }

    fn read_at(&self, lsn: Lsn, buf: &mut [u8]) -> Result<usize, io::Error> {
        let durable = self.durable_lsn();
        if lsn >= durable {
            return Ok(0);
        }

        let limit = if lsn.partition() == durable.partition() {
            (durable.offset() - lsn.offset()) as u64
        } else {
            let len = self.partition_len(lsn.partition())?;
            len.saturating_sub(lsn.offset() as u64)
        };

        let n = std::cmp::min(limit, buf.len() as u64) as usize;
        if n == 0 {
            return Ok(0);
        }

        let mut current =
            self.current.lock().unwrap_or_else(PoisonError::into_inner);

        let reuse = matches!(&*current, Some((p, _)) if *p == lsn.partition());
        if !reuse {
            *current = Some((lsn.partition(), self.open_partition(lsn.partition())?));
        }

        let Some((_, f)) = current.as_mut() else {
            return Ok(0);
        };

        f.seek(SeekFrom::Start(lsn.offset() as u64))?;
        f.read_exact(&mut buf[..n])
            .context(|| format!("read {} bytes at {}", n, lsn))?;

        Ok(n)
    }
}

/// Appends records to the partition files of a log directory.
///
/// Appended records become visible to readers only after [`flush`].
///
/// [`flush`]: LogWriter::flush
#[derive(Debug)]
pub struct LogWriter {
    config: Arc<Config>,
    f: File,
    partition: u32,
    offset: u32,
    durable: Arc<AtomicU64>,
}

impl LogWriter {
    /// Open the log for appending, creating `log.1` in an empty directory.
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        fs::create_dir_all(&config.log_dir)
            .context(|| format!("create log dir {}", config.log_dir))?;

        let partitions = LogDir::list_partitions(&config)?;
        let partition = partitions.last().copied().unwrap_or(1);

        let path = config.partition_path(partition);
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(|| format!("open {}", path.display()))?;

        let offset = f.metadata()?.len() as u32;

        info!(
            "LogWriter opened: partition: {}, end: {}",
            partition,
            Lsn::new(partition, offset)
        );

        Ok(Self {
            config,
            f,
            partition,
            offset,
            durable: Arc::new(AtomicU64::new(Lsn::new(partition, offset).0)),
        })
    }

    /// A reader that observes the durable LSN published by this writer.
    pub fn log_dir(&self) -> LogDir {
        LogDir::with_durable(self.config.clone(), self.durable.clone())
    }

    /// LSN the next appended record will get.
    pub fn end_lsn(&self) -> Lsn {
        Lsn::new(self.partition, self.offset)
    }

    pub fn durable_lsn(&self) -> Lsn {
        Lsn(self.durable.load(Ordering::Acquire))
    }

    /// Assign the record its LSN and append it. Returns the assigned LSN.
    ///
    /// Rolls over to a new partition when the record and a closing `Skip`
    /// would not fit into the current one.
    pub fn append(&mut self, mut rec: LogRecord) -> Result<Lsn, io::Error> {
        if rec.kind() == RecordKind::Skip {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Skip records are written by the log only",
            ));
        }

        if rec.len() > self.config.max_record_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "record of {} bytes exceeds max_record_size {}",
                    rec.len(),
                    self.config.max_record_size()
                ),
            ));
        }

        let need = (rec.len() + HEADER_SIZE) as u64;
        if self.offset as u64 + need > self.config.partition_size() {
            self.roll()?;
        }

        let lsn = self.end_lsn();
        rec.set_lsn(lsn);
        self.f.write_all(rec.as_bytes())?;
        self.offset += rec.len() as u32;

        Ok(lsn)
    }

    /// Make everything appended so far durable and visible to readers.
    pub fn flush(&mut self) -> Result<Lsn, io::Error> {
        self.f.sync_data()?;
        let end = self.end_lsn();
        self.durable.store(end.0, Ordering::Release);
        Ok(end)
    }

    /// Close the current partition with a `Skip` record and start the next.
    fn roll(&mut self) -> Result<(), io::Error> {
        let skip = LogRecord::new(RecordKind::Skip, PageId::NULL, 0, b"")
            .with_lsn(self.end_lsn());
        self.f.write_all(skip.as_bytes())?;
        self.f.sync_data()?;

        let next = self.partition + 1;
        let path = self.config.partition_path(next);
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(|| format!("create {}", path.display()))?;

        File::open(&self.config.log_dir)?.sync_all()?;

        info!(
            "LogWriter closed partition {} at {}",
            self.partition,
            skip.view().next_lsn()
        );

        self.f = f;
        self.partition = next;
        self.offset = 0;
        self.durable
            .store(Lsn::new(next, 0).0, Ordering::Release);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::LogDir;
    use super::LogSource;
    use super::LogWriter;
    use crate::record::codec;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::types::Lsn;
    use crate::types::PageId;
    use crate::Config;

    fn test_config(dir: &tempfile::TempDir) -> Arc<Config> {
        let p = dir.path();
        Arc::new(Config {
            partition_size: Some(1024),
            max_record_size: Some(256),
            ..Config::new(
                p.join("archive").to_string_lossy(),
                p.join("log").to_string_lossy(),
            )
        })
    }

    #[test]
    fn test_append_flush_read() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let config = test_config(&dir);

        let mut w = LogWriter::open(config.clone())?;
        let reader = w.log_dir();

        assert_eq!(Lsn::new(1, 0), reader.first_lsn()?);

        let rec = LogRecord::new(RecordKind::PageInsert, PageId::new(1, 3), 5, b"abc");
        let lsn = w.append(rec.clone())?;
        assert_eq!(Lsn::new(1, 0), lsn);

        // Not durable yet
        let mut buf = vec![0; 64];
        assert_eq!(0, reader.read_at(lsn, &mut buf)?);

        w.flush()?;
        assert_eq!(Lsn::new(1, 35), reader.durable_lsn());

        let n = reader.read_at(lsn, &mut buf)?;
        assert_eq!(35, n);

        let got = codec::decode(&buf[..n], 256).map_err(io::Error::from)?;
        assert_eq!(Some(rec.with_lsn(lsn)), got.map(|r| r.to_record()));

        Ok(())
    }

    #[test]
    fn test_roll_partition() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let config = test_config(&dir);

        let mut w = LogWriter::open(config.clone())?;

        let mut lsns = vec![];
        for i in 0..20 {
            let rec = LogRecord::new(
                RecordKind::PageUpdate,
                PageId::new(1, i),
                0,
                &[b'x'; 100],
            );
            lsns.push(w.append(rec)?);
        }
        w.flush()?;

        // 132 bytes per record; 7 records and a Skip fit in 1024 bytes.
        assert_eq!(Lsn::new(1, 0), lsns[0]);
        assert_eq!(Lsn::new(1, 132 * 6), lsns[6]);
        assert_eq!(Lsn::new(2, 0), lsns[7]);
        assert_eq!(Lsn::new(3, 0), lsns[14]);

        assert_eq!(vec![1, 2, 3], LogDir::list_partitions(&config)?);

        // Partition 1 ends with the Skip record
        let reader = LogDir::open(config.clone())?;
        assert_eq!(w.durable_lsn(), reader.durable_lsn());

        let mut buf = vec![0; 4096];
        let n = reader.read_at(Lsn::new(1, 132 * 7), &mut buf)?;
        assert_eq!(32, n);
        let skip = codec::decode(&buf[..n], 256).map_err(io::Error::from)?;
        let skip = skip.map(|r| (r.kind(), r.next_lsn()));
        assert_eq!(Some((RecordKind::Skip, Lsn::new(2, 0))), skip);

        // Reopen appends after the last record
        drop(w);
        let w = LogWriter::open(config)?;
        assert_eq!(Lsn::new(3, 132 * 6), w.end_lsn());

        Ok(())
    }
}
