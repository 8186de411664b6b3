use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::PoisonError;

use codeq::error_context_ext::ErrorContextExt;
use log::info;

use crate::restore::page::Page;

/// The device a volume's pages live on.
///
/// Pages are addressed by their number inside the volume.
pub trait Volume: Send + Sync {
    fn vol_id(&self) -> u32;

    fn page_size(&self) -> usize;

    fn page_count(&self) -> u32;

    fn read_page(&self, page: u32) -> Result<Page, io::Error>;

    fn write_page(&self, page: u32, p: &Page) -> Result<(), io::Error>;

    /// Make every written page durable.
    fn sync(&self) -> Result<(), io::Error>;

    fn mark_failed(&self);

    fn mark_healthy(&self);

    fn is_failed(&self) -> bool;
}

/// Write one line per page of `volume` with the page id and LSN it holds.
///
/// Returns the number of pages that were ever written, i.e. with a non-null
/// LSN.
pub fn dump_page_lsns<W: Write>(volume: &dyn Volume, mut w: W) -> Result<u32, io::Error> {
    let mut written = 0;

    for page in 0..volume.page_count() {
        let p = volume.read_page(page)?;
        if !p.lsn().is_null() {
            written += 1;
        }
        writeln!(w, "Page {}: pid={} lsn={}", page, p.page_id(), p.lsn())?;
    }

    writeln!(
        w,
        "volume {}: {} of {} pages written",
        volume.vol_id(),
        written,
        volume.page_count()
    )?;
    Ok(written)
}

/// A volume stored in one flat file of `page_count * page_size` bytes.
#[derive(Debug)]
pub struct FileVolume {
    path: PathBuf,
    vol_id: u32,
    page_size: usize,
    page_count: u32,
    f: Mutex<File>,
    failed: AtomicBool,
}

impl FileVolume {
    /// Create a volume of zeroed pages, truncating any existing file.
    pub fn create(
        path: impl AsRef<Path>,
        vol_id: u32,
        page_size: usize,
        page_count: u32,
    ) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .context(|| format!("create volume {}", path.display()))?;

        f.set_len(page_size as u64 * page_count as u64)?;

        info!(
            "Volume {} created: {}, pages: {} x {}",
            vol_id,
            path.display(),
            page_count,
            page_size
        );

        Ok(Self::new(path, vol_id, page_size, page_count, f))
    }

    pub fn open(
        path: impl AsRef<Path>,
        vol_id: u32,
        page_size: usize,
    ) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .context(|| format!("open volume {}", path.display()))?;

        let len = f.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "volume {} size {} is not a multiple of page size {}",
                    path.display(),
                    len,
                    page_size
                ),
            ));
        }

        let page_count = (len / page_size as u64) as u32;
        Ok(Self::new(path, vol_id, page_size, page_count, f))
    }

    fn new(
        path: PathBuf,
        vol_id: u32,
        page_size: usize,
        page_count: u32,
        f: File,
    ) -> Self {
        Self {
            path,
            vol_id,
            page_size,
            page_count,
            f: Mutex::new(f),
            failed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_page(&self, page: u32) -> Result<u64, io::Error> {
        if page >= self.page_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "page {} is beyond volume {} of {} pages",
                    page, self.vol_id, self.page_count
                ),
            ));
        }
        Ok(page as u64 * self.page_size as u64)
    }
}

impl Volume for FileVolume {
    fn vol_id(&self) -> u32 {
        self.vol_id
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn read_page(&self, page: u32) -> Result<Page, io::Error> {
        let offset = self.check_page(page)?;

        let mut buf = vec![0; self.page_size];
        {
            let mut f = self.f.lock().unwrap_or_else(PoisonError::into_inner);
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(&mut buf)
                .context(|| format!("read page {} of {}", page, self.path.display()))?;
        }

        Ok(Page::from_bytes(buf))
    }

    fn write_page(&self, page: u32, p: &Page) -> Result<(), io::Error> {
        let offset = self.check_page(page)?;

        if p.len() != self.page_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "page of {} bytes written to volume of page size {}",
                    p.len(),
                    self.page_size
                ),
            ));
        }

        let mut f = self.f.lock().unwrap_or_else(PoisonError::into_inner);
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(p.as_bytes())
            .context(|| format!("write page {} of {}", page, self.path.display()))
    }

    fn sync(&self) -> Result<(), io::Error> {
        let f = self.f.lock().unwrap_or_else(PoisonError::into_inner);
        f.sync_data()
    }

    fn mark_failed(&self) {
        info!("Volume {} marked failed", self.vol_id);
        self.failed.store(true, Ordering::Release);
    }

    fn mark_healthy(&self) {
        info!("Volume {} marked healthy", self.vol_id);
        self.failed.store(false, Ordering::Release);
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}
