use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufWriter;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use codeq::error_context_ext::ErrorContextExt;
use log::info;

use crate::restore::page::Page;
use crate::restore::volume::Volume;
use crate::types::Lsn;

/// A copy of every page of a volume, taken when the log was at a known LSN.
///
/// The file holds the pages back to back, followed by a trailer:
/// `u64 lsn | u32 page size | u32 magic`.
#[derive(Debug)]
pub struct BackupImage {
    path: PathBuf,
    lsn: Lsn,
    page_size: usize,
    page_count: u32,
    f: Mutex<File>,
}

impl BackupImage {
    pub const MAGIC: u32 = 0x4c41424b;
    pub const TRAILER_SIZE: usize = 16;

    /// Copy every page of `volume` into a new backup at `path`.
    ///
    /// `lsn` must be a point at which all changes before it are on the
    /// volume, and none after it.
    pub fn take(
        volume: &dyn Volume,
        lsn: Lsn,
        path: impl AsRef<Path>,
    ) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .context(|| format!("create backup {}", path.display()))?;

        let mut w = BufWriter::new(f);
        for page in 0..volume.page_count() {
            let p = volume.read_page(page)?;
            w.write_all(p.as_bytes())?;
        }

        w.write_u64::<BigEndian>(lsn.0)?;
        w.write_u32::<BigEndian>(volume.page_size() as u32)?;
        w.write_u32::<BigEndian>(Self::MAGIC)?;

        let f = w.into_inner().map_err(|e| e.into_error())?;
        f.sync_all()
            .context(|| format!("sync backup {}", path.display()))?;

        info!(
            "Backup of volume {} taken at {}: {}, pages: {}",
            volume.vol_id(),
            lsn,
            path.display(),
            volume.page_count()
        );

        Ok(Self {
            path,
            lsn,
            page_size: volume.page_size(),
            page_count: volume.page_count(),
            f: Mutex::new(f),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();

        let mut f =
            File::open(&path).context(|| format!("open backup {}", path.display()))?;

        let len = f.metadata()?.len();
        if len < Self::TRAILER_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("backup {} is too small: {} bytes", path.display(), len),
            ));
        }

        f.seek(SeekFrom::Start(len - Self::TRAILER_SIZE as u64))?;
        let lsn = Lsn(f.read_u64::<BigEndian>()?);
        let page_size = f.read_u32::<BigEndian>()? as usize;
        let magic = f.read_u32::<BigEndian>()?;

        if magic != Self::MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("backup {} has a bad magic: {:x}", path.display(), magic),
            ));
        }

        let body = len - Self::TRAILER_SIZE as u64;
        if page_size == 0 || body % page_size as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "backup {} holds {} bytes of pages of size {}",
                    path.display(),
                    body,
                    page_size
                ),
            ));
        }

        Ok(Self {
            path,
            lsn,
            page_size,
            page_count: (body / page_size as u64) as u32,
            f: Mutex::new(f),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every log record before this LSN is reflected in the pages.
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn read_page(&self, page: u32) -> Result<Page, io::Error> {
        if page >= self.page_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "page {} is beyond backup {} of {} pages",
                    page,
                    self.path.display(),
                    self.page_count
                ),
            ));
        }

        let mut buf = vec![0; self.page_size];

        let mut f = self.f.lock().unwrap_or_else(PoisonError::into_inner);
        f.seek(SeekFrom::Start(page as u64 * self.page_size as u64))?;
        f.read_exact(&mut buf)?;

        Ok(Page::from_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use pretty_assertions::assert_eq;

    use super::BackupImage;
    use crate::restore::page::Page;
    use crate::restore::volume::FileVolume;
    use crate::restore::volume::Volume;
    use crate::types::Lsn;
    use crate::types::PageId;

    #[test]
    fn test_take_and_open() -> Result<(), io::Error> {
        let temp = tempfile::tempdir()?;

        let vol = FileVolume::create(temp.path().join("vol"), 1, 64, 3)?;
        let mut p = Page::new(PageId::new(1, 1), 64);
        p.set_lsn(Lsn::new(1, 500));
        p.body_mut()[..3].copy_from_slice(b"abc");
        vol.write_page(1, &p)?;

        let path = temp.path().join("backup");
        let taken = BackupImage::take(&vol, Lsn::new(1, 600), &path)?;
        assert_eq!(3, taken.page_count());

        let b = BackupImage::open(&path)?;
        assert_eq!(Lsn::new(1, 600), b.lsn());
        assert_eq!(64, b.page_size());
        assert_eq!(3, b.page_count());
        assert_eq!(p, b.read_page(1)?);
        assert!(b.read_page(3).is_err());

        Ok(())
    }
}
