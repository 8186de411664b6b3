use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use codeq::error_context_ext::ErrorContextExt;
use codeq::Decode;

use crate::archive::format::BlockHeader;
use crate::archive::format::BlockIndex;
use crate::archive::format::Footer;
use crate::archive::format::BLOCK_HEADER_SIZE;
use crate::archive::format::FOOTER_SIZE;
use crate::archive::index::RunIndex;
use crate::archive::RunId;

/// Random access to the blocks, index and footer of one run file.
#[derive(Debug)]
pub struct RunReader {
    run_id: RunId,
    f: File,
    file_size: u64,
    footer: Footer,
}

impl RunReader {
    pub(crate) fn open(path: &Path, run_id: RunId) -> Result<Self, io::Error> {
        let mut f =
            File::open(path).context(|| format!("open {}", path.display()))?;

        let file_size = f.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "run file {} is too small: {} bytes",
                    path.display(),
                    file_size
                ),
            ));
        }

        f.seek(SeekFrom::Start(file_size - FOOTER_SIZE as u64))?;
        let footer = Footer::decode(&mut f)
            .context(|| format!("read footer of {}", path.display()))?;

        if footer.index_offset > file_size - FOOTER_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "index offset {} beyond the end of {}",
                    footer.index_offset,
                    path.display()
                ),
            ));
        }

        Ok(Self {
            run_id,
            f,
            file_size,
            footer,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn read_index(&mut self) -> Result<RunIndex, io::Error> {
        self.f.seek(SeekFrom::Start(self.footer.index_offset))?;
        let size = self.file_size - FOOTER_SIZE as u64 - self.footer.index_offset;
        let index = BlockIndex::decode_within(&mut self.f, size)
            .context(|| format!("read index of {}", self.run_id))?;

        Ok(RunIndex {
            run_id: self.run_id,
            entries: index.entries,
            record_count: self.footer.record_count,
            index_offset: self.footer.index_offset,
        })
    }

    /// Load the block at `offset` into `buf`, verifying its checksum.
    ///
    /// Returns the offset of the next block, or `None` if `offset` is at the
    /// end of the blocks.
    pub fn read_block(
        &mut self,
        offset: u64,
        buf: &mut Vec<u8>,
    ) -> Result<Option<u64>, io::Error> {
        if offset >= self.footer.index_offset {
            return Ok(None);
        }

        self.f.seek(SeekFrom::Start(offset))?;
        let header = BlockHeader::decode(&mut self.f)
            .context(|| format!("read block header at {} of {}", offset, self.run_id))?;

        let next = offset + (BLOCK_HEADER_SIZE as u64) + header.payload_len as u64;
        if next > self.footer.index_offset {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "block at {} of {} overruns the index at {}",
                    offset, self.run_id, self.footer.index_offset
                ),
            ));
        }

        buf.clear();
        buf.resize(header.payload_len as usize, 0);
        self.f
            .read_exact(buf)
            .context(|| format!("read block at {} of {}", offset, self.run_id))?;

        header.verify(buf, offset)?;

        Ok(Some(next))
    }
}
