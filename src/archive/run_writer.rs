use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;

use codeq::error_context_ext::ErrorContextExt;
use codeq::Encode;
use log::debug;

use crate::archive::format::BlockHeader;
use crate::archive::format::BlockIndex;
use crate::archive::format::Footer;
use crate::archive::format::IndexEntry;
use crate::archive::format::BLOCK_HEADER_SIZE;
use crate::archive::index::RunIndex;
use crate::archive::RunId;
use crate::record::LogRecordRef;
use crate::types::Lsn;
use crate::types::PageId;

/// Writes one run into a temporary file and renames it into place on
/// [`finish`](Self::finish).
///
/// Records must be appended in `(page id, lsn)` order. Dropping an unfinished
/// writer leaves the temporary file behind; it is removed on the next startup.
#[derive(Debug)]
pub struct RunWriter {
    run_id: RunId,
    dir: PathBuf,
    tmp_path: PathBuf,
    w: BufWriter<File>,

    block_size: usize,
    block: Vec<u8>,

    /// Offset of the block being filled.
    offset: u64,

    entries: Vec<IndexEntry>,
    record_count: u64,
    last_key: Option<(PageId, Lsn)>,
}

impl RunWriter {
    pub(crate) fn create(
        dir: PathBuf,
        run_id: RunId,
        block_size: usize,
    ) -> Result<Self, io::Error> {
        let tmp_path = dir.join(run_id.temp_file_name());

        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .context(|| format!("create {}", tmp_path.display()))?;

        Ok(Self {
            run_id,
            dir,
            tmp_path,
            w: BufWriter::with_capacity(block_size + BLOCK_HEADER_SIZE, f),
            block_size,
            block: Vec::with_capacity(block_size),
            offset: 0,
            entries: vec![],
            record_count: 0,
            last_key: None,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn append(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        let key = (rec.page_id(), rec.lsn());
        if let Some(last) = self.last_key {
            if key < last {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "out of order record for {}: ({}, {}) after ({}, {})",
                        self.run_id, key.0, key.1, last.0, last.1
                    ),
                ));
            }
        }
        if !self.run_id.contains(rec.lsn()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record at {} is outside {}", rec.lsn(), self.run_id),
            ));
        }
        self.last_key = Some(key);

        // A block is never split; an oversized record gets a block of its own.
        if !self.block.is_empty() && self.block.len() + rec.len() > self.block_size
        {
            self.write_block()?;
        }

        if self.block.is_empty() {
            self.entries.push(IndexEntry::new(rec.page_id(), self.offset));
        }

        self.block.extend_from_slice(rec.as_bytes());
        self.record_count += 1;

        Ok(())
    }

    fn write_block(&mut self) -> Result<(), io::Error> {
        let header = BlockHeader::for_payload(&self.block);
        header.encode(&mut self.w)?;
        self.w.write_all(&self.block)?;

        self.offset += (BLOCK_HEADER_SIZE + self.block.len()) as u64;
        self.block.clear();
        Ok(())
    }

    /// Write the index and footer, make the file durable and rename it to its
    /// final name.
    pub fn finish(mut self) -> Result<RunIndex, io::Error> {
        if !self.block.is_empty() {
            self.write_block()?;
        }

        let index_offset = self.offset;
        let index = BlockIndex {
            entries: std::mem::take(&mut self.entries),
        };
        index.encode(&mut self.w)?;

        let footer = Footer {
            index_offset,
            record_count: self.record_count,
        };
        footer.encode(&mut self.w)?;

        let f = self.w.into_inner().map_err(|e| e.into_error())?;
        f.sync_all()
            .context(|| format!("sync {}", self.tmp_path.display()))?;

        let final_path = self.dir.join(self.run_id.file_name());
        fs::rename(&self.tmp_path, &final_path).context(|| {
            format!(
                "rename {} to {}",
                self.tmp_path.display(),
                final_path.display()
            )
        })?;

        File::open(&self.dir)?.sync_all()?;

        debug!(
            "Run written: {}: records: {}, blocks: {}",
            self.run_id,
            self.record_count,
            index.entries.len()
        );

        Ok(RunIndex {
            run_id: self.run_id,
            entries: index.entries,
            record_count: self.record_count,
            index_offset,
        })
    }
}
