//! Record builders shared by the crate's tests.

use std::io;

use crate::consumer::LogConsumer;
use crate::record::LogRecord;
use crate::record::LogRecordRef;
use crate::record::RecordKind;
use crate::restore::redo::write_payload;
use crate::types::Lsn;
use crate::types::PageId;

/// Volume id used by test records and volumes.
pub(crate) const VOL: u32 = 1;

pub(crate) fn pid(page: u32) -> PageId {
    PageId::new(VOL, page)
}

/// A `PageUpdate` writing `bytes` at `offset` of the page body.
pub(crate) fn update(page: u32, offset: u16, bytes: &[u8]) -> LogRecord {
    LogRecord::new(
        RecordKind::PageUpdate,
        pid(page),
        0,
        &write_payload(offset, bytes),
    )
}

pub(crate) fn format(page: u32) -> LogRecord {
    LogRecord::new(RecordKind::PageFormat, pid(page), 0, b"")
}

/// A record without a page id.
pub(crate) fn comment(text: &str) -> LogRecord {
    LogRecord::new(RecordKind::Comment, PageId::NULL, 0, text.as_bytes())
}

pub(crate) fn xct_end(txn: u64) -> LogRecord {
    LogRecord::new(RecordKind::XctEnd, PageId::NULL, txn, b"")
}

/// Remembers what a scan delivered.
#[derive(Debug, Default)]
pub(crate) struct Collect {
    pub(crate) kinds: Vec<RecordKind>,
    pub(crate) lsns: Vec<Lsn>,
    pub(crate) files: Vec<String>,
    pub(crate) finalized: bool,
}

impl LogConsumer for Collect {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        self.kinds.push(rec.kind());
        self.lsns.push(rec.lsn());
        Ok(())
    }

    fn new_file(&mut self, name: &str) -> Result<(), io::Error> {
        self.files.push(name.to_string());
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), io::Error> {
        self.finalized = true;
        Ok(())
    }
}
