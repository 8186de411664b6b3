//! Log records: the envelope shared by the raw log and archive runs.

pub mod codec;

use std::fmt;
use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
pub use codec::FLAG_SINGLE_SYS_XCT;
pub use codec::HEADER_SIZE;

use crate::types::Lsn;
use crate::types::PageId;
use crate::types::TxnId;

/// Upper bound for a record decoded from a run file, where no [`Config`] is
/// at hand. Records are validated against the configured maximum when the
/// log is scanned, so this only catches garbage.
///
/// [`Config`]: crate::Config
pub const RECORD_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// The closed set of log record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Ends a log partition; the next record is at the start of the next
    /// partition.
    Skip = 0,
    TickSec = 1,
    TickMsec = 2,
    Comment = 3,
    ChkptBegin = 4,
    ChkptEnd = 5,
    XctEnd = 6,
    XctAbort = 7,
    Compensate = 8,
    PageAlloc = 9,
    PageDealloc = 10,
    /// Reset a page to an empty body.
    PageFormat = 11,
    /// Full page body image.
    PageImage = 12,
    PageInsert = 13,
    PageUpdate = 14,
    PageDelete = 15,
    RestoreBegin = 16,
    RestoreSegment = 17,
    RestoreEnd = 18,
}

impl RecordKind {
    pub const COUNT: usize = 19;

    pub const ALL: [RecordKind; Self::COUNT] = [
        RecordKind::Skip,
        RecordKind::TickSec,
        RecordKind::TickMsec,
        RecordKind::Comment,
        RecordKind::ChkptBegin,
        RecordKind::ChkptEnd,
        RecordKind::XctEnd,
        RecordKind::XctAbort,
        RecordKind::Compensate,
        RecordKind::PageAlloc,
        RecordKind::PageDealloc,
        RecordKind::PageFormat,
        RecordKind::PageImage,
        RecordKind::PageInsert,
        RecordKind::PageUpdate,
        RecordKind::PageDelete,
        RecordKind::RestoreBegin,
        RecordKind::RestoreSegment,
        RecordKind::RestoreEnd,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Skip => "skip",
            RecordKind::TickSec => "tick_sec",
            RecordKind::TickMsec => "tick_msec",
            RecordKind::Comment => "comment",
            RecordKind::ChkptBegin => "chkpt_begin",
            RecordKind::ChkptEnd => "chkpt_end",
            RecordKind::XctEnd => "xct_end",
            RecordKind::XctAbort => "xct_abort",
            RecordKind::Compensate => "compensate",
            RecordKind::PageAlloc => "page_alloc",
            RecordKind::PageDealloc => "page_dealloc",
            RecordKind::PageFormat => "page_format",
            RecordKind::PageImage => "page_image",
            RecordKind::PageInsert => "page_insert",
            RecordKind::PageUpdate => "page_update",
            RecordKind::PageDelete => "page_delete",
            RecordKind::RestoreBegin => "restore_begin",
            RecordKind::RestoreSegment => "restore_segment",
            RecordKind::RestoreEnd => "restore_end",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A borrowed view of one encoded log record.
///
/// Only produced by [`codec::decode`] or from a [`LogRecord`], so the header
/// is known to be valid and the slice is exactly one record long.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LogRecordRef<'a> {
    bytes: &'a [u8],
}

impl<'a> LogRecordRef<'a> {
    pub(crate) fn new_unchecked(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> RecordKind {
        // The kind was validated when the view was created.
        RecordKind::from_u8(codec::read_kind(self.bytes))
            .unwrap_or(RecordKind::Comment)
    }

    pub fn flags(&self) -> u8 {
        codec::read_flags(self.bytes)
    }

    pub fn is_single_sys_xct(&self) -> bool {
        self.flags() & FLAG_SINGLE_SYS_XCT != 0
    }

    pub fn page_id(&self) -> PageId {
        codec::read_page_id(self.bytes)
    }

    /// Whether the record is system-wide rather than page-scoped.
    pub fn null_pid(&self) -> bool {
        self.page_id().is_null()
    }

    pub fn lsn(&self) -> Lsn {
        codec::read_lsn(self.bytes)
    }

    /// LSN of the record that follows this one in the raw log.
    pub fn next_lsn(&self) -> Lsn {
        if self.kind() == RecordKind::Skip {
            self.lsn().next_partition()
        } else {
            self.lsn().advance(self.len() as u64)
        }
    }

    pub fn txn(&self) -> Option<TxnId> {
        match codec::read_txn(self.bytes) {
            0 => None,
            t => Some(t),
        }
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            buf: self.bytes.to_vec(),
        }
    }
}

impl fmt::Debug for LogRecordRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("kind", &self.kind())
            .field("pid", &format_args!("{}", self.page_id()))
            .field("lsn", &format_args!("{}", self.lsn()))
            .field("txn", &self.txn())
            .field("len", &self.len())
            .finish()
    }
}

impl fmt::Display for LogRecordRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} pid={} len={}",
            self.lsn(),
            self.kind(),
            self.page_id(),
            self.len()
        )?;
        if let Some(txn) = self.txn() {
            write!(f, " txn={}", txn)?;
        }
        if self.is_single_sys_xct() {
            write!(f, " ssx")?;
        }
        Ok(())
    }
}

/// An owned, encoded log record.
#[derive(Clone, PartialEq, Eq)]
pub struct LogRecord {
    buf: Vec<u8>,
}

impl LogRecord {
    /// Build a record. The LSN is assigned when the record is appended to
    /// the log.
    pub fn new(
        kind: RecordKind,
        pid: PageId,
        txn: TxnId,
        payload: &[u8],
    ) -> Self {
        Self {
            buf: codec::encode(kind, 0, pid, Lsn::NULL, txn, payload),
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        codec::write_flags(&mut self.buf, flags);
        self
    }

    pub fn with_lsn(mut self, lsn: Lsn) -> Self {
        self.set_lsn(lsn);
        self
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        codec::write_lsn(&mut self.buf, lsn);
    }

    pub fn view(&self) -> LogRecordRef<'_> {
        LogRecordRef::new_unchecked(&self.buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn lsn(&self) -> Lsn {
        self.view().lsn()
    }

    pub fn page_id(&self) -> PageId {
        self.view().page_id()
    }

    pub fn kind(&self) -> RecordKind {
        self.view().kind()
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

impl codeq::Encode for LogRecord {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_all(&self.buf)?;
        Ok(self.buf.len())
    }
}

impl codeq::Decode for LogRecord {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let len = r.read_u32::<BigEndian>()? as usize;
        if !(HEADER_SIZE..=RECORD_SIZE_LIMIT).contains(&len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid log record length: {}", len),
            ));
        }

        let mut buf = vec![0u8; len];
        buf[..4].copy_from_slice(&(len as u32).to_be_bytes());
        r.read_exact(&mut buf[4..])?;

        codec::check_header(&buf, RECORD_SIZE_LIMIT)?;

        Ok(Self { buf })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use codeq::Decode;
    use codeq::Encode;

    use super::LogRecord;
    use super::RecordKind;
    use crate::types::Lsn;
    use crate::types::PageId;

    #[test]
    fn test_kind_table() {
        for (i, k) in RecordKind::ALL.iter().enumerate() {
            assert_eq!(i, k.index());
            assert_eq!(Some(*k), RecordKind::from_u8(i as u8));
            assert_eq!(Some(*k), RecordKind::from_name(k.as_str()));
        }
        assert_eq!(None, RecordKind::from_u8(RecordKind::COUNT as u8));
    }

    #[test]
    fn test_next_lsn() {
        let rec = LogRecord::new(RecordKind::PageUpdate, PageId::new(1, 1), 0, b"1234")
            .with_lsn(Lsn::new(2, 100));
        assert_eq!(Lsn::new(2, 136), rec.view().next_lsn());

        let skip = LogRecord::new(RecordKind::Skip, PageId::NULL, 0, b"")
            .with_lsn(Lsn::new(2, 500));
        assert_eq!(Lsn::new(3, 0), skip.view().next_lsn());
    }

    #[test]
    fn test_record_codeq() -> Result<(), io::Error> {
        let rec = LogRecord::new(RecordKind::PageDelete, PageId::new(3, 4), 7, b"payload")
            .with_lsn(Lsn::new(1, 4096));

        let mut b = Vec::new();
        let n = rec.encode(&mut b)?;
        assert_eq!(n, rec.len());

        let got = LogRecord::decode(&mut b.as_slice())?;
        assert_eq!(rec, got);
        assert_eq!(Some(7), got.view().txn());
        assert_eq!(b"payload", got.view().payload());

        // Truncated input
        let res = LogRecord::decode(&mut &b[..b.len() - 1]);
        assert_eq!(io::ErrorKind::UnexpectedEof, res.unwrap_err().kind());

        Ok(())
    }
}
