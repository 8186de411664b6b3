use std::fmt;

use byteorder::BigEndian;
use byteorder::ByteOrder;

use crate::types::Lsn;
use crate::types::PageId;

/// Size of the page header: `u64 page lsn | u64 page id`.
pub const PAGE_HEADER_SIZE: usize = 16;

/// A page image: a header with the LSN of the last applied record, followed
/// by the body the redo records modify.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    buf: Vec<u8>,
}

impl Page {
    pub fn zeroed(page_size: usize) -> Self {
        debug_assert!(page_size >= PAGE_HEADER_SIZE);
        Self {
            buf: vec![0; page_size],
        }
    }

    /// A zeroed page that belongs to `pid`.
    pub fn new(pid: PageId, page_size: usize) -> Self {
        let mut p = Self::zeroed(page_size);
        p.set_page_id(pid);
        p
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        debug_assert!(buf.len() >= PAGE_HEADER_SIZE);
        Self { buf }
    }

    pub fn lsn(&self) -> Lsn {
        Lsn(BigEndian::read_u64(&self.buf[0..8]))
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        BigEndian::write_u64(&mut self.buf[0..8], lsn.0);
    }

    pub fn page_id(&self) -> PageId {
        PageId::from_u64(BigEndian::read_u64(&self.buf[8..16]))
    }

    pub fn set_page_id(&mut self, pid: PageId) {
        BigEndian::write_u64(&mut self.buf[8..16], pid.to_u64());
    }

    pub fn body(&self) -> &[u8] {
        &self.buf[PAGE_HEADER_SIZE..]
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.buf[PAGE_HEADER_SIZE..]
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
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("pid", &format_args!("{}", self.page_id()))
            .field("lsn", &format_args!("{}", self.lsn()))
            .field("size", &self.buf.len())
            .finish()
    }
}
