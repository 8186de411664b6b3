use std::io;

use byteorder::BigEndian;
use byteorder::ByteOrder;

use crate::record::LogRecordRef;
use crate::record::RecordKind;
use crate::restore::page::Page;

/// Applies the effect of a log record to a page image.
pub trait RedoApplier: Send + Sync {
    /// Apply `rec` to `page` if the page does not reflect it yet.
    ///
    /// Returns whether the page changed.
    fn apply(&self, page: &mut Page, rec: LogRecordRef<'_>) -> Result<bool, io::Error>;
}

/// Redo of the page record kinds, with these payloads:
///
/// - `PageFormat`, `PageDealloc`: none; the body is zeroed.
/// - `PageImage`: the body, copied from offset 0.
/// - `PageInsert`, `PageUpdate`: `u16 offset | bytes`, written at `offset`.
/// - `PageDelete`: `u16 offset | u16 len`; the range is zeroed.
///
/// Other kinds only advance the page LSN.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRedo;

impl PageRedo {
    fn range(
        page: &Page,
        rec: &LogRecordRef<'_>,
        offset: usize,
        len: usize,
    ) -> Result<std::ops::Range<usize>, io::Error> {
        let end = offset + len;
        if end > page.body().len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} at {} writes [{}, {}) beyond page body of {} bytes",
                    rec.kind(),
                    rec.lsn(),
                    offset,
                    end,
                    page.body().len()
                ),
            ));
        }
        Ok(offset..end)
    }

    fn payload_header(rec: &LogRecordRef<'_>, size: usize) -> Result<(), io::Error> {
        if rec.payload().len() < size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} at {} has a payload of {} bytes, expected at least {}",
                    rec.kind(),
                    rec.lsn(),
                    rec.payload().len(),
                    size
                ),
            ));
        }
        Ok(())
    }
}

impl RedoApplier for PageRedo {
    fn apply(&self, page: &mut Page, rec: LogRecordRef<'_>) -> Result<bool, io::Error> {
        if rec.lsn() <= page.lsn() {
            return Ok(false);
        }

        let payload = rec.payload();

        match rec.kind() {
            RecordKind::PageFormat | RecordKind::PageDealloc => {
                page.body_mut().fill(0);
            }
            RecordKind::PageImage => {
                let r = Self::range(page, &rec, 0, payload.len())?;
                let body = page.body_mut();
                body.fill(0);
                body[r].copy_from_slice(payload);
            }
            RecordKind::PageInsert | RecordKind::PageUpdate => {
                Self::payload_header(&rec, 2)?;
                let offset = BigEndian::read_u16(&payload[0..2]) as usize;
                let bytes = &payload[2..];

                let r = Self::range(page, &rec, offset, bytes.len())?;
                page.body_mut()[r].copy_from_slice(bytes);
            }
            RecordKind::PageDelete => {
                Self::payload_header(&rec, 4)?;
                let offset = BigEndian::read_u16(&payload[0..2]) as usize;
                let len = BigEndian::read_u16(&payload[2..4]) as usize;

                let r = Self::range(page, &rec, offset, len)?;
                page.body_mut()[r].fill(0);
            }
            _ => {}
        }

        page.set_lsn(rec.lsn());
        page.set_page_id(rec.page_id());
        Ok(true)
    }
}

/// Payload of a `PageInsert` or `PageUpdate` record for [`PageRedo`].
pub fn write_payload(offset: u16, bytes: &[u8]) -> Vec<u8> {
    let mut b = vec![0; 2];
    BigEndian::write_u16(&mut b, offset);
    b.extend_from_slice(bytes);
    b
}

/// Payload of a `PageDelete` record for [`PageRedo`].
pub fn delete_payload(offset: u16, len: u16) -> Vec<u8> {
    let mut b = vec![0; 4];
    BigEndian::write_u16(&mut b[0..2], offset);
    BigEndian::write_u16(&mut b[2..4], len);
    b
}
