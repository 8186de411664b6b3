//! Binary layout of the log record envelope.
//!
//! All offset arithmetic on raw record bytes lives here. A record is:
//!
//! ```text
//! offset width field
//!      0     4 length, header included      (u32, big endian)
//!      4     1 kind                         (RecordKind as u8)
//!      5     1 flags                        (bit 0: single system transaction)
//!      6     2 reserved, always zero
//!      8     4 page id: volume              (u32, big endian; 0: no page)
//!     12     4 page id: page number         (u32, big endian)
//!     16     8 lsn                          (u64, big endian)
//!     24     8 transaction id               (u64, big endian; 0: none)
//!     32     * payload
//! ```

use byteorder::BigEndian;
use byteorder::ByteOrder;

use crate::errors::RecordParseError;
use crate::record::LogRecordRef;
use crate::record::RecordKind;
use crate::types::Lsn;
use crate::types::PageId;
use crate::types::TxnId;

pub const HEADER_SIZE: usize = 32;

/// Flag bit: the record is a complete single-record system transaction.
pub const FLAG_SINGLE_SYS_XCT: u8 = 0x01;

const LEN_OFF: usize = 0;
const KIND_OFF: usize = 4;
const FLAGS_OFF: usize = 5;
const VOL_OFF: usize = 8;
const PAGE_OFF: usize = 12;
const LSN_OFF: usize = 16;
const TXN_OFF: usize = 24;

/// Encode a complete record into a new buffer.
pub fn encode(
    kind: RecordKind,
    flags: u8,
    pid: PageId,
    lsn: Lsn,
    txn: TxnId,
    payload: &[u8],
) -> Vec<u8> {
    let len = HEADER_SIZE + payload.len();
    let mut buf = vec![0u8; len];

    BigEndian::write_u32(&mut buf[LEN_OFF..], len as u32);
    buf[KIND_OFF] = kind as u8;
    buf[FLAGS_OFF] = flags;
    BigEndian::write_u32(&mut buf[VOL_OFF..], pid.vol);
    BigEndian::write_u32(&mut buf[PAGE_OFF..], pid.page);
    BigEndian::write_u64(&mut buf[LSN_OFF..], lsn.0);
    BigEndian::write_u64(&mut buf[TXN_OFF..], txn);
    buf[HEADER_SIZE..].copy_from_slice(payload);

    buf
}

pub(crate) fn write_flags(buf: &mut [u8], flags: u8) {
    buf[FLAGS_OFF] = flags;
}

/// Overwrite the LSN field of an encoded record.
pub(crate) fn write_lsn(buf: &mut [u8], lsn: Lsn) {
    BigEndian::write_u64(&mut buf[LSN_OFF..], lsn.0);
}

/// Validate a complete header and return the record length and kind.
///
/// `header` must hold at least [`HEADER_SIZE`] bytes.
pub fn check_header(
    header: &[u8],
    max_record_size: usize,
) -> Result<(usize, RecordKind), RecordParseError> {
    debug_assert!(header.len() >= HEADER_SIZE);

    let length = read_length(header);
    let at = read_lsn(header);

    if (length as usize) < HEADER_SIZE || (length as usize) > max_record_size {
        return Err(RecordParseError::CorruptLength {
            at,
            length,
            min: HEADER_SIZE,
            max: max_record_size,
        });
    }

    let kind = RecordKind::from_u8(header[KIND_OFF])
        .ok_or(RecordParseError::UnknownKind {
            at,
            kind: header[KIND_OFF],
        })?;

    Ok((length as usize, kind))
}

/// Decode the record at the start of `bytes`.
///
/// Returns `Ok(None)` if `bytes` does not hold the whole record yet.
pub fn decode(
    bytes: &[u8],
    max_record_size: usize,
) -> Result<Option<LogRecordRef<'_>>, RecordParseError> {
    if bytes.len() < HEADER_SIZE {
        return Ok(None);
    }

    let (len, _kind) = check_header(bytes, max_record_size)?;
    if bytes.len() < len {
        return Ok(None);
    }

    Ok(Some(LogRecordRef::new_unchecked(&bytes[..len])))
}

pub(crate) fn read_length(b: &[u8]) -> u32 {
    BigEndian::read_u32(&b[LEN_OFF..])
}

pub(crate) fn read_kind(b: &[u8]) -> u8 {
    b[KIND_OFF]
}

pub(crate) fn read_flags(b: &[u8]) -> u8 {
    b[FLAGS_OFF]
}

pub(crate) fn read_page_id(b: &[u8]) -> PageId {
    PageId::new(
        BigEndian::read_u32(&b[VOL_OFF..]),
        BigEndian::read_u32(&b[PAGE_OFF..]),
    )
}

pub(crate) fn read_lsn(b: &[u8]) -> Lsn {
    Lsn(BigEndian::read_u64(&b[LSN_OFF..]))
}

pub(crate) fn read_txn(b: &[u8]) -> TxnId {
    BigEndian::read_u64(&b[TXN_OFF..])
}
