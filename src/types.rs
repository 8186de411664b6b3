use std::fmt;
use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// Log sequence number: the position of a record in the recovery log.
///
/// The high 32 bits are the partition number, the low 32 bits the byte offset
/// inside that partition. Comparing the raw `u64` therefore orders records the
/// way they were written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const NULL: Lsn = Lsn(0);
    pub const MAX: Lsn = Lsn(u64::MAX);

    pub fn new(partition: u32, offset: u32) -> Self {
        Lsn(((partition as u64) << 32) | offset as u64)
    }

    pub fn partition(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(&self) -> u32 {
        self.0 as u32
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The LSN `n` bytes further in the same partition.
    pub fn advance(&self, n: u64) -> Self {
        debug_assert!(self.offset() as u64 + n <= u32::MAX as u64);
        Lsn(self.0 + n)
    }

    /// The first LSN of the partition after this one.
    pub fn next_partition(&self) -> Self {
        Lsn::new(self.partition() + 1, 0)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.partition(), self.offset())
    }
}

impl From<u64> for Lsn {
    fn from(v: u64) -> Self {
        Lsn(v)
    }
}

/// Identifies a page: volume id plus page number inside the volume.
///
/// `vol == 0` is reserved for records that do not belong to any page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId {
    pub vol: u32,
    pub page: u32,
}

impl PageId {
    pub const NULL: PageId = PageId { vol: 0, page: 0 };

    pub fn new(vol: u32, page: u32) -> Self {
        Self { vol, page }
    }

    pub fn is_null(&self) -> bool {
        self.vol == 0
    }

    pub fn to_u64(self) -> u64 {
        ((self.vol as u64) << 32) | self.page as u64
    }

    pub fn from_u64(v: u64) -> Self {
        Self {
            vol: (v >> 32) as u32,
            page: v as u32,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.vol, self.page)
    }
}

impl codeq::Encode for PageId {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u32::<BigEndian>(self.vol)?;
        w.write_u32::<BigEndian>(self.page)?;
        Ok(8)
    }
}

impl codeq::Decode for PageId {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let vol = r.read_u32::<BigEndian>()?;
        let page = r.read_u32::<BigEndian>()?;
        Ok(Self { vol, page })
    }
}

/// Transaction id; `0` means the record has no transaction.
pub type TxnId = u64;
