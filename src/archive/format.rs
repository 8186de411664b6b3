//! On-disk layout of an archive run file.
//!
//! ```text
//! block*    : u32 payload_len | u32 crc32(payload) | payload (whole records)
//! index     : u32 count | count * (u64 page id | u64 block offset) | u32 crc32
//! footer    : u64 index offset | u64 record count | u32 magic | u32 version
//! ```
//!
//! All integers are big endian. The footer has a fixed size so a reader
//! finds the index from the end of the file.

use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use codeq::Decode;
use codeq::Encode;

use crate::types::PageId;

/// `"LARN"`
pub const MAGIC: u32 = 0x4c41_524e;
pub const VERSION: u32 = 1;

pub const BLOCK_HEADER_SIZE: usize = 8;
pub const INDEX_ENTRY_SIZE: usize = 16;
pub const FOOTER_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub payload_len: u32,
    pub crc: u32,
}

impl BlockHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            payload_len: payload.len() as u32,
            crc: crc32fast::hash(payload),
        }
    }

    pub fn verify(&self, payload: &[u8], offset: u64) -> Result<(), io::Error> {
        let crc = crc32fast::hash(payload);
        if crc != self.crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "block checksum mismatch at offset {}: expected {:08x}, got {:08x}",
                    offset, self.crc, crc
                ),
            ));
        }
        Ok(())
    }
}

impl Encode for BlockHeader {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u32::<BigEndian>(self.payload_len)?;
        w.write_u32::<BigEndian>(self.crc)?;
        Ok(BLOCK_HEADER_SIZE)
    }
}

impl Decode for BlockHeader {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let payload_len = r.read_u32::<BigEndian>()?;
        let crc = r.read_u32::<BigEndian>()?;
        Ok(Self { payload_len, crc })
    }
}

/// First page id in a block and the block's offset in the run file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub pid: PageId,
    pub offset: u64,
}

impl IndexEntry {
    pub fn new(pid: PageId, offset: u64) -> Self {
        Self { pid, offset }
    }
}

impl Encode for IndexEntry {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let n = self.pid.encode(&mut w)?;
        w.write_u64::<BigEndian>(self.offset)?;
        Ok(n + 8)
    }
}

impl Decode for IndexEntry {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let pid = PageId::decode(&mut r)?;
        let offset = r.read_u64::<BigEndian>()?;
        Ok(Self { pid, offset })
    }
}

/// The block index of a run, checksummed as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub entries: Vec<IndexEntry>,
}

impl Encode for BlockIndex {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut buf =
            Vec::with_capacity(4 + self.entries.len() * INDEX_ENTRY_SIZE);
        buf.write_u32::<BigEndian>(self.entries.len() as u32)?;
        for e in &self.entries {
            e.encode(&mut buf)?;
        }

        let crc = crc32fast::hash(&buf);
        w.write_all(&buf)?;
        w.write_u32::<BigEndian>(crc)?;

        Ok(buf.len() + 4)
    }
}

impl BlockIndex {
    /// Encoded size of an index with `count` entries.
    pub fn encoded_size(count: u32) -> u64 {
        4 + count as u64 * INDEX_ENTRY_SIZE as u64 + 4
    }

    /// Decode an index that occupies at most `size` bytes.
    ///
    /// The entry count is checked against `size` before the entries are
    /// read, so a corrupt count can not cause a huge allocation.
    pub fn decode_within<R: io::Read>(mut r: R, size: u64) -> Result<Self, io::Error> {
        let count = r.read_u32::<BigEndian>()?;

        if Self::encoded_size(count) > size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "run index entry count {} does not fit in {} bytes",
                    count, size
                ),
            ));
        }

        let mut buf = vec![0u8; count as usize * INDEX_ENTRY_SIZE];
        r.read_exact(&mut buf)?;

        let crc = r.read_u32::<BigEndian>()?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&count.to_be_bytes());
        hasher.update(&buf);
        let actual = hasher.finalize();

        if actual != crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "run index checksum mismatch: expected {:08x}, got {:08x}",
                    crc, actual
                ),
            ));
        }

        let mut entries = Vec::with_capacity(count as usize);
        let mut rd = buf.as_slice();
        for _ in 0..count {
            entries.push(IndexEntry::decode(&mut rd)?);
        }

        Ok(Self { entries })
    }
}

impl Decode for BlockIndex {
    fn decode<R: io::Read>(r: R) -> Result<Self, io::Error> {
        Self::decode_within(r, u64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub record_count: u64,
}

impl Encode for Footer {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u64::<BigEndian>(self.index_offset)?;
        w.write_u64::<BigEndian>(self.record_count)?;
        w.write_u32::<BigEndian>(MAGIC)?;
        w.write_u32::<BigEndian>(VERSION)?;
        Ok(FOOTER_SIZE)
    }
}

impl Decode for Footer {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let index_offset = r.read_u64::<BigEndian>()?;
        let record_count = r.read_u64::<BigEndian>()?;

        let magic = r.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad run file magic: {:08x}", magic),
            ));
        }

        let version = r.read_u32::<BigEndian>()?;
        if version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported run file version: {}", version),
            ));
        }

        Ok(Self {
            index_offset,
            record_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use codeq::Decode;
    use codeq::Encode;

    use super::BlockIndex;
    use super::Footer;
    use super::IndexEntry;
    use crate::types::PageId;

    #[test]
    fn test_footer_layout() -> Result<(), io::Error> {
        let footer = Footer {
            index_offset: 0x0102,
            record_count: 3,
        };

        let mut b = Vec::new();
        let n = footer.encode(&mut b)?;
        assert_eq!(24, n);

        let want: Vec<u8> = vec![
            0, 0, 0, 0, 0, 0, 1, 2, // index offset
            0, 0, 0, 0, 0, 0, 0, 3, // record count
            b'L', b'A', b'R', b'N', // magic
            0, 0, 0, 1, // version
        ];
        assert_eq!(want, b);

        assert_eq!(footer, Footer::decode(&mut b.as_slice())?);

        b[17] = b'X';
        assert!(Footer::decode(&mut b.as_slice()).is_err());

        Ok(())
    }

    #[test]
    fn test_block_index_checksum() -> Result<(), io::Error> {
        let index = BlockIndex {
            entries: vec![
                IndexEntry::new(PageId::new(1, 1), 0),
                IndexEntry::new(PageId::new(1, 9), 4096),
            ],
        };

        let mut b = Vec::new();
        let n = index.encode(&mut b)?;
        assert_eq!(4 + 2 * 16 + 4, n);
        assert_eq!(n, b.len());

        assert_eq!(index, BlockIndex::decode(&mut b.as_slice())?);

        // Flip one bit of the second entry
        b[20] ^= 1;
        let err = BlockIndex::decode(&mut b.as_slice()).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());

        Ok(())
    }

    #[test]
    fn test_block_index_count_exceeds_size() -> Result<(), io::Error> {
        let index = BlockIndex {
            entries: vec![IndexEntry::new(PageId::new(1, 1), 0)],
        };

        let mut b = Vec::new();
        let n = index.encode(&mut b)?;
        assert_eq!(BlockIndex::encoded_size(1), n as u64);

        assert_eq!(index, BlockIndex::decode_within(&mut b.as_slice(), n as u64)?);

        // A corrupt count is refused before anything is allocated for it.
        b[0..4].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = BlockIndex::decode_within(&mut b.as_slice(), n as u64).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
        assert!(err.to_string().contains("4294967295"), "{}", err);

        Ok(())
    }
}
