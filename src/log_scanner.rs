//! Splits blocks of raw log bytes into records.

use std::cmp::min;

use crate::errors::RecordParseError;
use crate::record::codec;
use crate::record::LogRecordRef;
use crate::record::RecordKind;
use crate::record::HEADER_SIZE;

/// Per-kind mask of records a scanner skips without materializing them.
///
/// `Skip` records end a log partition and are never ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindFilter {
    ignored: [bool; RecordKind::COUNT],
}

impl Default for KindFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl KindFilter {
    pub fn accept_all() -> Self {
        Self {
            ignored: [false; RecordKind::COUNT],
        }
    }

    pub fn ignore_all() -> Self {
        let mut f = Self {
            ignored: [true; RecordKind::COUNT],
        };
        f.ignored[RecordKind::Skip.index()] = false;
        f
    }

    /// Accept exactly `kinds`, plus `Skip`.
    pub fn only(kinds: impl IntoIterator<Item = RecordKind>) -> Self {
        let mut f = Self::ignore_all();
        for k in kinds {
            f.unset_ignore(k);
        }
        f
    }

    pub fn set_ignore(&mut self, kind: RecordKind) {
        if kind != RecordKind::Skip {
            self.ignored[kind.index()] = true;
        }
    }

    pub fn unset_ignore(&mut self, kind: RecordKind) {
        self.ignored[kind.index()] = false;
    }

    pub fn is_ignored(&self, kind: RecordKind) -> bool {
        self.ignored[kind.index()]
    }
}

/// Parses consecutive blocks of the log into [`LogRecordRef`]s.
///
/// A record cut by the end of a block is buffered and completed with the
/// bytes of the next block, so callers just feed blocks in log order.
#[derive(Debug)]
pub struct LogScanner {
    max_record_size: usize,
    filter: KindFilter,

    /// Leading bytes of a record cut at the end of the previous block.
    truncated: Vec<u8>,

    /// A reassembled record handed out to the caller.
    current: Vec<u8>,

    /// Remaining bytes of an ignored record that spans blocks.
    to_skip: usize,

    ignored_count: u64,
}

impl LogScanner {
    pub fn new(max_record_size: usize) -> Self {
        Self::with_filter(max_record_size, KindFilter::accept_all())
    }

    pub fn with_filter(max_record_size: usize, filter: KindFilter) -> Self {
        Self {
            max_record_size,
            filter,
            truncated: Vec::with_capacity(max_record_size),
            current: Vec::with_capacity(max_record_size),
            to_skip: 0,
            ignored_count: 0,
        }
    }

    pub fn filter(&self) -> &KindFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut KindFilter {
        &mut self.filter
    }

    /// Number of records skipped by the filter so far.
    pub fn ignored_count(&self) -> u64 {
        self.ignored_count
    }

    /// Whether part of a record is carried over to the next block.
    pub fn has_partial(&self) -> bool {
        !self.truncated.is_empty() || self.to_skip > 0
    }

    /// Forget any carried-over bytes, e.g. when the reader repositions.
    pub fn reset(&mut self) {
        self.truncated.clear();
        self.to_skip = 0;
    }

    /// Return the next complete record in `block` starting at `*pos`.
    ///
    /// `*pos` is advanced past the returned record. `Ok(None)` means the block
    /// is exhausted; any trailing partial record is kept and completed by the
    /// next call with the following block.
    pub fn next_logrec<'a>(
        &'a mut self,
        block: &'a [u8],
        pos: &mut usize,
    ) -> Result<Option<LogRecordRef<'a>>, RecordParseError> {
        loop {
            if self.to_skip > 0 {
                let n = min(self.to_skip, block.len() - *pos);
                *pos += n;
                self.to_skip -= n;
                if self.to_skip > 0 {
                    return Ok(None);
                }
            }

            if !self.truncated.is_empty() {
                if self.truncated.len() < HEADER_SIZE {
                    self.fill_truncated(block, pos, HEADER_SIZE);
                    if self.truncated.len() < HEADER_SIZE {
                        return Ok(None);
                    }
                }

                let (len, kind) =
                    codec::check_header(&self.truncated, self.max_record_size)?;

                if self.filter.is_ignored(kind) {
                    self.to_skip = len - self.truncated.len();
                    self.truncated.clear();
                    self.ignored_count += 1;
                    continue;
                }

                self.fill_truncated(block, pos, len);
                if self.truncated.len() < len {
                    return Ok(None);
                }

                std::mem::swap(&mut self.current, &mut self.truncated);
                self.truncated.clear();
                return Ok(Some(LogRecordRef::new_unchecked(&self.current)));
            }

            let rest = &block[*pos..];
            if rest.is_empty() {
                return Ok(None);
            }

            if rest.len() < HEADER_SIZE {
                self.truncated.extend_from_slice(rest);
                *pos = block.len();
                return Ok(None);
            }

            let (len, kind) = codec::check_header(rest, self.max_record_size)?;

            if self.filter.is_ignored(kind) {
                self.ignored_count += 1;
                if rest.len() >= len {
                    *pos += len;
                    continue;
                }
                self.to_skip = len - rest.len();
                *pos = block.len();
                return Ok(None);
            }

            if rest.len() < len {
                self.truncated.extend_from_slice(rest);
                *pos = block.len();
                return Ok(None);
            }

            *pos += len;
            return Ok(Some(LogRecordRef::new_unchecked(&rest[..len])));
        }
    }

    /// Move bytes from `block` into `truncated` until it holds `upto` bytes or
    /// the block is exhausted.
    fn fill_truncated(&mut self, block: &[u8], pos: &mut usize, upto: usize) {
        let need = upto - self.truncated.len();
        let n = min(need, block.len() - *pos);
        self.truncated.extend_from_slice(&block[*pos..*pos + n]);
        *pos += n;
    }
}
