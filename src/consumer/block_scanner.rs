use std::io;
use std::sync::Arc;

use crate::consumer::ConsumerSet;
use crate::errors::ArchiveError;
use crate::log_scanner::KindFilter;
use crate::log_scanner::LogScanner;
use crate::raw_log::LogSource;
use crate::record::RecordKind;
use crate::types::Lsn;
use crate::Config;

/// Reads the raw log block by block and feeds its records to consumers.
pub struct BlockScanner {
    source: Arc<dyn LogSource>,
    scanner: LogScanner,
    block: Vec<u8>,
}

impl BlockScanner {
    pub fn new(config: &Config, source: Arc<dyn LogSource>, filter: KindFilter) -> Self {
        Self {
            source,
            scanner: LogScanner::with_filter(config.max_record_size(), filter),
            block: vec![0; config.block_size()],
        }
    }

    /// Deliver every record that passes the filter, starting at `from` and
    /// stopping before `until` or at the durable end of the log.
    ///
    /// `from` must be the LSN of a record. Returns the number of records
    /// delivered.
    pub fn scan(
        &mut self,
        from: Lsn,
        until: Lsn,
        consumers: &mut ConsumerSet,
    ) -> Result<u64, ArchiveError> {
        self.scanner.reset();

        let mut read_pos = from;
        let mut partition = None;
        let mut count = 0;

        'blocks: while read_pos < until {
            if partition != Some(read_pos.partition()) {
                partition = Some(read_pos.partition());
                consumers.new_file(&Config::partition_file_name(read_pos.partition()))?;
            }

            let n = self.source.read_at(read_pos, &mut self.block)?;
            if n == 0 {
                if self.scanner.has_partial() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("log ends inside a record before {}", read_pos),
                    )
                    .into());
                }
                break;
            }
            read_pos = read_pos.advance(n as u64);

            let mut pos = 0;
            let mut next_partition = None;

            while let Some(rec) = self.scanner.next_logrec(&self.block[..n], &mut pos)? {
                if rec.lsn() >= until {
                    break 'blocks;
                }

                consumers.handle(rec)?;
                count += 1;

                if rec.kind() == RecordKind::Skip {
                    next_partition = Some(rec.next_lsn());
                    break;
                }
            }

            if let Some(next) = next_partition {
                self.scanner.reset();
                read_pos = next;
            }
        }

        consumers.finalize()?;
        Ok(count)
    }
}
