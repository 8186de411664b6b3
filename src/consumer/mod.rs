//! Consumers of log records and the scanners that drive them.
//!
//! A [`LogConsumer`] is handed every record a scan produces. The archiver, the
//! raw log [`BlockScanner`] and the archive [`RunFileScanner`] all feed a
//! [`ConsumerSet`], which routes each record to the consumers registered for
//! it.

mod aggregate;
mod block_scanner;
mod page_stats;
mod print;
mod run_file_scanner;
mod verify;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

pub use aggregate::AggregateConsumer;
pub use block_scanner::BlockScanner;
pub use page_stats::PageStat;
pub use page_stats::PageStatsConsumer;
pub use print::PrintConsumer;
pub use run_file_scanner::RunFileScanner;
pub use verify::VerifyConsumer;

use crate::record::LogRecordRef;
use crate::record::RecordKind;

/// Receives log records from a scan.
pub trait LogConsumer: Send {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error>;

    /// Called when the scan moves to a new file: a log partition or an
    /// archive run. `name` is the file name without directory.
    fn new_file(&mut self, _name: &str) -> Result<(), io::Error> {
        Ok(())
    }

    /// Called once after the last record.
    fn finalize(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}

/// A consumer shared with the code that reads its results afterwards.
impl<C: LogConsumer> LogConsumer for Arc<Mutex<C>> {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        self.lock().unwrap_or_else(PoisonError::into_inner).handle(rec)
    }

    fn new_file(&mut self, name: &str) -> Result<(), io::Error> {
        self.lock().unwrap_or_else(PoisonError::into_inner).new_file(name)
    }

    fn finalize(&mut self) -> Result<(), io::Error> {
        self.lock().unwrap_or_else(PoisonError::into_inner).finalize()
    }
}

/// Routes records to consumers by what they subscribed to.
///
/// - `any`: every record;
/// - `page`: records with a page id;
/// - `transaction`: records with a transaction id or the single system
///   transaction flag;
/// - per kind: records of that kind.
///
/// A consumer registered in several lists sees a record once per list.
#[derive(Default)]
pub struct ConsumerSet {
    any: Vec<Box<dyn LogConsumer>>,
    page: Vec<Box<dyn LogConsumer>>,
    transaction: Vec<Box<dyn LogConsumer>>,
    by_kind: BTreeMap<RecordKind, Vec<Box<dyn LogConsumer>>>,
}

impl ConsumerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_any(mut self, c: impl LogConsumer + 'static) -> Self {
        self.any.push(Box::new(c));
        self
    }

    pub fn with_page(mut self, c: impl LogConsumer + 'static) -> Self {
        self.page.push(Box::new(c));
        self
    }

    pub fn with_transaction(mut self, c: impl LogConsumer + 'static) -> Self {
        self.transaction.push(Box::new(c));
        self
    }

    pub fn with_kind(
        mut self,
        kind: RecordKind,
        c: impl LogConsumer + 'static,
    ) -> Self {
        self.by_kind.entry(kind).or_default().push(Box::new(c));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }

    pub fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        for c in self.any.iter_mut() {
            c.handle(rec)?;
        }

        if !rec.null_pid() {
            for c in self.page.iter_mut() {
                c.handle(rec)?;
            }
        }

        if rec.txn().is_some() || rec.is_single_sys_xct() {
            for c in self.transaction.iter_mut() {
                c.handle(rec)?;
            }
        }

        if let Some(cs) = self.by_kind.get_mut(&rec.kind()) {
            for c in cs.iter_mut() {
                c.handle(rec)?;
            }
        }

        Ok(())
    }

    pub fn new_file(&mut self, name: &str) -> Result<(), io::Error> {
        for c in self.all_mut() {
            c.new_file(name)?;
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<(), io::Error> {
        for c in self.all_mut() {
            c.finalize()?;
        }
        Ok(())
    }

    fn all(&self) -> impl Iterator<Item = &Box<dyn LogConsumer>> {
        self.any
            .iter()
            .chain(self.page.iter())
            .chain(self.transaction.iter())
            .chain(self.by_kind.values().flatten())
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn LogConsumer>> {
        self.any
            .iter_mut()
            .chain(self.page.iter_mut())
            .chain(self.transaction.iter_mut())
            .chain(self.by_kind.values_mut().flatten())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::ConsumerSet;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::record::FLAG_SINGLE_SYS_XCT;
    use crate::testing::Collect;
    use crate::types::PageId;

    #[test]
    fn test_routing() -> Result<(), io::Error> {
        let any = Arc::new(Mutex::new(Collect::default()));
        let page = Arc::new(Mutex::new(Collect::default()));
        let txn = Arc::new(Mutex::new(Collect::default()));
        let chkpt = Arc::new(Mutex::new(Collect::default()));

        let mut set = ConsumerSet::new()
            .with_any(any.clone())
            .with_page(page.clone())
            .with_transaction(txn.clone())
            .with_kind(RecordKind::ChkptBegin, chkpt.clone());

        let recs = [
            LogRecord::new(RecordKind::ChkptBegin, PageId::NULL, 0, b""),
            LogRecord::new(RecordKind::PageInsert, PageId::new(1, 1), 7, b""),
            LogRecord::new(RecordKind::PageAlloc, PageId::new(1, 2), 0, b"")
                .with_flags(FLAG_SINGLE_SYS_XCT),
            LogRecord::new(RecordKind::XctEnd, PageId::NULL, 7, b""),
            LogRecord::new(RecordKind::Comment, PageId::NULL, 0, b""),
        ];

        set.new_file("log.1")?;
        for r in &recs {
            set.handle(r.view())?;
        }
        set.finalize()?;

        let any = any.lock().unwrap();
        assert_eq!(5, any.kinds.len());
        assert_eq!(vec!["log.1".to_string()], any.files);
        assert!(any.finalized);

        assert_eq!(
            vec![RecordKind::PageInsert, RecordKind::PageAlloc],
            page.lock().unwrap().kinds
        );
        assert_eq!(
            vec![
                RecordKind::PageInsert,
                RecordKind::PageAlloc,
                RecordKind::XctEnd
            ],
            txn.lock().unwrap().kinds
        );
        assert_eq!(vec![RecordKind::ChkptBegin], chkpt.lock().unwrap().kinds);
        assert!(chkpt.lock().unwrap().finalized);

        Ok(())
    }
}
