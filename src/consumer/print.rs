use std::io;

use crate::consumer::LogConsumer;
use crate::record::LogRecordRef;

/// Writes one line per record, and a header line per file.
#[derive(Debug)]
pub struct PrintConsumer<W> {
    w: W,
    count: u64,
}

impl<W: io::Write + Send> PrintConsumer<W> {
    pub fn new(w: W) -> Self {
        Self { w, count: 0 }
    }

    pub fn get_ref(&self) -> &W {
        &self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: io::Write + Send> LogConsumer for PrintConsumer<W> {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        writeln!(self.w, "  R-{:05}: {}", self.count, rec)?;
        self.count += 1;
        Ok(())
    }

    fn new_file(&mut self, name: &str) -> Result<(), io::Error> {
        self.count = 0;
        writeln!(self.w, "{}", name)
    }

    fn finalize(&mut self) -> Result<(), io::Error> {
        self.w.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::PrintConsumer;
    use crate::consumer::LogConsumer;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::record::FLAG_SINGLE_SYS_XCT;
    use crate::types::Lsn;
    use crate::types::PageId;

    #[test]
    fn test_print() -> Result<(), io::Error> {
        let mut p = PrintConsumer::new(Vec::new());

        p.new_file("log.1")?;
        let r = LogRecord::new(RecordKind::PageInsert, PageId::new(1, 2), 9, b"abc")
            .with_lsn(Lsn::new(1, 0));
        p.handle(r.view())?;

        let r = LogRecord::new(RecordKind::PageAlloc, PageId::new(1, 3), 0, b"")
            .with_flags(FLAG_SINGLE_SYS_XCT)
            .with_lsn(Lsn::new(1, 35));
        p.handle(r.view())?;
        p.finalize()?;

        let got = String::from_utf8(p.into_inner()).unwrap();
        assert_eq!(
            indoc! {"
                log.1
                  R-00000: 1.0 page_insert pid=1.2 len=35 txn=9
                  R-00001: 1.35 page_alloc pid=1.3 len=32 ssx
            "},
            got
        );

        Ok(())
    }
}
