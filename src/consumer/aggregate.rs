use std::io;

use crate::consumer::LogConsumer;
use crate::log_scanner::KindFilter;
use crate::record::LogRecordRef;
use crate::record::RecordKind;

/// Counts records of selected kinds per interval of clock ticks.
///
/// `TickSec` and `TickMsec` records delimit the intervals and are never
/// counted. A row is closed every `interval` ticks, and once more by
/// `finalize`.
#[derive(Debug)]
pub struct AggregateConsumer {
    kinds: Vec<RecordKind>,
    interval: u32,
    ticks: u32,
    counts: [u64; RecordKind::COUNT],
    rows: Vec<Vec<u64>>,
}

impl AggregateConsumer {
    pub fn new(
        kinds: impl IntoIterator<Item = RecordKind>,
        interval: u32,
    ) -> Result<Self, io::Error> {
        let kinds = kinds
            .into_iter()
            .filter(|k| !Self::is_tick(*k))
            .collect::<Vec<_>>();

        if kinds.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "aggregation requires at least one record kind",
            ));
        }
        if interval == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "aggregation interval must be at least one tick",
            ));
        }

        Ok(Self {
            kinds,
            interval,
            ticks: 0,
            counts: [0; RecordKind::COUNT],
            rows: vec![],
        })
    }

    /// A scan filter that passes the counted kinds and the ticks.
    pub fn filter(&self) -> KindFilter {
        KindFilter::only(
            self.kinds
                .iter()
                .copied()
                .chain([RecordKind::TickSec, RecordKind::TickMsec]),
        )
    }

    pub fn kinds(&self) -> &[RecordKind] {
        &self.kinds
    }

    /// One row per closed interval, one column per kind in [`kinds`](Self::kinds).
    pub fn rows(&self) -> &[Vec<u64>] {
        &self.rows
    }

    /// Write a header line with the kind names followed by the rows, tab
    /// separated.
    pub fn write_table<W: io::Write>(&self, mut w: W) -> Result<(), io::Error> {
        let names = self.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>();
        writeln!(w, "# {}", names.join(" "))?;

        for row in &self.rows {
            let cells = row.iter().map(|c| c.to_string()).collect::<Vec<_>>();
            writeln!(w, "{}", cells.join("\t"))?;
        }
        Ok(())
    }

    fn is_tick(kind: RecordKind) -> bool {
        matches!(kind, RecordKind::TickSec | RecordKind::TickMsec)
    }

    fn close_row(&mut self) {
        let row = self
            .kinds
            .iter()
            .map(|k| std::mem::take(&mut self.counts[k.index()]))
            .collect();
        self.rows.push(row);
    }
}

impl LogConsumer for AggregateConsumer {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        let kind = rec.kind();

        if Self::is_tick(kind) {
            self.ticks += 1;
            if self.ticks == self.interval {
                self.ticks = 0;
                self.close_row();
            }
        } else if self.kinds.contains(&kind) {
            self.counts[kind.index()] += 1;
        }

        Ok(())
    }

    fn finalize(&mut self) -> Result<(), io::Error> {
        self.close_row();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::AggregateConsumer;
    use crate::consumer::LogConsumer;
    use crate::record::LogRecord;
    use crate::record::RecordKind;
    use crate::types::PageId;

    #[test]
    fn test_aggregate() -> Result<(), io::Error> {
        let mut agg = AggregateConsumer::new(
            [RecordKind::PageUpdate, RecordKind::XctEnd],
            2,
        )?;

        let seq = [
            RecordKind::PageUpdate,
            RecordKind::XctEnd,
            RecordKind::TickSec,
            RecordKind::PageUpdate,
            RecordKind::Comment,
            RecordKind::TickMsec,
            RecordKind::PageUpdate,
            RecordKind::TickSec,
            RecordKind::TickSec,
            RecordKind::XctEnd,
        ];
        for k in seq {
            let pid = if k == RecordKind::PageUpdate {
                PageId::new(1, 1)
            } else {
                PageId::NULL
            };
            agg.handle(LogRecord::new(k, pid, 0, b"").view())?;
        }
        agg.finalize()?;

        let want: Vec<Vec<u64>> = vec![vec![2, 1], vec![1, 0], vec![0, 1]];
        assert_eq!(want, agg.rows().to_vec());

        let mut out = Vec::new();
        agg.write_table(&mut out)?;
        assert_eq!(
            indoc! {"
                # page_update xct_end
                2\t1
                1\t0
                0\t1
            "},
            String::from_utf8(out).unwrap()
        );

        let filter = agg.filter();
        assert!(filter.is_ignored(RecordKind::Comment));
        assert!(!filter.is_ignored(RecordKind::TickMsec));

        Ok(())
    }

    #[test]
    fn test_aggregate_requires_kinds() {
        assert!(AggregateConsumer::new([RecordKind::TickSec], 1).is_err());
        assert!(AggregateConsumer::new([RecordKind::Comment], 0).is_err());
    }
}
