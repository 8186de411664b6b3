//! Scanning an archive made of several runs.

use std::io;
use std::sync::Arc;
use std::sync::RwLock;

use pretty_assertions::assert_eq;
use rand::Rng;

use crate::archive::ArchiveDirectory;
use crate::archive::ArchiveIndex;
use crate::archive::ArchiveScanner;
use crate::archive::RunId;
use crate::archive::ScanOrder;
use crate::consumer::LogConsumer;
use crate::consumer::VerifyConsumer;
use crate::errors::ArchiveError;
use crate::errors::RunBoundaryError;
use crate::record::LogRecord;
use crate::testing;
use crate::tests::context::TestContext;
use crate::types::Lsn;

/// Write a run of `records`, which must lie in `[begin, end)` of partition 1.
fn write_run(
    dir: &ArchiveDirectory,
    begin: u32,
    end: u32,
    records: &[LogRecord],
) -> Result<(), io::Error> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| (r.page_id(), r.lsn()));

    let mut w = dir.create_run(RunId::new(Lsn::new(1, begin), Lsn::new(1, end)))?;
    for r in &sorted {
        w.append(r.view())?;
    }
    w.finish()?;
    Ok(())
}

/// Random page updates at every 50th offset of `[begin, end)`.
fn random_records(begin: u32, end: u32, pages: u32) -> Vec<LogRecord> {
    let mut rng = rand::rng();

    (begin..end)
        .step_by(50)
        .map(|off| {
            let page = rng.random_range(0..pages);
            testing::update(page, 0, &off.to_be_bytes()).with_lsn(Lsn::new(1, off))
        })
        .collect()
}

fn open_scanner(dir: ArchiveDirectory) -> Result<ArchiveScanner, ArchiveError> {
    let index = ArchiveIndex::load(&dir)?;
    Ok(ArchiveScanner::new(
        Arc::new(dir),
        Arc::new(RwLock::new(index)),
    ))
}

#[test]
fn test_merge_runs() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;
    let dir = ArchiveDirectory::open(ctx.arc_config())?;

    let ranges = [(0, 1000), (1000, 1700), (1700, 1750), (1750, 3000)];

    let mut all = vec![];
    for (b, e) in ranges {
        let recs = random_records(b, e, 6);
        write_run(&dir, b, e, &recs)?;
        all.extend(recs);
    }

    let scanner = open_scanner(dir)?;

    // LSN order: exactly the union, strictly ascending.
    let got = scanner
        .scan_all(ScanOrder::Lsn)?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(all, got);

    // Page order: the same records sorted by (page id, lsn).
    let got = scanner
        .scan_all(ScanOrder::Page)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut want = all.clone();
    want.sort_by_key(|r| (r.page_id(), r.lsn()));
    assert_eq!(want, got);

    let mut verify = VerifyConsumer::for_merged();
    for r in &got {
        verify.handle(r.view())?;
    }
    verify.finalize()?;
    assert!(verify.is_ok(), "{:?}", verify.errors());
    assert_eq!(all.len() as u64, verify.count());

    Ok(())
}

#[test]
fn test_lsn_scan_reads_one_run_at_a_time() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;
    let dir = ArchiveDirectory::open(ctx.arc_config())?;

    let ranges = [(0, 1000), (1000, 2000), (2000, 3000)];
    let mut runs = vec![];
    for (b, e) in ranges {
        let recs = random_records(b, e, 6);
        write_run(&dir, b, e, &recs)?;
        runs.push(recs);
    }

    let scanner = open_scanner(dir)?;
    let mut it = scanner.scan_all(ScanOrder::Lsn)?;

    // The second run is not read until the first one is used up, so removing
    // its file now surfaces as an error right after the first run.
    scanner
        .directory()
        .delete_run(RunId::new(Lsn::new(1, 1000), Lsn::new(1, 2000)))?;

    let mut got = vec![];
    let err = loop {
        match it.next() {
            Some(Ok(rec)) => got.push(rec),
            Some(Err(e)) => break e,
            None => panic!("expect an error for the removed run"),
        }
    };

    assert_eq!(runs[0], got);
    assert_eq!(io::ErrorKind::NotFound, err.kind());
    assert!(it.next().is_none());

    Ok(())
}

#[test]
fn test_scan_pages() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;
    let dir = ArchiveDirectory::open(ctx.arc_config())?;

    let mut all = vec![];
    for (b, e) in [(0, 2000), (2000, 2500), (2500, 5000)] {
        let recs = random_records(b, e, 20);
        write_run(&dir, b, e, &recs)?;
        all.extend(recs);
    }

    let scanner = open_scanner(dir)?;

    let (first, last) = (testing::pid(5), testing::pid(9));
    let (from, until) = (Lsn::new(1, 700), Lsn::new(1, 4100));

    let got = scanner
        .scan_pages(first, last, from, until)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut want = all
        .into_iter()
        .filter(|r| first <= r.page_id() && r.page_id() <= last)
        .filter(|r| from <= r.lsn() && r.lsn() < until)
        .collect::<Vec<_>>();
    want.sort_by_key(|r| (r.page_id(), r.lsn()));

    assert_eq!(want, got);

    Ok(())
}

#[test]
fn test_hole_fails_full_scan() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;
    let dir = ArchiveDirectory::open(ctx.arc_config())?;

    write_run(&dir, 0, 100, &random_records(0, 100, 3))?;
    write_run(&dir, 150, 200, &random_records(150, 200, 3))?;

    let scanner = ArchiveScanner::new(
        Arc::new(dir),
        Arc::new(RwLock::new(ArchiveIndex::new())),
    );

    let res = scanner.scan_all(ScanOrder::Lsn);
    match res {
        Err(ArchiveError::RunBoundary(RunBoundaryError::Hole {
            prev_end,
            next_begin,
        })) => {
            assert_eq!(Lsn::new(1, 100), prev_end);
            assert_eq!(Lsn::new(1, 150), next_begin);
        }
        other => panic!("expect a hole, got: {:?}", other.map(|_| ())),
    }

    // Loading the index refuses the hole as well.
    let res = ArchiveIndex::load(scanner.directory());
    assert!(matches!(res, Err(ArchiveError::RunBoundary(_))));

    Ok(())
}

#[test]
fn test_probe_page() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;
    let dir = ArchiveDirectory::open(ctx.arc_config())?;

    let recs = [testing::update(1, 0, b"a"), testing::update(3, 0, b"b")];
    write_run(&dir, 0, 100, &[recs[0].clone().with_lsn(Lsn::new(1, 0))])?;
    write_run(&dir, 100, 200, &[recs[1].clone().with_lsn(Lsn::new(1, 150))])?;

    let scanner = open_scanner(dir)?;
    let (from, until) = (Lsn::new(1, 0), Lsn::new(1, 200));

    let probes = scanner
        .probe_page(testing::pid(1), from, until)
        .map_err(ArchiveError::from)?;
    assert_eq!(
        vec![RunId::new(Lsn::new(1, 0), Lsn::new(1, 100))],
        probes.iter().map(|p| p.run_id).collect::<Vec<_>>()
    );

    // Never touched: not an unrecoverable condition.
    let res = scanner.probe_page(testing::pid(0), from, until);
    let err = ArchiveError::from(res.unwrap_err());
    assert!(matches!(&err, ArchiveError::NotFound(e) if e.pid == testing::pid(0)));
    assert!(!err.is_unrecoverable());

    // Restricted to the LSN range of the second run.
    let probes = scanner
        .probe_page(testing::pid(3), Lsn::new(1, 100), until)
        .map_err(ArchiveError::from)?;
    assert_eq!(
        vec![RunId::new(Lsn::new(1, 100), Lsn::new(1, 200))],
        probes.iter().map(|p| p.run_id).collect::<Vec<_>>()
    );

    Ok(())
}
