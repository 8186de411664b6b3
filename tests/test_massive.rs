use std::io;
use std::sync::Arc;

use log_archive::archive::ScanOrder;
use log_archive::consumer::ConsumerSet;
use log_archive::raw_log::LogWriter;
use log_archive::record::LogRecord;
use log_archive::record::RecordKind;
use log_archive::restore::redo::write_payload;
use log_archive::restore::FileVolume;
use log_archive::restore::PageRedo;
use log_archive::restore::RestoreState;
use log_archive::restore::Volume;
use log_archive::ArchiveDump;
use log_archive::Config;
use log_archive::PageId;
use log_archive::StorageEngine;
use log_archive::SweepScheduler;
use rand::Rng;
use tempfile::TempDir;

const PAGES: u32 = 64;

fn config(temp_dir: &TempDir) -> Config {
    Config {
        block_size: Some(4096),
        workspace_size: Some(16 * 1024),
        max_record_size: Some(1024),
        partition_size: Some(64 * 1024),
        poll_interval_ms: Some(1),
        page_size: Some(256),
        restore_segment_size: Some(16),
        ..Config::new(
            temp_dir.path().join("archive").display(),
            temp_dir.path().join("log").display(),
        )
    }
}

/// Append `n` random updates; returns how many bytes each page body had
/// written at which offset, for the final check.
fn append_random(
    w: &mut LogWriter,
    n: usize,
    body: &mut [Vec<u8>],
) -> Result<(), io::Error> {
    let mut rng = rand::rng();

    for _ in 0..n {
        let page = rng.random_range(0..PAGES);
        let offset = rng.random_range(0..200u16);
        let len = rng.random_range(1..=40usize);
        let bytes = (0..len).map(|_| rng.random::<u8>()).collect::<Vec<_>>();

        let rec = LogRecord::new(
            RecordKind::PageUpdate,
            PageId::new(1, page),
            0,
            &write_payload(offset, &bytes),
        );
        w.append(rec)?;

        let b = &mut body[page as usize];
        b[offset as usize..offset as usize + len].copy_from_slice(&bytes);

        if rng.random_range(0..10) == 0 {
            let comment = LogRecord::new(RecordKind::Comment, PageId::NULL, 0, b"tick");
            w.append(comment)?;
        }
    }

    w.flush()?;
    Ok(())
}

#[test]
fn test_massive_archive_and_restore() -> Result<(), io::Error> {
    let temp_dir = TempDir::new()?;

    let mut config = config(&temp_dir);
    config.restore_scheduler = Some(SweepScheduler::SinglePass);
    let config = Arc::new(config);

    let page_size = config.page_size();
    let mut body = vec![vec![0u8; page_size - 16]; PAGES as usize];

    let mut w = LogWriter::open(config.clone())?;
    let mut total_records = 0;

    // Archive in three sessions, restarting the archiver each time.
    for _session in 0..3 {
        let engine = StorageEngine::open(config.clone(), Arc::new(w.log_dir()))?;
        let archiver = engine.start_archiver(ConsumerSet::new())?;

        for _ in 0..5 {
            append_random(&mut w, 500, &mut body)?;

            let end = w.durable_lsn();
            archiver.activate(end, true)?;
            assert_eq!(end, archiver.next_consumed_lsn());
        }

        total_records += archiver.stat().records_archived;
        engine.shutdown()?;
    }
    assert_eq!(3 * 5 * 500, total_records);

    let dump = ArchiveDump::open(config.clone())?;
    let mut report = Vec::new();
    assert!(dump.verify(&mut report).map_err(io::Error::from)?);
    println!("{}", String::from_utf8_lossy(&report));

    let failure = w.durable_lsn();
    let engine = StorageEngine::open(config.clone(), Arc::new(w.log_dir()))?;

    let n = engine.archive_scanner().scan_all(ScanOrder::Lsn)?.count();
    assert_eq!(3 * 5 * 500, n);

    let volume = Arc::new(FileVolume::create(
        temp_dir.path().join("volume"),
        1,
        page_size,
        PAGES,
    )?);

    let mgr = engine.restore(volume.clone(), None, Arc::new(PageRedo), failure)?;
    mgr.wait()?;
    assert_eq!(RestoreState::Done, mgr.state());
    assert_eq!(PAGES as u64, mgr.reconstructions());

    for p in 0..PAGES {
        let page = volume.read_page(p)?;
        assert_eq!(PageId::new(1, p), page.page_id());
        assert_eq!(&body[p as usize][..], page.body(), "page {}", p);
    }

    Ok(())
}
