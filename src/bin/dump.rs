use std::io;
use std::io::stdout;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use clap::Parser;
use log_archive::consumer::BlockScanner;
use log_archive::consumer::ConsumerSet;
use log_archive::consumer::PageStatsConsumer;
use log_archive::consumer::PrintConsumer;
use log_archive::log_scanner::KindFilter;
use log_archive::raw_log::LogDir;
use log_archive::raw_log::LogSource;
use log_archive::restore::dump_page_lsns;
use log_archive::restore::FileVolume;
use log_archive::ArchiveDump;
use log_archive::Config;

#[derive(Clone, Debug, PartialEq, Eq, clap::Parser)]
#[clap(about = "dump a log archive, or the recovery log it is built from", author)]
pub struct Args {
    /// The archive directory
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Check run boundaries and record order instead of listing records
    #[arg(long)]
    verify: bool,

    /// Print the records of the recovery log in this directory
    #[arg(long, value_name = "LOG_DIR")]
    log: Option<PathBuf>,

    /// Print per page record statistics of the recovery log, with `--log`
    #[arg(long)]
    pages: bool,

    /// Print the LSN of every page of this volume file
    #[arg(long, value_name = "FILE")]
    volume: Option<PathBuf>,

    /// Page size of the volume file, with `--volume`
    #[arg(long, value_name = "BYTES")]
    page_size: Option<usize>,
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();

    let log_dir = args.log.clone().unwrap_or_default();
    let config = Arc::new(Config::new(
        args.path.display(),
        log_dir.display(),
    ));

    if let Some(volume) = &args.volume {
        let page_size = args.page_size.unwrap_or_else(|| config.page_size());
        let volume = FileVolume::open(volume, 1, page_size)?;
        dump_page_lsns(&volume, stdout())?;
        return Ok(());
    }

    if args.log.is_some() {
        return dump_log(config, args.pages);
    }

    let dump = ArchiveDump::open(config)?;

    if args.verify {
        let ok = dump.verify(stdout()).map_err(io::Error::from)?;
        if !ok {
            exit(1);
        }
        return Ok(());
    }

    dump.write(stdout())
}

fn dump_log(config: Arc<Config>, pages: bool) -> Result<(), io::Error> {
    let source = Arc::new(LogDir::open(config.clone())?);
    let first = source.first_lsn()?;
    let until = source.durable_lsn();

    let print = Arc::new(Mutex::new(PrintConsumer::new(stdout())));
    let stats = Arc::new(Mutex::new(PageStatsConsumer::new()));

    let mut consumers = ConsumerSet::new().with_any(print);
    if pages {
        consumers = consumers.with_page(stats.clone());
    }

    let mut scanner = BlockScanner::new(&config, source.clone(), KindFilter::accept_all());
    let n = scanner
        .scan(first, until, &mut consumers)
        .map_err(io::Error::from)?;

    let mut out = stdout();
    if pages {
        stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_to(&mut out)?;
    }
    writeln!(out, "{} records in [{}, {})", n, first, until)?;

    Ok(())
}
