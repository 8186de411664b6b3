//! The log archive: a directory of immutable runs, each holding the page
//! records of an LSN range sorted by `(page id, lsn)`, plus a block index
//! per run for page lookups.

pub mod directory;
pub mod dump;
pub mod format;
pub mod index;
pub(crate) mod lock;
pub mod run_id;
pub mod run_reader;
pub mod run_writer;
pub mod scanner;

pub use directory::ArchiveDirectory;
pub use dump::ArchiveDump;
pub use index::ArchiveIndex;
pub use index::ProbeResult;
pub use index::RunIndex;
pub use run_id::RunId;
pub use run_reader::RunReader;
pub use run_writer::RunWriter;
pub use scanner::ArchiveScanner;
pub use scanner::MergeScanner;
pub use scanner::RecordStream;
pub use scanner::RunScanner;
pub use scanner::ScanOrder;
