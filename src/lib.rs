//! Log archiving and instant restore:
//! Continuously turns a page-oriented recovery log into sorted, indexed run
//! files, and rebuilds a failed volume page by page from a backup image and
//! the archive.
//!
//! ## Features
//!
//! - A background [`LogArchiver`] that consumes the durable log in LSN order
//!   and writes runs sorted by `(page id, lsn)`, each covering an LSN range
//!   that starts where the previous one ends
//! - An [`ArchiveIndex`](archive::ArchiveIndex) of per-run block indexes for
//!   page range lookups
//! - Merged archive scans in page order or in LSN order
//! - A [`RestoreManager`](restore::RestoreManager) restoring a failed volume
//!   segment by segment in the background, while serving page requests on
//!   demand
//! - Log consumers for printing, verifying and aggregating log and archive
//!   contents
//!
//! ## Example
//!
//! ```rust
//! # use std::io;
//! # use std::sync::Arc;
//! use log_archive::consumer::ConsumerSet;
//! use log_archive::raw_log::LogWriter;
//! use log_archive::record::LogRecord;
//! use log_archive::record::RecordKind;
//! use log_archive::Config;
//! use log_archive::PageId;
//! use log_archive::StorageEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let temp_dir = tempfile::tempdir()?;
//! let config = Arc::new(Config::new(
//!     temp_dir.path().join("archive").display(),
//!     temp_dir.path().join("log").display(),
//! ));
//!
//! // Write some log
//! let mut writer = LogWriter::open(config.clone())?;
//! for page in 1..=3 {
//!     let rec = LogRecord::new(RecordKind::PageUpdate, PageId::new(1, page), 0, b"hello");
//!     writer.append(rec)?;
//! }
//! let end = writer.flush()?;
//!
//! // Archive it
//! let engine = StorageEngine::open(config.clone(), Arc::new(writer.log_dir()))?;
//! let archiver = engine.start_archiver(ConsumerSet::new())?;
//! archiver.activate(end, true)?;
//! assert_eq!(end, archiver.next_consumed_lsn());
//!
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod config;

pub(crate) mod num;

pub mod archive;
pub mod archiver;
pub mod consumer;
pub mod dump_writer;
pub mod engine;
pub mod errors;
pub mod log_scanner;
pub mod raw_log;
pub mod record;
pub mod restore;
pub mod types;

pub use codeq;

pub use archive::ArchiveDump;
pub use archiver::ArchiverStat;
pub use archiver::LogArchiver;
pub use config::Config;
pub use config::SweepScheduler;
pub use engine::StorageEngine;
pub use types::Lsn;
pub use types::PageId;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
