use std::io;

use crate::archive::RunId;
use crate::consumer::LogConsumer;
use crate::record::LogRecordRef;
use crate::types::Lsn;
use crate::types::PageId;

/// Which ordering the verified stream must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Archive runs: `(page id, lsn)` order, LSNs inside the run's range.
    Runs,

    /// Merged archive output: `(page id, lsn)` order across all runs.
    Merged,

    /// The raw log: each record starts where the previous one ended.
    Log,
}

/// Checks record order and LSN bounds, collecting every violation.
#[derive(Debug)]
pub struct VerifyConsumer {
    mode: Mode,

    /// Range of the run being verified, parsed from its file name.
    bounds: Option<RunId>,

    last: Option<(PageId, Lsn)>,
    expected: Option<Lsn>,

    count: u64,
    errors: Vec<String>,
}

impl VerifyConsumer {
    pub fn for_runs() -> Self {
        Self::new(Mode::Runs)
    }

    pub fn for_merged() -> Self {
        Self::new(Mode::Merged)
    }

    pub fn for_log() -> Self {
        Self::new(Mode::Log)
    }

    fn new(mode: Mode) -> Self {
        Self {
            mode,
            bounds: None,
            last: None,
            expected: None,
            count: 0,
            errors: vec![],
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn check_sorted(&mut self, pid: PageId, lsn: Lsn) {
        if let Some((last_pid, last_lsn)) = self.last {
            if (pid, lsn) <= (last_pid, last_lsn) {
                self.errors.push(format!(
                    "record ({}, {}) is not after ({}, {})",
                    pid, lsn, last_pid, last_lsn
                ));
            }
        }
    }
}

impl LogConsumer for VerifyConsumer {
    fn handle(&mut self, rec: LogRecordRef<'_>) -> Result<(), io::Error> {
        let pid = rec.page_id();
        let lsn = rec.lsn();

        match self.mode {
            Mode::Runs => {
                self.check_sorted(pid, lsn);
                if let Some(run) = self.bounds {
                    if !run.contains(lsn) {
                        self.errors
                            .push(format!("record at {} is outside {}", lsn, run));
                    }
                }
            }
            Mode::Merged => {
                self.check_sorted(pid, lsn);
            }
            Mode::Log => {
                if let Some(expected) = self.expected {
                    if lsn != expected {
                        self.errors.push(format!(
                            "record at {}, expected {}",
                            lsn, expected
                        ));
                    }
                }
                self.expected = Some(rec.next_lsn());
            }
        }

        self.last = Some((pid, lsn));
        self.count += 1;
        Ok(())
    }

    fn new_file(&mut self, name: &str) -> Result<(), io::Error> {
        if self.mode == Mode::Runs {
            self.last = None;
            self.bounds = match RunId::parse_file_name(name) {
                Ok(run_id) => Some(run_id),
                Err(e) => {
                    self.errors.push(e.to_string());
                    None
                }
            };
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), io::Error> {
        if self.is_ok() {
            log::info!("Log verification complete: {} records", self.count);
        } else {
            log::warn!(
                "Log verification found {} errors in {} records",
                self.errors.len(),
                self.count
            );
        }
        Ok(())
    }
}
