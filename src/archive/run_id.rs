use std::fmt;

use crate::errors::InvalidRunFileName;
use crate::num::format_lsn_for_file_name;
use crate::num::parse_lsn_from_file_name;
use crate::types::Lsn;

/// Identifies an archive run by the half-open LSN range `[begin, end)` it
/// covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId {
    pub begin: Lsn,
    pub end: Lsn,
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId[{}, {})", self.begin, self.end)
    }
}

impl RunId {
    pub const SUFFIX: &'static str = ".arc";
    pub const TEMP_SUFFIX: &'static str = ".tmp";

    pub fn new(begin: Lsn, end: Lsn) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    pub fn contains(&self, lsn: Lsn) -> bool {
        self.begin <= lsn && lsn < self.end
    }

    /// Whether the run covers any LSN in `[from, until)`.
    pub fn overlaps(&self, from: Lsn, until: Lsn) -> bool {
        self.begin < until && from < self.end
    }

    /// The file name format is
    /// `run-<partition:010>_<offset:010>-<partition:010>_<offset:010>.arc`.
    pub fn file_name(&self) -> String {
        format!(
            "run-{}-{}{}",
            format_lsn_for_file_name(self.begin.partition(), self.begin.offset()),
            format_lsn_for_file_name(self.end.partition(), self.end.offset()),
            Self::SUFFIX
        )
    }

    /// Name of the file a run is written to before it is renamed into place.
    pub fn temp_file_name(&self) -> String {
        format!("{}{}", self.file_name(), Self::TEMP_SUFFIX)
    }

    pub fn parse_file_name(file_name: &str) -> Result<Self, InvalidRunFileName> {
        let begin = Self::parse_lsn(file_name, false)?;
        let end = Self::parse_lsn(file_name, true)?;

        if begin > end {
            return Err(InvalidRunFileName::new(
                file_name,
                format!("begin {} is after end {}", begin, end),
            ));
        }

        Ok(Self { begin, end })
    }

    /// Parse the begin or the end LSN from a run file name.
    pub fn parse_lsn(
        file_name: &str,
        is_end: bool,
    ) -> Result<Lsn, InvalidRunFileName> {
        let without_suffix =
            file_name.strip_suffix(Self::SUFFIX).ok_or_else(|| {
                InvalidRunFileName::new(file_name, "has no '.arc' suffix")
            })?;

        let without_prefix =
            without_suffix.strip_prefix("run-").ok_or_else(|| {
                InvalidRunFileName::new(file_name, "has no 'run-' prefix")
            })?;

        let (begin, end) = without_prefix.split_once('-').ok_or_else(|| {
            InvalidRunFileName::new(file_name, "has no '-' between LSNs")
        })?;

        let s = if is_end { end } else { begin };

        let (p, o) = parse_lsn_from_file_name(s)
            .map_err(|e| InvalidRunFileName::new(file_name, e))?;

        Ok(Lsn::new(p, o))
    }
}
