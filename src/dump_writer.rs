use std::io;

use crate::archive::RunId;
use crate::record::LogRecord;

/// Write a record of a run dump, preceded by the run id for the first record
/// of each run.
pub fn multiline_string<W: io::Write>(
    w: &mut W,
    run_id: RunId,
    record_index: u64,
    res: Result<LogRecord, io::Error>,
) -> Result<(), io::Error> {
    if record_index == 0 {
        writeln!(w, "{}", run_id)?;
    }

    match res {
        Ok(rec) => {
            writeln!(w, "  R-{record_index:05}: {}", rec.view())?;
        }
        Err(io_err) => {
            writeln!(w, "Error: {}", io_err)?;
        }
    }
    Ok(())
}
