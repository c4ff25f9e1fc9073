//! Bookkeeping for flows that process tarballs one after another.
//!
//! A failure on one tarball is logged and counted, and the loop moves on to the next one; the
//! binaries turn a [`Report`] with failures into a nonzero exit status at the end.

use std::{path::Path, process::ExitCode};

use log::{error, info, warn};

use crate::error::Result;

/// How processing a single item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Signed, verified, imported...
    Completed,
    /// Deliberately not processed (already signed, missing signature, unsupported input).
    Skipped,
    /// Processed, with a negative answer (a signature that didn't verify).
    Failed,
}

/// Tally of the outcomes of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Report {
    /// Counts the result of processing `item`, logging errors.
    pub fn record(&mut self, item: &Path, result: Result<Outcome>) {
        match result {
            Ok(Outcome::Completed) => self.completed += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Ok(Outcome::Failed) => self.failed += 1,
            Err(err) => {
                error!("Failed to process {}: {err}", item.display());
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// The process exit status for a binary that ran this batch.
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Logs a one-line summary, e.g. "All tarballs have been processed successfully."
    pub fn log_summary(&self, noun: &str) {
        if self.total() == 0 {
            info!("No {noun} found. Exiting.");
        } else if self.is_success() {
            info!(
                "All {noun} have been processed successfully ({} done, {} skipped).",
                self.completed, self.skipped
            );
        } else {
            warn!(
                "{} of {} {noun} failed ({} done, {} skipped).",
                self.failed,
                self.total(),
                self.completed,
                self.skipped
            );
        }
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::error::Error;

    #[test]
    fn test_report() {
        let mut report = Report::default();
        assert!(report.is_success());
        assert_eq!(report.total(), 0);

        let item = Path::new("dist/app.tar");
        report.record(item, Ok(Outcome::Completed));
        report.record(item, Ok(Outcome::Skipped));
        assert!(report.is_success());

        report.record(item, Err(Error::InvalidInput("nope".into())));
        report.record(item, Ok(Outcome::Failed));
        assert_eq!(
            report,
            Report {
                completed: 1,
                skipped: 1,
                failed: 2
            }
        );
        assert!(!report.is_success());
        assert_eq!(report.total(), 4);
    }
}
