//! StageScope for automatic begin/complete logging
//!
//! - Logs `{STAGE}_BEGIN` on creation
//! - Logs `{STAGE}_COMPLETE` with `elapsed_ms` when completed
//! - Logs `{STAGE}_FAILED` on drop if never completed, which is what happens
//!   when a `?` returns early out of the stage

use std::cell::Cell;
use std::time::Instant;

use super::logger::Reporter;

/// A pipeline stage whose outcome is reported automatically
///
/// # Usage
///
/// ```ignore
/// let scope = StageScope::with_fields(reporter, "DUMP", &[("database", name)]);
/// run_dump()?;          // early return logs DUMP_FAILED
/// scope.complete_with_fields(&[("bytes", &size)]);  // logs DUMP_COMPLETE
/// ```
pub struct StageScope<'a> {
    reporter: &'a dyn Reporter,
    name: &'a str,
    completed: Cell<bool>,
    started: Instant,
}

impl<'a> StageScope<'a> {
    pub fn with_fields(reporter: &'a dyn Reporter, name: &'a str, fields: &[(&str, &str)]) -> Self {
        reporter.info(&format!("{}_BEGIN", name), fields);

        Self {
            reporter,
            name,
            completed: Cell::new(false),
            started: Instant::now(),
        }
    }

    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);

        let elapsed = self.started.elapsed().as_millis().to_string();
        let mut fields: Vec<(&str, &str)> = vec![("elapsed_ms", elapsed.as_str())];
        fields.extend(extra_fields.iter().copied());

        self.reporter
            .info(&format!("{}_COMPLETE", self.name), &fields);
    }
}

impl Drop for StageScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            self.reporter.error(
                &format!("{}_FAILED", self.name),
                &[("reason", "stage did not complete")],
            );
        }
    }
}
