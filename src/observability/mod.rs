//! Observability for sitevault
//!
//! - Structured JSON event lines
//! - An explicit [`Reporter`] sink handed to every orchestrator, never a
//!   global logger
//! - Typed lifecycle [`Event`]s
//! - [`StageScope`] for per-stage begin/complete/failed events
//!
//! # Usage
//!
//! ```ignore
//! use sitevault::observability::{Event, JsonReporter, Reporter, Severity};
//!
//! let reporter = JsonReporter::stderr(Severity::Info);
//! reporter.info(Event::BackupStart.as_str(), &[("site", "/var/www/html")]);
//! ```
//!
//! Passwords must never be passed as field values.

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{format_line, JsonReporter, LogRecord, MemoryReporter, Reporter, Severity};
pub use scope::StageScope;

/// Report a lifecycle event at the severity it implies
pub fn report_event(reporter: &dyn Reporter, event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    reporter.report(severity, event.as_str(), fields);
}
