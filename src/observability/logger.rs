//! Structured JSON reporting
//!
//! - One line = one event
//! - `event` first, then `severity`, then fields sorted by key
//! - Synchronous, no buffering
//!
//! Nothing logs through a global. Callers hold a `&dyn Reporter` and pass it
//! down to whatever needs to report.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" | "DEBUG" => Ok(Severity::Trace),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "FATAL" | "CRITICAL" => Ok(Severity::Fatal),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Sink for structured events
pub trait Reporter {
    fn report(&self, severity: Severity, event: &str, fields: &[(&str, &str)]);

    fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.report(Severity::Info, event, fields);
    }

    fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.report(Severity::Warn, event, fields);
    }

    fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.report(Severity::Error, event, fields);
    }
}

/// Writes one JSON object per event to `W`, dropping events below `min`
pub struct JsonReporter<W: Write> {
    writer: Mutex<W>,
    min: Severity,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W, min: Severity) -> Self {
        Self {
            writer: Mutex::new(writer),
            min,
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl JsonReporter<io::Stderr> {
    /// Reporter on stderr, leaving stdout for command results
    pub fn stderr(min: Severity) -> Self {
        Self::new(io::stderr(), min)
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < self.min {
            return;
        }

        let line = format_line(severity, event, fields);

        if let Ok(mut writer) = self.writer.lock() {
            // Write atomically (one syscall)
            let _ = writer.write_all(line.as_bytes());
            let _ = writer.flush();
        }
    }
}

/// Render one event as a JSON line
pub fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push('{');

    output.push_str("\"event\":\"");
    escape_json_string(&mut output, event);
    output.push('"');

    output.push_str(",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push('}');
    output.push('\n');
    output
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub event: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory reporter; clones share the same record list
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Event names in emission order
    pub fn events(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.records().iter().any(|r| r.event == event)
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                severity,
                event: event.to_string(),
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }
    }
}
