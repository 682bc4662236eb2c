use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use tracing::warn;

use crate::trace::trace::TraceEvent;

/// Session trace sink: one JSON object per line, appended.
///
/// A file that cannot be opened disables the logger; write failures only warn.
pub struct TraceLogger {
    sink: Option<Mutex<File>>,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let sink = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not open trace file");
                None
            }
        };
        TraceLogger { sink }
    }

    pub fn log(&self, event: &TraceEvent) {
        let Some(sink) = &self.sink else {
            return;
        };

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = %event.kind, "failed to serialize trace event");
                return;
            }
        };

        if let Err(e) = writeln!(sink.lock(), "{}", line) {
            warn!(error = %e, "failed to write trace event");
        }
    }
}
