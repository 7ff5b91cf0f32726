//! Human-readable call tracing, configured per connector.
//!
//! Trace lines are advisory only and their format may change.

use crate::types::Value;
use std::{
    fmt,
    io::Write,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Clone, Default)]
pub enum DebugSink {
    /// `tracing::debug!` events on the `dyn_connector::trace` target.
    #[default]
    Tracing,
    Writer(Arc<Mutex<dyn Write + Send>>),
}

impl DebugSink {
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        DebugSink::Writer(Arc::new(Mutex::new(w)))
    }
}

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DebugSink::Tracing => f.write_str("Tracing"),
            DebugSink::Writer(_) => f.write_str("Writer"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub sink: DebugSink,
    pub verbose: bool,
}

impl DebugConfig {
    fn emit(&self, line: fmt::Arguments) {
        match &self.sink {
            DebugSink::Tracing => tracing::debug!(target: "dyn_connector::trace", "{line}"),
            DebugSink::Writer(w) => {
                let mut w = w.lock().unwrap_or_else(PoisonError::into_inner);
                // Trace output never fails a call.
                let _ = writeln!(w, "{line}");
            }
        }
    }

    pub(crate) fn request(&self, method: &str, token: &str, payload: &Value) {
        if !self.enabled {
            return;
        }
        let token = if token.is_empty() { "none" } else { "present" };
        if self.verbose {
            self.emit(format_args!(
                "request \"{method}\" token={token} payload={payload:?}"
            ));
        } else {
            self.emit(format_args!(
                "request \"{method}\" token={token} payload={}",
                payload.summary()
            ));
        }
    }

    pub(crate) fn response(&self, method: &str, status: impl fmt::Debug, payload: &Value) {
        if !self.enabled {
            return;
        }
        if self.verbose {
            self.emit(format_args!(
                "response \"{method}\" status={status:?} payload={payload:?}"
            ));
        } else {
            self.emit(format_args!("response \"{method}\" status={status:?}"));
        }
    }

    pub(crate) fn note(&self, line: fmt::Arguments) {
        if self.enabled {
            self.emit(line);
        }
    }
}
