//! Level gate in front of the log sink
//!
//! Every component logs through a `LogGate`. The gate drops events above the
//! configured verbosity and hands the rest to a `LogSink`. It never fails its
//! caller: a sink that panics is contained here.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use super::level::LogLevel;

/// One log event that passed the gate
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub service: &'a str,
    pub level: LogLevel,
    pub correlation: &'a str,
    pub message: &'a str,
}

/// Destination for log events that passed the gate
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord<'_>);
}

/// Default sink: forwards to `tracing` at the matching level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord<'_>) {
        let LogRecord {
            service,
            correlation,
            message,
            ..
        } = *record;
        match record.level {
            LogLevel::Error => error!(service, correlation, "{}", message),
            LogLevel::Info => info!(service, correlation, "{}", message),
            LogLevel::Debug => debug!(service, correlation, "{}", message),
            LogLevel::Trace => trace!(service, correlation, "{}", message),
        }
    }
}

/// Level-ordered filter shared by all components
#[derive(Clone)]
pub struct LogGate {
    service: Arc<str>,
    verbosity: LogLevel,
    sink: Arc<dyn LogSink>,
}

impl LogGate {
    /// Gate writing to `tracing`
    pub fn new(service: &str, verbosity: LogLevel) -> Self {
        Self::with_sink(service, verbosity, Arc::new(TracingSink))
    }

    pub fn with_sink(service: &str, verbosity: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self {
            service: Arc::from(service),
            verbosity,
            sink,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn verbosity(&self) -> LogLevel {
        self.verbosity
    }

    /// Whether an event at `level` would be emitted
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.verbosity
    }

    /// Emit `message` if `level` is within the configured verbosity.
    ///
    /// Returns true when the event reached the sink.
    pub fn log_event(&self, level: LogLevel, correlation: &str, message: &str) -> bool {
        if !self.enabled(level) {
            return false;
        }

        let record = LogRecord {
            service: &self.service,
            level,
            correlation,
            message,
        };
        panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(&record))).is_ok()
    }

    pub fn error(&self, correlation: &str, message: &str) {
        self.log_event(LogLevel::Error, correlation, message);
    }

    pub fn info(&self, correlation: &str, message: &str) {
        self.log_event(LogLevel::Info, correlation, message);
    }

    pub fn debug(&self, correlation: &str, message: &str) {
        self.log_event(LogLevel::Debug, correlation, message);
    }

    /// Trace events are usually payload dumps; skip formatting when disabled
    pub fn trace_with(&self, correlation: &str, message: impl FnOnce() -> String) {
        if self.enabled(LogLevel::Trace) {
            self.log_event(LogLevel::Trace, correlation, &message());
        }
    }
}

impl fmt::Debug for LogGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogGate")
            .field("service", &self.service)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
