//! Logging infrastructure for fabric-client
//!
//! `LogGate` applies the service's verbosity policy; `init_tracing` installs
//! the `tracing` subscriber the default sink writes to.

pub mod gate;
pub mod level;
pub mod subscriber;

pub use gate::{LogGate, LogRecord, LogSink, TracingSink};
pub use level::LogLevel;
pub use subscriber::init_tracing;
