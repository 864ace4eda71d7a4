pub mod access;
pub mod global;
pub mod logger;
pub mod subscriber;
pub mod writer;

pub use access::{AccessLogEntry, HttpData, captured_body, flatten_headers};
pub use global::{global, init_global};
pub use logger::{Field, Logger, NoopLogger, TracingLogger, kv, trace_id};
pub use subscriber::init_logging;
pub use writer::LogWriter;
