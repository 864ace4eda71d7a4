//! `io::Write` adapter that turns writes into debug log lines.

use std::io;
use std::sync::Arc;

use opentelemetry::Context;
use serde_json::Value;

use super::logger::{Field, Logger};

/// Redirects a byte sink (for example the console span exporter) into a
/// [`Logger`]. Payloads that parse as JSON are logged structurally under the
/// `data` key; anything else is logged as a string.
pub struct LogWriter {
    logger: Arc<dyn Logger>,
    message: String,
}

impl LogWriter {
    pub fn new(logger: Arc<dyn Logger>, message: impl Into<String>) -> Self {
        Self {
            logger,
            message: message.into(),
        }
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(buf.len());
        }
        let data = match serde_json::from_slice::<Value>(buf) {
            Ok(value) => value,
            Err(_) => Value::String(String::from_utf8_lossy(buf).trim_end().to_string()),
        };

        self.logger.debug(
            &Context::current(),
            &self.message,
            &[Field {
                key: "data".to_string(),
                value: data,
            }],
        );
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
