//! Span and writer fixtures for unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::TracerProvider;

use super::trace::{SharedTracerProvider, shared_tracer_provider};

/// Collects exported spans in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl CollectingExporter {
    pub fn finished(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }
}

impl SpanExporter for CollectingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans.lock().unwrap().extend(batch);
        Box::pin(future::ready(Ok(())))
    }
}

/// Provider that exports synchronously into the returned collector.
pub fn collecting_provider() -> (SharedTracerProvider, CollectingExporter) {
    let exporter = CollectingExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (shared_tracer_provider(provider), exporter)
}

/// Clonable in-memory writer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
