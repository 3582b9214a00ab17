//! Trace sink passed into the reader and evaluator

/// Receives diagnostic output from a read or evaluate call.
pub trait TraceWriter: Send + Sync {
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    fn verbose(&self, message: &str);
}

/// Forwards to `tracing` events under the `weft::template` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn error(&self, message: &str) {
        tracing::error!(target: "weft::template", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "weft::template", "{}", message);
    }

    fn verbose(&self, message: &str) {
        tracing::debug!(target: "weft::template", "{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn error(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn verbose(&self, _message: &str) {}
}
