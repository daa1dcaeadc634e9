/*
 * trace.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Trace sink used by the template context.

use std::fmt;

pub trait TraceWriter: Send + Sync {
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    fn verbose(&self, message: &str);
}

/// Forwards to `tracing` at error, info and debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn verbose(&self, message: &str) {
        tracing::debug!("{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceWriter;

impl TraceWriter for NoopTraceWriter {
    fn error(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn verbose(&self, _message: &str) {}
}

impl fmt::Debug for dyn TraceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TraceWriter")
    }
}
