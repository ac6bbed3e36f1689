//! Injected warning/debug sink.

use std::sync::Arc;

/// Receives the advisory messages emitted by the parser and the verifier.
///
/// Messages sent here never change the outcome of an operation.
pub trait Diagnostics: Send + Sync {
    fn warn(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }
}

/// Shared handle to the default sink.
pub fn tracing_diagnostics() -> Arc<dyn Diagnostics> {
    Arc::new(TracingDiagnostics)
}
