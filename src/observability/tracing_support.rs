//! Tracing integration for per-stage structured logging.

use std::time::Duration;
use tracing::{Level, Span, span};

/// Create a span for a stage instance.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_filestream::observability::span_stage;
///
/// let span = span_stage("binary_file_sink", "capture");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_stage(kind: &str, name: &str) -> Span {
    span!(Level::INFO, "stage", kind = %kind, name = %name)
}

/// Logging collaborator owned by one stage.
///
/// Cheap to clone; all clones log under the same span.
#[derive(Debug, Clone)]
pub struct StageLog {
    span: Span,
}

impl StageLog {
    /// Log under a fresh span for a stage of `kind` named `name`.
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            span: span_stage(kind, name),
        }
    }

    /// Log under a caller-provided span.
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// The span events are attached to.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Log a successful activation.
    #[inline]
    pub fn activated(&self, target: &str) {
        tracing::debug!(parent: &self.span, target = %target, "stage activated");
    }

    /// Log a deactivation that released resources.
    #[inline]
    pub fn deactivated(&self) {
        tracing::debug!(parent: &self.span, "stage deactivated");
    }

    /// Log a live reconfiguration.
    #[inline]
    pub fn reconfigured(&self, setting: &str, preserved_offset: Option<usize>) {
        tracing::debug!(
            parent: &self.span,
            setting = %setting,
            preserved_offset = ?preserved_offset,
            "stage reconfigured"
        );
    }

    /// Log a cooperative yield.
    #[inline]
    pub fn yielded(&self, timeout: Duration) {
        tracing::trace!(
            parent: &self.span,
            timeout_us = timeout.as_micros() as u64,
            "descriptor not ready, yielding"
        );
    }

    /// Log the end of a non-circular stream.
    #[inline]
    pub fn end_of_stream(&self, offset: usize) {
        tracing::debug!(parent: &self.span, offset = offset, "end of stream");
    }

    /// Log a fatal I/O error before it is propagated.
    #[inline]
    pub fn io_error(&self, operation: &str, error: &dyn std::error::Error) {
        tracing::error!(
            parent: &self.span,
            operation = %operation,
            error = %error,
            "I/O error"
        );
    }

    /// Log a failure outside the cycle path, such as a flush on close or a
    /// reactivation that left the stage stopped.
    #[inline]
    pub fn warn(&self, context: &str, error: &dyn std::error::Error) {
        tracing::warn!(parent: &self.span, error = %error, "{}", context);
    }
}
