//! Observability: structured logging through `tracing`.
//!
//! There is no process-wide logger. Every stage owns a [`StageLog`], a
//! handle on its own span, and emits all of its events as children of that
//! span. Callers that want stage events nested under their own spans inject
//! one with `with_span` on the stage.
//!
//! ## Example
//!
//! ```rust,ignore
//! let span = tracing::info_span!("iq-replay", pipeline = "radio0");
//! let source = BinaryFileSource::new(dtype, Strategy::Mapped).with_span(span);
//! ```

mod tracing_support;

pub use tracing_support::{StageLog, span_stage};
