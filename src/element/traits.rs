//! Core stage traits.

use super::{ConsumeContext, Lifecycle, ProduceContext};
use crate::buffer::BufferView;
use crate::error::Result;
use crate::format::DType;

// ============================================================================
// Cycle results
// ============================================================================

/// Outcome of one production cycle.
#[derive(Debug)]
pub enum ProduceResult {
    /// `n` bytes were written into the context's output window.
    ///
    /// Zero means nothing was available; it is not end of pipeline.
    Produced(usize),
    /// A window of the stage's own memory is exposed downstream, no copy made.
    ///
    /// An empty view is the end-of-stream signal of a non-circular file.
    View(BufferView),
    /// I/O was not ready before the deadline; control returns to the scheduler.
    WouldBlock,
}

impl ProduceResult {
    /// Bytes produced this cycle.
    pub fn bytes(&self) -> usize {
        match self {
            Self::Produced(n) => *n,
            Self::View(view) => view.len(),
            Self::WouldBlock => 0,
        }
    }

    /// Whole elements of `dtype` produced this cycle.
    pub fn elements(&self, dtype: DType) -> usize {
        dtype.elements_in(self.bytes())
    }

    /// Whether the stage yielded without doing I/O.
    pub fn is_yield(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Take the exposed view, if any.
    pub fn into_view(self) -> Option<BufferView> {
        match self {
            Self::View(view) => Some(view),
            _ => None,
        }
    }
}

/// Outcome of one consumption cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    /// `n` bytes from the front of the input were consumed.
    Consumed(usize),
    /// I/O was not ready before the deadline; control returns to the scheduler.
    WouldBlock,
}

impl ConsumeResult {
    /// Bytes consumed this cycle.
    pub fn bytes(&self) -> usize {
        match self {
            Self::Consumed(n) => *n,
            Self::WouldBlock => 0,
        }
    }

    /// Whether the stage yielded without doing I/O.
    pub fn is_yield(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// A stage that produces a byte stream on its output port.
///
/// # Lifecycle
///
/// - `activate()` is called once before the first cycle
/// - `produce()` is called repeatedly by the scheduler's worker thread
/// - `deactivate()` is called on teardown
///
/// Stages take `&self` so configuration setters can be called from other
/// threads while the scheduler owns the cycle loop; implementations
/// serialize internally.
pub trait Source: Lifecycle + Send + Sync {
    /// Run one production cycle.
    fn produce(&self, ctx: &mut ProduceContext<'_>) -> Result<ProduceResult>;

    /// Element type of the output port.
    fn dtype(&self) -> DType {
        DType::bytes()
    }

    /// Get the name of this source (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// ============================================================================
// Sink Trait
// ============================================================================

/// A stage that consumes a byte stream from its input port.
///
/// Sinks report how many bytes of the input they consumed; the scheduler
/// keeps the rest for the next cycle.
pub trait Sink: Lifecycle + Send + Sync {
    /// Run one consumption cycle.
    fn consume(&self, ctx: &ConsumeContext<'_>) -> Result<ConsumeResult>;

    /// Get the name of this sink (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
