//! Buffer-pool contract between a stage's output port and the scheduler.
//!
//! The scheduler never allocates output memory itself. It asks the port's
//! [`BufferManager`] for the current production window ([`front`]), lets the
//! stage fill or expose it, then [`pop`]s the bytes that were produced. A
//! generic allocator-backed manager would take buffers back through
//! [`push`]; a file-backed manager has nothing to take back.
//!
//! [`front`]: BufferManager::front
//! [`pop`]: BufferManager::pop
//! [`push`]: BufferManager::push

use crate::buffer::BufferView;
use crate::error::Result;
use crate::format::DType;

/// Arguments passed to [`BufferManager::init`] by the scheduler.
///
/// A file-backed manager sizes its window from the file, so the element type
/// is all it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferManagerArgs {
    /// Element type of the port.
    pub dtype: DType,
}

impl Default for BufferManagerArgs {
    fn default() -> Self {
        Self::for_dtype(DType::bytes())
    }
}

impl BufferManagerArgs {
    /// Args for a port carrying `dtype`.
    pub fn for_dtype(dtype: DType) -> Self {
        Self { dtype }
    }
}

/// Supplies production windows for one output port.
///
/// Implementations are driven by a single scheduler thread per stage; a
/// manager shared with configuration threads is wrapped in a handle that
/// serializes access.
pub trait BufferManager: Send {
    /// Prepare the manager for use. Called once per activation.
    fn init(&mut self, args: &BufferManagerArgs) -> Result<()>;

    /// True when no more windows can be produced.
    fn empty(&self) -> bool;

    /// Consume `num_bytes` from the stream and return the window consumed.
    fn pop(&mut self, num_bytes: usize) -> Result<BufferView>;

    /// Return a buffer to the pool.
    fn push(&mut self, buffer: BufferView) -> Result<()>;

    /// The currently exposed production window, if initialized.
    fn front(&self) -> Option<BufferView>;
}
