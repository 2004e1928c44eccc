//! Per-cycle contexts passed to stages by the scheduler.

use crate::buffer::BufferView;
use crate::config::WorkInfo;

/// Context for one production cycle of a [`Source`](super::Source).
///
/// Carries the scheduler's work parameters and, for sources that copy into
/// scheduler memory, the writable output window. Sources that expose their
/// own memory (mapped files) are driven without an output buffer.
pub struct ProduceContext<'a> {
    output: Option<&'a mut [u8]>,
    work: WorkInfo,
}

impl<'a> ProduceContext<'a> {
    /// Context with a writable output window.
    pub fn new(output: &'a mut [u8], work: WorkInfo) -> Self {
        Self {
            output: Some(output),
            work,
        }
    }

    /// Context without an output window.
    pub fn without_buffer(work: WorkInfo) -> Self {
        Self { output: None, work }
    }

    /// Whether the scheduler supplied an output window.
    pub fn has_buffer(&self) -> bool {
        self.output.is_some()
    }

    /// The output window (empty if none was supplied).
    pub fn output(&mut self) -> &mut [u8] {
        match &mut self.output {
            Some(output) => &mut **output,
            None => &mut [],
        }
    }

    /// Capacity of the output window in bytes.
    pub fn capacity(&self) -> usize {
        self.output.as_ref().map_or(0, |output| output.len())
    }

    /// The scheduler's work parameters.
    pub fn work(&self) -> &WorkInfo {
        &self.work
    }
}

impl std::fmt::Debug for ProduceContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProduceContext")
            .field("capacity", &self.capacity())
            .field("work", &self.work)
            .finish()
    }
}

/// Context for one consumption cycle of a [`Sink`](super::Sink).
#[derive(Debug)]
pub struct ConsumeContext<'a> {
    input: &'a BufferView,
    work: WorkInfo,
}

impl<'a> ConsumeContext<'a> {
    /// Context over the available input.
    pub fn new(input: &'a BufferView, work: WorkInfo) -> Self {
        Self { input, work }
    }

    /// The available input bytes.
    pub fn input(&self) -> &'a BufferView {
        self.input
    }

    /// The scheduler's work parameters.
    pub fn work(&self) -> &WorkInfo {
        &self.work
    }
}
