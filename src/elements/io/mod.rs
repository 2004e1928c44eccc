//! File and descriptor I/O elements.
//!
//! - [`BinaryFileSource`], [`BinaryFileSink`]: Path-based file read/write
//! - [`FileDescriptorSource`], [`FileDescriptorSink`]: Caller-supplied descriptor I/O
//! - [`TextFileSink`]: Human-readable dump, one element per line
//! - [`DescriptorStream`]: Readiness wait plus one transfer per cycle

mod fd;
mod file;
pub mod open;
mod text;

pub use fd::{DescriptorStream, FileDescriptorSink, FileDescriptorSource, Readiness};
pub use file::{BinaryFileSink, BinaryFileSource};
pub use text::TextFileSink;
