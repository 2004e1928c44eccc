//! Built-in file stream elements.
//!
//! ## Sources
//! - [`BinaryFileSource`]: Streams a file, mapped or through a descriptor
//! - [`FileDescriptorSource`]: Reads from a caller-supplied descriptor
//!
//! ## Sinks
//! - [`BinaryFileSink`]: Writes raw bytes to a file
//! - [`FileDescriptorSink`]: Writes to a caller-supplied descriptor
//! - [`TextFileSink`]: Writes elements as text lines

pub mod io;

// Sources
pub use io::{BinaryFileSource, FileDescriptorSource};

// Sinks
pub use io::{BinaryFileSink, FileDescriptorSink, TextFileSink};

// Descriptor plumbing
pub use io::{DescriptorStream, Readiness};
