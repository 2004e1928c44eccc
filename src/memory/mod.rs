//! Memory management for file streams.
//!
//! # Architecture
//!
//! - [`MemorySegment`]: Trait for memory backends views can point into
//! - [`MappedRegion`]: A file mapped into memory for one activation
//! - [`BufferManager`]: The buffer-pool contract the scheduler drives
//! - [`MappedBufferManager`]: Buffer manager over a mapped file, with
//!   optional circular wraparound
//! - [`BufferManagerHandle`]: Mutex-guarded slot through which the scheduler
//!   reaches the live manager across reconfigurations
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_filestream::config::FileAccessSpec;
//! use parallax_filestream::memory::{BufferManager, BufferManagerArgs, MappedBufferManager};
//!
//! let spec = FileAccessSpec::read_only("/tmp/input.bin").with_circular(true);
//! let mut manager = MappedBufferManager::new(spec);
//! manager.init(&BufferManagerArgs::default())?;
//!
//! // Each pop hands out the next window of the file's pages.
//! let view = manager.pop(4096)?;
//! ```

mod manager;
mod mapped_file;
mod mapped_manager;
mod segment;

pub use manager::{BufferManager, BufferManagerArgs};
pub use mapped_file::MappedRegion;
pub use mapped_manager::{BufferManagerHandle, MAX_WRAP_PASSES, MappedBufferManager};
pub use segment::{HeapSegment, MemorySegment, MemoryType};
