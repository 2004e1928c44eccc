//! # Parallax Filestream
//!
//! File-backed stream stages for the Parallax pipeline engine.
//!
//! A regular file can be streamed without copying: its pages are mapped and
//! handed downstream as buffer views, optionally wrapping around forever
//! (auto-rewind). Pipes, sockets and devices are streamed through a
//! descriptor instead, with one bounded readiness wait and one syscall per
//! cycle so a stage never stalls the cooperative scheduler.
//!
//! ## Features
//!
//! - **Zero-copy file sources**: `mmap`-backed [`BufferManager`](memory::BufferManager)
//! - **Circular playback**: wrap-around views built from two segments
//! - **Descriptor streaming**: `poll` + `read`/`writev`, yield on timeout
//! - **Live reconfiguration**: path and rewind setters callable from any thread
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parallax_filestream::prelude::*;
//!
//! let src = BinaryFileSource::new(DType::parse("complex_float32")?, Strategy::Mapped);
//! src.set_file_path("capture.iq")?;
//! src.set_auto_rewind(true)?;
//! src.activate()?;
//!
//! let mut ctx = ProduceContext::without_buffer(WorkInfo::new(4096));
//! if let ProduceResult::View(view) = src.produce(&mut ctx)? {
//!     for chunk in view.chunks() {
//!         process(chunk);
//!     }
//! }
//! src.deactivate()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod config;
pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod memory;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::BufferView;
    pub use crate::config::{FileSourceConfig, Strategy, WorkInfo};
    pub use crate::element::{
        ConsumeContext, ConsumeResult, Lifecycle, ProduceContext, ProduceResult, Sink, Source,
        StageState,
    };
    pub use crate::elements::{
        BinaryFileSink, BinaryFileSource, FileDescriptorSink, FileDescriptorSource, TextFileSink,
    };
    pub use crate::error::{Error, Result};
    pub use crate::format::DType;
    pub use crate::memory::{BufferManager, BufferManagerHandle, MemorySegment, MemoryType};
}

pub use error::{Error, Result};
