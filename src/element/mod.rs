//! Stage system for file stream pipelines.
//!
//! This module defines the traits and types a stage implements against the
//! external scheduler:
//!
//! - [`Lifecycle`]: `activate` / `deactivate` state machine
//! - [`Source`]: Produces a byte stream (file reader, descriptor reader)
//! - [`Sink`]: Consumes a byte stream (file writer, descriptor writer)
//!
//! # Design
//!
//! The scheduler is cooperative and single-threaded per stage: it calls
//! `produce`/`consume` once per cycle and expects the call to return within
//! the [`WorkInfo::max_timeout`](crate::config::WorkInfo::max_timeout) it
//! passed in. A stage that cannot make progress returns `WouldBlock` so
//! other stages can run.
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_filestream::element::{Lifecycle, ProduceContext, ProduceResult, Source};
//! use parallax_filestream::config::WorkInfo;
//!
//! source.activate()?;
//! let mut out = vec![0u8; 4096];
//! loop {
//!     let mut ctx = ProduceContext::new(&mut out, WorkInfo::new(out.len()));
//!     match source.produce(&mut ctx)? {
//!         ProduceResult::Produced(0) => break,
//!         ProduceResult::Produced(n) => handle(&out[..n]),
//!         ProduceResult::View(view) => handle_view(view),
//!         ProduceResult::WouldBlock => continue,
//!     }
//! }
//! source.deactivate()?;
//! ```

mod context;
mod lifecycle;
mod traits;

pub use context::{ConsumeContext, ProduceContext};
pub use lifecycle::{Lifecycle, StageState};
pub use traits::{ConsumeResult, ProduceResult, Sink, Source};
