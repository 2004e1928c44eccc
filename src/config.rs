//! Configuration for file stream stages.
//!
//! - [`FileAccessSpec`]: how one activation opens and maps a file
//! - [`Strategy`]: mapped pages vs. read()/write() on a descriptor
//! - [`WorkInfo`]: what the scheduler asks of a single cycle
//! - [`FileSourceConfig`]: builder for [`BinaryFileSource`](crate::elements::BinaryFileSource)

use crate::error::{Error, Result};
use crate::format::DType;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a file is accessed for the duration of one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccessSpec {
    /// Path of the file to map.
    pub path: PathBuf,
    /// Map the pages readable.
    pub readable: bool,
    /// Map the pages writable (shared with the file).
    pub writable: bool,
    /// Treat the file as an endlessly repeating stream.
    pub circular: bool,
}

impl FileAccessSpec {
    /// Read-only access to `path`.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            readable: true,
            writable: false,
            circular: false,
        }
    }

    /// Set the circular (auto-rewind) flag.
    pub fn with_circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    /// Set the writable flag.
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Check the spec can be used to open a mapping.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Configuration("empty file path".into()));
        }
        if !self.readable && !self.writable {
            return Err(Error::Configuration(format!(
                "{}: mapping must be readable or writable",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// How a source moves bytes out of its file. Chosen once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Expose the file's pages directly as output buffers.
    ///
    /// Only valid for regular files. Supports auto-rewind.
    Mapped,
    /// Poll the descriptor and issue one `read()` per cycle.
    ///
    /// Works for pipes, sockets and devices.
    #[default]
    Descriptor,
}

/// Per-cycle work parameters supplied by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkInfo {
    /// Minimum number of elements the scheduler wants this cycle.
    pub min_elements: usize,
    /// Longest a stage may wait for readiness before yielding.
    pub max_timeout: Duration,
}

impl WorkInfo {
    /// Default per-cycle readiness wait.
    pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_millis(1);

    /// Work info asking for `min_elements` with the default timeout.
    pub fn new(min_elements: usize) -> Self {
        Self {
            min_elements,
            max_timeout: Self::DEFAULT_MAX_TIMEOUT,
        }
    }

    /// Set the readiness timeout.
    pub fn with_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }
}

impl Default for WorkInfo {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Configuration for a path-based file source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSourceConfig {
    /// Stage name used for logging.
    pub name: String,
    /// Output element type.
    pub dtype: DType,
    /// Read strategy.
    pub strategy: Strategy,
    /// Initial path; may be set later.
    pub path: Option<PathBuf>,
    /// Initial auto-rewind flag (mapped strategy only).
    pub rewind: bool,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            name: String::from("binary-file-source"),
            dtype: DType::bytes(),
            strategy: Strategy::default(),
            path: None,
            rewind: false,
        }
    }
}

impl FileSourceConfig {
    /// Config for a source reading `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Set the stage name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the output element type.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Set the read strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the auto-rewind flag.
    pub fn with_rewind(mut self, rewind: bool) -> Self {
        self.rewind = rewind;
        self
    }
}
