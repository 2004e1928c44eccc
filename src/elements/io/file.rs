//! File-based source and sink elements.
//!
//! [`BinaryFileSource`] reads a file either by exposing its mapped pages
//! ([`Strategy::Mapped`]) or by polling a descriptor and copying
//! ([`Strategy::Descriptor`]). [`BinaryFileSink`] always writes through a
//! descriptor.
//!
//! # Reconfiguration
//!
//! Path and auto-rewind setters may be called from any thread while the
//! scheduler is cycling the stage. A live stage is deactivated and
//! reactivated inside the setter, under the same lock the cycle takes, so a
//! cycle sees either the old file or the new one. Changing only the
//! auto-rewind flag keeps the stream position; changing the path restarts
//! at offset zero.

use super::fd::{StreamState, consume_cycle, produce_cycle, require_active};
use super::open::{open_for_read, open_for_write, require_existing, require_path};
use crate::config::{FileAccessSpec, FileSourceConfig, Strategy};
use crate::element::{
    ConsumeContext, ConsumeResult, Lifecycle, ProduceContext, ProduceResult, Sink, Source,
    StageState,
};
use crate::error::{Error, Result};
use crate::format::DType;
use crate::memory::{BufferManager, BufferManagerArgs, BufferManagerHandle, MappedBufferManager};
use crate::observability::StageLog;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// BinaryFileSource
// ============================================================================

#[derive(Debug, Default)]
struct SourceState {
    io: StreamState,
    path: Option<PathBuf>,
    rewind: bool,
    at_end: bool,
}

/// A source element that streams the contents of a file.
///
/// With [`Strategy::Mapped`] each cycle pops `min_elements` elements from a
/// [`MappedBufferManager`] and returns them as a [`ProduceResult::View`]
/// into the mapping. An empty view marks the end of a non-circular file.
/// With [`Strategy::Descriptor`] each cycle performs one `read()` into the
/// scheduler's output window.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_filestream::config::{Strategy, WorkInfo};
/// use parallax_filestream::element::{Lifecycle, ProduceContext, Source};
/// use parallax_filestream::elements::BinaryFileSource;
/// use parallax_filestream::format::DType;
///
/// let src = BinaryFileSource::new(DType::parse("complex_float32")?, Strategy::Mapped);
/// src.set_file_path("capture.iq")?;
/// src.set_auto_rewind(true)?;
/// src.activate()?;
///
/// let mut ctx = ProduceContext::without_buffer(WorkInfo::new(1024));
/// let view = src.produce(&mut ctx)?.into_view();
/// ```
pub struct BinaryFileSource {
    name: String,
    dtype: DType,
    strategy: Strategy,
    log: StageLog,
    manager: BufferManagerHandle,
    state: Mutex<SourceState>,
}

impl BinaryFileSource {
    /// Create a source for elements of `dtype`. The path is set later with
    /// [`set_file_path`](Self::set_file_path).
    pub fn new(dtype: DType, strategy: Strategy) -> Self {
        let name = String::from("binary-file-source");
        Self {
            log: StageLog::new("binary_file_source", &name),
            name,
            dtype,
            strategy,
            manager: BufferManagerHandle::new(),
            state: Mutex::new(SourceState::default()),
        }
    }

    /// Create a source from a config.
    ///
    /// # Errors
    ///
    /// Auto-rewind with the descriptor strategy is [`Error::Unsupported`].
    pub fn from_config(config: FileSourceConfig) -> Result<Self> {
        if config.rewind && config.strategy == Strategy::Descriptor {
            return Err(Error::Unsupported("auto-rewind requires the mapped strategy"));
        }
        let source = Self::new(config.dtype, config.strategy).with_name(config.name);
        {
            let mut state = source.lock();
            state.path = config.path;
            state.rewind = config.rewind;
        }
        Ok(source)
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.log = StageLog::new("binary_file_source", &self.name);
        self
    }

    /// Log under the given span instead of the stage's own.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.log = StageLog::from_span(span);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The read strategy chosen at construction.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The configured path, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Whether the stream wraps at end of file.
    pub fn auto_rewind(&self) -> bool {
        self.lock().rewind
    }

    /// Point the source at `path`.
    ///
    /// A live source switches files immediately and restarts at offset
    /// zero.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotFound`] if `path` does not exist; the previous
    /// configuration is kept. If reopening a live source fails, the source
    /// ends inactive and the error is returned.
    pub fn set_file_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        require_existing(path)?;

        let mut state = self.lock();
        state.path = Some(path.to_path_buf());
        self.reactivate(&mut state, "file_path", false)
    }

    /// Enable or disable wrapping to the start of the file at end of file.
    ///
    /// A live mapped source keeps its stream position across the change.
    ///
    /// # Errors
    ///
    /// Enabling auto-rewind with [`Strategy::Descriptor`] is
    /// [`Error::Unsupported`].
    pub fn set_auto_rewind(&self, rewind: bool) -> Result<()> {
        if self.strategy == Strategy::Descriptor {
            return if rewind {
                Err(Error::Unsupported("auto-rewind requires the mapped strategy"))
            } else {
                Ok(())
            };
        }

        let mut state = self.lock();
        if state.rewind == rewind {
            return Ok(());
        }
        state.rewind = rewind;
        self.reactivate(&mut state, "auto_rewind", true)
    }

    /// Current stream position of a live mapped source.
    pub fn offset(&self) -> Option<usize> {
        let _state = self.lock();
        self.manager.offset()
    }

    /// Move the stream position of a live mapped source.
    ///
    /// `set_offset(0)` re-arms a non-circular source that reached the end.
    ///
    /// # Errors
    ///
    /// [`Error::OffsetOutOfRange`] when `offset` is not inside the file,
    /// [`Error::InvalidState`] when the source is not active.
    pub fn set_offset(&self, offset: usize) -> Result<()> {
        if self.strategy == Strategy::Descriptor {
            return Err(Error::Unsupported("set_offset requires the mapped strategy"));
        }

        let mut state = self.lock();
        self.manager
            .with(|manager| manager.set_offset(offset))
            .unwrap_or_else(|| Err(Error::InvalidState(format!("{} is not active", self.name))))?;
        state.at_end = false;
        Ok(())
    }

    /// Buffer manager the scheduler should use for the output port.
    ///
    /// Only the default (empty) memory domain is supported.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for any other domain,
    /// [`Error::Unsupported`] for the descriptor strategy and
    /// [`Error::InvalidState`] while no file is mapped.
    pub fn output_buffer_manager(&self, domain: &str) -> Result<BufferManagerHandle> {
        if !domain.is_empty() {
            return Err(Error::Configuration(format!(
                "{}: unsupported memory domain '{domain}'",
                self.name
            )));
        }
        if self.strategy == Strategy::Descriptor {
            return Err(Error::Unsupported(
                "descriptor strategy copies into scheduler buffers",
            ));
        }

        let _state = self.lock();
        if !self.manager.is_live() {
            return Err(Error::InvalidState(format!(
                "{}: buffer manager is not initialized",
                self.name
            )));
        }
        Ok(self.manager.clone())
    }

    /// Get the number of bytes produced.
    pub fn bytes_produced(&self) -> u64 {
        self.lock().io.bytes
    }

    /// Get the number of cycles that yielded without reading.
    pub fn cycles_yielded(&self) -> u64 {
        self.lock().io.yields
    }

    /// Open or map the configured file. With `preserve`, a live mapping is
    /// replaced in the same critical section that carries its position
    /// over, and the restored position is returned.
    fn open_backend(&self, state: &mut SourceState, preserve: bool) -> Result<Option<usize>> {
        require_path(state.path.as_deref(), &self.name)?;
        let path = state.path.clone().unwrap_or_default();

        match self.strategy {
            Strategy::Mapped => {
                let spec = FileAccessSpec::read_only(&path).with_circular(state.rewind);
                let mut manager = MappedBufferManager::new(spec);
                manager.init(&BufferManagerArgs::for_dtype(self.dtype))?;
                let preserved = if preserve {
                    self.manager.swap_preserving(manager)?
                } else {
                    drop(self.manager.install(manager));
                    None
                };
                state.at_end = false;
                Ok(preserved)
            }
            Strategy::Descriptor => {
                let fd = open_for_read(&path)?;
                drop(state.io.stream.replace(Some(fd)));
                state.at_end = false;
                Ok(None)
            }
        }
    }

    fn close_backend(&self, state: &mut SourceState) {
        match self.strategy {
            Strategy::Mapped => drop(self.manager.take()),
            Strategy::Descriptor => {
                state.io.stream.close();
            }
        }
    }

    /// Reopen a live source after a setting changed.
    fn reactivate(
        &self,
        state: &mut SourceState,
        setting: &str,
        preserve: bool,
    ) -> Result<()> {
        if !state.io.stage.is_active() {
            return Ok(());
        }

        match self.open_backend(state, preserve) {
            Ok(preserved) => {
                self.log.reconfigured(setting, preserved);
                Ok(())
            }
            Err(err) => {
                self.close_backend(state);
                state.io.stage = StageState::Inactive;
                self.log.warn("reactivation failed, stage stopped", &err);
                Err(err)
            }
        }
    }

    fn produce_mapped(&self, state: &mut SourceState, ctx: &ProduceContext<'_>) -> Result<ProduceResult> {
        let wanted = ctx.work().min_elements.saturating_mul(self.dtype.size());
        if wanted == 0 {
            return Ok(ProduceResult::Produced(0));
        }

        let view = self
            .manager
            .with(|manager| manager.pop(wanted))
            .unwrap_or_else(|| Err(Error::InvalidState(format!("{} is not active", self.name))))?;

        if view.is_empty() {
            if !state.at_end {
                state.at_end = true;
                self.log.end_of_stream(self.manager.offset().unwrap_or_default());
            }
        } else {
            state.io.bytes += view.len() as u64;
        }
        Ok(ProduceResult::View(view))
    }
}

impl Lifecycle for BinaryFileSource {
    fn activate(&self) -> Result<()> {
        let mut state = self.lock();
        if state.io.stage.is_active() {
            return Ok(());
        }
        self.open_backend(&mut state, false)?;
        state.io.stage = StageState::Active;

        let target = state
            .path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        self.log.activated(&target);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let mut state = self.lock();
        let was_active = state.io.stage.is_active();
        self.close_backend(&mut state);
        state.io.stage = StageState::Inactive;
        if was_active {
            self.log.deactivated();
        }
        Ok(())
    }

    fn state(&self) -> StageState {
        self.lock().io.stage
    }
}

impl Source for BinaryFileSource {
    fn produce(&self, ctx: &mut ProduceContext<'_>) -> Result<ProduceResult> {
        let mut state = self.lock();
        require_active(&state.io, &self.name)?;

        match self.strategy {
            Strategy::Mapped => self.produce_mapped(&mut state, ctx),
            Strategy::Descriptor => produce_cycle(&mut state.io, ctx, &self.log),
        }
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// BinaryFileSink
// ============================================================================

#[derive(Debug, Default)]
struct SinkState {
    io: StreamState,
    path: Option<PathBuf>,
}

/// A sink element that writes its input to a file.
///
/// The file is created or truncated on activation. Each cycle performs one
/// vectored `write()` of the available input once the descriptor is
/// writable.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_filestream::elements::BinaryFileSink;
///
/// let sink = BinaryFileSink::new().with_path("output.bin");
/// sink.activate()?;
/// ```
pub struct BinaryFileSink {
    name: String,
    log: StageLog,
    enabled: AtomicBool,
    state: Mutex<SinkState>,
}

impl BinaryFileSink {
    /// Create a sink with no path.
    pub fn new() -> Self {
        let name = String::from("binary-file-sink");
        Self {
            log: StageLog::new("binary_file_sink", &name),
            name,
            enabled: AtomicBool::new(true),
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Set the path before activation.
    pub fn with_path(self, path: impl AsRef<Path>) -> Self {
        self.lock().path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.log = StageLog::new("binary_file_sink", &self.name);
        self
    }

    /// Log under the given span instead of the stage's own.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.log = StageLog::from_span(span);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configured path, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Point the sink at `path`. A live sink closes its file and opens
    /// (truncating) the new one immediately.
    ///
    /// # Errors
    ///
    /// If the new file cannot be opened the sink ends inactive and the
    /// error is returned.
    pub fn set_file_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut state = self.lock();
        state.path = Some(path.as_ref().to_path_buf());
        if !state.io.stage.is_active() {
            return Ok(());
        }

        match self.open(&mut state) {
            Ok(()) => {
                self.log.reconfigured("file_path", None);
                Ok(())
            }
            Err(err) => {
                state.io.stream.close();
                state.io.stage = StageState::Inactive;
                self.log.warn("reactivation failed, stage stopped", &err);
                Err(err)
            }
        }
    }

    /// Enable or disable writing. A disabled sink discards its input.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether writing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Get the number of bytes written.
    pub fn bytes_consumed(&self) -> u64 {
        self.lock().io.bytes
    }

    /// Get the number of cycles that yielded without writing.
    pub fn cycles_yielded(&self) -> u64 {
        self.lock().io.yields
    }

    fn open(&self, state: &mut SinkState) -> Result<()> {
        require_path(state.path.as_deref(), &self.name)?;
        let path = state.path.clone().unwrap_or_default();
        let fd = open_for_write(&path)?;
        drop(state.io.stream.replace(Some(fd)));
        Ok(())
    }
}

impl Default for BinaryFileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for BinaryFileSink {
    fn activate(&self) -> Result<()> {
        let mut state = self.lock();
        if state.io.stage.is_active() {
            return Ok(());
        }
        self.open(&mut state)?;
        state.io.stage = StageState::Active;

        let target = state
            .path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        self.log.activated(&target);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let mut state = self.lock();
        let was_active = state.io.stage.is_active();
        state.io.stream.close();
        state.io.stage = StageState::Inactive;
        if was_active {
            self.log.deactivated();
        }
        Ok(())
    }

    fn state(&self) -> StageState {
        self.lock().io.stage
    }
}

impl Sink for BinaryFileSink {
    fn consume(&self, ctx: &ConsumeContext<'_>) -> Result<ConsumeResult> {
        let mut state = self.lock();
        require_active(&state.io, &self.name)?;
        consume_cycle(&mut state.io, ctx, self.is_enabled(), &self.log)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
