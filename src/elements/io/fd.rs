//! File descriptor source and sink elements.
//!
//! Streaming over descriptors that must not be mapped (pipes, sockets,
//! character devices). Every cycle:
//!
//! 1. waits for readiness, at most `WorkInfo::max_timeout`
//! 2. yields to the scheduler if the descriptor is not ready
//! 3. otherwise issues exactly one `read`/`write` sized to what is available
//!
//! Short transfers are normal and reported as-is; nothing retries within a
//! cycle. A failed transfer is fatal for the stage.

use crate::buffer::BufferView;
use crate::element::{
    ConsumeContext, ConsumeResult, Lifecycle, ProduceContext, ProduceResult, Sink, Source,
    StageState,
};
use crate::error::{Error, Result};
use crate::format::DType;
use crate::observability::StageLog;
use rustix::event::{PollFd, PollFlags, Timespec};
use rustix::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use rustix::io::Errno;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Direction a descriptor is polled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Data available to read.
    Read,
    /// Room available to write.
    Write,
}

impl Readiness {
    fn flags(self) -> PollFlags {
        match self {
            Readiness::Read => PollFlags::IN,
            Readiness::Write => PollFlags::OUT,
        }
    }
}

/// An optional owned descriptor with one-syscall-per-cycle transfers.
///
/// Dropping or [`close`](Self::close)-ing the stream closes the descriptor.
#[derive(Debug, Default)]
pub struct DescriptorStream {
    fd: Option<OwnedFd>,
}

impl DescriptorStream {
    /// A stream with no descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream owning `fd`.
    pub fn from_owned(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }

    /// Take ownership of a raw descriptor; `-1` (or any negative value)
    /// means no descriptor.
    ///
    /// # Safety
    /// A non-negative `fd` must be open and not owned by anything else.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        if fd < 0 {
            return Self::new();
        }
        // SAFETY: caller guarantees fd is open and unowned.
        Self::from_owned(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Whether a descriptor is held.
    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// The raw descriptor, or `None` when unset.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Swap in a new descriptor, returning the previous one unclosed.
    pub fn replace(&mut self, fd: Option<OwnedFd>) -> Option<OwnedFd> {
        std::mem::replace(&mut self.fd, fd)
    }

    /// Close the descriptor. Returns whether one was open.
    pub fn close(&mut self) -> bool {
        self.fd.take().is_some()
    }

    fn fd(&self) -> Result<&OwnedFd> {
        self.fd
            .as_ref()
            .ok_or_else(|| Error::InvalidState("descriptor is not open".into()))
    }

    /// Wait until the descriptor is ready in `direction` or `timeout` passes.
    ///
    /// Returns `false` on timeout or when interrupted by a signal.
    pub fn wait_ready(&self, direction: Readiness, timeout: Duration) -> Result<bool> {
        let fd = self.fd()?;
        let mut fds = [PollFd::from_borrowed_fd(fd.as_fd(), direction.flags())];
        let deadline = Timespec {
            tv_sec: timeout.as_secs() as _,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        match rustix::event::poll(&mut fds, Some(&deadline)) {
            Ok(0) => Ok(false),
            // Hangup and error conditions count as ready: the transfer
            // reports them.
            Ok(_) => Ok(true),
            Err(Errno::INTR) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// One readiness wait plus at most one `read` into `buf`.
    ///
    /// Returns `None` when the cycle should yield, `Some(0)` at end of file.
    pub fn read_cycle(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        if !self.wait_ready(Readiness::Read, timeout)? {
            return Ok(None);
        }
        match rustix::io::read(self.fd()?, buf) {
            Ok(n) => Ok(Some(n)),
            Err(Errno::INTR | Errno::AGAIN) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// One readiness wait plus at most one vectored `write` of `input`.
    ///
    /// Returns `None` when the cycle should yield.
    pub fn write_cycle(&self, input: &BufferView, timeout: Duration) -> Result<Option<usize>> {
        if !self.wait_ready(Readiness::Write, timeout)? {
            return Ok(None);
        }
        let slices = input.io_slices();
        match rustix::io::writev(self.fd()?, &slices) {
            Ok(n) => Ok(Some(n)),
            Err(Errno::INTR | Errno::AGAIN) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Counters and descriptor of a descriptor-backed stage.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    pub(crate) stage: StageState,
    pub(crate) stream: DescriptorStream,
    pub(crate) bytes: u64,
    pub(crate) yields: u64,
}

/// Run one read cycle of a descriptor source.
pub(crate) fn produce_cycle(
    state: &mut StreamState,
    ctx: &mut ProduceContext<'_>,
    log: &StageLog,
) -> Result<ProduceResult> {
    if ctx.work().min_elements == 0 || ctx.capacity() == 0 {
        return Ok(ProduceResult::Produced(0));
    }

    let timeout = ctx.work().max_timeout;
    match state.stream.read_cycle(ctx.output(), timeout) {
        Ok(Some(n)) => {
            state.bytes += n as u64;
            Ok(ProduceResult::Produced(n))
        }
        Ok(None) => {
            state.yields += 1;
            log.yielded(timeout);
            Ok(ProduceResult::WouldBlock)
        }
        Err(err) => {
            log.io_error("read", &err);
            Err(err)
        }
    }
}

/// Run one write cycle of a descriptor sink.
pub(crate) fn consume_cycle(
    state: &mut StreamState,
    ctx: &ConsumeContext<'_>,
    enabled: bool,
    log: &StageLog,
) -> Result<ConsumeResult> {
    let input = ctx.input();
    if input.is_empty() {
        return Ok(ConsumeResult::Consumed(0));
    }
    if !enabled {
        return Ok(ConsumeResult::Consumed(input.len()));
    }

    let timeout = ctx.work().max_timeout;
    match state.stream.write_cycle(input, timeout) {
        Ok(Some(n)) => {
            state.bytes += n as u64;
            Ok(ConsumeResult::Consumed(n))
        }
        Ok(None) => {
            state.yields += 1;
            log.yielded(timeout);
            Ok(ConsumeResult::WouldBlock)
        }
        Err(err) => {
            log.io_error("write", &err);
            Err(err)
        }
    }
}

fn lock_state(state: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn require_descriptor(state: &StreamState, name: &str) -> Result<()> {
    if state.stream.is_open() {
        Ok(())
    } else {
        Err(Error::Configuration(format!("{name}: descriptor is unset (-1)")))
    }
}

pub(crate) fn require_active(state: &StreamState, name: &str) -> Result<()> {
    if state.stage.is_active() {
        Ok(())
    } else {
        Err(Error::InvalidState(format!("{name} is not active")))
    }
}

/// Swap the descriptor of a live or idle stage.
///
/// A live stage stays live on the new descriptor; if the new descriptor is
/// unset the stage ends inactive and the configuration error is returned.
fn swap_descriptor(
    state: &Mutex<StreamState>,
    fd: Option<OwnedFd>,
    name: &str,
    log: &StageLog,
) -> Result<()> {
    let mut state = lock_state(state);
    drop(state.stream.replace(fd));
    if state.stage.is_active() {
        log.reconfigured("descriptor", None);
        if let Err(err) = require_descriptor(&state, name) {
            state.stage = StageState::Inactive;
            log.deactivated();
            return Err(err);
        }
    }
    Ok(())
}

// ============================================================================
// FileDescriptorSource
// ============================================================================

/// A source that reads from a caller-supplied file descriptor.
///
/// The source owns the descriptor and closes it on deactivation.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_filestream::elements::FileDescriptorSource;
/// use parallax_filestream::format::DType;
///
/// let (read_fd, write_fd) = rustix::pipe::pipe()?;
/// let src = FileDescriptorSource::from_owned(read_fd, DType::bytes());
/// src.activate()?;
/// ```
pub struct FileDescriptorSource {
    name: String,
    dtype: DType,
    log: StageLog,
    state: Mutex<StreamState>,
}

impl FileDescriptorSource {
    /// Create a source with no descriptor. One must be set before activation.
    pub fn new(dtype: DType) -> Self {
        Self::with_stream(DescriptorStream::new(), dtype)
    }

    /// Create a source that takes ownership of `fd`.
    pub fn from_owned(fd: OwnedFd, dtype: DType) -> Self {
        Self::with_stream(DescriptorStream::from_owned(fd), dtype)
    }

    /// Create a source from a raw descriptor, taking ownership. `-1` leaves
    /// the descriptor unset.
    ///
    /// # Safety
    /// A non-negative `fd` must be valid and not used elsewhere.
    pub unsafe fn from_raw_fd(fd: RawFd, dtype: DType) -> Self {
        // SAFETY: forwarded from the caller.
        Self::with_stream(unsafe { DescriptorStream::from_raw_fd(fd) }, dtype)
    }

    fn with_stream(stream: DescriptorStream, dtype: DType) -> Self {
        let name = match stream.as_raw_fd() {
            Some(fd) => format!("fdsrc-{fd}"),
            None => String::from("fdsrc"),
        };
        Self {
            log: StageLog::new("file_descriptor_source", &name),
            name,
            dtype,
            state: Mutex::new(StreamState {
                stream,
                ..Default::default()
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.log = StageLog::new("file_descriptor_source", &self.name);
        self
    }

    /// Log under the given span instead of the stage's own.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.log = StageLog::from_span(span);
        self
    }

    /// Replace the descriptor. A live source switches to it immediately.
    pub fn set_descriptor(&self, fd: OwnedFd) -> Result<()> {
        swap_descriptor(&self.state, Some(fd), &self.name, &self.log)
    }

    /// Replace the descriptor with a raw one; `-1` unsets it.
    ///
    /// # Safety
    /// A non-negative `fd` must be valid and not used elsewhere.
    pub unsafe fn set_raw_descriptor(&self, fd: RawFd) -> Result<()> {
        // SAFETY: forwarded from the caller.
        let stream = unsafe { DescriptorStream::from_raw_fd(fd) };
        swap_descriptor(&self.state, stream.fd, &self.name, &self.log)
    }

    /// Get the raw file descriptor, if set.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        lock_state(&self.state).stream.as_raw_fd()
    }

    /// Get the number of bytes read.
    pub fn bytes_produced(&self) -> u64 {
        lock_state(&self.state).bytes
    }

    /// Get the number of cycles that yielded without reading.
    pub fn cycles_yielded(&self) -> u64 {
        lock_state(&self.state).yields
    }
}

impl Lifecycle for FileDescriptorSource {
    fn activate(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        require_descriptor(&state, &self.name)?;
        state.stage = StageState::Active;
        self.log.activated(&self.name);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        let was_active = state.stage.is_active();
        state.stream.close();
        state.stage = StageState::Inactive;
        if was_active {
            self.log.deactivated();
        }
        Ok(())
    }

    fn state(&self) -> StageState {
        lock_state(&self.state).stage
    }
}

impl Source for FileDescriptorSource {
    fn produce(&self, ctx: &mut ProduceContext<'_>) -> Result<ProduceResult> {
        let mut state = lock_state(&self.state);
        require_active(&state, &self.name)?;
        produce_cycle(&mut state, ctx, &self.log)
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// FileDescriptorSink
// ============================================================================

/// A sink that writes to a caller-supplied file descriptor.
///
/// The sink owns the descriptor and closes it on deactivation.
pub struct FileDescriptorSink {
    name: String,
    log: StageLog,
    enabled: std::sync::atomic::AtomicBool,
    state: Mutex<StreamState>,
}

impl FileDescriptorSink {
    /// Create a sink with no descriptor. One must be set before activation.
    pub fn new() -> Self {
        Self::with_stream(DescriptorStream::new())
    }

    /// Create a sink that takes ownership of `fd`.
    pub fn from_owned(fd: OwnedFd) -> Self {
        Self::with_stream(DescriptorStream::from_owned(fd))
    }

    /// Create a sink from a raw descriptor, taking ownership. `-1` leaves
    /// the descriptor unset.
    ///
    /// # Safety
    /// A non-negative `fd` must be valid and not used elsewhere.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        // SAFETY: forwarded from the caller.
        Self::with_stream(unsafe { DescriptorStream::from_raw_fd(fd) })
    }

    fn with_stream(stream: DescriptorStream) -> Self {
        let name = match stream.as_raw_fd() {
            Some(fd) => format!("fdsink-{fd}"),
            None => String::from("fdsink"),
        };
        Self {
            log: StageLog::new("file_descriptor_sink", &name),
            name,
            enabled: std::sync::atomic::AtomicBool::new(true),
            state: Mutex::new(StreamState {
                stream,
                ..Default::default()
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.log = StageLog::new("file_descriptor_sink", &self.name);
        self
    }

    /// Log under the given span instead of the stage's own.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.log = StageLog::from_span(span);
        self
    }

    /// Replace the descriptor. A live sink switches to it immediately.
    pub fn set_descriptor(&self, fd: OwnedFd) -> Result<()> {
        swap_descriptor(&self.state, Some(fd), &self.name, &self.log)
    }

    /// Replace the descriptor with a raw one; `-1` unsets it.
    ///
    /// # Safety
    /// A non-negative `fd` must be valid and not used elsewhere.
    pub unsafe fn set_raw_descriptor(&self, fd: RawFd) -> Result<()> {
        // SAFETY: forwarded from the caller.
        let stream = unsafe { DescriptorStream::from_raw_fd(fd) };
        swap_descriptor(&self.state, stream.fd, &self.name, &self.log)
    }

    /// Enable or disable writing. A disabled sink discards its input.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled
            .store(enabled, std::sync::atomic::Ordering::Relaxed);
    }

    /// Whether writing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Get the raw file descriptor, if set.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        lock_state(&self.state).stream.as_raw_fd()
    }

    /// Get the number of bytes written.
    pub fn bytes_consumed(&self) -> u64 {
        lock_state(&self.state).bytes
    }

    /// Get the number of cycles that yielded without writing.
    pub fn cycles_yielded(&self) -> u64 {
        lock_state(&self.state).yields
    }
}

impl Default for FileDescriptorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for FileDescriptorSink {
    fn activate(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        require_descriptor(&state, &self.name)?;
        state.stage = StageState::Active;
        self.log.activated(&self.name);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        let was_active = state.stage.is_active();
        state.stream.close();
        state.stage = StageState::Inactive;
        if was_active {
            self.log.deactivated();
        }
        Ok(())
    }

    fn state(&self) -> StageState {
        lock_state(&self.state).stage
    }
}

impl Sink for FileDescriptorSink {
    fn consume(&self, ctx: &ConsumeContext<'_>) -> Result<ConsumeResult> {
        let mut state = lock_state(&self.state);
        require_active(&state, &self.name)?;
        consume_cycle(&mut state, ctx, self.is_enabled(), &self.log)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
