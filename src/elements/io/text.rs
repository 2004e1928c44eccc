//! Text file sink.
//!
//! Writes one element per line in decimal. Vector components are separated
//! by a comma and a space, and complex components are written as `(re,im)`:
//!
//! ```text
//! complex_int16:2   ->   (1,-2), (3,4)
//! float32           ->   0.5
//! ```
//!
//! Meant for inspecting streams by eye, not for throughput: writes go
//! through a buffered [`File`] and block.

use super::fd::{StreamState, require_active};
use super::open::require_path;
use crate::element::{ConsumeContext, ConsumeResult, Lifecycle, Sink, StageState};
use crate::error::Result;
use crate::format::{DType, ScalarKind};
use crate::observability::StageLog;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct TextState {
    io: StreamState,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

/// A sink element that writes its input as text, one element per line.
///
/// Only whole elements are consumed; a trailing partial element stays in
/// the input for the next cycle.
pub struct TextFileSink {
    name: String,
    dtype: DType,
    log: StageLog,
    state: Mutex<TextState>,
}

impl TextFileSink {
    /// Create a sink for elements of `dtype` with no path.
    pub fn new(dtype: DType) -> Self {
        let name = String::from("text-file-sink");
        Self {
            log: StageLog::new("text_file_sink", &name),
            name,
            dtype,
            state: Mutex::new(TextState::default()),
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
        self.log = StageLog::new("text_file_sink", &self.name);
        self
    }

    /// Log under the given span instead of the stage's own.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.log = StageLog::from_span(span);
        self
    }

    fn lock(&self) -> MutexGuard<'_, TextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The element type written.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The configured path, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Get the number of lines written.
    pub fn lines_written(&self) -> u64 {
        self.lock().lines
    }

    /// Point the sink at `path`; a live sink reopens immediately.
    pub fn set_file_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut state = self.lock();
        state.path = Some(path.as_ref().to_path_buf());
        if !state.io.stage.is_active() {
            return Ok(());
        }

        self.close(&mut state);
        match self.open(&mut state) {
            Ok(()) => {
                self.log.reconfigured("file_path", None);
                Ok(())
            }
            Err(err) => {
                state.io.stage = StageState::Inactive;
                self.log.warn("reactivation failed, stage stopped", &err);
                Err(err)
            }
        }
    }

    fn open(&self, state: &mut TextState) -> Result<()> {
        require_path(state.path.as_deref(), &self.name)?;
        let path = state.path.clone().unwrap_or_default();
        state.writer = Some(BufWriter::new(File::create(&path)?));
        Ok(())
    }

    fn close(&self, state: &mut TextState) {
        if let Some(mut writer) = state.writer.take() {
            if let Err(err) = writer.flush() {
                self.log.warn("flush on close failed", &err);
            }
        }
    }
}

impl Lifecycle for TextFileSink {
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
        self.close(&mut state);
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

impl Sink for TextFileSink {
    fn consume(&self, ctx: &ConsumeContext<'_>) -> Result<ConsumeResult> {
        let mut state = self.lock();
        require_active(&state.io, &self.name)?;

        let size = self.dtype.size();
        let count = self.dtype.elements_in(ctx.input().len());
        if count == 0 {
            return Ok(ConsumeResult::Consumed(0));
        }

        let whole = ctx.input().prefix(count * size);
        let bytes = match whole.as_contiguous() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(whole.to_vec()),
        };

        let state = &mut *state;
        let Some(writer) = state.writer.as_mut() else {
            return Ok(ConsumeResult::Consumed(0));
        };
        for element in bytes.chunks_exact(size) {
            if let Err(err) = write_element(writer, self.dtype, element) {
                self.log.io_error("write", &err);
                return Err(err.into());
            }
        }

        state.lines += count as u64;
        state.io.bytes += (count * size) as u64;
        Ok(ConsumeResult::Consumed(count * size))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn write_element(out: &mut impl Write, dtype: DType, element: &[u8]) -> io::Result<()> {
    let width = dtype.width();
    let parts = if dtype.is_complex() { 2 } else { 1 };

    for (index, component) in element.chunks_exact(width * parts).enumerate() {
        if index > 0 {
            out.write_all(b", ")?;
        }
        if dtype.is_complex() {
            let (re, im) = component.split_at(width);
            out.write_all(b"(")?;
            write_scalar(out, dtype.kind(), re)?;
            out.write_all(b",")?;
            write_scalar(out, dtype.kind(), im)?;
            out.write_all(b")")?;
        } else {
            write_scalar(out, dtype.kind(), component)?;
        }
    }
    out.write_all(b"\n")
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn write_scalar(out: &mut impl Write, kind: ScalarKind, bytes: &[u8]) -> io::Result<()> {
    match (kind, bytes.len()) {
        (ScalarKind::Int, 1) => write!(out, "{}", i8::from_ne_bytes(array(bytes))),
        (ScalarKind::Int, 2) => write!(out, "{}", i16::from_ne_bytes(array(bytes))),
        (ScalarKind::Int, 4) => write!(out, "{}", i32::from_ne_bytes(array(bytes))),
        (ScalarKind::Int, 8) => write!(out, "{}", i64::from_ne_bytes(array(bytes))),
        (ScalarKind::UInt, 1) => write!(out, "{}", bytes[0]),
        (ScalarKind::UInt, 2) => write!(out, "{}", u16::from_ne_bytes(array(bytes))),
        (ScalarKind::UInt, 4) => write!(out, "{}", u32::from_ne_bytes(array(bytes))),
        (ScalarKind::UInt, 8) => write!(out, "{}", u64::from_ne_bytes(array(bytes))),
        (ScalarKind::Float, 4) => write!(out, "{}", f32::from_ne_bytes(array(bytes))),
        (ScalarKind::Float, 8) => write!(out, "{}", f64::from_ne_bytes(array(bytes))),
        (kind, width) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no text form for {kind:?} of {width} bytes"),
        )),
    }
}
