//! Buffer manager that hands out a mapped file's pages as output buffers.
//!
//! # Cursor arithmetic
//!
//! The manager tracks `bytes_popped`, the stream position within a file of
//! `filesize` bytes (`0 <= bytes_popped <= filesize`). `pop(n)` returns:
//!
//! ```text
//! bytes_popped + n <= filesize   [bp, bp+n)                    bp += n
//! !circular                      empty view (end of stream)    unchanged
//! circular, bp == filesize       [0, n)                         bp = n
//! circular, otherwise            [bp, filesize) ++ [0, rest)    bp = rest
//! ```
//!
//! A request larger than the whole file wraps as many times as needed; the
//! view then has one segment per pass. Circular requests are clamped to
//! [`MAX_WRAP_PASSES`] passes over the file.

use super::{BufferManager, BufferManagerArgs, MappedRegion, MemorySegment};
use crate::buffer::{BufferView, ViewSegment};
use crate::config::FileAccessSpec;
use crate::error::{Error, Result};
use crate::format::DType;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Most whole-file passes a single circular pop may span.
pub const MAX_WRAP_PASSES: usize = 4;

/// A [`BufferManager`] over a memory-mapped file.
///
/// The mapping is created in [`init`](BufferManager::init) and released
/// when the manager is dropped; views popped from it keep the mapping alive
/// until they are dropped too.
pub struct MappedBufferManager {
    spec: FileAccessSpec,
    region: Option<Arc<MappedRegion>>,
    front: Option<BufferView>,
    dtype: DType,
    circular: bool,
    filesize: usize,
    bytes_popped: usize,
}

impl MappedBufferManager {
    /// Create a manager for `spec`. Nothing is mapped until `init`.
    pub fn new(spec: FileAccessSpec) -> Self {
        let circular = spec.circular;
        Self {
            spec,
            region: None,
            front: None,
            dtype: DType::bytes(),
            circular,
            filesize: 0,
            bytes_popped: 0,
        }
    }

    /// The access spec this manager maps.
    pub fn spec(&self) -> &FileAccessSpec {
        &self.spec
    }

    /// Whether `init` has mapped the file.
    pub fn is_initialized(&self) -> bool {
        self.region.is_some()
    }

    /// Whether the stream wraps at end of file.
    pub fn is_circular(&self) -> bool {
        self.circular
    }

    /// Size of the mapped file in bytes.
    pub fn filesize(&self) -> usize {
        self.filesize
    }

    /// Current stream position in bytes.
    pub fn offset(&self) -> usize {
        self.bytes_popped
    }

    /// Move the stream position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OffsetOutOfRange`] when `offset` is not inside the
    /// file.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        let out_of_range = if self.filesize > 0 {
            offset >= self.filesize
        } else {
            offset > 0
        };
        if out_of_range {
            return Err(Error::OffsetOutOfRange {
                offset,
                filesize: self.filesize,
            });
        }
        self.bytes_popped = offset;
        Ok(())
    }

    /// Restore a position saved with [`offset`](Self::offset) before a remap
    /// of the same file. Unlike `set_offset`, the end-of-file position is
    /// accepted.
    pub(crate) fn restore_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.filesize {
            return Err(Error::OffsetOutOfRange {
                offset,
                filesize: self.filesize,
            });
        }
        self.bytes_popped = offset;
        Ok(())
    }

    fn region(&self) -> Result<&Arc<MappedRegion>> {
        self.region
            .as_ref()
            .ok_or_else(|| Error::InvalidState("buffer manager is not initialized".into()))
    }

    fn window(region: &Arc<MappedRegion>, offset: usize, len: usize) -> ViewSegment {
        let segment: Arc<dyn MemorySegment> = region.clone();
        ViewSegment::new(segment, offset, len)
    }

    fn take(&mut self, num_bytes: usize) -> Result<BufferView> {
        let region = Arc::clone(self.region()?);
        let mut view = BufferView::empty(self.dtype);

        if num_bytes <= self.filesize - self.bytes_popped {
            view.push_segment(Self::window(&region, self.bytes_popped, num_bytes));
            self.bytes_popped += num_bytes;
            return Ok(view);
        }

        // End of stream: signalled by the null view, not an error.
        if !self.circular || self.filesize == 0 {
            return Ok(view);
        }

        if self.bytes_popped == self.filesize {
            self.bytes_popped = 0;
        }

        let mut remaining = num_bytes.min(self.filesize.saturating_mul(MAX_WRAP_PASSES));
        loop {
            let take = remaining.min(self.filesize - self.bytes_popped);
            view.push_segment(Self::window(&region, self.bytes_popped, take));
            self.bytes_popped += take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
            self.bytes_popped = 0;
        }
        Ok(view)
    }
}

impl BufferManager for MappedBufferManager {
    fn init(&mut self, args: &BufferManagerArgs) -> Result<()> {
        let region = Arc::new(MappedRegion::open(&self.spec)?);

        self.dtype = args.dtype;
        self.circular = self.spec.circular;
        self.filesize = region.len();
        self.bytes_popped = 0;

        let segment: Arc<dyn MemorySegment> = region.clone();
        self.front = Some(BufferView::new(segment, 0, self.filesize, self.dtype));
        self.region = Some(region);

        tracing::debug!(
            path = %self.spec.path.display(),
            filesize = self.filesize,
            circular = self.circular,
            "mapped file"
        );
        Ok(())
    }

    fn empty(&self) -> bool {
        !self.circular && self.bytes_popped == self.filesize
    }

    fn pop(&mut self, num_bytes: usize) -> Result<BufferView> {
        let view = self.take(num_bytes)?;
        self.front = Some(view.clone());
        Ok(view)
    }

    fn push(&mut self, _buffer: BufferView) -> Result<()> {
        Err(Error::Unsupported("MappedBufferManager::push"))
    }

    fn front(&self) -> Option<BufferView> {
        self.front.clone()
    }
}

impl std::fmt::Debug for MappedBufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedBufferManager")
            .field("path", &self.spec.path)
            .field("circular", &self.circular)
            .field("filesize", &self.filesize)
            .field("bytes_popped", &self.bytes_popped)
            .finish()
    }
}

/// Shared slot holding the live [`MappedBufferManager`] of a stage.
///
/// The stage swaps managers in and out of the slot on activation and
/// reconfiguration; the scheduler keeps a handle and always observes either
/// the old manager or the new one, never a half-replaced mapping. When the
/// slot is empty the handle reports `empty()` and refuses to pop.
#[derive(Clone, Default)]
pub struct BufferManagerHandle {
    slot: Arc<Mutex<Option<MappedBufferManager>>>,
}

impl BufferManagerHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<MappedBufferManager>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the live manager, returning the previous one.
    pub(crate) fn install(&self, manager: MappedBufferManager) -> Option<MappedBufferManager> {
        self.lock().replace(manager)
    }

    /// Replace the live manager, carrying the old manager's stream position
    /// over to `manager` under a single lock, so no pop lands in between.
    ///
    /// Returns the restored position, or `None` when no manager was live.
    /// The position is clamped to the new file's size.
    pub(crate) fn swap_preserving(&self, mut manager: MappedBufferManager) -> Result<Option<usize>> {
        let mut slot = self.lock();
        let preserved = match slot.as_ref() {
            Some(old) => {
                let offset = old.offset().min(manager.filesize());
                manager.restore_offset(offset)?;
                Some(offset)
            }
            None => None,
        };
        let old = slot.replace(manager);
        drop(slot);
        drop(old);
        Ok(preserved)
    }

    /// Remove the live manager.
    pub(crate) fn take(&self) -> Option<MappedBufferManager> {
        self.lock().take()
    }

    /// Whether a manager is installed.
    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `f` against the live manager.
    pub fn with<R>(&self, f: impl FnOnce(&mut MappedBufferManager) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    /// Stream position of the live manager.
    pub fn offset(&self) -> Option<usize> {
        self.with(|manager| manager.offset())
    }

    fn released() -> Error {
        Error::InvalidState("buffer manager has been released".into())
    }
}

impl BufferManager for BufferManagerHandle {
    fn init(&mut self, args: &BufferManagerArgs) -> Result<()> {
        self.with(|manager| manager.init(args))
            .unwrap_or_else(|| Err(Self::released()))
    }

    fn empty(&self) -> bool {
        self.lock().as_ref().is_none_or(|manager| manager.empty())
    }

    fn pop(&mut self, num_bytes: usize) -> Result<BufferView> {
        self.with(|manager| manager.pop(num_bytes))
            .unwrap_or_else(|| Err(Self::released()))
    }

    fn push(&mut self, buffer: BufferView) -> Result<()> {
        self.with(|manager| manager.push(buffer))
            .unwrap_or_else(|| Err(Self::released()))
    }

    fn front(&self) -> Option<BufferView> {
        self.lock().as_ref().and_then(|manager| manager.front())
    }
}

impl std::fmt::Debug for BufferManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManagerHandle")
            .field("live", &self.is_live())
            .finish()
    }
}
