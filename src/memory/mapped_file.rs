//! Memory-mapped file region.
//!
//! A [`MappedRegion`] maps an entire file into the address space so that its
//! pages can be handed downstream as buffers without a copy. The region owns
//! both the descriptor and the mapping; both are released when the last
//! reference is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_filestream::config::FileAccessSpec;
//! use parallax_filestream::memory::{MappedRegion, MemorySegment};
//!
//! let region = MappedRegion::open(&FileAccessSpec::read_only("/tmp/input.bin"))?;
//! println!("mapped {} bytes", region.len());
//! ```

use super::{MemorySegment, MemoryType};
use crate::config::FileAccessSpec;
use crate::error::{Error, Result};
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{MapFlags, ProtFlags};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A file mapped into memory for the duration of one activation.
///
/// Zero-length files are represented without a mapping: `mmap` rejects a
/// zero length, and there are no pages to expose anyway.
pub struct MappedRegion {
    /// Kept open for the lifetime of the mapping.
    _fd: OwnedFd,
    /// Start of the mapping, `None` for an empty file.
    ptr: Option<NonNull<u8>>,
    len: usize,
    path: PathBuf,
    writable: bool,
}

impl MappedRegion {
    /// Open and map the file described by `spec`.
    ///
    /// The mapping is shared with the file; it is read-only unless
    /// `spec.writable` is set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid spec and a system error
    /// if opening, `fstat` or `mmap` fails.
    pub fn open(spec: &FileAccessSpec) -> Result<Self> {
        spec.validate()?;

        let flags = if spec.writable {
            OFlags::RDWR
        } else {
            OFlags::RDONLY
        };
        let fd = rustix::fs::open(&spec.path, flags | OFlags::CLOEXEC, Mode::empty())?;

        let stat = rustix::fs::fstat(&fd)?;
        let len = usize::try_from(stat.st_size).map_err(|_| {
            Error::Configuration(format!(
                "{}: file size {} cannot be mapped",
                spec.path.display(),
                stat.st_size
            ))
        })?;

        let ptr = if len == 0 {
            None
        } else {
            let mut prot = ProtFlags::empty();
            if spec.readable {
                prot |= ProtFlags::READ;
            }
            if spec.writable {
                prot |= ProtFlags::WRITE;
            }

            // SAFETY: we request a fresh mapping (null hint) of a length
            // obtained from fstat on the descriptor we just opened.
            let ptr = unsafe {
                rustix::mm::mmap(std::ptr::null_mut(), len, prot, MapFlags::SHARED, &fd, 0)?
            };
            Some(
                NonNull::new(ptr.cast::<u8>())
                    .ok_or_else(|| Error::Configuration("mmap returned null".into()))?,
            )
        };

        Ok(Self {
            _fd: fd,
            ptr,
            len,
            path: spec.path.clone(),
            writable: spec.writable,
        })
    }

    /// Get the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the pages were mapped writable.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Flush modified pages of a writable mapping to the file.
    pub fn sync(&self) -> Result<()> {
        if let (Some(ptr), true) = (self.ptr, self.writable) {
            // SAFETY: ptr/len describe the live mapping owned by self.
            unsafe {
                rustix::mm::msync(ptr.as_ptr().cast(), self.len, rustix::mm::MsyncFlags::SYNC)?;
            }
        }
        Ok(())
    }
}

impl MemorySegment for MappedRegion {
    fn as_ptr(&self) -> *const u8 {
        match self.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => NonNull::<u8>::dangling().as_ptr(),
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::MappedFile
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            tracing::warn!(path = %self.path.display(), "msync failed: {}", err);
        }
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the mapping was created in open() with this length and
            // no view can outlive the region (views hold an Arc to it).
            if let Err(err) = unsafe { rustix::mm::munmap(ptr.as_ptr().cast(), self.len) } {
                tracing::warn!(path = %self.path.display(), "munmap failed: {}", err);
            }
        }
        // fd is closed when OwnedFd is dropped
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("writable", &self.writable)
            .finish()
    }
}

// SAFETY: the mapping is plain memory owned by this value; shared access only
// hands out immutable slices, and the kernel keeps SHARED mappings coherent.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}
