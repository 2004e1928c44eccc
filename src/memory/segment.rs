//! Memory segment trait and types.

/// Type of memory backing a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Process heap memory owned by the segment.
    Heap,
    /// Memory-mapped file.
    MappedFile,
}

impl MemoryType {
    /// Is the memory a window onto file pages?
    #[inline]
    pub fn is_file_backed(&self) -> bool {
        matches!(self, MemoryType::MappedFile)
    }
}

/// Trait for memory segment backends.
///
/// A memory segment represents a contiguous region of memory that buffer
/// views point into. Views hold the segment through an `Arc`, so a segment
/// always outlives every view onto it.
///
/// # Safety
///
/// Implementations must ensure that:
/// - `as_ptr()` stays valid for `len()` bytes for the lifetime of the segment
/// - The memory is not mutated through another path while views exist
pub trait MemorySegment: Send + Sync {
    /// Get a raw pointer to the start of this segment.
    fn as_ptr(&self) -> *const u8;

    /// Total size of the segment in bytes.
    fn len(&self) -> usize;

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of memory backing this segment.
    fn memory_type(&self) -> MemoryType;

    /// Get the segment as a byte slice.
    fn as_slice(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        // SAFETY: implementors guarantee as_ptr() is valid for len() bytes
        // while &self is alive.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }
}

/// A segment owning a heap allocation.
///
/// Used for views built from bytes that did not come from a file mapping.
pub struct HeapSegment {
    data: Box<[u8]>,
}

impl HeapSegment {
    /// Copy `bytes` into a new heap segment.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
        }
    }
}

impl From<Vec<u8>> for HeapSegment {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }
}

impl MemorySegment for HeapSegment {
    fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for HeapSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSegment")
            .field("len", &self.data.len())
            .finish()
    }
}
