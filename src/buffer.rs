//! Buffer views for zero-copy data passing.
//!
//! A [`BufferView`] is a read-only window onto one or more memory segments,
//! walked as a single logical byte stream. Most views have exactly one
//! segment. A circular file source produces two at the wrap point (the tail
//! of the file followed by its head) and never copies to glue them.

use crate::format::DType;
use crate::memory::{HeapSegment, MemorySegment, MemoryType};
use smallvec::SmallVec;
use std::io::IoSlice;
use std::sync::Arc;

/// One contiguous piece of a [`BufferView`].
///
/// Cheap to clone (Arc increment + copy of offset/len).
#[derive(Clone)]
pub struct ViewSegment {
    segment: Arc<dyn MemorySegment>,
    offset: usize,
    len: usize,
}

impl ViewSegment {
    /// Create a window of `len` bytes at `offset` within `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > segment.len()`.
    pub fn new(segment: Arc<dyn MemorySegment>, offset: usize, len: usize) -> Self {
        assert!(
            offset
                .checked_add(len)
                .is_some_and(|end| end <= segment.len()),
            "view segment exceeds memory segment bounds"
        );
        Self {
            segment,
            offset,
            len,
        }
    }

    /// Address of the first byte.
    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    /// Offset within the backing segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the window is zero-length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The window's bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.segment.as_slice()[self.offset..self.offset + self.len]
    }

    /// Memory type of the backing segment.
    pub fn memory_type(&self) -> MemoryType {
        self.segment.memory_type()
    }
}

impl std::fmt::Debug for ViewSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSegment")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("memory_type", &self.memory_type())
            .finish()
    }
}

/// A scatter/gather view over one or more segments, read as one stream.
///
/// An empty view (no segments) is the "null" buffer: a non-circular file
/// source returns it once the file is exhausted.
#[derive(Clone)]
pub struct BufferView {
    segments: SmallVec<[ViewSegment; 2]>,
    len: usize,
    dtype: DType,
}

impl BufferView {
    /// The empty view.
    pub fn empty(dtype: DType) -> Self {
        Self {
            segments: SmallVec::new(),
            len: 0,
            dtype,
        }
    }

    /// A single-segment view of `len` bytes at `offset` within `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > segment.len()`.
    pub fn new(segment: Arc<dyn MemorySegment>, offset: usize, len: usize, dtype: DType) -> Self {
        let mut view = Self::empty(dtype);
        view.push_segment(ViewSegment::new(segment, offset, len));
        view
    }

    /// A view over a heap copy of `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, dtype: DType) -> Self {
        let segment: Arc<dyn MemorySegment> = Arc::new(HeapSegment::from(bytes.into()));
        let len = segment.len();
        Self::new(segment, 0, len, dtype)
    }

    /// Append a segment to the end of the stream. Empty segments are dropped.
    pub fn push_segment(&mut self, segment: ViewSegment) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push(segment);
    }

    /// Append all segments of `other` after this view's bytes.
    pub fn append(&mut self, other: BufferView) {
        for segment in other.segments {
            self.push_segment(segment);
        }
    }

    /// Total length in bytes across all segments.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type of the stream.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of whole elements in the view.
    pub fn elements(&self) -> usize {
        self.dtype.elements_in(self.len)
    }

    /// Address of the first byte, or null for the empty view.
    pub fn address(&self) -> *const u8 {
        self.segments
            .first()
            .map_or(std::ptr::null(), ViewSegment::as_ptr)
    }

    /// The segments in stream order.
    pub fn segments(&self) -> &[ViewSegment] {
        &self.segments
    }

    /// Number of segments (0 for empty, 2 at a wrap point).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Borrow the bytes if the view is a single contiguous window.
    pub fn as_contiguous(&self) -> Option<&[u8]> {
        match self.segments.as_slice() {
            [] => Some(&[]),
            [only] => Some(only.as_slice()),
            _ => None,
        }
    }

    /// Iterate the contiguous chunks in stream order.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.segments.iter().map(ViewSegment::as_slice)
    }

    /// Iterate all bytes in stream order.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.chunks().flat_map(|chunk| chunk.iter().copied())
    }

    /// Gather the chunks for a vectored write.
    pub fn io_slices(&self) -> SmallVec<[IoSlice<'_>; 2]> {
        self.chunks().map(IoSlice::new).collect()
    }

    /// Copy the stream into a contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// View of the first `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len > self.len()`.
    pub fn prefix(&self, len: usize) -> Self {
        assert!(len <= self.len, "prefix exceeds view length");
        let mut out = Self::empty(self.dtype);
        let mut remaining = len;
        for segment in &self.segments {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(segment.len());
            out.push_segment(ViewSegment {
                segment: Arc::clone(&segment.segment),
                offset: segment.offset,
                len: take,
            });
            remaining -= take;
        }
        out
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("len", &self.len)
            .field("dtype", &self.dtype)
            .field("segments", &self.segments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(bytes: &[u8]) -> Arc<dyn MemorySegment> {
        Arc::new(HeapSegment::copy_from_slice(bytes))
    }

    #[test]
    fn test_empty_view() {
        let view = BufferView::empty(DType::bytes());
        assert!(view.is_empty());
        assert!(view.address().is_null());
        assert_eq!(view.segment_count(), 0);
        assert_eq!(view.as_contiguous(), Some(&[][..]));
        assert!(view.to_vec().is_empty());
    }

    #[test]
    fn test_single_segment() {
        let view = BufferView::new(heap(b"0123456789"), 2, 4, DType::bytes());
        assert_eq!(view.len(), 4);
        assert_eq!(view.as_contiguous(), Some(&b"2345"[..]));
        assert_eq!(view.segments()[0].offset(), 2);
    }

    #[test]
    fn test_two_segments_read_as_one_stream() {
        let file = heap(b"0123456789");
        let mut view = BufferView::new(Arc::clone(&file), 8, 2, DType::bytes());
        view.append(BufferView::new(file, 0, 2, DType::bytes()));

        assert_eq!(view.len(), 4);
        assert_eq!(view.segment_count(), 2);
        assert!(view.as_contiguous().is_none());
        assert_eq!(view.to_vec(), b"8901");
        assert_eq!(view.bytes().collect::<Vec<_>>(), b"8901");
        assert_eq!(view.io_slices().len(), 2);
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let mut view = BufferView::new(heap(b"abc"), 0, 0, DType::bytes());
        assert_eq!(view.segment_count(), 0);
        view.append(BufferView::from_bytes(b"xy".to_vec(), DType::bytes()));
        assert_eq!(view.segment_count(), 1);
    }

    #[test]
    fn test_elements_and_prefix() {
        let dtype = DType::parse("int16").unwrap();
        let file = heap(b"abcdef");
        let mut view = BufferView::new(Arc::clone(&file), 4, 2, dtype);
        view.append(BufferView::new(file, 0, 3, dtype));
        assert_eq!(view.elements(), 2);

        let prefix = view.prefix(3);
        assert_eq!(prefix.to_vec(), b"efa");
        assert_eq!(prefix.segment_count(), 2);
    }

    #[test]
    #[should_panic(expected = "view segment exceeds memory segment bounds")]
    fn test_out_of_bounds_panics() {
        let _ = BufferView::new(heap(b"abc"), 2, 2, DType::bytes());
    }
}
