//! Integration tests for the mapped file source.
//!
//! These tests drive `BinaryFileSource` the way a scheduler does: one
//! `produce` per cycle without an output buffer, consuming the views the
//! source exposes from its mapping.

use parallax_filestream::config::{FileAccessSpec, FileSourceConfig, Strategy, WorkInfo};
use parallax_filestream::element::{Lifecycle, ProduceContext, ProduceResult, Source};
use parallax_filestream::elements::BinaryFileSource;
use parallax_filestream::error::Error;
use parallax_filestream::format::DType;
use parallax_filestream::memory::{
    BufferManager, BufferManagerArgs, MAX_WRAP_PASSES, MappedBufferManager, MemoryType,
};
use proptest::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::NamedTempFile;

fn temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(content).unwrap();
    temp.flush().unwrap();
    temp
}

fn source(temp: &NamedTempFile, rewind: bool) -> BinaryFileSource {
    let config = FileSourceConfig::new(temp.path())
        .with_strategy(Strategy::Mapped)
        .with_rewind(rewind);
    let src = BinaryFileSource::from_config(config).unwrap();
    src.activate().unwrap();
    src
}

fn cycle(src: &BinaryFileSource, elements: usize) -> Vec<u8> {
    let mut ctx = ProduceContext::without_buffer(WorkInfo::new(elements));
    match src.produce(&mut ctx).unwrap() {
        ProduceResult::View(view) => view.to_vec(),
        other => panic!("mapped source returned {other:?}"),
    }
}

// ============================================================================
// Circular playback
// ============================================================================

/// A 10-byte file read 4 bytes at a time wraps through every phase.
#[test]
fn test_circular_sequence() {
    let temp = temp_file(b"0123456789");
    let src = source(&temp, true);

    let mut offsets = Vec::new();
    let mut produced = Vec::new();
    for _ in 0..6 {
        produced.extend(cycle(&src, 4));
        offsets.push(src.offset().unwrap());
    }

    assert_eq!(offsets, [4, 8, 2, 6, 10, 4]);
    assert_eq!(produced, b"012345678901234567890123");
}

/// Views expose the file pages, not copies.
#[test]
fn test_views_are_file_backed() {
    let temp = temp_file(b"0123456789");
    let src = source(&temp, true);

    let manager = src.output_buffer_manager("").unwrap();
    let front = manager.front().unwrap();

    let mut ctx = ProduceContext::without_buffer(WorkInfo::new(4));
    let view = src.produce(&mut ctx).unwrap().into_view().unwrap();
    assert_eq!(view.address(), front.address());
    assert!(
        view.segments()
            .iter()
            .all(|segment| segment.memory_type() == MemoryType::MappedFile)
    );
}

/// An element type larger than a byte scales the request.
#[test]
fn test_circular_complex_elements() {
    let samples: Vec<u8> = (0u8..32).collect();
    let temp = temp_file(&samples);
    let dtype = DType::parse("complex_int16").unwrap();
    let config = FileSourceConfig::new(temp.path())
        .with_dtype(dtype)
        .with_strategy(Strategy::Mapped)
        .with_rewind(true);
    let src = BinaryFileSource::from_config(config).unwrap();
    src.activate().unwrap();

    let mut ctx = ProduceContext::without_buffer(WorkInfo::new(5));
    let first = src.produce(&mut ctx).unwrap();
    assert_eq!(first.elements(dtype), 5);

    let mut ctx = ProduceContext::without_buffer(WorkInfo::new(5));
    let second = src.produce(&mut ctx).unwrap().into_view().unwrap();
    assert_eq!(second.segment_count(), 2);
    assert_eq!(second.to_vec()[..12], samples[20..32]);
    assert_eq!(second.to_vec()[12..], samples[..8]);
}

// ============================================================================
// Non-circular end of stream
// ============================================================================

/// Once exhausted, a non-circular source keeps returning empty views.
#[test]
fn test_end_of_stream_is_sticky() {
    let temp = temp_file(b"0123456789");
    let src = source(&temp, false);

    assert_eq!(cycle(&src, 8), b"01234567");
    assert!(cycle(&src, 8).is_empty());
    assert_eq!(cycle(&src, 2), b"89");

    let manager = src.output_buffer_manager("").unwrap();
    for _ in 0..3 {
        assert!(cycle(&src, 1).is_empty());
        assert!(manager.empty());
    }
    assert!(src.is_active());

    src.set_offset(0).unwrap();
    assert!(!manager.empty());
    assert_eq!(cycle(&src, 10), b"0123456789");
}

/// A request far larger than the file is end of stream for a linear
/// source and a bounded number of passes for a circular one.
#[test]
fn test_oversized_request() {
    let temp = temp_file(b"0123456789");

    let linear = source(&temp, false);
    assert_eq!(cycle(&linear, 4), b"0123");
    assert!(cycle(&linear, usize::MAX).is_empty());
    assert_eq!(linear.offset(), Some(4));
    assert_eq!(cycle(&linear, 6), b"456789");

    let circular = source(&temp, true);
    let bytes = cycle(&circular, usize::MAX);
    assert_eq!(bytes.len(), 10 * MAX_WRAP_PASSES);
    assert_eq!(&bytes[..12], b"012345678901");
    assert_eq!(circular.offset(), Some(10));
}

// ============================================================================
// Offset control
// ============================================================================

#[test]
fn test_set_offset_bounds() {
    let temp = temp_file(b"0123456789");
    let src = source(&temp, false);

    src.set_offset(9).unwrap();
    assert_eq!(cycle(&src, 1), b"9");

    let err = src.set_offset(10).unwrap_err();
    assert!(matches!(
        err,
        Error::OffsetOutOfRange {
            offset: 10,
            filesize: 10
        }
    ));
    assert!(err.is_configuration());
    assert_eq!(src.offset(), Some(10));
}

#[test]
fn test_set_offset_on_empty_file() {
    let temp = temp_file(b"");
    let src = source(&temp, true);

    src.set_offset(0).unwrap();
    assert!(src.set_offset(1).is_err());
    assert!(cycle(&src, 4).is_empty());
}

#[test]
fn test_set_offset_requires_active_source() {
    let temp = temp_file(b"0123");
    let src = source(&temp, false);
    src.deactivate().unwrap();
    assert!(matches!(src.set_offset(0), Err(Error::InvalidState(_))));
}

// ============================================================================
// Reconfiguration
// ============================================================================

/// Toggling auto-rewind while live keeps the stream position, including
/// the end-of-file position.
#[test]
fn test_rewind_toggle_keeps_position() {
    let temp = temp_file(b"0123456789");
    let src = source(&temp, true);

    cycle(&src, 4);
    cycle(&src, 4);
    cycle(&src, 2);
    assert_eq!(src.offset(), Some(10));

    src.set_auto_rewind(false).unwrap();
    assert_eq!(src.offset(), Some(10));
    assert!(cycle(&src, 1).is_empty());

    src.set_auto_rewind(true).unwrap();
    assert_eq!(src.offset(), Some(10));
    assert_eq!(cycle(&src, 3), b"012");
}

/// Changing the path while live restarts at the beginning of the new file.
#[test]
fn test_path_change_restarts() {
    let first = temp_file(b"0123456789");
    let second = temp_file(b"abcdef");
    let src = source(&first, true);
    cycle(&src, 7);

    let manager = src.output_buffer_manager("").unwrap();
    src.set_file_path(second.path()).unwrap();
    assert_eq!(src.offset(), Some(0));
    assert_eq!(manager.front().unwrap().len(), 6);
    assert_eq!(cycle(&src, 8), b"abcdefab");
}

/// Configuration set while inactive takes effect on activation.
#[test]
fn test_configure_before_activation() {
    let temp = temp_file(b"xyz");
    let src = BinaryFileSource::new(DType::bytes(), Strategy::Mapped);
    src.set_auto_rewind(true).unwrap();
    src.set_file_path(temp.path()).unwrap();
    assert!(src.offset().is_none());

    src.activate().unwrap();
    assert_eq!(cycle(&src, 5), b"xyzxy");
}

/// A live source can be reconfigured from another thread while the
/// scheduler thread keeps cycling; every view is a valid window.
#[test]
fn test_reconfigure_while_cycling() {
    let first = temp_file(b"0123456789");
    let second = temp_file(b"0123456789");
    let src = Arc::new(source(&first, true));
    let done = Arc::new(AtomicBool::new(false));

    let worker = {
        let src = Arc::clone(&src);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut cycles = 0;
            while !done.load(Ordering::Relaxed) || cycles < 100 {
                let bytes = cycle(&src, 7);
                for pair in bytes.windows(2) {
                    assert_eq!(pair[1], b'0' + (pair[0] - b'0' + 1) % 10);
                }
                cycles += 1;
                if bytes.is_empty() {
                    src.set_offset(0).unwrap();
                }
            }
            cycles
        })
    };

    for round in 0..50 {
        src.set_auto_rewind(round % 2 == 0).unwrap();
        let path = if round % 3 == 0 {
            second.path()
        } else {
            first.path()
        };
        src.set_file_path(path).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    let cycles = worker.join().unwrap();
    assert!(cycles >= 100);
    assert!(src.is_active());
}

/// Pops through the scheduler's handle race with auto-rewind toggles on
/// another thread; the stream never repeats or skips a byte.
#[test]
fn test_rewind_toggle_while_popping_handle() {
    let content: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
    let temp = temp_file(&content);
    let src = Arc::new(source(&temp, true));
    let done = Arc::new(AtomicBool::new(false));

    let worker = {
        let mut handle = src.output_buffer_manager("").unwrap();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut previous: Option<u8> = None;
            let mut popped = 0usize;
            while !done.load(Ordering::Relaxed) || popped < 20_000 {
                let view = handle.pop(1).unwrap();
                let Some(&byte) = view.to_vec().first() else {
                    continue;
                };
                if let Some(prev) = previous {
                    assert_eq!(byte, prev.wrapping_add(1), "after {popped} bytes");
                }
                previous = Some(byte);
                popped += 1;
            }
            popped
        })
    };

    for round in 0..200 {
        src.set_auto_rewind(round % 2 == 1).unwrap();
    }
    src.set_auto_rewind(true).unwrap();
    done.store(true, Ordering::Relaxed);

    assert!(worker.join().unwrap() >= 20_000);
    assert!(src.is_active());
}

// ============================================================================
// Circular concatenation property
// ============================================================================

proptest! {
    /// Any sequence of circular pops concatenates to the file repeated,
    /// each pop clamped to a bounded number of passes.
    #[test]
    fn prop_circular_pops_concatenate(
        content in proptest::collection::vec(any::<u8>(), 1..64),
        requests in proptest::collection::vec(1usize..200, 1..20),
    ) {
        let temp = temp_file(&content);
        let spec = FileAccessSpec::read_only(temp.path()).with_circular(true);
        let mut manager = MappedBufferManager::new(spec);
        manager.init(&BufferManagerArgs::default()).unwrap();

        let mut stream = Vec::new();
        for n in &requests {
            let view = manager.pop(*n).unwrap();
            prop_assert_eq!(view.len(), (*n).min(content.len() * MAX_WRAP_PASSES));
            prop_assert!(manager.offset() >= 1 && manager.offset() <= content.len());
            stream.extend(view.to_vec());
        }

        let expected: Vec<u8> = content.iter().copied().cycle().take(stream.len()).collect();
        prop_assert_eq!(stream, expected);
    }

    /// A non-circular file is produced exactly once, whatever the request sizes.
    #[test]
    fn prop_linear_pops_never_exceed_file(
        content in proptest::collection::vec(any::<u8>(), 0..64),
        requests in proptest::collection::vec(1usize..32, 1..40),
    ) {
        let temp = temp_file(&content);
        let mut manager = MappedBufferManager::new(FileAccessSpec::read_only(temp.path()));
        manager.init(&BufferManagerArgs::default()).unwrap();

        let mut stream = Vec::new();
        for n in &requests {
            let view = manager.pop(*n).unwrap();
            prop_assert!(view.is_empty() || view.len() == *n);
            stream.extend(view.to_vec());
        }
        prop_assert!(stream.len() <= content.len());
        prop_assert_eq!(&stream[..], &content[..stream.len()]);
    }
}
