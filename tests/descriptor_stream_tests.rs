//! Integration tests for descriptor streaming.
//!
//! Sources and sinks are wired to pipes, socket pairs and regular files and
//! driven cycle by cycle, checking the one-syscall-per-cycle contract and
//! the cooperative yield.

use parallax_filestream::buffer::BufferView;
use parallax_filestream::config::{Strategy, WorkInfo};
use parallax_filestream::element::{
    ConsumeContext, ConsumeResult, Lifecycle, ProduceContext, ProduceResult, Sink, Source,
    StageState,
};
use parallax_filestream::elements::{
    BinaryFileSink, BinaryFileSource, FileDescriptorSink, FileDescriptorSource,
};
use parallax_filestream::error::Error;
use parallax_filestream::format::DType;
use rustix::net::{AddressFamily, SocketFlags, SocketType};
use rustix::pipe::PipeFlags;
use std::time::{Duration, Instant};

fn work(n: usize) -> WorkInfo {
    WorkInfo::new(n).with_timeout(Duration::from_millis(50))
}

fn read_into(src: &impl Source, out: &mut [u8]) -> ProduceResult {
    let len = out.len();
    let mut ctx = ProduceContext::new(out, work(len));
    src.produce(&mut ctx).unwrap()
}

fn write_from(sink: &impl Sink, bytes: &[u8]) -> ConsumeResult {
    let view = BufferView::from_bytes(bytes.to_vec(), DType::bytes());
    sink.consume(&ConsumeContext::new(&view, work(bytes.len())))
        .unwrap()
}

// ============================================================================
// Descriptor configuration
// ============================================================================

/// An unset descriptor is a configuration error and the stage stays inactive.
#[test]
fn test_unset_descriptor_is_rejected() {
    // SAFETY: -1 is never taken ownership of.
    let src = unsafe { FileDescriptorSource::from_raw_fd(-1, DType::bytes()) };
    let err = src.activate().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.is_configuration());
    assert_eq!(src.state(), StageState::Inactive);

    let sink = FileDescriptorSink::new();
    assert!(matches!(sink.activate(), Err(Error::Configuration(_))));
    assert!(!sink.is_active());
}

/// A descriptor set after construction is used on activation.
#[test]
fn test_descriptor_set_later() {
    let (read_fd, write_fd) = rustix::pipe::pipe().unwrap();
    let src = FileDescriptorSource::new(DType::bytes());
    src.set_descriptor(read_fd).unwrap();
    src.activate().unwrap();

    let sink = FileDescriptorSink::new();
    sink.set_descriptor(write_fd).unwrap();
    sink.activate().unwrap();

    assert_eq!(write_from(&sink, b"late"), ConsumeResult::Consumed(4));
    let mut out = [0u8; 8];
    assert_eq!(read_into(&src, &mut out).bytes(), 4);
    assert_eq!(&out[..4], b"late");
}

// ============================================================================
// Streaming
// ============================================================================

/// Bytes written on one end of a socket pair come out of the other, and
/// closing the writer reads as zero production.
#[test]
fn test_socketpair_stream() {
    let (left, right) = rustix::net::socketpair(
        AddressFamily::UNIX,
        SocketType::STREAM,
        SocketFlags::CLOEXEC,
        None,
    )
    .unwrap();

    let sink = FileDescriptorSink::from_owned(left);
    let src = FileDescriptorSource::from_owned(right, DType::bytes());
    sink.activate().unwrap();
    src.activate().unwrap();

    let mut out = [0u8; 64];
    assert!(read_into(&src, &mut out).is_yield());

    assert_eq!(write_from(&sink, b"ping").bytes(), 4);
    match read_into(&src, &mut out) {
        ProduceResult::Produced(n) => assert_eq!(&out[..n], b"ping"),
        other => panic!("expected Produced, got {other:?}"),
    }

    sink.deactivate().unwrap();
    assert!(matches!(read_into(&src, &mut out), ProduceResult::Produced(0)));
    assert_eq!(src.bytes_produced(), 4);
    assert_eq!(src.cycles_yielded(), 1);
}

/// A read is sized by the output window; the rest stays for later cycles.
#[test]
fn test_short_window_reads_in_steps() {
    let (read_fd, write_fd) = rustix::pipe::pipe().unwrap();
    rustix::io::write(&write_fd, b"abcdefgh").unwrap();

    let src = FileDescriptorSource::from_owned(read_fd, DType::bytes());
    src.activate().unwrap();

    let mut out = [0u8; 3];
    let mut collected = Vec::new();
    for _ in 0..3 {
        let n = read_into(&src, &mut out).bytes();
        collected.extend_from_slice(&out[..n]);
    }
    assert_eq!(collected, b"abcdefgh");
}

/// An idle descriptor yields within the cycle deadline.
#[test]
fn test_idle_descriptor_yields_promptly() {
    let (read_fd, _write_fd) = rustix::pipe::pipe().unwrap();
    let src = FileDescriptorSource::from_owned(read_fd, DType::bytes());
    src.activate().unwrap();

    let mut out = [0u8; 16];
    let start = Instant::now();
    for _ in 0..5 {
        let mut ctx = ProduceContext::new(
            &mut out,
            WorkInfo::new(16).with_timeout(Duration::from_millis(2)),
        );
        assert!(src.produce(&mut ctx).unwrap().is_yield());
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(src.cycles_yielded(), 5);
}

/// A full pipe makes the sink yield instead of blocking.
#[test]
fn test_full_pipe_sink_yields() {
    let (_read_fd, write_fd) =
        rustix::pipe::pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK).unwrap();
    let sink = FileDescriptorSink::from_owned(write_fd);
    sink.activate().unwrap();

    let chunk = vec![0u8; 64 * 1024];
    let mut yielded = false;
    for _ in 0..64 {
        let view = BufferView::from_bytes(chunk.clone(), DType::bytes());
        let ctx = ConsumeContext::new(&view, WorkInfo::new(chunk.len()));
        if sink.consume(&ctx).unwrap().is_yield() {
            yielded = true;
            break;
        }
    }
    assert!(yielded);
    assert!(sink.cycles_yielded() >= 1);
}

// ============================================================================
// File round trip
// ============================================================================

/// Bytes written by the file sink read back identically through the mapped
/// source and the descriptor source.
#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.bin");
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();

    let sink = BinaryFileSink::new().with_path(&path);
    sink.activate().unwrap();
    let mut written = 0;
    while written < payload.len() {
        let end = (written + 1500).min(payload.len());
        written += write_from(&sink, &payload[written..end]).bytes();
    }
    sink.deactivate().unwrap();
    assert_eq!(sink.bytes_consumed(), payload.len() as u64);

    let mapped = BinaryFileSource::new(DType::bytes(), Strategy::Mapped);
    mapped.set_file_path(&path).unwrap();
    mapped.activate().unwrap();
    let mut readback = Vec::new();
    loop {
        let mut ctx = ProduceContext::without_buffer(WorkInfo::new(1000));
        let view = mapped.produce(&mut ctx).unwrap().into_view().unwrap();
        if view.is_empty() {
            break;
        }
        readback.extend(view.to_vec());
    }
    assert_eq!(readback, payload);

    let copied = BinaryFileSource::new(DType::bytes(), Strategy::Descriptor);
    copied.set_file_path(&path).unwrap();
    copied.activate().unwrap();
    let mut readback = Vec::new();
    let mut out = vec![0u8; 4096];
    loop {
        let n = read_into(&copied, &mut out).bytes();
        if n == 0 {
            break;
        }
        readback.extend_from_slice(&out[..n]);
    }
    assert_eq!(readback, payload);
}

/// A disabled file sink swallows its input and leaves the file empty.
#[test]
fn test_disabled_sink_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disabled.bin");

    let sink = BinaryFileSink::new().with_path(&path);
    sink.set_enabled(false);
    sink.activate().unwrap();
    assert_eq!(write_from(&sink, b"ignored"), ConsumeResult::Consumed(7));
    sink.deactivate().unwrap();

    assert!(std::fs::read(&path).unwrap().is_empty());
}
