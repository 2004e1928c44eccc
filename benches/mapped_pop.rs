//! Mapped buffer manager benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use parallax_filestream::config::{FileAccessSpec, Strategy, WorkInfo};
use parallax_filestream::element::{Lifecycle, ProduceContext, Source};
use parallax_filestream::elements::BinaryFileSource;
use parallax_filestream::format::DType;
use parallax_filestream::memory::{BufferManager, BufferManagerArgs, MappedBufferManager};
use std::io::Write;
use tempfile::NamedTempFile;

const FILE_SIZE: usize = 4 * 1024 * 1024;

fn fixture() -> NamedTempFile {
    let mut temp = NamedTempFile::new().unwrap();
    let content: Vec<u8> = (0..FILE_SIZE).map(|i| i as u8).collect();
    temp.write_all(&content).unwrap();
    temp.flush().unwrap();
    temp
}

fn bench_circular_pop(c: &mut Criterion) {
    let temp = fixture();
    let mut group = c.benchmark_group("mapped_circular_pop");

    for request in [4096usize, 65536, 1_000_003] {
        let spec = FileAccessSpec::read_only(temp.path()).with_circular(true);
        let mut manager = MappedBufferManager::new(spec);
        manager.init(&BufferManagerArgs::default()).unwrap();

        group.throughput(Throughput::Bytes(request as u64));
        group.bench_with_input(BenchmarkId::from_parameter(request), &request, |b, &n| {
            b.iter(|| {
                let view = manager.pop(n).unwrap();
                std::hint::black_box(view.address());
            });
        });
    }

    group.finish();
}

fn bench_source_cycle(c: &mut Criterion) {
    let temp = fixture();
    let dtype = DType::parse("complex_float32").unwrap();
    let src = BinaryFileSource::new(dtype, Strategy::Mapped);
    src.set_file_path(temp.path()).unwrap();
    src.set_auto_rewind(true).unwrap();
    src.activate().unwrap();

    let mut group = c.benchmark_group("mapped_source_cycle");
    group.throughput(Throughput::Elements(8192));
    group.bench_function("8192_complex_float32", |b| {
        b.iter(|| {
            let mut ctx = ProduceContext::without_buffer(WorkInfo::new(8192));
            std::hint::black_box(src.produce(&mut ctx).unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_circular_pop, bench_source_cycle);
criterion_main!(benches);
