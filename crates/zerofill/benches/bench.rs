use core::hint::black_box;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use zerofill::{ChunkBuffer, ProgressCounter, writer::write_chunks};

const TOTAL_BYTES: u64 = 256 * 1024 * 1024;

fn write_throughput(c: &mut Criterion) {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    let mut group = c.benchmark_group("write_chunks/sink");
    group.throughput(Throughput::Bytes(TOTAL_BYTES));

    for chunk_size in [64 * 1024, 1024 * 1024, 16 * 1024 * 1024, 100 * 1024 * 1024] {
        let buffer = ChunkBuffer::zeroed(chunk_size).expect("chunk size is non-zero");
        let cancel = CancellationToken::new();

        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let progress = ProgressCounter::new();
                    let mut sink = tokio::io::sink();
                    let written =
                        write_chunks(&mut sink, &buffer, TOTAL_BYTES, &progress, &cancel).await;
                    black_box(written.expect("sink never fails"))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, write_throughput);
criterion_main!(benches);
