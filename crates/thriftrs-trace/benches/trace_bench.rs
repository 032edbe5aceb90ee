// Criterion benchmarks for thriftrs-trace
//
// Run benchmarks with:
//   cargo bench -p thriftrs-trace

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use thriftrs_trace::{MemorySink, TraceContext, TraceHeader, TraceSink, Tracker};

fn bench_gen_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("gen_header");
    let tracker = Tracker::new("bench", "bench", Arc::new(MemorySink::new()) as Arc<dyn TraceSink>);
    let parent = TraceContext::new("chain", 0);

    group.bench_function("root", |b| {
        b.iter(|| {
            let mut header = TraceHeader::default();
            tracker.gen_header_in(None, black_box(&mut header));
            header
        })
    });

    group.bench_function("nested", |b| {
        b.iter(|| {
            let mut header = TraceHeader::default();
            tracker.gen_header_in(Some(&parent), black_box(&mut header));
            header
        })
    });

    group.finish();
}

fn bench_record(c: &mut Criterion) {
    let sink = Arc::new(MemorySink::new());
    let tracker = Tracker::new("bench", "bench", sink.clone() as Arc<dyn TraceSink>);
    let parent = TraceContext::new("chain", 0);

    c.bench_function("record_memory_sink", |b| {
        b.iter(|| {
            let mut header = TraceHeader::default();
            tracker.gen_header_in(Some(&parent), &mut header);
            tracker.record(black_box(header), None);
        })
    });
}

criterion_group!(benches, bench_gen_header, bench_record);
criterion_main!(benches);
