// Criterion benchmarks for thriftrs-common converter and framing
//
// Run benchmarks with:
//   cargo bench -p thriftrs-common
//
// For detailed output with plots:
//   cargo bench -p thriftrs-common -- --save-baseline main

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use thriftrs_common::transport::{FramedJsonProtocol, MemoryBuffer, Protocol};
use thriftrs_common::{Converter, FieldType, MessageType, Record, StructDescriptor, Value};

fn person() -> Arc<StructDescriptor> {
    StructDescriptor::builder("Person")
        .required(1, "name", FieldType::String)
        .field(2, "age", FieldType::I16)
        .field(3, "phones", FieldType::list(FieldType::String))
        .field(4, "scores", FieldType::map(FieldType::String, FieldType::Double))
        .build()
        .unwrap()
}

fn sample(desc: &Arc<StructDescriptor>, phones: usize) -> Record {
    Record::new(desc)
        .with("name", "Alice")
        .unwrap()
        .with("age", 30i16)
        .unwrap()
        .with(
            "phones",
            (0..phones).map(|i| Value::from(format!("555-{:04}", i))).collect::<Vec<_>>(),
        )
        .unwrap()
        .with(
            "scores",
            Value::Map(vec![
                (Value::from("math"), Value::Double(9.5)),
                (Value::from("art"), Value::Double(7.0)),
            ]),
        )
        .unwrap()
}

fn bench_converter(c: &mut Criterion) {
    let mut group = c.benchmark_group("converter");
    let desc = person();

    for phones in [1, 100] {
        let record = sample(&desc, phones);
        let node = Converter::encode_struct(&record).unwrap();

        group.bench_function(format!("encode_{}_phones", phones), |b| {
            b.iter(|| Converter::encode_struct(black_box(&record)))
        });
        group.bench_function(format!("decode_{}_phones", phones), |b| {
            b.iter(|| Converter::decode_struct(black_box(&node), &desc))
        });
    }

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let desc = person();
    let record = sample(&desc, 10);

    c.bench_function("framed_write_read", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut proto = FramedJsonProtocol::new(MemoryBuffer::new());
                proto.write_message_begin("add", MessageType::Call, 1).unwrap();
                proto.write_struct(black_box(&record)).await.unwrap();
                proto.write_message_end().await.unwrap();
                proto.read_message_begin().await.unwrap();
                proto.read_struct(&desc).await.unwrap()
            })
        })
    });
}

criterion_group!(benches, bench_converter, bench_framing);
criterion_main!(benches);
