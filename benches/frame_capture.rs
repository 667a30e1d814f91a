//! Benchmarks for the per-tick capture path
//!
//! Measures against an in-process producer:
//! - `update_telemetry` for a realistic 300-variable table
//! - typed value extraction from the snapshot
//! - descriptor table parsing on (re)connect
//!
//! Platform: Cross-platform (mock producer, CI-safe)

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use irsdk_shm::VariableType;
use irsdk_shm::platform::SharedMemory;
use irsdk_shm::schema::{HeaderView, read_variable_descriptors};
use irsdk_shm::test_utils::{MockProducer, ProducerLayout};
use std::hint::black_box;

fn producer() -> MockProducer {
    let mut layout = ProducerLayout::new().buffers(3).tick_rate(60);
    for i in 0..300 {
        let ty = match i % 4 {
            0 => VariableType::Float32,
            1 => VariableType::Int32,
            2 => VariableType::Bool,
            _ => VariableType::Float64,
        };
        let count = if i % 50 == 0 { 64 } else { 1 };
        layout = layout.variable(&format!("Var{i}"), ty, count);
    }
    MockProducer::new(layout.build())
}

fn bench_update_telemetry(c: &mut Criterion) {
    let producer = producer();
    let payload = vec![0x5a; producer.image().buf_len];
    let mut reader = producer.reader();
    assert!(reader.startup());

    let mut group = c.benchmark_group("update_telemetry");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    let mut tick = 0;
    group.bench_function("new_frame", |b| {
        b.iter(|| {
            tick += 1;
            producer.publish(tick, &payload);
            black_box(reader.update_telemetry())
        })
    });

    group.bench_function("no_new_frame", |b| b.iter(|| black_box(reader.update_telemetry())));

    group.finish();
}

fn bench_value_extraction(c: &mut Criterion) {
    let producer = producer();
    let mut reader = producer.reader();
    assert!(reader.startup());
    producer.publish(1, &vec![0; producer.image().buf_len]);
    assert!(reader.update_telemetry());

    c.bench_function("value_f32_by_name", |b| {
        b.iter(|| black_box(reader.value::<f32>(black_box("Var0"))))
    });

    let frame = reader.frame().expect("snapshot captured");
    let info = reader.variable_info("Var100").expect("array variable").clone();
    c.bench_function("frame_value_vec_f32", |b| {
        b.iter(|| black_box(frame.value::<Vec<f32>>(black_box(&info))))
    });
}

fn bench_descriptor_parsing(c: &mut Criterion) {
    let producer = producer();
    let mut memory = producer.memory();
    memory.open("bench").expect("mock memory opens");

    c.bench_function("read_300_descriptors", |b| {
        b.iter(|| {
            let region = memory.region().expect("mapped");
            black_box(read_variable_descriptors(&HeaderView::new(region)))
        })
    });
}

criterion_group!(benches, bench_update_telemetry, bench_value_extraction, bench_descriptor_parsing);
criterion_main!(benches);
