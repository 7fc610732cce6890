use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeSet;

use atp_protocol::codec::{binary, json};
use atp_protocol::{Frame, FrameMeta, FrameType, Payload, QosTier, Window};

fn small_data_frame() -> Frame {
    Frame {
        v: 1,
        frame_type: FrameType::Data,
        session_id: "sess-bench-0001".into(),
        stream_id: "stream-bench-0001".into(),
        msg_seq: 128,
        frag_seq: 0,
        flags: BTreeSet::new(),
        qos: QosTier::Gold,
        ttl: 8,
        window: Some(Window::new(4, 8192, 10_000)),
        meta: FrameMeta::default(),
        payload: Payload::Data {
            content: serde_json::json!({"text": "summarize this document for me"}),
            tokens_in: Some(12),
            tokens_out: Some(0),
            cost_delta_micros: Some(0),
        },
        sig: None,
        nonce: Some("nonce-bench-0001".into()),
        checksum: None,
    }
}

fn large_data_frame() -> Frame {
    let mut frame = small_data_frame();
    let chunk: Vec<serde_json::Value> = (0..500)
        .map(|i| serde_json::json!({"token": i, "text": format!("token-{i}")}))
        .collect();
    if let Payload::Data { content, .. } = &mut frame.payload {
        *content = serde_json::json!({"chunks": chunk});
    }
    frame
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let small = small_data_frame();
    group.bench_function("json_small", |b| b.iter(|| json::encode(black_box(&small))));
    group.bench_function("binary_small", |b| {
        b.iter(|| binary::encode(black_box(&small), 1 << 20))
    });

    let large = large_data_frame();
    group.bench_function("json_large", |b| b.iter(|| json::encode(black_box(&large))));
    group.bench_function("binary_large", |b| {
        b.iter(|| binary::encode(black_box(&large), 1 << 20))
    });

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let small = small_data_frame();
    let json_bytes = json::encode(&small).expect("encode small json");
    let binary_bytes = binary::encode(&small, 1 << 20).expect("encode small binary");
    group.bench_function("json_small", |b| b.iter(|| json::decode(black_box(&json_bytes))));
    group.bench_function("binary_small", |b| {
        b.iter(|| binary::decode(black_box(&binary_bytes)))
    });

    let large = large_data_frame();
    let json_bytes = json::encode(&large).expect("encode large json");
    let binary_bytes = binary::encode(&large, 1 << 20).expect("encode large binary");
    group.bench_function("json_large", |b| b.iter(|| json::decode(black_box(&json_bytes))));
    group.bench_function("binary_large", |b| {
        b.iter(|| binary::decode(black_box(&binary_bytes)))
    });

    group.finish();
}

fn benchmark_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    let frame = small_data_frame();
    group.bench_function("binary_small", |b| {
        b.iter(|| {
            let encoded = binary::encode(black_box(&frame), 1 << 20).expect("encode");
            binary::decode(black_box(&encoded)).expect("decode")
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_roundtrip);
criterion_main!(benches);
