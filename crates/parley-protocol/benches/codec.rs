//! Codec benchmarks for parley-protocol.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ClientEvent, MessageType, ReceiveMessage, SendMessage, ServerEvent};

fn send_event(len: usize) -> ClientEvent {
    ClientEvent::SendMessage(SendMessage {
        receiver_id: "5f0c6d2e-8d4b-4c1e-9b1a-2f3e4d5c6b7a".into(),
        content: "x".repeat(len),
        message_type: MessageType::Text,
    })
}

fn receive_event(len: usize) -> ServerEvent {
    ServerEvent::ReceiveMessage(ReceiveMessage {
        id: "0b7e2a44-1c3d-4e5f-8a9b-0c1d2e3f4a5b".into(),
        sender_id: "9a8b7c6d-5e4f-4a3b-2c1d-0e9f8a7b6c5d".into(),
        sender_username: "alice".into(),
        content: "x".repeat(len),
        message_type: MessageType::Text,
        timestamp: Utc::now(),
    })
}

fn bench_decode_inbound(c: &mut Criterion) {
    let event = send_event(64);
    let text = codec::encode_json(&event).unwrap();
    let binary = codec::encode(&event).unwrap();

    let mut group = c.benchmark_group("decode_send_message");
    group.throughput(Throughput::Elements(1));
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::decode_json::<ClientEvent>(black_box(&text)))
    });
    group.bench_function("msgpack_64B", |b| {
        b.iter(|| codec::decode::<ClientEvent>(black_box(&binary)))
    });
    group.finish();
}

fn bench_encode_outbound(c: &mut Criterion) {
    let event = receive_event(256);

    let mut group = c.benchmark_group("encode_receive_message");
    group.throughput(Throughput::Elements(1));
    group.bench_function("json_256B", |b| {
        b.iter(|| codec::encode_json(black_box(&event)))
    });
    group.bench_function("msgpack_256B", |b| {
        b.iter(|| codec::encode(black_box(&event)))
    });
    group.finish();
}

criterion_group!(benches, bench_decode_inbound, bench_encode_outbound);
criterion_main!(benches);
