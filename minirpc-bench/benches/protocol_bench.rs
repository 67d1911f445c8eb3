//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use minirpc_protocol::{CodecType, Decoder, Encoder, Frame, Header, Options};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Payload {
    id: u64,
    name: String,
    data: Vec<u8>,
}

fn create_payload(size: usize) -> Payload {
    Payload {
        id: 12345678,
        name: "bench".to_string(),
        data: vec![0x42; size],
    }
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let header = Bytes::from_static(b"Foo.Sum");
        let frame = Frame::new(header, Bytes::from("x".repeat(size)));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let header = Bytes::from_static(b"Foo.Sum");
        let encoded = Frame::new(header, Bytes::from("x".repeat(size)))
            .encode()
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_message_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_encode");
    let header = Header::new("Foo.Sum", 42);

    for codec in CodecType::ALL {
        for size in [100, 10000] {
            let payload = create_payload(size);

            group.throughput(Throughput::Elements(1));
            group.bench_with_input(
                BenchmarkId::new(codec.as_str(), size),
                &payload,
                |b, payload| {
                    b.iter(|| black_box(Encoder::encode_message(codec, &header, payload).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_message_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_decode");
    let header = Header::new("Foo.Sum", 42);

    for codec in CodecType::ALL {
        for size in [100, 10000] {
            let encoded = Encoder::encode_message(codec, &header, &create_payload(size)).unwrap();

            group.throughput(Throughput::Elements(1));
            group.bench_with_input(
                BenchmarkId::new(codec.as_str(), size),
                &encoded,
                |b, encoded| {
                    b.iter(|| {
                        let mut decoder = Decoder::new();
                        decoder.extend(encoded);
                        let frame = decoder.decode_frame().unwrap().unwrap();
                        let header: Header = codec.decode(&frame.header).unwrap();
                        let payload: Payload = codec.decode(&frame.body).unwrap();
                        black_box((header, payload))
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_options_parse(c: &mut Criterion) {
    let line = Options::new(CodecType::Postcard).to_line().unwrap();

    c.bench_function("options_parse", |b| {
        b.iter(|| black_box(Options::from_line(&line).unwrap()));
    });
}

fn bench_crc32c(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32c");

    for size in [100, 1000, 10000, 100000] {
        let data = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(crc32c::crc32c(data)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_message_encode,
    bench_message_decode,
    bench_options_parse,
    bench_crc32c,
);

criterion_main!(benches);
