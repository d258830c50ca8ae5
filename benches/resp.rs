use criterion::{black_box, criterion_group, criterion_main, Criterion};
use emberkv::*;

fn bench_resp(c: &mut Criterion) {
    let mut group = c.benchmark_group("resp");

    group.bench_function("parse_set_frame", |b| {
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n";
        b.iter(|| black_box(parse_request(frame)));
    });

    group.bench_function("encode_array_64", |b| {
        let items: Vec<String> = (0..64).map(|i| format!("key-{i}")).collect();
        b.iter(|| black_box(resp_array(&items)));
    });

    group.finish();
}

criterion_group!(benches, bench_resp);
criterion_main!(benches);
