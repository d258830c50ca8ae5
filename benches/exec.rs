use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use emberkv::{CommandHandler, Config, Keyspace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

fn bench_exec_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");
    group.bench_function("set_get", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<String> = (0..1000).map(|_| format!("k{}", rng.gen::<u32>())).collect();

        b.iter_batched(
            || {
                let config = Arc::new(Config::from_args(Vec::new()).expect("config"));
                CommandHandler::new(config, Arc::new(Keyspace::new()))
            },
            |handler| {
                for key in &keys {
                    let set = [String::from("SET"), key.clone(), String::from("v")];
                    let get = [String::from("GET"), key.clone()];
                    black_box(handler.handle(&set));
                    black_box(handler.handle(&get));
                }
                black_box(handler)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_exec_set_get);
criterion_main!(benches);
