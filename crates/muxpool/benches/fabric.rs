use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use muxpool::{ResourceConfig, SystemResource};
use std::thread;

const MESSAGES: u64 = 100_000;
const POOL: usize = 256;

fn bench_rendezvous(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendezvous");
    group.throughput(Throughput::Elements(MESSAGES));

    group.bench_function("single_producer_consumer", |b| {
        b.iter(|| {
            let resource = SystemResource::new(ResourceConfig::new(POOL, 1, 1), || 0u64).unwrap();
            let producer = resource.register_producer().unwrap();
            let consumer = resource.register_consumer().unwrap();

            let producer_handle = thread::spawn(move || {
                for i in 0..MESSAGES {
                    let mut token = producer.get_empty().unwrap();
                    *token.payload_mut() = i;
                    token.set_rank(i);
                    token.post_full().unwrap();
                }
            });

            for _ in 0..MESSAGES {
                let token = consumer.get_full().unwrap();
                black_box(*token.payload());
                token.release();
            }

            producer_handle.join().unwrap();
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 25_000;

    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements(PRODUCERS as u64 * PER_PRODUCER));

    group.bench_function("four_producers_one_consumer", |b| {
        b.iter(|| {
            let resource =
                SystemResource::new(ResourceConfig::new(POOL, PRODUCERS, 1), || 0u64).unwrap();
            let consumer = resource.register_consumer().unwrap();

            let mut handles = vec![];
            for _ in 0..PRODUCERS {
                let resource = resource.clone();
                handles.push(thread::spawn(move || {
                    let producer = resource.register_producer().unwrap();
                    for i in 0..PER_PRODUCER {
                        let mut token = producer.get_empty().unwrap();
                        *token.payload_mut() = i;
                        token.set_rank(i);
                        token.post_full().unwrap();
                    }
                }));
            }

            for _ in 0..PRODUCERS as u64 * PER_PRODUCER {
                let token = consumer.get_full().unwrap();
                black_box(*token.payload());
                token.release();
            }

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rendezvous, bench_contended);
criterion_main!(benches);
