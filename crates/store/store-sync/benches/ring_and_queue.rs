use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use store_sync::queue::BoundedQueue;
use store_sync::ring::{Ring, VersionedSlot};

fn bench_ring_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("push_front", "cap_256"), |b| {
        let mut buf = vec![0u8; Ring::<u64>::bytes_required(256)];
        let ring = unsafe { Ring::<u64>::at(buf.as_mut_ptr()) };
        ring.init(256);
        let mut revision = 0u64;
        b.iter(|| {
            revision += 1;
            ring.push_front(VersionedSlot::new(black_box(revision), 0, revision));
        });
    });

    group.bench_function(BenchmarkId::new("push_then_pop_back", "cap_256"), |b| {
        let mut buf = vec![0u8; Ring::<u64>::bytes_required(256)];
        let ring = unsafe { Ring::<u64>::at(buf.as_mut_ptr()) };
        ring.init(256);
        for i in 0..256 {
            ring.push_front(VersionedSlot::new(i, 0, i));
        }
        let mut revision = 256u64;
        b.iter(|| {
            revision += 1;
            ring.push_front(VersionedSlot::new(black_box(revision), 0, revision));
            let observed = ring.back().unwrap().revision;
            ring.pop_back(observed);
        });
    });

    group.finish();
}

fn bench_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("push_pop", "cap_256"), |b| {
        let mut buf = vec![0u8; BoundedQueue::<u16>::bytes_required(256)];
        let queue = unsafe { BoundedQueue::<u16>::at(buf.as_mut_ptr()) };
        queue.init(256);
        b.iter(|| {
            queue.push(black_box(1));
            black_box(queue.pop());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ring_push_pop, bench_queue_push_pop);
criterion_main!(benches);
