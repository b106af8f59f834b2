use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;
use std::sync::Arc;
use tierguard::{CacheKey, CheckOptions, Fingerprint, SetOptions, Tier, TierGuard};

/// Benchmark cache key and fingerprint computation speed
fn bench_key_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_computation");

    let params = BTreeMap::from([
        ("temperature".to_string(), serde_json::json!(0.7)),
        ("lang".to_string(), serde_json::json!("en")),
        ("max_tokens".to_string(), serde_json::json!(1024)),
    ]);

    group.bench_function("simple_key", |b| {
        b.iter(|| CacheKey::simple(black_box("copy.generate"), black_box("write a headline")))
    });

    group.bench_function("key_with_params", |b| {
        b.iter(|| {
            CacheKey::compute(
                black_box("copy.generate"),
                black_box("write a headline"),
                black_box(&params),
            )
        })
    });

    group.bench_function("key_with_many_params", |b| {
        let many_params: BTreeMap<_, _> = (0..20)
            .map(|i| (format!("param{}", i), serde_json::json!(i)))
            .collect();

        b.iter(|| {
            CacheKey::compute(
                black_box("copy.generate"),
                black_box("write a headline"),
                black_box(&many_params),
            )
        })
    });

    group.bench_function("fingerprint", |b| {
        b.iter(|| Fingerprint::of(black_box("tenant-942")))
    });

    group.finish();
}

/// Benchmark single-threaded admission throughput per tier
fn bench_single_threaded_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");

    for tier in [Tier::Free, Tier::Starter, Tier::Admin].iter() {
        group.throughput(Throughput::Elements(1000));

        group.bench_with_input(
            BenchmarkId::new("admission_decisions", tier),
            tier,
            |b, &tier| {
                let guard = TierGuard::new();

                b.iter(|| {
                    for _ in 0..1000 {
                        black_box(guard.check_limit(
                            black_box("tenant-1"),
                            tier,
                            "bench",
                            CheckOptions::default(),
                        ));
                        guard.complete_request("tenant-1");
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark multi-threaded concurrent admission throughput
fn bench_concurrent_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let guard = Arc::new(TierGuard::new());

                    let mut handles = vec![];
                    for i in 0..num_threads {
                        let guard = Arc::clone(&guard);
                        let handle = std::thread::spawn(move || {
                            // Each thread gates a different identity to avoid contention
                            let identity = format!("tenant-{}", i);
                            for _ in 0..1000 {
                                black_box(guard.check_limit(
                                    &identity,
                                    Tier::Admin,
                                    "bench",
                                    CheckOptions::default(),
                                ));
                                guard.complete_request(&identity);
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark different identity cardinalities
fn bench_identity_diversity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity_diversity");
    group.throughput(Throughput::Elements(1000));

    // Single identity (worst case - maximum contention on one state)
    group.bench_function("single_identity", |b| {
        let guard = TierGuard::new();

        b.iter(|| {
            for _ in 0..1000 {
                black_box(guard.check_limit(
                    black_box("tenant-1"),
                    Tier::Admin,
                    "bench",
                    CheckOptions::default(),
                ));
                guard.complete_request("tenant-1");
            }
        })
    });

    // 10 unique identities (moderate diversity)
    group.bench_function("10_identities", |b| {
        let guard = TierGuard::new();
        let identities: Vec<_> = (0..10).map(|i| format!("tenant-{}", i)).collect();

        b.iter(|| {
            for i in 0..1000 {
                let identity = &identities[i % 10];
                black_box(guard.check_limit(
                    identity,
                    Tier::Admin,
                    "bench",
                    CheckOptions::default(),
                ));
                guard.complete_request(identity);
            }
        })
    });

    // 1000 unique identities (maximum diversity - best case)
    group.bench_function("1000_identities", |b| {
        let guard = TierGuard::new();
        let identities: Vec<_> = (0..1000).map(|i| format!("tenant-{}", i)).collect();

        b.iter(|| {
            for identity in &identities {
                black_box(guard.check_limit(
                    identity,
                    Tier::Admin,
                    "bench",
                    CheckOptions::default(),
                ));
                guard.complete_request(identity);
            }
        })
    });

    group.finish();
}

/// Benchmark cache store and lookup, both sides of the compression threshold
fn bench_cache_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    group.throughput(Throughput::Elements(1));

    let small = "a short generated answer".to_string();
    let large = "lorem ipsum dolor sit amet ".repeat(400);

    group.bench_function("set_small", |b| {
        let guard = TierGuard::new();
        let key = CacheKey::simple("bench", "small");

        b.iter(|| {
            guard.cache_set(
                black_box(key),
                black_box(&small),
                SetOptions::new("bench", "model-a", Tier::Agency),
            )
        })
    });

    group.bench_function("set_large_compressed", |b| {
        let guard = TierGuard::new();
        let key = CacheKey::simple("bench", "large");

        b.iter(|| {
            guard.cache_set(
                black_box(key),
                black_box(&large),
                SetOptions::new("bench", "model-a", Tier::Agency),
            )
        })
    });

    group.bench_function("get_small", |b| {
        let guard = TierGuard::new();
        let key = CacheKey::simple("bench", "small");
        guard.cache_set(key, &small, SetOptions::new("bench", "model-a", Tier::Agency));

        b.iter(|| black_box(guard.cache_get::<String>(black_box(key))))
    });

    group.bench_function("get_large_compressed", |b| {
        let guard = TierGuard::new();
        let key = CacheKey::simple("bench", "large");
        guard.cache_set(key, &large, SetOptions::new("bench", "model-a", Tier::Agency));

        b.iter(|| black_box(guard.cache_get::<String>(black_box(key))))
    });

    group.finish();
}

/// Benchmark per-identity state creation at scale
fn bench_registry_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_scaling");

    for num_identities in [100, 1000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("first_contact", num_identities),
            num_identities,
            |b, &num_identities| {
                b.iter(|| {
                    let guard = TierGuard::new();

                    for i in 0..num_identities {
                        let identity = format!("tenant-{}", i);
                        guard.check_limit(&identity, Tier::Starter, "bench", CheckOptions::default());
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_computation,
    bench_single_threaded_throughput,
    bench_concurrent_throughput,
    bench_identity_diversity,
    bench_cache_roundtrip,
    bench_registry_scaling,
);
criterion_main!(benches);
