use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keystone_di::prelude::*;
use std::sync::Arc;

/// Resolves `n` as `n - 1` plus one, down to zero
#[derive(Default)]
struct CountdownProvider;

impl Provider for CountdownProvider {
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        container: &Container,
    ) -> DiResult<Option<DependencyInstance>> {
        let n = match key.downcast_ref::<u32>() {
            Some(n) => *n,
            None => return Ok(None),
        };
        let value = if n == 0 {
            0
        } else {
            *container.get_as::<u32>(n - 1)? + 1
        };
        Ok(Some(DependencyInstance::transient(value)))
    }

    fn exists(&self, key: &DependencyKey) -> bool {
        key.is::<u32>()
    }

    fn clone_provider(&self, _keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>> {
        Ok(Arc::new(CountdownProvider))
    }
}

fn benchmark_cached_lookups(c: &mut Criterion) {
    let container = Container::new();
    container.add_singleton("config", "value".to_string()).unwrap();
    let scope = container.create_scope("request").unwrap();
    container.add_provider::<CountdownProvider>().unwrap();

    let mut group = c.benchmark_group("cached");
    group.bench_function("singleton_hit", |b| {
        b.iter(|| black_box(container.get("config").unwrap()))
    });
    group.bench_function("typed_singleton_hit", |b| {
        b.iter(|| black_box(container.get_as::<String>("config").unwrap()))
    });
    group.bench_function("reset_scope", |b| {
        b.iter(|| container.reset_scope(black_box(&scope)).unwrap())
    });
    group.finish();
}

fn benchmark_nested_resolution(c: &mut Criterion) {
    let container = Container::new();
    container.add_provider::<CountdownProvider>().unwrap();

    let mut group = c.benchmark_group("nested_transient");
    for depth in [1_u32, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, depth| {
            b.iter(|| black_box(container.get_as::<u32>(*depth).unwrap()))
        });
    }
    group.finish();
}

fn benchmark_clone(c: &mut Criterion) {
    let container = Container::new();
    container.add_provider::<CountdownProvider>().unwrap();
    let singletons: SingletonMap = (0..100_u32).map(|i| (i + 1000, i)).collect();
    container.add_singletons(singletons).unwrap();

    c.bench_function("clone_keep_singletons", |b| {
        b.iter(|| black_box(container.clone_container(true, false).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_cached_lookups,
    benchmark_nested_resolution,
    benchmark_clone
);
criterion_main!(benches);
