//! Allocator benchmarks.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use segalloc::{Allocator, Config, FitPolicy, ListOrder, MmapHeap};

fn fresh(config: Config) -> Allocator<MmapHeap> {
  let mut allocator = Allocator::with_config(MmapHeap::new().unwrap(), config);
  allocator.init().unwrap();
  allocator
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
  let sizes: &[usize] = &[16, 64, 256, 1024, 4096, 32768];
  let mut group = c.benchmark_group("alloc_free_cycle");

  for &size in sizes {
    group.bench_with_input(BenchmarkId::new("segalloc", size), &size, |b, &sz| {
      let mut allocator = fresh(Config::default());
      b.iter(|| {
        let payload = allocator.allocate(black_box(sz)).unwrap().unwrap();
        allocator.free(payload).unwrap();
      });
    });
    group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &sz| {
      b.iter(|| {
        let v = vec![0u8; sz];
        black_box(v);
      });
    });
  }
  group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
  let mut group = c.benchmark_group("alloc_burst");

  group.bench_function("1000x64B", |b| {
    b.iter(|| {
      let mut allocator = fresh(Config::default());
      let payloads: Vec<_> = (0..1000)
        .map(|_| allocator.allocate(64).unwrap().unwrap())
        .collect();
      black_box(payloads);
    });
  });

  group.finish();
}

/// Frees every other block of a burst, then refills the holes.
fn bench_fragmented_refill(c: &mut Criterion) {
  let mut group = c.benchmark_group("fragmented_refill");

  for order in [ListOrder::AddressOrdered, ListOrder::Lifo] {
    for policy in [FitPolicy::FirstFit, FitPolicy::BestFit] {
      let config = Config::default().list_order(order).fit_policy(policy);
      let id = format!("{order:?}/{policy:?}");
      group.bench_function(BenchmarkId::from_parameter(id), |b| {
        b.iter(|| {
          let mut allocator = fresh(config);
          let payloads: Vec<_> = (0..512)
            .map(|i| allocator.allocate(16 + (i % 7) * 24).unwrap().unwrap())
            .collect();
          for payload in payloads.iter().step_by(2) {
            allocator.free(*payload).unwrap();
          }
          for i in 0..256 {
            black_box(allocator.allocate(8 + (i % 5) * 24).unwrap());
          }
        });
      });
    }
  }

  group.finish();
}

fn bench_resize_growth(c: &mut Criterion) {
  c.bench_function("resize_doubling", |b| {
    b.iter(|| {
      let mut allocator = fresh(Config::default());
      let mut payload = allocator.allocate(16).unwrap().unwrap();
      let mut size = 16;
      while size < 64 * 1024 {
        size *= 2;
        payload = allocator.resize(payload, size).unwrap().unwrap();
      }
      black_box(payload);
    });
  });
}

criterion_group!(
  benches,
  bench_alloc_free_cycle,
  bench_alloc_burst,
  bench_fragmented_refill,
  bench_resize_growth
);
criterion_main!(benches);
