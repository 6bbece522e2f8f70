//! Benchmarks for attribute access through trait descriptors.
//!
//! Run with: cargo bench -p ctrait-core --bench attr_bench

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use ctrait_core::{
    DefaultValueKind, Host, HostClass, Notifier, TraitDescriptor, TraitKind, Validator, Value,
};

fn point_class() -> Rc<HostClass> {
    let x = TraitDescriptor::new(TraitKind::Trait);
    x.set_default(DefaultValueKind::Constant, Value::Int(0));
    x.set_validator(Some(Validator::int_range(Some(-1_000_000), Some(1_000_000))));
    let label = TraitDescriptor::new(TraitKind::Trait);
    label.set_default(DefaultValueKind::Constant, Value::str("origin"));
    HostClass::builder("Point")
        .trait_("x", x)
        .trait_("label", label)
        .build()
}

// =============================================================================
// Reads
// =============================================================================

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("attr/get");
    let class = point_class();

    let host = Host::alloc(&class).expect("alloc");
    host.set("x", 7).expect("set");
    group.bench_function("stored", |b| b.iter(|| black_box(host.get(black_box("x")))));

    group.bench_function("default_first_read", |b| {
        b.iter(|| {
            let fresh = Host::alloc(&class).expect("alloc");
            black_box(fresh.get("label"))
        })
    });

    group.finish();
}

// =============================================================================
// Writes
// =============================================================================

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("attr/set");
    let class = point_class();

    let host = Host::alloc(&class).expect("alloc");
    let mut n = 0_i64;
    group.bench_function("validated", |b| {
        b.iter(|| {
            n = (n + 1) % 1000;
            black_box(host.set("x", n))
        })
    });

    group.bench_function("unchanged", |b| b.iter(|| black_box(host.set("x", 5))));

    let observed = Host::alloc(&class).expect("alloc");
    let calls = Rc::new(Cell::new(0_u64));
    let sink = Rc::clone(&calls);
    observed.on_any_trait_change(Notifier::new(move |_| {
        sink.set(sink.get() + 1);
        Ok(())
    }));
    let mut m = 0_i64;
    group.bench_function("notified", |b| {
        b.iter(|| {
            m = (m + 1) % 1000;
            black_box(observed.set("x", m))
        })
    });

    let rejected = Host::alloc(&class).expect("alloc");
    group.bench_function("rejected", |b| {
        b.iter(|| black_box(rejected.set("x", Value::str("nope")).is_err()))
    });

    group.finish();
}

criterion_group!(benches, bench_get, bench_set);
criterion_main!(benches);
