//! Criterion benchmarks for feature resolution and model matching.
//!
//! Both run on every backend initialization and every feature refresh, so they
//! must stay well below a millisecond.
//!
//! Run with:
//! ```bash
//! cargo bench --package printfleet-core --bench resolve_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use printfleet_core::{
    resolve, resolve_backend_kind, validate_overrides, BackendKind, Capability,
    CapabilityOverrides, HardwareProbe, OverrideSetting,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn full_probe() -> HardwareProbe {
    HardwareProbe::new()
        .with(Capability::Camera, true)
        .with(Capability::Led, true)
        .with(Capability::MaterialMultiplexing, true)
        .with_camera_url("http://192.168.1.50:8080/?action=stream")
}

fn mixed_overrides() -> CapabilityOverrides {
    CapabilityOverrides::new()
        .with(
            Capability::Camera,
            OverrideSetting::CustomUrl {
                url: "http://192.168.1.60:8080/stream".to_string(),
            },
        )
        .with(Capability::Led, OverrideSetting::ForceOn)
        .with(Capability::Filtration, OverrideSetting::ForceOn)
        .with(Capability::StatusMonitoring, OverrideSetting::ForceOff)
}

// ── Benchmarks: resolve ───────────────────────────────────────────────────────

fn bench_resolve_per_backend(c: &mut Criterion) {
    let probe = full_probe();
    let overrides = mixed_overrides();
    let mut group = c.benchmark_group("resolve");

    for kind in [
        BackendKind::GenericLegacy,
        BackendKind::Adventurer5M,
        BackendKind::Adventurer5MPro,
        BackendKind::Ad5x,
    ] {
        let base = kind.base_capabilities();
        group.bench_with_input(BenchmarkId::new("backend", kind.display_name()), &base, |b, base| {
            b.iter(|| resolve(black_box(base), black_box(&probe), black_box(&overrides)))
        });
    }

    group.finish();
}

fn bench_validate_overrides(c: &mut Criterion) {
    let base = BackendKind::GenericLegacy.base_capabilities();
    let overrides = mixed_overrides();

    c.bench_function("validate_overrides/generic_legacy", |b| {
        b.iter(|| validate_overrides(black_box(&base), black_box(&overrides)))
    });
}

// ── Benchmarks: model resolution ──────────────────────────────────────────────

fn bench_resolve_backend_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_backend_kind");

    // First rule vs. fallback: the fallback walks the whole table.
    for model in ["FlashForge Adventurer 5M Pro", "AD5X", "Creator Pro 2"] {
        group.bench_with_input(BenchmarkId::new("model", model), &model, |b, &model| {
            b.iter(|| resolve_backend_kind(black_box(Some(model))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_resolve_per_backend,
    bench_validate_overrides,
    bench_resolve_backend_kind,
);
criterion_main!(benches);
