// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use criterion::{criterion_group, criterion_main, Criterion};
use fluid_cursor::{FluidContext, Rgb, SimulationConfig, SoftwareBackend};

fn bench_step(c: &mut Criterion) {
    let config = SimulationConfig {
        sim_resolution: 64,
        dye_resolution: 128,
        pressure_iterations: 20,
        ..SimulationConfig::default()
    };
    let Ok(mut ctx) = FluidContext::new(SoftwareBackend::new(256, 256), config) else {
        return;
    };
    ctx.splat(0.5, 0.5, 500.0, -300.0, Rgb::new(1.0, 0.5, 0.2));

    c.bench_function("step_64x64", |b| b.iter(|| ctx.step(1.0 / 60.0)));
    c.bench_function("splat_64x64", |b| {
        b.iter(|| ctx.splat(0.3, 0.7, 100.0, 100.0, Rgb::new(0.2, 0.4, 0.9)))
    });
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
