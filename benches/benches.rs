use iq_slurper::{
    complex::ComplexFloat,
    dc_block::{remove_dc, DEFAULT_ALPHA},
    f_engine::{kaiser_window, stft, WindowSpec},
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    // 10 ms at 20 Msps
    let samples: Vec<ComplexFloat> = (0..200_000)
        .map(|_| ComplexFloat::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    let spec = WindowSpec::derive(74.0, 25e3, 20e6).unwrap();

    c.bench_function("dc block", |b| {
        b.iter(|| remove_dc(black_box(&samples), black_box(DEFAULT_ALPHA)))
    });

    c.bench_function("kaiser window", |b| {
        b.iter(|| kaiser_window(black_box(spec.n_fft), black_box(spec.beta)))
    });

    c.bench_function("stft", |b| {
        b.iter(|| {
            stft(
                black_box(&samples),
                black_box(&spec),
                black_box(20e6),
                black_box(2.44e9),
            )
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
