use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use discharge_core::{RawSample, RawSampleSeries, extract_model};

// Synthetic discharge: jittered sample times, sagging Voc, small noise
fn synth_series(n: usize, seed: u32) -> RawSampleSeries {
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    let mut t = 0.0;
    let samples = (0..n)
        .map(|i| {
            t += 10.0 + next_f64() * 0.2;
            let soc = 1.0 - i as f64 / n as f64;
            let voc = 3.0 + 1.2 * soc + (next_f64() - 0.5) * 1e-3;
            RawSample {
                t_s: t,
                voc,
                vload: voc - 0.075,
                esr: 0.15 + (next_f64() - 0.5) * 1e-3,
            }
        })
        .collect::<Vec<_>>();
    RawSampleSeries::try_from_samples(samples).expect("increasing timestamps")
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_model");
    for n in [101usize, 1_000, 100_000] {
        let raw = synth_series(n, 0xC0FFEE);
        group.bench_function(format!("n={n}"), |b| {
            b.iter_batched(
                || raw.clone(),
                |r| black_box(extract_model(&r).map(|m| m.capacity_ah)),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
