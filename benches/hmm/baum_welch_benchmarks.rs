use criterion::{black_box, criterion_group, criterion_main, Criterion};
use discrete_hmm::hmm::{fit, forward, reestimate, BaumWelchConfig, HiddenMarkovModel};
use ndarray::array;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn truth() -> HiddenMarkovModel {
    HiddenMarkovModel::new(
        array![[0.9, 0.05, 0.05], [0.1, 0.8, 0.1], [0.05, 0.15, 0.8]],
        array![
            [0.6, 0.2, 0.1, 0.1],
            [0.1, 0.6, 0.2, 0.1],
            [0.1, 0.1, 0.2, 0.6]
        ],
        array![0.4, 0.3, 0.3],
    )
    .unwrap()
}

fn guess() -> HiddenMarkovModel {
    HiddenMarkovModel::new(
        array![[0.5, 0.25, 0.25], [0.25, 0.5, 0.25], [0.25, 0.25, 0.5]],
        array![
            [0.4, 0.2, 0.2, 0.2],
            [0.2, 0.4, 0.2, 0.2],
            [0.2, 0.2, 0.2, 0.4]
        ],
        array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    )
    .unwrap()
}

fn observations(len: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(44);
    truth().sample(len, &mut rng).unwrap().1
}

fn bench_forward(c: &mut Criterion) {
    let model = guess();
    let mut group = c.benchmark_group("forward");
    for &len in &[100usize, 400] {
        let obs = observations(len);
        group.bench_function(format!("forward_len_{len}"), |b| {
            b.iter(|| forward(black_box(&model), black_box(&obs)).unwrap())
        });
    }
    group.finish();
}

fn bench_reestimate(c: &mut Criterion) {
    let model = guess();
    let mut group = c.benchmark_group("reestimate");
    for &len in &[100usize, 400] {
        let obs = observations(len);
        for scaling in [false, true] {
            let config = BaumWelchConfig::new(1).with_scaling(scaling);
            group.bench_function(format!("em_step_len_{len}_scaled_{scaling}"), |b| {
                b.iter(|| reestimate(black_box(&model), black_box(&obs), &config).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let model = guess();
    let obs = observations(400);
    let config = BaumWelchConfig::new(50).with_scaling(true);
    c.bench_function("fit_50_iterations_len_400", |b| {
        b.iter(|| fit(black_box(&model), black_box(&obs), &config).unwrap())
    });
}

criterion_group!(benches, bench_forward, bench_reestimate, bench_fit);
criterion_main!(benches);
