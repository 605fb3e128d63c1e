use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kkt::{exact_multipliers, ConstraintValues, JacobianProvider, Loss, SolveOptions, Warn};

/// Dense synthetic jacobians; rows vary with the indices so the Gram
/// matrices stay well-conditioned across sizes.
struct DenseProvider {
    p: usize,
}

impl JacobianProvider<f64> for DenseProvider {
    fn num_parameters(&self) -> usize {
        1
    }

    fn parameter_len(&self, _parameter: usize) -> usize {
        self.p
    }

    fn loss_jacobian(&mut self, batch_index: usize, _parameter: usize) -> Option<Vec<f64>> {
        let shift = batch_index as f64;
        Some((0..self.p).map(|k| (0.1 * k as f64 + shift).sin()).collect())
    }

    fn constraint_jacobian(
        &mut self,
        batch_index: usize,
        constraint: usize,
        _parameter: usize,
    ) -> Option<Vec<f64>> {
        let shift = (batch_index + 3 * constraint) as f64;
        Some(
            (0..self.p)
                .map(|k| (0.07 * k as f64 + shift).cos() + if k == constraint { 1.0 } else { 0.0 })
                .collect(),
        )
    }
}

fn bench_exact_multipliers(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_multipliers");
    for (batch, constraints, p) in [(4, 2, 32), (16, 4, 128), (64, 8, 512)] {
        let loss = Loss::Batched((0..batch).map(|b| 0.5 + 0.01 * b as f64).collect());
        let g = ConstraintValues::Matrix(
            (0..batch)
                .map(|b| (0..constraints).map(|j| 0.1 * (b + j) as f64).collect())
                .collect(),
        );
        let options = SolveOptions {
            warn: Warn::Silent,
            ..Default::default()
        };

        let id = format!("{}x{}x{}", batch, constraints, p);
        group.bench_with_input(BenchmarkId::new("solve", &id), &p, |bench, &p| {
            let mut provider = DenseProvider { p };
            bench.iter(|| {
                black_box(
                    exact_multipliers(black_box(&loss), black_box(&g), &mut provider, &options)
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_exact_multipliers);
criterion_main!(benches);
