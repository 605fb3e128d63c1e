use std::time::Instant;

use num_traits::Float;

use crate::error::{NotPositiveDefinite, SolveError};
use crate::jacobian::{
    constraint_jacobian_row, loss_jacobian_row, total_parameter_len, JacobianProvider,
};
use crate::linalg::{cholesky_back_solve, cholesky_factor, dot, lstsq_solve, CholeskyFactor};
use crate::timing::{SolveTimings, SKIPPED};

/// Scalar or per-batch-element training loss.
#[derive(Debug, Clone, PartialEq)]
pub enum Loss<F> {
    Scalar(F),
    Batched(Vec<F>),
}

/// Constraint residuals — or their multipliers — in the shape the caller
/// supplied them.
///
/// A `Vector` is ambiguous on its own and is resolved against the loss, the
/// same way a rank comparison resolves it in a tensor framework: paired with
/// a batched loss it is `[batch]` with one constraint per element; paired
/// with a scalar loss it is `[C]` unbatched. Multipliers always come back in
/// the variant the constraints went in as.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValues<F> {
    Scalar(F),
    Vector(Vec<F>),
    Matrix(Vec<Vec<F>>),
}

/// What to do when the Gram factorization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Warn {
    /// Fall back silently.
    Silent,
    /// Report the failure on stderr, then fall back.
    #[default]
    Report,
    /// Report, then surface the factorization failure instead of recovering.
    Strict,
}

/// Options for [`exact_multipliers`].
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Zero-fill Jacobian pieces for parameters the loss or constraints do
    /// not reach, instead of failing.
    pub allow_unused: bool,
    /// Fallback policy for rank-deficient constraint Gram matrices.
    pub warn: Warn,
}

/// Multipliers in the caller's constraint shape, plus per-stage timings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactSolution<F> {
    pub multipliers: ConstraintValues<F>,
    pub timings: SolveTimings,
}

/// Normalize `(loss, constraints)` to a dense `[batch][C]` residual block
/// with its matching `[batch]` loss, `batch = 1` for unbatched solves.
pub(crate) fn normalize<F: Float>(
    loss: &Loss<F>,
    constraints: &ConstraintValues<F>,
) -> Result<(Vec<F>, Vec<Vec<F>>), SolveError> {
    match (loss, constraints) {
        (Loss::Scalar(f), ConstraintValues::Scalar(g)) => Ok((vec![*f], vec![vec![*g]])),
        (Loss::Scalar(f), ConstraintValues::Vector(g)) => {
            if g.is_empty() {
                return Err(SolveError::ShapeMismatch {
                    what: "constraint count",
                    expected: 1,
                    got: 0,
                });
            }
            Ok((vec![*f], vec![g.clone()]))
        }
        (Loss::Scalar(_), ConstraintValues::Matrix(_)) => Err(SolveError::ShapeMismatch {
            what: "constraints rank against a scalar loss",
            expected: 1,
            got: 2,
        }),
        (Loss::Batched(f), _) if f.is_empty() => Err(SolveError::ShapeMismatch {
            what: "loss batch",
            expected: 1,
            got: 0,
        }),
        (Loss::Batched(f), ConstraintValues::Scalar(g)) => {
            if f.len() != 1 {
                return Err(SolveError::ShapeMismatch {
                    what: "constraints batch",
                    expected: f.len(),
                    got: 1,
                });
            }
            // A batch of one degenerates to the unbatched 1x1 system
            Ok((f.clone(), vec![vec![*g]]))
        }
        (Loss::Batched(f), ConstraintValues::Vector(g)) => {
            if g.len() != f.len() {
                return Err(SolveError::ShapeMismatch {
                    what: "constraints batch",
                    expected: f.len(),
                    got: g.len(),
                });
            }
            // One constraint per element: [batch] -> [batch][1]
            Ok((f.clone(), g.iter().map(|&v| vec![v]).collect()))
        }
        (Loss::Batched(f), ConstraintValues::Matrix(g)) => {
            if g.len() != f.len() {
                return Err(SolveError::ShapeMismatch {
                    what: "constraints batch",
                    expected: f.len(),
                    got: g.len(),
                });
            }
            let c = g[0].len();
            if c == 0 {
                return Err(SolveError::ShapeMismatch {
                    what: "constraint count",
                    expected: 1,
                    got: 0,
                });
            }
            for row in g {
                if row.len() != c {
                    return Err(SolveError::ShapeMismatch {
                        what: "constraint count",
                        expected: c,
                        got: row.len(),
                    });
                }
            }
            Ok((f.clone(), g.clone()))
        }
    }
}

/// Put a solved `[batch][C]` multiplier block back into the variant the
/// constraints arrived in.
fn reshape_like<F: Float>(original: &ConstraintValues<F>, m: Vec<Vec<F>>) -> ConstraintValues<F> {
    match original {
        ConstraintValues::Scalar(_) => ConstraintValues::Scalar(m[0][0]),
        ConstraintValues::Vector(_) => {
            if m.len() == 1 {
                // Unbatched [C] (or batch of one, where the two coincide)
                ConstraintValues::Vector(m.into_iter().next().unwrap_or_default())
            } else {
                // Batched with C = 1
                ConstraintValues::Vector(m.into_iter().map(|row| row[0]).collect())
            }
        }
        ConstraintValues::Matrix(_) => ConstraintValues::Matrix(m),
    }
}

/// Compute the exact Lagrange multipliers for an equality-constrained step.
///
/// Implements the closed-form stationarity condition for the
/// equality-constrained projection of the loss gradient:
///
/// ```text
/// multipliers = (J_g J_g^T)^{-1} (g - J_g J_f^T)
/// ```
///
/// where `f` is the loss, `g` the constraint residuals, and the Jacobians
/// are taken with respect to every parameter, flattened and concatenated.
/// The formula is exact only when `J_g` has full row rank; when the Gram
/// matrix `J_g J_g^T` fails its Cholesky factorization (linearly dependent
/// constraints, or a rank-deficient Jacobian early in training), the solver
/// reports the failure per `options.warn` and recovers with a per-element
/// least-squares solve — unless `Warn::Strict` asks for the factorization
/// failure itself.
///
/// Everything is recomputed from scratch per call; the returned timings
/// record the wall-clock seconds of each stage.
pub fn exact_multipliers<F: Float, J: JacobianProvider<F>>(
    loss: &Loss<F>,
    constraints: &ConstraintValues<F>,
    provider: &mut J,
    options: &SolveOptions,
) -> Result<ExactSolution<F>, SolveError> {
    let (_loss_values, g) = normalize(loss, constraints)?;
    let batch = g.len();
    let c_len = g[0].len();
    let p_len = total_parameter_len(provider)?;

    let mut timings = SolveTimings::default();

    // jac_fT: [batch][P], one flattened row per batch element
    let start = Instant::now();
    let mut jac_ft: Vec<Vec<F>> = Vec::with_capacity(batch);
    for b in 0..batch {
        let row = loss_jacobian_row(provider, b, options.allow_unused)?;
        debug_assert_eq!(row.len(), p_len);
        jac_ft.push(row);
    }
    timings.compute_loss_jacobian = start.elapsed().as_secs_f64();

    // jac_g: [batch][C][P]
    let start = Instant::now();
    let mut jac_g: Vec<Vec<Vec<F>>> = Vec::with_capacity(batch);
    for b in 0..batch {
        let mut rows = Vec::with_capacity(c_len);
        for c in 0..c_len {
            let row = constraint_jacobian_row(provider, b, c, options.allow_unused)?;
            debug_assert_eq!(row.len(), p_len);
            rows.push(row);
        }
        jac_g.push(rows);
    }
    timings.compute_constraint_jacobian = start.elapsed().as_secs_f64();

    // Gram matrix J_g J_g^T, per batch element
    let start = Instant::now();
    let gram: Vec<Vec<Vec<F>>> = jac_g
        .iter()
        .map(|rows| {
            (0..c_len)
                .map(|i| (0..c_len).map(|j| dot(&rows[i], &rows[j])).collect())
                .collect()
        })
        .collect();
    timings.compute_gram = start.elapsed().as_secs_f64();

    // Right-hand side g - J_g J_f^T, per batch element
    let start = Instant::now();
    let rhs: Vec<Vec<F>> = g
        .iter()
        .zip(jac_g.iter().zip(&jac_ft))
        .map(|(g_row, (j_rows, f_row))| {
            g_row
                .iter()
                .zip(j_rows)
                .map(|(&gv, j_row)| gv - dot(j_row, f_row))
                .collect()
        })
        .collect();
    timings.compute_pre_multipliers = start.elapsed().as_secs_f64();

    // Primary path: factor every batch element's Gram matrix. The attempt is
    // timed whether or not it succeeds.
    let start = Instant::now();
    let mut factors: Vec<CholeskyFactor<F>> = Vec::with_capacity(batch);
    let mut failure: Option<NotPositiveDefinite> = None;
    for matrix in &gram {
        match cholesky_factor(matrix) {
            Ok(factor) => factors.push(factor),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    timings.cholesky = start.elapsed().as_secs_f64();

    let multipliers: Vec<Vec<F>> = match failure {
        None => {
            let start = Instant::now();
            let m = factors
                .iter()
                .zip(&rhs)
                .map(|(factor, b)| cholesky_back_solve(factor, b))
                .collect();
            timings.cholesky_solve = start.elapsed().as_secs_f64();
            timings.least_squares = SKIPPED;
            timings.errored = false;
            m
        }
        Some(err) => {
            if options.warn != Warn::Silent {
                eprintln!("error occurred while computing constrained loss: {}", err);
                eprintln!(
                    "constraints are likely ill-conditioned (constraint jacobian is not \
                     full row rank at this point); falling back to a least-squares solve"
                );
            }
            if options.warn == Warn::Strict {
                return Err(SolveError::NotPositiveDefinite(err));
            }
            // The least-squares primitive is not batched; iterate per element
            let start = Instant::now();
            let m = gram
                .iter()
                .zip(&rhs)
                .map(|(matrix, b)| lstsq_solve(matrix, b))
                .collect();
            timings.least_squares = start.elapsed().as_secs_f64();
            timings.cholesky_solve = SKIPPED;
            timings.errored = true;
            m
        }
    };

    Ok(ExactSolution {
        multipliers: reshape_like(constraints, multipliers),
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One parameter of width 2; every jacobian row is a constant.
    struct Flat {
        loss_row: Vec<f64>,
        constraint_row: Vec<f64>,
    }

    impl JacobianProvider<f64> for Flat {
        fn num_parameters(&self) -> usize {
            1
        }

        fn parameter_len(&self, _parameter: usize) -> usize {
            self.loss_row.len()
        }

        fn loss_jacobian(&mut self, _batch_index: usize, _parameter: usize) -> Option<Vec<f64>> {
            Some(self.loss_row.clone())
        }

        fn constraint_jacobian(
            &mut self,
            _batch_index: usize,
            _constraint: usize,
            _parameter: usize,
        ) -> Option<Vec<f64>> {
            Some(self.constraint_row.clone())
        }
    }

    #[test]
    fn scalar_scalar_closed_form() {
        // f jacobian (4, 0), g jacobian (1, 0), g = 1:
        // gram = 1, rhs = 1 - 4 = -3
        let mut provider = Flat {
            loss_row: vec![4.0, 0.0],
            constraint_row: vec![1.0, 0.0],
        };
        let sol = exact_multipliers(
            &Loss::Scalar(4.0),
            &ConstraintValues::Scalar(1.0),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap();
        assert_eq!(sol.multipliers, ConstraintValues::Scalar(-3.0));
        assert!(!sol.timings.errored);
    }

    #[test]
    fn vector_against_batched_loss_means_one_constraint_per_element() {
        let mut provider = Flat {
            loss_row: vec![1.0, 0.0],
            constraint_row: vec![0.0, 2.0],
        };
        let sol = exact_multipliers(
            &Loss::Batched(vec![0.5, 0.25]),
            &ConstraintValues::Vector(vec![1.0, 2.0]),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap();
        // gram = 4 per element, rhs = g - 0
        match sol.multipliers {
            ConstraintValues::Vector(v) => {
                assert_eq!(v.len(), 2);
                assert!((v[0] - 0.25).abs() < 1e-12);
                assert!((v[1] - 0.5).abs() < 1e-12);
            }
            other => panic!("expected Vector, got {:?}", other),
        }
    }

    #[test]
    fn batch_of_one_scalar_constraints_degenerates_to_unbatched() {
        let mut provider = Flat {
            loss_row: vec![4.0, 0.0],
            constraint_row: vec![1.0, 0.0],
        };
        let sol = exact_multipliers(
            &Loss::Batched(vec![4.0]),
            &ConstraintValues::Scalar(1.0),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap();
        assert_eq!(sol.multipliers, ConstraintValues::Scalar(-3.0));
    }

    #[test]
    fn scalar_constraints_against_a_longer_batch_is_fatal() {
        let mut provider = Flat {
            loss_row: vec![1.0],
            constraint_row: vec![1.0],
        };
        let err = exact_multipliers(
            &Loss::Batched(vec![1.0, 2.0, 3.0]),
            &ConstraintValues::Scalar(1.0),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SolveError::ShapeMismatch {
                what: "constraints batch",
                expected: 3,
                got: 1,
            }
        );
    }

    #[test]
    fn batch_length_mismatch_is_fatal() {
        let mut provider = Flat {
            loss_row: vec![1.0],
            constraint_row: vec![1.0],
        };
        let err = exact_multipliers(
            &Loss::Batched(vec![1.0, 2.0, 3.0]),
            &ConstraintValues::Vector(vec![1.0, 2.0]),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SolveError::ShapeMismatch {
                what: "constraints batch",
                expected: 3,
                got: 2,
            }
        );
    }

    #[test]
    fn matrix_against_scalar_loss_is_fatal() {
        let mut provider = Flat {
            loss_row: vec![1.0],
            constraint_row: vec![1.0],
        };
        let err = exact_multipliers(
            &Loss::Scalar(1.0),
            &ConstraintValues::Matrix(vec![vec![1.0]]),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolveError::ShapeMismatch { .. }));
    }

    #[test]
    fn ragged_constraint_matrix_is_fatal() {
        let mut provider = Flat {
            loss_row: vec![1.0],
            constraint_row: vec![1.0],
        };
        let err = exact_multipliers(
            &Loss::Batched(vec![1.0, 2.0]),
            &ConstraintValues::Matrix(vec![vec![1.0, 2.0], vec![3.0]]),
            &mut provider,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SolveError::ShapeMismatch {
                what: "constraint count",
                expected: 2,
                got: 1,
            }
        );
    }

    struct NoParams;

    impl JacobianProvider<f64> for NoParams {
        fn num_parameters(&self) -> usize {
            0
        }

        fn parameter_len(&self, _parameter: usize) -> usize {
            0
        }

        fn loss_jacobian(&mut self, _batch_index: usize, _parameter: usize) -> Option<Vec<f64>> {
            None
        }

        fn constraint_jacobian(
            &mut self,
            _batch_index: usize,
            _constraint: usize,
            _parameter: usize,
        ) -> Option<Vec<f64>> {
            None
        }
    }

    #[test]
    fn empty_parameter_list_is_fatal() {
        let err = exact_multipliers(
            &Loss::Scalar(1.0),
            &ConstraintValues::Scalar(1.0),
            &mut NoParams,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, SolveError::NoParameters);
    }
}
