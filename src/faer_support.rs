//! faer adapters for the multiplier solver.
//!
//! Thin wrappers accepting `faer::Col<f64>` / `faer::Mat<f64>` and returning
//! multipliers in faer types.

use faer::{Col, Mat};

use crate::error::SolveError;
use crate::exact::{exact_multipliers, ConstraintValues, Loss, SolveOptions};
use crate::jacobian::JacobianProvider;
use crate::timing::SolveTimings;

/// Batched solve: `loss` holds one value per batch element, `constraints` is
/// `[batch, C]`. Multipliers come back as a `[batch, C]` matrix.
pub fn exact_multipliers_faer<J: JacobianProvider<f64>>(
    loss: &Col<f64>,
    constraints: &Mat<f64>,
    provider: &mut J,
    options: &SolveOptions,
) -> Result<(Mat<f64>, SolveTimings), SolveError> {
    let loss_vec: Vec<f64> = (0..loss.nrows()).map(|i| loss[i]).collect();
    let rows: Vec<Vec<f64>> = (0..constraints.nrows())
        .map(|i| {
            (0..constraints.ncols())
                .map(|j| constraints[(i, j)])
                .collect()
        })
        .collect();
    let sol = exact_multipliers(
        &Loss::Batched(loss_vec),
        &ConstraintValues::Matrix(rows),
        provider,
        options,
    )?;
    let m = match sol.multipliers {
        ConstraintValues::Matrix(m) => m,
        ConstraintValues::Vector(v) => v.into_iter().map(|x| vec![x]).collect(),
        ConstraintValues::Scalar(s) => vec![vec![s]],
    };
    let ncols = m.first().map_or(0, Vec::len);
    Ok((Mat::from_fn(m.len(), ncols, |i, j| m[i][j]), sol.timings))
}

/// Unbatched solve: scalar loss against a column of `C` residuals.
pub fn exact_multipliers_faer_unbatched<J: JacobianProvider<f64>>(
    loss: f64,
    constraints: &Col<f64>,
    provider: &mut J,
    options: &SolveOptions,
) -> Result<(Col<f64>, SolveTimings), SolveError> {
    let g: Vec<f64> = (0..constraints.nrows()).map(|i| constraints[i]).collect();
    let sol = exact_multipliers(
        &Loss::Scalar(loss),
        &ConstraintValues::Vector(g),
        provider,
        options,
    )?;
    let v = match sol.multipliers {
        ConstraintValues::Vector(v) => v,
        ConstraintValues::Scalar(s) => vec![s],
        ConstraintValues::Matrix(m) => m.into_iter().flatten().collect(),
    };
    Ok((Col::from_fn(v.len(), |i| v[i]), sol.timings))
}
