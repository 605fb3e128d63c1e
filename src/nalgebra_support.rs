//! nalgebra adapters for the multiplier solver.
//!
//! Thin wrappers accepting `DVector<F>` / `DMatrix<F>` and returning
//! multipliers in nalgebra types.

use nalgebra::{DMatrix, DVector, Scalar};
use num_traits::Float;

use crate::error::SolveError;
use crate::exact::{exact_multipliers, ConstraintValues, Loss, SolveOptions};
use crate::jacobian::JacobianProvider;
use crate::timing::SolveTimings;

/// Batched solve: `loss` holds one value per batch element, `constraints` is
/// `[batch, C]`. Multipliers come back as a `[batch, C]` matrix.
pub fn exact_multipliers_nalgebra<F: Float + Scalar, J: JacobianProvider<F>>(
    loss: &DVector<F>,
    constraints: &DMatrix<F>,
    provider: &mut J,
    options: &SolveOptions,
) -> Result<(DMatrix<F>, SolveTimings), SolveError> {
    let loss_vec: Vec<F> = loss.as_slice().to_vec();
    let rows: Vec<Vec<F>> = (0..constraints.nrows())
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
    let nrows = m.len();
    let ncols = m.first().map_or(0, Vec::len);
    let flat: Vec<F> = m.into_iter().flatten().collect();
    Ok((DMatrix::from_row_slice(nrows, ncols, &flat), sol.timings))
}

/// Unbatched solve: scalar loss against a vector of `C` residuals.
pub fn exact_multipliers_nalgebra_unbatched<F: Float + Scalar, J: JacobianProvider<F>>(
    loss: F,
    constraints: &DVector<F>,
    provider: &mut J,
    options: &SolveOptions,
) -> Result<(DVector<F>, SolveTimings), SolveError> {
    let sol = exact_multipliers(
        &Loss::Scalar(loss),
        &ConstraintValues::Vector(constraints.as_slice().to_vec()),
        provider,
        options,
    )?;
    let v = match sol.multipliers {
        ConstraintValues::Vector(v) => v,
        ConstraintValues::Scalar(s) => vec![s],
        ConstraintValues::Matrix(m) => m.into_iter().flatten().collect(),
    };
    Ok((DVector::from_vec(v), sol.timings))
}
