use num_traits::Float;

use crate::error::SolveError;

/// Reverse-mode differentiation backend for one forward evaluation.
///
/// The solver consumes derivatives through this seam rather than owning an
/// autodiff engine: implementors wrap whatever tape or graph produced the
/// loss and constraints, and answer per-parameter Jacobian queries for it.
/// Queries are made one batch element and one output at a time — the solver
/// never asks the backend to vectorize across the batch, which keeps
/// per-sample gradients exact. `batch_index` is always 0 for unbatched
/// solves.
///
/// A `None` return marks a parameter the queried output does not reach at
/// all. Whether that is an error or a block of zeros is the solver's call
/// (`allow_unused`), not the backend's.
///
/// Implementations must preserve any differentiable graph they hold, since
/// the multipliers themselves may need to be differentiated through.
pub trait JacobianProvider<F: Float> {
    /// Number of parameter tensors, in their fixed order.
    fn num_parameters(&self) -> usize;

    /// Flattened element count of parameter `parameter`.
    fn parameter_len(&self, parameter: usize) -> usize;

    /// `d loss[batch_index] / d theta_parameter`, flattened.
    fn loss_jacobian(&mut self, batch_index: usize, parameter: usize) -> Option<Vec<F>>;

    /// `d constraints[batch_index][constraint] / d theta_parameter`, flattened.
    fn constraint_jacobian(
        &mut self,
        batch_index: usize,
        constraint: usize,
        parameter: usize,
    ) -> Option<Vec<F>>;
}

/// Total flattened parameter count `P`.
pub(crate) fn total_parameter_len<F: Float, J: JacobianProvider<F>>(
    provider: &J,
) -> Result<usize, SolveError> {
    let count = provider.num_parameters();
    if count == 0 {
        return Err(SolveError::NoParameters);
    }
    Ok((0..count).map(|k| provider.parameter_len(k)).sum())
}

fn append_piece<F: Float>(
    row: &mut Vec<F>,
    piece: Option<Vec<F>>,
    expected: usize,
    parameter: usize,
    allow_unused: bool,
) -> Result<(), SolveError> {
    match piece {
        Some(jac) => {
            if jac.len() != expected {
                return Err(SolveError::ShapeMismatch {
                    what: "parameter jacobian length",
                    expected,
                    got: jac.len(),
                });
            }
            row.extend(jac);
        }
        None => {
            if !allow_unused {
                return Err(SolveError::UnusedParameter { parameter });
            }
            row.extend(std::iter::repeat(F::zero()).take(expected));
        }
    }
    Ok(())
}

/// Assemble one batch element's flattened loss-Jacobian row of width `P`:
/// per-parameter pieces, concatenated in parameter order.
pub(crate) fn loss_jacobian_row<F: Float, J: JacobianProvider<F>>(
    provider: &mut J,
    batch_index: usize,
    allow_unused: bool,
) -> Result<Vec<F>, SolveError> {
    let mut row = Vec::new();
    for k in 0..provider.num_parameters() {
        let expected = provider.parameter_len(k);
        let piece = provider.loss_jacobian(batch_index, k);
        append_piece(&mut row, piece, expected, k, allow_unused)?;
    }
    Ok(row)
}

/// Assemble one constraint's flattened Jacobian row, same layout as
/// [`loss_jacobian_row`].
pub(crate) fn constraint_jacobian_row<F: Float, J: JacobianProvider<F>>(
    provider: &mut J,
    batch_index: usize,
    constraint: usize,
    allow_unused: bool,
) -> Result<Vec<F>, SolveError> {
    let mut row = Vec::new();
    for k in 0..provider.num_parameters() {
        let expected = provider.parameter_len(k);
        let piece = provider.constraint_jacobian(batch_index, constraint, k);
        append_piece(&mut row, piece, expected, k, allow_unused)?;
    }
    Ok(row)
}
