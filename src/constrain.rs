use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use num_traits::Float;

use crate::error::SolveError;
use crate::exact::{
    exact_multipliers, normalize, ConstraintValues, Loss, SolveOptions,
};
use crate::jacobian::JacobianProvider;
use crate::linalg::dot;
use crate::reduction::Reduction;
use crate::timing::SolveTimings;

/// Constraint-handling method for [`constrain_loss`].
///
/// A closed enumeration: the string forms exist only for configuration
/// parsing, and an unrecognized name fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    /// Average (along the batch) of the per-element constrained update.
    Constrained,
    /// Constrained update of the mean loss with respect to every constraint
    /// in the batch at once: one multiplier set for the whole batch.
    Batchwise,
    /// Reduce the constraints along the batch axis before solving. Requires
    /// a [`Reduction`].
    Reduction,
    /// Quadratic penalty with closed-form multipliers; no solver call.
    SoftConstrained,
    /// Ignore the constraints entirely. Control condition.
    Unconstrained,
    /// Ignore the loss entirely and only satisfy the constraints.
    /// Debugging only.
    NoLoss,
    /// The sum of `NoLoss` and `Unconstrained`. Destroys the exponential
    /// convergence guarantee; debugging only.
    NonProjecting,
}

impl Method {
    fn name(self) -> &'static str {
        match self {
            Method::Constrained => "constrained",
            Method::Batchwise => "batchwise",
            Method::Reduction => "reduction",
            Method::SoftConstrained => "soft-constrained",
            Method::Unconstrained => "unconstrained",
            Method::NoLoss => "no-loss",
            Method::NonProjecting => "non-projecting",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, SolveError> {
        match s {
            "constrained" => Ok(Method::Constrained),
            "batchwise" => Ok(Method::Batchwise),
            "reduction" => Ok(Method::Reduction),
            "soft-constrained" => Ok(Method::SoftConstrained),
            "unconstrained" => Ok(Method::Unconstrained),
            "no-loss" => Ok(Method::NoLoss),
            "non-projecting" => Ok(Method::NonProjecting),
            other => Err(SolveError::UnknownMethod(other.to_string())),
        }
    }
}

/// Output of [`constrain_loss`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedLoss<F> {
    /// The reweighted scalar loss to step the optimizer with.
    pub loss: F,
    /// Multipliers in the caller's constraint shape (zero for
    /// `Unconstrained`, closed-form for `SoftConstrained`).
    pub multipliers: ConstraintValues<F>,
    /// Reduced residuals for `Method::Reduction`; a single zero otherwise.
    pub reduced: Vec<F>,
    /// Solver timings for the methods that called the solver.
    pub timings: Option<SolveTimings>,
}

/// Mean over the batch of a parameter's per-element loss Jacobians.
/// `None` only when no element reaches the parameter.
fn mean_loss_jacobian<F: Float, J: JacobianProvider<F>>(
    inner: &mut J,
    batch: usize,
    parameter: usize,
) -> Option<Vec<F>> {
    let len = inner.parameter_len(parameter);
    let mut acc = vec![F::zero(); len];
    let mut used = false;
    for b in 0..batch {
        if let Some(jac) = inner.loss_jacobian(b, parameter) {
            used = true;
            for (a, v) in acc.iter_mut().zip(jac) {
                *a = *a + v;
            }
        }
    }
    if !used {
        return None;
    }
    let scale = F::from(batch).unwrap_or_else(F::one);
    Some(acc.into_iter().map(|a| a / scale).collect())
}

/// Presents the batch-mean loss and the flattened `[batch * C]` constraint
/// set as one unbatched system.
struct BatchwiseProvider<'a, F: Float, J: JacobianProvider<F>> {
    inner: &'a mut J,
    batch: usize,
    per_element: usize,
    _marker: PhantomData<F>,
}

impl<'a, F: Float, J: JacobianProvider<F>> JacobianProvider<F> for BatchwiseProvider<'a, F, J> {
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn parameter_len(&self, parameter: usize) -> usize {
        self.inner.parameter_len(parameter)
    }

    fn loss_jacobian(&mut self, _batch_index: usize, parameter: usize) -> Option<Vec<F>> {
        mean_loss_jacobian(self.inner, self.batch, parameter)
    }

    fn constraint_jacobian(
        &mut self,
        _batch_index: usize,
        constraint: usize,
        parameter: usize,
    ) -> Option<Vec<F>> {
        let b = constraint / self.per_element;
        let c = constraint % self.per_element;
        self.inner.constraint_jacobian(b, c, parameter)
    }
}

/// Presents batch-reduced constraints against the batch-mean loss.
struct ReducedProvider<'a, F: Float, J: JacobianProvider<F>> {
    inner: &'a mut J,
    batch: usize,
    reduction: &'a dyn Reduction<F>,
    _marker: PhantomData<F>,
}

impl<'a, F: Float, J: JacobianProvider<F>> JacobianProvider<F> for ReducedProvider<'a, F, J> {
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn parameter_len(&self, parameter: usize) -> usize {
        self.inner.parameter_len(parameter)
    }

    fn loss_jacobian(&mut self, _batch_index: usize, parameter: usize) -> Option<Vec<F>> {
        mean_loss_jacobian(self.inner, self.batch, parameter)
    }

    fn constraint_jacobian(
        &mut self,
        _batch_index: usize,
        constraint: usize,
        parameter: usize,
    ) -> Option<Vec<F>> {
        let len = self.inner.parameter_len(parameter);
        let mut rows = Vec::with_capacity(self.batch);
        let mut used = false;
        for b in 0..self.batch {
            match self.inner.constraint_jacobian(b, constraint, parameter) {
                Some(jac) => {
                    used = true;
                    rows.push(jac);
                }
                None => rows.push(vec![F::zero(); len]),
            }
        }
        if !used {
            return None;
        }
        Some(self.reduction.reduce(&rows))
    }
}

/// Replaces the loss Jacobian with zeros, leaving the constraints intact.
struct ZeroLossProvider<'a, F: Float, J: JacobianProvider<F>> {
    inner: &'a mut J,
    _marker: PhantomData<F>,
}

impl<'a, F: Float, J: JacobianProvider<F>> JacobianProvider<F> for ZeroLossProvider<'a, F, J> {
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn parameter_len(&self, parameter: usize) -> usize {
        self.inner.parameter_len(parameter)
    }

    fn loss_jacobian(&mut self, _batch_index: usize, parameter: usize) -> Option<Vec<F>> {
        Some(vec![F::zero(); self.inner.parameter_len(parameter)])
    }

    fn constraint_jacobian(
        &mut self,
        batch_index: usize,
        constraint: usize,
        parameter: usize,
    ) -> Option<Vec<F>> {
        self.inner.constraint_jacobian(batch_index, constraint, parameter)
    }
}

fn constraint_rows<F: Float>(
    constraints: &ConstraintValues<F>,
    loss: &[F],
) -> Result<Vec<Vec<F>>, SolveError> {
    normalize(&Loss::Batched(loss.to_vec()), constraints).map(|(_, g)| g)
}

fn flatten<F: Float>(values: ConstraintValues<F>) -> Vec<F> {
    match values {
        ConstraintValues::Scalar(s) => vec![s],
        ConstraintValues::Vector(v) => v,
        ConstraintValues::Matrix(rows) => rows.into_iter().flatten().collect(),
    }
}

fn map_values<F: Float>(
    values: &ConstraintValues<F>,
    f: impl Fn(F) -> F,
) -> ConstraintValues<F> {
    match values {
        ConstraintValues::Scalar(s) => ConstraintValues::Scalar(f(*s)),
        ConstraintValues::Vector(v) => {
            ConstraintValues::Vector(v.iter().map(|&x| f(x)).collect())
        }
        ConstraintValues::Matrix(rows) => ConstraintValues::Matrix(
            rows.iter()
                .map(|row| row.iter().map(|&x| f(x)).collect())
                .collect(),
        ),
    }
}

/// Reshape a flat `[batch * C]` multiplier vector into the variant the
/// constraints arrived in.
fn shaped_like<F: Float>(
    original: &ConstraintValues<F>,
    flat: &[F],
    per_element: usize,
) -> ConstraintValues<F> {
    match original {
        ConstraintValues::Scalar(_) => ConstraintValues::Scalar(flat[0]),
        ConstraintValues::Vector(_) => ConstraintValues::Vector(flat.to_vec()),
        ConstraintValues::Matrix(_) => ConstraintValues::Matrix(
            flat.chunks(per_element).map(|chunk| chunk.to_vec()).collect(),
        ),
    }
}

/// Reweight a batch's loss against its constraint residuals.
///
/// `loss` is the per-element loss for the batch; `constraints` the matching
/// residuals. The selected [`Method`] decides how — or whether — the exact
/// multiplier solver runs; see the variant docs. Methods that solve return
/// the solver's stage timings for the caller's iteration record.
pub fn constrain_loss<F: Float, J: JacobianProvider<F>>(
    loss: &[F],
    constraints: &ConstraintValues<F>,
    provider: &mut J,
    method: Method,
    reduction: Option<&dyn Reduction<F>>,
    options: &SolveOptions,
) -> Result<ConstrainedLoss<F>, SolveError> {
    if loss.is_empty() {
        return Err(SolveError::ShapeMismatch {
            what: "loss batch",
            expected: 1,
            got: 0,
        });
    }
    let batch = loss.len();
    let batch_f = F::from(batch).unwrap_or_else(F::one);
    let mean_loss = loss.iter().fold(F::zero(), |acc, &v| acc + v) / batch_f;

    match method {
        Method::Constrained => {
            let g = constraint_rows(constraints, loss)?;
            let sol =
                exact_multipliers(&Loss::Batched(loss.to_vec()), constraints, provider, options)?;
            let lam = constraint_rows(&sol.multipliers, loss)?;
            let mut total = F::zero();
            for b in 0..batch {
                total = total + loss[b] + dot(&lam[b], &g[b]);
            }
            Ok(ConstrainedLoss {
                loss: total / batch_f,
                multipliers: sol.multipliers,
                reduced: vec![F::zero()],
                timings: Some(sol.timings),
            })
        }
        Method::Batchwise => {
            let g = constraint_rows(constraints, loss)?;
            let per_element = g[0].len();
            let flat: Vec<F> = g.iter().flat_map(|row| row.iter().copied()).collect();
            let mut adapter = BatchwiseProvider {
                inner: provider,
                batch,
                per_element,
                _marker: PhantomData,
            };
            let sol = exact_multipliers(
                &Loss::Scalar(mean_loss),
                &ConstraintValues::Vector(flat.clone()),
                &mut adapter,
                options,
            )?;
            let lam = flatten(sol.multipliers);
            let value = mean_loss + dot(&lam, &flat);
            Ok(ConstrainedLoss {
                loss: value,
                multipliers: shaped_like(constraints, &lam, per_element),
                reduced: vec![F::zero()],
                timings: Some(sol.timings),
            })
        }
        Method::Reduction => {
            let reduction = reduction.ok_or(SolveError::MissingReduction)?;
            let g = constraint_rows(constraints, loss)?;
            let reduced = reduction.reduce(&g);
            if reduced.is_empty() {
                return Err(SolveError::ShapeMismatch {
                    what: "reduced constraint count",
                    expected: 1,
                    got: 0,
                });
            }
            let mut adapter = ReducedProvider {
                inner: provider,
                batch,
                reduction,
                _marker: PhantomData,
            };
            let sol = exact_multipliers(
                &Loss::Scalar(mean_loss),
                &ConstraintValues::Vector(reduced.clone()),
                &mut adapter,
                options,
            )?;
            let lam = flatten(sol.multipliers);
            let value = mean_loss + dot(&lam, &reduced);
            Ok(ConstrainedLoss {
                loss: value,
                multipliers: ConstraintValues::Vector(lam),
                reduced,
                timings: Some(sol.timings),
            })
        }
        Method::SoftConstrained => {
            let g = constraint_rows(constraints, loss)?;
            let numel = F::from(batch * g[0].len()).unwrap_or_else(F::one);
            let multipliers = map_values(constraints, |v| v / numel);
            let mut penalty = F::zero();
            for row in &g {
                for &v in row {
                    penalty = penalty + v * v;
                }
            }
            Ok(ConstrainedLoss {
                loss: mean_loss + penalty / numel,
                multipliers,
                reduced: vec![F::zero()],
                timings: None,
            })
        }
        Method::Unconstrained => {
            // Technically the multipliers are zero; returned for consistency
            let multipliers = map_values(constraints, |_| F::zero());
            Ok(ConstrainedLoss {
                loss: mean_loss,
                multipliers,
                reduced: vec![F::zero()],
                timings: None,
            })
        }
        Method::NoLoss | Method::NonProjecting => {
            let g = constraint_rows(constraints, loss)?;
            let zeros = vec![F::zero(); batch];
            let mut adapter = ZeroLossProvider {
                inner: provider,
                _marker: PhantomData,
            };
            let sol = exact_multipliers(&Loss::Batched(zeros), constraints, &mut adapter, options)?;
            let lam = constraint_rows(&sol.multipliers, loss)?;
            let mut total = F::zero();
            for b in 0..batch {
                let correction = dot(&lam[b], &g[b]);
                total = total
                    + if method == Method::NoLoss {
                        correction
                    } else {
                        loss[b] + correction
                    };
            }
            Ok(ConstrainedLoss {
                loss: total / batch_f,
                multipliers: sol.multipliers,
                reduced: vec![F::zero()],
                timings: Some(sol.timings),
            })
        }
    }
}
