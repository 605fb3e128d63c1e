use num_traits::Float;

/// Collapses the leading batch axis of a stack of equal-length vectors.
///
/// The reweighter applies the same map to the constraint residuals and,
/// column-wise, to the constraint Jacobian rows, which is the chain rule
/// exactly when the map is linear along the batch axis. A nonlinear
/// reduction would need its own Jacobian transport and is not supported
/// through this seam.
pub trait Reduction<F: Float> {
    /// Reduce `[batch][width]` to `[width]`.
    fn reduce(&self, stacked: &[Vec<F>]) -> Vec<F>;
}

/// Arithmetic mean along the batch axis.
pub struct Mean;

impl<F: Float> Reduction<F> for Mean {
    fn reduce(&self, stacked: &[Vec<F>]) -> Vec<F> {
        let mut out = Sum.reduce(stacked);
        let scale = F::from(stacked.len()).unwrap_or_else(F::one);
        for v in out.iter_mut() {
            *v = *v / scale;
        }
        out
    }
}

/// Sum along the batch axis.
pub struct Sum;

impl<F: Float> Reduction<F> for Sum {
    fn reduce(&self, stacked: &[Vec<F>]) -> Vec<F> {
        let width = stacked.first().map_or(0, Vec::len);
        let mut out = vec![F::zero(); width];
        for row in stacked {
            debug_assert_eq!(row.len(), width);
            for (o, &v) in out.iter_mut().zip(row) {
                *o = *o + v;
            }
        }
        out
    }
}
