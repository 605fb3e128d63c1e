use num_traits::Float;

use crate::error::NotPositiveDefinite;

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
#[derive(Debug)]
pub struct CholeskyFactor<F> {
    l: Vec<Vec<F>>,
    n: usize,
}

/// Factorize a symmetric `n x n` matrix as `L * L^T`.
///
/// Failure is a first-class outcome, not an exception: a non-positive pivot
/// means the matrix is not positive-definite (for a constraint Gram matrix,
/// that the constraint Jacobian has lost row rank), and the returned error
/// carries the pivot that broke down so strict-mode callers can surface it.
// Explicit indexing is clearer for the row-oriented elimination order
#[allow(clippy::needless_range_loop)]
pub fn cholesky_factor<F: Float>(a: &[Vec<F>]) -> Result<CholeskyFactor<F>, NotPositiveDefinite> {
    let n = a.len();
    debug_assert!(a.iter().all(|row| row.len() == n));

    let eps = F::from(1e-12).unwrap_or_else(F::epsilon);
    let mut l = vec![vec![F::zero(); n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum = sum - l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= eps {
                    return Err(NotPositiveDefinite {
                        pivot: i,
                        value: sum.to_f64().unwrap_or(f64::NAN),
                    });
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    Ok(CholeskyFactor { l, n })
}

/// Solve `A * x = b` using a pre-computed Cholesky factorization.
///
/// This avoids re-factorizing when solving multiple right-hand sides
/// against the same matrix.
pub fn cholesky_back_solve<F: Float>(factor: &CholeskyFactor<F>, b: &[F]) -> Vec<F> {
    let n = factor.n;
    debug_assert_eq!(b.len(), n);

    // Forward substitution (L * y = b)
    let mut y = vec![F::zero(); n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum = sum - factor.l[i][j] * y[j];
        }
        y[i] = sum / factor.l[i][i];
    }

    // Back substitution (L^T * x = y)
    let mut x = vec![F::zero(); n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum = sum - factor.l[j][i] * x[j];
        }
        x[i] = sum / factor.l[i][i];
    }

    x
}

/// Solve `A * x = b` for symmetric positive-definite `A` via Cholesky.
pub fn cholesky_solve<F: Float>(
    a: &[Vec<F>],
    b: &[F],
) -> Result<Vec<F>, NotPositiveDefinite> {
    let factor = cholesky_factor(a)?;
    Ok(cholesky_back_solve(&factor, b))
}

/// Solve `A * x = b` in the least-squares sense via column-pivoted
/// Householder QR with numerical-rank truncation.
///
/// Never fails: a rank-deficient `A` yields a finite basic solution with the
/// out-of-rank coordinates set to zero. This is the fallback for Gram
/// matrices that Cholesky rejects.
// Explicit indexing is clearer for pivoted QR: row/col indices drive the
// pivot search, the reflections, and the back substitution
#[allow(clippy::needless_range_loop)]
pub fn lstsq_solve<F: Float>(a: &[Vec<F>], b: &[F]) -> Vec<F> {
    let m = a.len();
    debug_assert_eq!(b.len(), m);
    let n = if m > 0 { a[0].len() } else { 0 };
    if n == 0 {
        return vec![];
    }

    let mut r: Vec<Vec<F>> = a.to_vec();
    let mut qtb: Vec<F> = b.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();
    let kmax = m.min(n);

    for k in 0..kmax {
        // Pivot on the column with the largest remaining norm
        let mut best = k;
        let mut best_norm = F::zero();
        for j in k..n {
            let mut s = F::zero();
            for i in k..m {
                s = s + r[i][j] * r[i][j];
            }
            if s > best_norm {
                best_norm = s;
                best = j;
            }
        }
        if best != k {
            for row in r.iter_mut() {
                row.swap(k, best);
            }
            perm.swap(k, best);
        }

        // Householder reflection zeroing column k below the diagonal
        let mut norm_sq = F::zero();
        for i in k..m {
            norm_sq = norm_sq + r[i][k] * r[i][k];
        }
        let norm = norm_sq.sqrt();
        if norm == F::zero() {
            continue;
        }
        let alpha = if r[k][k] > F::zero() {
            F::zero() - norm
        } else {
            norm
        };
        let mut v: Vec<F> = (k..m).map(|i| r[i][k]).collect();
        v[0] = v[0] - alpha;
        let mut v_norm_sq = F::zero();
        for &vi in &v {
            v_norm_sq = v_norm_sq + vi * vi;
        }
        if v_norm_sq == F::zero() {
            continue;
        }

        // Apply (I - 2 v v^T / ||v||^2) to the remaining columns and to b
        for j in (k + 1)..n {
            let mut dot = F::zero();
            for (t, i) in (k..m).enumerate() {
                dot = dot + v[t] * r[i][j];
            }
            let scale = (dot + dot) / v_norm_sq;
            for (t, i) in (k..m).enumerate() {
                r[i][j] = r[i][j] - scale * v[t];
            }
        }
        let mut dot = F::zero();
        for (t, i) in (k..m).enumerate() {
            dot = dot + v[t] * qtb[i];
        }
        let scale = (dot + dot) / v_norm_sq;
        for (t, i) in (k..m).enumerate() {
            qtb[i] = qtb[i] - scale * v[t];
        }
        r[k][k] = alpha;
        for i in (k + 1)..m {
            r[i][k] = F::zero();
        }
    }

    // Numerical rank: diagonal entries above a tolerance relative to the
    // largest (pivoting makes the diagonal roughly non-increasing)
    let tol = F::from(1e-10).unwrap_or_else(F::epsilon);
    let leading = r[0][0].abs();
    let cutoff = if leading > F::zero() { leading * tol } else { tol };
    let mut rank = 0;
    for k in 0..kmax {
        if r[k][k].abs() > cutoff {
            rank = k + 1;
        } else {
            break;
        }
    }

    // Back-substitute over the leading rank x rank block; the rest stays zero
    let mut y = vec![F::zero(); n];
    for i in (0..rank).rev() {
        let mut sum = qtb[i];
        for j in (i + 1)..rank {
            sum = sum - r[i][j] * y[j];
        }
        y[i] = sum / r[i][i];
    }

    // Undo the column permutation
    let mut x = vec![F::zero(); n];
    for (j, &p) in perm.iter().enumerate() {
        x[p] = y[j];
    }
    x
}

/// Compute the dot product of two vectors.
pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    let mut s = F::zero();
    for i in 0..a.len() {
        s = s + a[i] * b[i];
    }
    s
}
