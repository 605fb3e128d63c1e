//! Exact Lagrange multipliers for equality-constrained training.
//!
//! Given a batch's loss, a vector of constraint residuals that should be
//! driven to zero, and a differentiation backend for the model parameters,
//! computes the multipliers
//!
//! ```text
//! multipliers = (J_g J_g^T)^{-1} (g - J_g J_f^T)
//! ```
//!
//! that project the loss gradient onto the constraint-satisfying subspace to
//! first order. The Gram matrix is Cholesky-factored, with a least-squares
//! fallback when the constraint Jacobian loses row rank; each stage of the
//! solve is wall-clock timed for diagnosing numerical failure.
//!
//! Automatic differentiation is not implemented here: callers supply a
//! [`JacobianProvider`] wrapping their own reverse-mode engine.
//!
//! ```
//! use kkt::{exact_multipliers, ConstraintValues, JacobianProvider, Loss, SolveOptions};
//!
//! // One parameter theta of width 1, evaluated at theta = 2:
//! // loss f = theta^2, constraint g = theta - 1.
//! struct Line;
//!
//! impl JacobianProvider<f64> for Line {
//!     fn num_parameters(&self) -> usize { 1 }
//!     fn parameter_len(&self, _: usize) -> usize { 1 }
//!     fn loss_jacobian(&mut self, _: usize, _: usize) -> Option<Vec<f64>> {
//!         Some(vec![4.0])
//!     }
//!     fn constraint_jacobian(&mut self, _: usize, _: usize, _: usize) -> Option<Vec<f64>> {
//!         Some(vec![1.0])
//!     }
//! }
//!
//! let sol = exact_multipliers(
//!     &Loss::Scalar(4.0),
//!     &ConstraintValues::Scalar(1.0),
//!     &mut Line,
//!     &SolveOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(sol.multipliers, ConstraintValues::Scalar(-3.0));
//! ```

pub mod constrain;
pub mod error;
pub mod exact;
pub mod jacobian;
pub mod linalg;
pub mod reduction;
pub mod timing;

#[cfg(feature = "faer")]
pub mod faer_support;
#[cfg(feature = "nalgebra")]
pub mod nalgebra_support;

pub use constrain::{constrain_loss, ConstrainedLoss, Method};
pub use error::{NotPositiveDefinite, SolveError};
pub use exact::{
    exact_multipliers, ConstraintValues, ExactSolution, Loss, SolveOptions, Warn,
};
pub use jacobian::JacobianProvider;
pub use reduction::{Mean, Reduction, Sum};
pub use timing::{SolveTimings, Stage, SKIPPED};
