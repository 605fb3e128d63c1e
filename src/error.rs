use std::error::Error;
use std::fmt;

/// Diagnostics from a failed Cholesky factorization: the pivot that went
/// non-positive during elimination.
///
/// Strict-mode solves surface this value unwrapped, so callers see the
/// factorization's own failure rather than a translation of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotPositiveDefinite {
    /// Row/column of the Gram matrix at which elimination broke down.
    pub pivot: usize,
    /// Value of the failing pivot after elimination.
    pub value: f64,
}

impl fmt::Display for NotPositiveDefinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matrix is not positive-definite: pivot {} is {:e}",
            self.pivot, self.value
        )
    }
}

impl Error for NotPositiveDefinite {}

/// Errors surfaced by the multiplier solver and the loss reweighter.
///
/// Only `NotPositiveDefinite` is ever recovered internally (via the
/// least-squares fallback); every other condition is fatal to the call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The constraint Gram matrix could not be Cholesky-factored and the
    /// caller requested strict failure instead of the fallback.
    NotPositiveDefinite(NotPositiveDefinite),
    /// Inconsistent batch / constraint / parameter dimensions.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// A parameter received no gradient contribution and `allow_unused`
    /// was not set.
    UnusedParameter { parameter: usize },
    /// The parameter list is empty.
    NoParameters,
    /// Unrecognized reweighting method name.
    UnknownMethod(String),
    /// `Method::Reduction` was selected without supplying a reduction.
    MissingReduction,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::NotPositiveDefinite(e) => {
                write!(f, "cholesky factorization failed: {}", e)
            }
            SolveError::ShapeMismatch {
                what,
                expected,
                got,
            } => write!(f, "shape mismatch: {} should be {}, got {}", what, expected, got),
            SolveError::UnusedParameter { parameter } => write!(
                f,
                "parameter {} received no gradient (set allow_unused to zero-fill)",
                parameter
            ),
            SolveError::NoParameters => write!(f, "parameter list is empty"),
            SolveError::UnknownMethod(name) => {
                write!(f, "method {:?} not known, please respecify", name)
            }
            SolveError::MissingReduction => {
                write!(f, "a reduction must be supplied when method is \"reduction\"")
            }
        }
    }
}

impl Error for SolveError {}

impl From<NotPositiveDefinite> for SolveError {
    fn from(e: NotPositiveDefinite) -> Self {
        SolveError::NotPositiveDefinite(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_pivot() {
        let e = NotPositiveDefinite {
            pivot: 1,
            value: -2.5e-3,
        };
        let msg = e.to_string();
        assert!(msg.contains("pivot 1"), "{}", msg);
        assert!(msg.contains("not positive-definite"), "{}", msg);
    }

    #[test]
    fn solve_error_wraps_factorization_failure() {
        let inner = NotPositiveDefinite {
            pivot: 0,
            value: 0.0,
        };
        let e: SolveError = inner.into();
        assert_eq!(e, SolveError::NotPositiveDefinite(inner));
    }

    #[test]
    fn unknown_method_message_quotes_the_name() {
        let e = SolveError::UnknownMethod("hard-constrained".to_string());
        assert!(e.to_string().contains("\"hard-constrained\""));
    }
}
