use std::fmt;

/// Sentinel recorded for the stage the untaken solve path skipped.
pub const SKIPPED: f64 = -999.0;

/// Named computation stages of one multiplier solve.
///
/// The string keys are fixed: training loops merge them verbatim into their
/// own per-iteration timing maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    ComputeLossJacobian,
    ComputeConstraintJacobian,
    ComputeGram,
    ComputePreMultipliers,
    Cholesky,
    CholeskySolve,
    LeastSquares,
    Errored,
}

impl Stage {
    /// Fixed external key for this stage.
    pub fn key(self) -> &'static str {
        match self {
            Stage::ComputeLossJacobian => "exact multipliers: compute loss jacobian",
            Stage::ComputeConstraintJacobian => "exact multipliers: compute constraint jacobian",
            Stage::ComputeGram => "exact multipliers: compute gram matrix",
            Stage::ComputePreMultipliers => "exact multipliers: compute pre-multipliers",
            Stage::Cholesky => "exact multipliers: cholesky",
            Stage::CholeskySolve => "exact multipliers: cholesky solve",
            Stage::LeastSquares => "exact multipliers: least squares",
            Stage::Errored => "exact multipliers: errored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-stage wall-clock seconds for one multiplier solve.
///
/// A fixed record rather than a string-keyed map: the stage set is closed.
/// Exactly one of `cholesky_solve` / `least_squares` holds [`SKIPPED`] per
/// solve, depending on which path ran; `cholesky` always holds the time spent
/// attempting the factorization, even when the attempt failed. `errored`
/// records whether the least-squares fallback ran.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveTimings {
    pub compute_loss_jacobian: f64,
    pub compute_constraint_jacobian: f64,
    pub compute_gram: f64,
    pub compute_pre_multipliers: f64,
    pub cholesky: f64,
    pub cholesky_solve: f64,
    pub least_squares: f64,
    pub errored: bool,
}

impl SolveTimings {
    /// Stage keys and elapsed seconds, in stage order, for merging into a
    /// caller-owned map. `errored` is a flag rather than a duration; read it
    /// from the field directly.
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            (Stage::ComputeLossJacobian.key(), self.compute_loss_jacobian),
            (
                Stage::ComputeConstraintJacobian.key(),
                self.compute_constraint_jacobian,
            ),
            (Stage::ComputeGram.key(), self.compute_gram),
            (Stage::ComputePreMultipliers.key(), self.compute_pre_multipliers),
            (Stage::Cholesky.key(), self.cholesky),
            (Stage::CholeskySolve.key(), self.cholesky_solve),
            (Stage::LeastSquares.key(), self.least_squares),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_keys_are_stable() {
        assert_eq!(
            Stage::ComputeLossJacobian.key(),
            "exact multipliers: compute loss jacobian"
        );
        assert_eq!(Stage::Cholesky.key(), "exact multipliers: cholesky");
        assert_eq!(Stage::CholeskySolve.key(), "exact multipliers: cholesky solve");
        assert_eq!(Stage::LeastSquares.key(), "exact multipliers: least squares");
        assert_eq!(Stage::Errored.key(), "exact multipliers: errored");
    }

    #[test]
    fn entries_cover_every_duration_stage_once() {
        let timings = SolveTimings {
            compute_loss_jacobian: 1.0,
            compute_constraint_jacobian: 2.0,
            compute_gram: 3.0,
            compute_pre_multipliers: 4.0,
            cholesky: 5.0,
            cholesky_solve: 6.0,
            least_squares: SKIPPED,
            errored: false,
        };
        let entries = timings.entries();
        assert_eq!(entries.len(), 7);
        let mut keys: Vec<&str> = entries.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 7, "duplicate stage key");
        assert_eq!(entries[6], (Stage::LeastSquares.key(), SKIPPED));
    }
}
