//! Pipeline-level error types.

/// Errors that can abort the lattice estimation pipeline.
///
/// All failures are deterministic for a given numeric input; the core never
/// retries internally. Callers that hit [`LatticeError::LatticeNotFound`] may
/// re-run with a relaxed tolerance or more candidate spikes.
#[derive(Debug, Clone, PartialEq)]
pub enum LatticeError {
    /// Basis search exhausted its candidate spikes, or a structural sanity
    /// check on the spike set failed.
    LatticeNotFound {
        /// Number of candidate spikes available to the search.
        candidates: usize,
        /// Which check failed.
        reason: &'static str,
    },
    /// Reciprocal or direct unit cell has (near-)zero area; the dual basis
    /// is undefined.
    DegenerateLattice {
        /// Signed cell area (cross product of the first two basis vectors).
        area: f64,
    },
    /// Too few non-outlier harmonic samples to solve the shift system.
    InsufficientSamples {
        /// Required minimum number of samples.
        needed: usize,
        /// Number of samples that survived the outlier gate.
        got: usize,
    },
    /// Raw stack buffer length does not match the declared dimensions.
    BadStackShape {
        /// Expected sample count (`frames * nx * ny`).
        expected: usize,
        /// Provided sample count.
        got: usize,
    },
}

impl std::fmt::Display for LatticeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatticeNotFound { candidates, reason } => {
                write!(f, "lattice not found ({reason}; {candidates} candidate spikes)")
            }
            Self::DegenerateLattice { area } => {
                write!(f, "degenerate lattice: unit cell area {area:.3e}")
            }
            Self::InsufficientSamples { needed, got } => {
                write!(f, "insufficient harmonic samples: need {needed}, got {got}")
            }
            Self::BadStackShape { expected, got } => {
                write!(f, "bad stack shape: expected {expected} samples, got {got}")
            }
        }
    }
}

impl std::error::Error for LatticeError {}
