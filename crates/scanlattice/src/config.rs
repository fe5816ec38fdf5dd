//! Estimation pipeline configuration.

use serde::{Deserialize, Serialize};

/// Controls for the offset (absolute lattice reference) estimation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetParams {
    /// Border width (pixels) of the averaged window that is zeroed before
    /// peak search, to avoid edge-biased maxima.
    pub border: usize,
    /// Minimum distance (pixels) of an accepted window maximum from the
    /// window edge.
    pub interior_margin: usize,
    /// Gaussian sigma applied when the window maximum sits on the border.
    pub smoothing_sigma: f64,
    /// Upper bound on smoothing passes; keeps the peak search terminating
    /// on pathological windows.
    pub max_smoothing_passes: usize,
}

impl Default for OffsetParams {
    fn default() -> Self {
        Self {
            border: 2,
            interior_margin: 3,
            smoothing_sigma: 2.0,
            max_smoothing_passes: 16,
        }
    }
}

/// Top-level lattice estimation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    /// Exclusion half-width (pixels) around each extracted Fourier spike.
    pub extent: usize,
    /// Number of candidate spikes to extract from the filtered spectrum.
    pub num_spikes: usize,
    /// Maximum distance (pixels) between a predicted harmonic position and
    /// an observed spike to count as a match.
    pub tolerance: f64,
    /// Cap on the combinatorial harmonic order explored by the basis
    /// search. The search normally terminates earlier, at the first
    /// unmatched harmonic; the cap guarantees termination on malformed
    /// input.
    pub max_harmonic_order: usize,
    /// Number of harmonic orders sampled per basis vector during shift
    /// estimation.
    pub num_harmonics: usize,
    /// Mean absolute residual phase (radians) above which a harmonic pixel
    /// is discarded as an outlier.
    pub outlier_phase: f64,
    /// Enforce the 3-fold closure constraint (basis vectors summing to
    /// zero) on the refined reciprocal basis. Disable for lattices that
    /// are not 3-fold symmetric.
    pub enforce_closure: bool,
    /// Offset estimation controls.
    pub offset: OffsetParams,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            extent: 15,
            num_spikes: 150,
            tolerance: 3.0,
            max_harmonic_order: 12,
            num_harmonics: 3,
            outlier_phase: 1.0,
            enforce_closure: true,
            offset: OffsetParams::default(),
        }
    }
}
