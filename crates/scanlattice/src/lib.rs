//! scanlattice — illumination-lattice estimation for scanned-lattice
//! microscopy stacks.
//!
//! A stack records a lattice of excitation spots translated by a constant
//! per-frame shift. The pipeline recovers the lattice geometry and the
//! scan motion directly from the data:
//!
//! 1. **Spectrum** – per-frame 2D FFT, frequency-shifted, magnitudes
//!    accumulated over the stack.
//! 2. **Filter** – log-scale whitening of the accumulated magnitudes so
//!    lattice spikes stand out from the envelope.
//! 3. **Peaks** – iterative spike extraction with exclusion squares.
//! 4. **Basis** – combinatorial search for three reciprocal vectors whose
//!    harmonic sums reproduce the spike set, refined by least squares.
//! 5. **Geometry** – reciprocal-to-direct basis conversion.
//! 6. **Motion** – per-frame shift from spike phase ramps, absolute offset
//!    from lattice-windowed frame averaging, drift-corrected shift.
//! 7. **Neighbors** – per-output-pixel lookup of the scan events nearest
//!    in unit-cell phase, via Delaunay triangulation.

pub mod basis;
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod lattice;
pub mod motion;
pub mod neighbors;
pub mod peaks;
pub mod spectrum;
pub mod stack;
#[cfg(test)]
pub(crate) mod test_utils;

use nalgebra::Vector2;

pub use crate::basis::find_basis;
pub use crate::config::{LatticeConfig, OffsetParams};
pub use crate::error::LatticeError;
pub use crate::filter::spike_filter;
pub use crate::geometry::reciprocal_to_direct;
pub use crate::lattice::{combine_lattices, generate_lattice};
pub use crate::motion::{correct_shift_drift, estimate_offset, estimate_shift};
pub use crate::neighbors::{
    find_interpolation_neighbors, BoundaryMapping, Neighbor, NeighborMap,
};
pub use crate::peaks::find_spikes;
pub use crate::spectrum::FourierField;
pub use crate::stack::ImageStack;

/// Full lattice and motion estimate for one stack.
#[derive(Debug, Clone)]
pub struct LatticeEstimate {
    /// Reciprocal-space basis triple (pixels from the spectrum center).
    pub reciprocal: [Vector2<f64>; 3],
    /// Direct-space basis triple (pixels).
    pub direct: [Vector2<f64>; 3],
    /// Per-frame lattice translation (pixels), drift-corrected when the
    /// stack has at least two frames.
    pub shift: Vector2<f64>,
    /// Absolute lattice offset in the first frame (pixels).
    pub offset: Vector2<f64>,
}

/// Serialization-friendly view of a [`LatticeEstimate`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LatticeReport {
    /// Reciprocal basis vectors, row/col pixel components.
    pub reciprocal: [[f64; 2]; 3],
    /// Direct basis vectors, row/col pixel components.
    pub direct: [[f64; 2]; 3],
    /// Per-frame shift.
    pub shift: [f64; 2],
    /// First-frame offset.
    pub offset: [f64; 2],
}

impl From<&LatticeEstimate> for LatticeReport {
    fn from(e: &LatticeEstimate) -> Self {
        let pair = |v: Vector2<f64>| [v.x, v.y];
        Self {
            reciprocal: [pair(e.reciprocal[0]), pair(e.reciprocal[1]), pair(e.reciprocal[2])],
            direct: [pair(e.direct[0]), pair(e.direct[1]), pair(e.direct[2])],
            shift: pair(e.shift),
            offset: pair(e.offset),
        }
    }
}

/// Run the full estimation pipeline on a stack.
pub fn estimate_lattice(
    stack: &ImageStack<'_>,
    config: &LatticeConfig,
) -> Result<LatticeEstimate, LatticeError> {
    let field = FourierField::compute(stack);
    estimate_lattice_with_field(stack, &field, config)
}

/// Run the pipeline against a precomputed spectral field, e.g. when the
/// field is reused across parameter sweeps.
pub fn estimate_lattice_with_field(
    stack: &ImageStack<'_>,
    field: &FourierField,
    config: &LatticeConfig,
) -> Result<LatticeEstimate, LatticeError> {
    let dims = stack.dims();
    if field.dims() != dims || field.frames() != stack.frames() {
        return Err(LatticeError::BadStackShape {
            expected: stack.frames() * dims.0 * dims.1,
            got: field.frames() * field.dims().0 * field.dims().1,
        });
    }

    let filtered = spike_filter(field.magnitude_sum());
    let spikes = find_spikes(&filtered, config.extent, config.num_spikes);
    tracing::info!(spikes = spikes.len(), "extracted spectral spikes");

    let reciprocal = find_basis(&spikes, field.magnitude_sum(), config)?;
    let direct = reciprocal_to_direct(&reciprocal, dims)?;
    tracing::info!(
        b1 = ?(direct[0].x, direct[0].y),
        b2 = ?(direct[1].x, direct[1].y),
        "recovered direct lattice basis"
    );

    let mut shift = estimate_shift(&reciprocal, field, &filtered, config)?;
    let offset = estimate_offset(stack.frame(0), &direct, config)?;
    if stack.frames() >= 2 {
        let offset_last = estimate_offset(stack.frame(stack.frames() - 1), &direct, config)?;
        shift = correct_shift_drift(dims, &direct, shift, offset, offset_last, stack.frames())?;
    }
    tracing::info!(
        shift = ?(shift.x, shift.y),
        offset = ?(offset.x, offset.y),
        "estimated scan motion"
    );

    Ok(LatticeEstimate {
        reciprocal,
        direct,
        shift,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{hex_harmonic_set, render_harmonic_stack, render_spot_stack};
    use nalgebra::Matrix2;

    #[test]
    fn recovers_lattice_and_motion_from_synthetic_stack() {
        let dims = (256usize, 256usize);
        let frames = 40usize;
        // Commensurate square lattice, so rendered frames are exactly
        // periodic and spike phases are noise-free.
        let basis = [Vector2::new(16.0, 0.0), Vector2::new(0.0, 16.0)];
        let shift = Vector2::new(0.3, -0.1);
        let offset = Vector2::new(7.3, 11.8);

        let data = render_spot_stack(dims, frames, &basis, shift, offset, 1.5);
        let stack = ImageStack::new(&data, frames, dims.0, dims.1).unwrap();
        let est = estimate_lattice(&stack, &LatticeConfig::default()).unwrap();

        // Reciprocal triple closes.
        let sum = est.reciprocal[0] + est.reciprocal[1] + est.reciprocal[2];
        assert!(sum.norm() < 1e-6, "reciprocal sum = {sum:?}");

        // The injected generators appear in the direct triple up to sign.
        for target in basis {
            let hit = est
                .direct
                .iter()
                .any(|v| (v - target).norm() < 0.05 || (v + target).norm() < 0.05);
            assert!(hit, "generator {target:?} missing from {:?}", est.direct);
        }

        assert!(
            (est.shift - shift).norm() < 0.02,
            "shift estimate {:?} vs {shift:?}",
            est.shift
        );

        // Offset is only defined modulo the lattice.
        let cell = Matrix2::from_columns(&[basis[0], basis[1]]);
        let r = cell.try_inverse().unwrap() * (est.offset - offset);
        let frac = Vector2::new(r.x - r.x.round(), r.y - r.y.round());
        assert!(
            (cell * frac).norm() < 0.25,
            "offset estimate {:?} differs from {offset:?} by {:?} within the cell",
            est.offset,
            cell * frac
        );
    }

    #[test]
    fn recovers_hexagonal_lattice_and_motion() {
        let dims = (256usize, 256usize);
        let frames = 50usize;
        // Integer-frequency hexagonal reciprocal generators, so every
        // harmonic lands on a discrete spectral bin with an exact phase.
        let g1 = Vector2::new(0.0, 18.0);
        let g2 = Vector2::new(16.0, -9.0);
        let shift = Vector2::new(0.3, -0.1);
        let offset = Vector2::new(6.3, 3.7);

        let harmonics = hex_harmonic_set(g1, g2, 4, 220.0, 0.55);
        let data = render_harmonic_stack(dims, frames, &harmonics, 5000.0, shift, offset);
        let stack = ImageStack::new(&data, frames, dims.0, dims.1).unwrap();
        let est = estimate_lattice(&stack, &LatticeConfig::default()).unwrap();

        let sum = est.reciprocal[0] + est.reciprocal[1] + est.reciprocal[2];
        assert!(sum.norm() < 1e-6, "reciprocal sum = {sum:?}");

        // Duals of the injected generators: cross(g1, g2) = -288, and on a
        // 256-pixel frame dual(g1) = (-16, 0), dual(g2) = (8, 4096/288).
        // The estimate fixes signs only up to the orientation of its first
        // pair, so match each expected dual up to sign.
        for target in [Vector2::new(16.0, 0.0), Vector2::new(-8.0, 4096.0 / 288.0)] {
            let hit = est
                .direct
                .iter()
                .any(|v| (v - target).norm() < 0.05 || (v + target).norm() < 0.05);
            assert!(hit, "dual {target:?} missing from {:?}", est.direct);
        }

        assert!(
            (est.shift - shift).norm() < 0.01,
            "shift estimate {:?} vs {shift:?}",
            est.shift
        );

        let cell = Matrix2::from_columns(&[
            Vector2::new(16.0, 0.0),
            Vector2::new(-8.0, 4096.0 / 288.0),
        ]);
        let r = cell.try_inverse().unwrap() * (est.offset - offset);
        let frac = Vector2::new(r.x - r.x.round(), r.y - r.y.round());
        assert!(
            (cell * frac).norm() < 0.5,
            "offset estimate {:?} differs from {offset:?} by {:?} within the cell",
            est.offset,
            cell * frac
        );
    }

    #[test]
    fn mismatched_field_is_rejected() {
        let data = vec![0u16; 2 * 16 * 16];
        let stack = ImageStack::new(&data, 2, 16, 16).unwrap();
        let small = vec![0u16; 8 * 8];
        let other = ImageStack::new(&small, 1, 8, 8).unwrap();
        let field = FourierField::compute(&other);
        let err = estimate_lattice_with_field(&stack, &field, &LatticeConfig::default())
            .unwrap_err();
        assert!(matches!(err, LatticeError::BadStackShape { .. }));
    }
}
