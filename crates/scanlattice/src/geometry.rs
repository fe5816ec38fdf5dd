//! Reciprocal-to-direct basis conversion.

use nalgebra::Vector2;

use crate::error::LatticeError;

/// 2D cross product (signed parallelogram area).
pub(crate) fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Convert a reciprocal basis (frequency-pixel units) to its dual
/// real-space basis (image-pixel units).
///
/// Each vector is rotated by 90 degrees and scaled per-axis by the image
/// dimension over the reciprocal cell area, so the direct and reciprocal
/// unit cells are mutually dual:
/// `cross(direct) * cross(reciprocal) == nx * ny`.
pub fn reciprocal_to_direct(
    reciprocal: &[Vector2<f64>; 3],
    dims: (usize, usize),
) -> Result<[Vector2<f64>; 3], LatticeError> {
    let area = cross(reciprocal[0], reciprocal[1]);
    if area.abs() < 1e-9 {
        return Err(LatticeError::DegenerateLattice { area });
    }
    let (nx, ny) = (dims.0 as f64, dims.1 as f64);
    let dual = |v: &Vector2<f64>| Vector2::new(v.y * nx / area, -v.x * ny / area);
    Ok([dual(&reciprocal[0]), dual(&reciprocal[1]), dual(&reciprocal[2])])
}
