//! Lattice point enumeration in image coordinates.

use nalgebra::{Matrix2, Vector2};

use crate::error::LatticeError;
use crate::geometry::cross;

/// Enumerate every lattice point `i*b1 + j*b2 + center` that falls
/// strictly inside the image bounds shrunk by `edge_buffer` on all sides.
///
/// With `center = None` the lattice is anchored at the image center pixel.
/// A caller-supplied absolute center is first reduced to lattice
/// coordinates (2x2 solve) and its integer part dropped, so the supplied
/// position is itself a valid lattice point.
pub fn generate_lattice(
    dims: (usize, usize),
    basis: &[Vector2<f64>],
    center: Option<Vector2<f64>>,
    edge_buffer: f64,
) -> Result<Vec<Vector2<f64>>, LatticeError> {
    let (b1, b2) = (basis[0], basis[1]);
    let half = Vector2::new((dims.0 / 2) as f64, (dims.1 / 2) as f64);

    let center = match center {
        None => half,
        Some(c) => {
            let cell = Matrix2::from_columns(&[b1, b2]);
            let inv = cell
                .try_inverse()
                .ok_or(LatticeError::DegenerateLattice { area: cross(b1, b2) })?;
            let mut components = inv * (c - half);
            components.x -= components.x.floor();
            components.y -= components.y.floor();
            b1 * components.x + b2 * components.y + half
        }
    };

    // Index reach is an overestimate derived from the shorter span.
    let reach = (dims.0.max(dims.1) as f64 / b1.norm()).ceil() as i64;
    let (ux, uy) = (dims.0 as f64 - edge_buffer, dims.1 as f64 - edge_buffer);
    let mut points = Vec::new();
    for i in -reach..reach {
        for j in -reach..reach {
            let p = b1 * i as f64 + b2 * j as f64 + center;
            if p.x > edge_buffer && p.x < ux && p.y > edge_buffer && p.y < uy {
                points.push(p);
            }
        }
    }
    Ok(points)
}

/// Illumination spot positions for every scan step over an output region:
/// the lattice anchored at `offset + step * step_size * shift`, one point
/// list per step. Consumed by downstream resampling stages.
pub fn combine_lattices(
    dims: (usize, usize),
    basis: &[Vector2<f64>],
    shift: Vector2<f64>,
    offset: Option<Vector2<f64>>,
    num_steps: usize,
    step_size: f64,
    edge_buffer: f64,
) -> Result<Vec<Vec<Vector2<f64>>>, LatticeError> {
    let offset = offset.unwrap_or_else(|| Vector2::new((dims.0 / 2) as f64, (dims.1 / 2) as f64));
    let mut spots = Vec::with_capacity(num_steps);
    for step in 0..num_steps {
        let center = offset + shift * (step as f64 * step_size);
        spots.push(generate_lattice(dims, basis, Some(center), edge_buffer)?);
    }
    Ok(spots)
}
