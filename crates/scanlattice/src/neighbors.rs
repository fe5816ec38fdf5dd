//! Scan-position triangulation and per-grid-point neighbor resolution.
//!
//! Output grid points and scan positions are both reduced to unit-cell
//! phase (lattice coordinates modulo 1, mapped back to pixels), so the
//! absolute lattice translation drops out. The reduced scan positions are
//! replicated into the 8 neighboring unit cells, triangulated once, and
//! each grid point's enclosing simplex yields its three nearest-in-phase
//! scan events.

use nalgebra::{Matrix2, Vector2};
use spade::{DelaunayTriangulation, Point2, PositionInTriangulation, Triangulation};

use crate::error::LatticeError;
use crate::geometry::cross;

/// One scan event that illuminated a grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Scan step (frame index) of the event.
    pub frame: usize,
    /// Absolute pixel position of the illumination spot.
    pub position: Vector2<f64>,
}

/// A grid point whose unit-cell phase fell outside the triangulated scan
/// cloud. Non-fatal: other grid points of the same call remain valid.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryMapping {
    /// Flat index of the failing grid point.
    pub index: usize,
    /// Grid point position (pixels).
    pub position: [f64; 2],
}

impl std::fmt::Display for BoundaryMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "grid point {} at ({:.2}, {:.2}) outside the triangulated scan cloud",
            self.index, self.position[0], self.position[1]
        )
    }
}

impl std::error::Error for BoundaryMapping {}

/// Per-grid-point neighbor map over a rectangular output grid.
#[derive(Debug, Clone)]
pub struct NeighborMap {
    /// Grid dimensions `(grid_x.len(), grid_y.len())`; points are stored
    /// x-major.
    pub grid_dims: (usize, usize),
    /// Flat list of grid point positions.
    pub grid: Vec<Vector2<f64>>,
    /// For each grid point, its three illuminating scan events, or a
    /// per-point boundary error.
    pub neighbors: Vec<Result<[Neighbor; 3], BoundaryMapping>>,
}

/// Resolve, for every point of the output grid, the three scan events
/// nearest in unit-cell phase.
pub fn find_interpolation_neighbors(
    grid_x: &[f64],
    grid_y: &[f64],
    direct: &[Vector2<f64>],
    shift: Vector2<f64>,
    offset: Vector2<f64>,
    num_steps: usize,
) -> Result<NeighborMap, LatticeError> {
    let (b1, b2) = (direct[0], direct[1]);
    let cell = Matrix2::from_columns(&[b1, b2]);
    let inv = cell
        .try_inverse()
        .ok_or(LatticeError::DegenerateLattice { area: cross(b1, b2) })?;
    let reduce = |p: Vector2<f64>| -> Vector2<f64> {
        let mut components = inv * p;
        components.x -= components.x.floor();
        components.y -= components.y.floor();
        cell * components
    };

    let mut grid = Vec::with_capacity(grid_x.len() * grid_y.len());
    for &gx in grid_x {
        for &gy in grid_y {
            grid.push(Vector2::new(gx, gy));
        }
    }
    let grid_phase: Vec<Vector2<f64>> = grid.iter().map(|g| reduce(g - offset)).collect();

    // Scan positions relative to the offset; the home cell comes first so
    // a replicated vertex index modulo `num_steps` is its scan step.
    let scan_phase: Vec<Vector2<f64>> =
        (0..num_steps).map(|s| reduce(shift * s as f64)).collect();
    let mut cloud = Vec::with_capacity(9 * num_steps);
    for i in [0.0, -1.0, 1.0] {
        for j in [0.0, -1.0, 1.0] {
            for p in &scan_phase {
                cloud.push(p + b1 * i + b2 * j);
            }
        }
    }
    if cloud.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(LatticeError::DegenerateLattice { area: cross(b1, b2) });
    }

    let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
    let mut step_of_vertex: Vec<usize> = Vec::with_capacity(cloud.len());
    for (k, p) in cloud.iter().enumerate() {
        let handle = triangulation
            .insert(Point2::new(p.x, p.y))
            .map_err(|_| LatticeError::DegenerateLattice { area: cross(b1, b2) })?;
        if handle.index() == step_of_vertex.len() {
            step_of_vertex.push(k % num_steps);
        }
        // A merged duplicate keeps the first step it was seen with.
    }
    tracing::debug!(
        vertices = triangulation.num_vertices(),
        steps = num_steps,
        "triangulated replicated scan positions"
    );

    // Degenerate on-vertex/on-edge locations are resolved by retrying with
    // a perturbation far below the scan position spacing.
    let nudge = 1e-6 * b1.norm().max(1.0);
    let nudges = [
        (0.0, 0.0),
        (nudge, nudge),
        (-nudge, nudge),
        (nudge, -nudge),
        (-nudge, -nudge),
    ];

    let mut neighbors = Vec::with_capacity(grid.len());
    for (index, (point, phase)) in grid.iter().zip(&grid_phase).enumerate() {
        let mut face = None;
        let mut outside = false;
        for (dx, dy) in nudges {
            match triangulation.locate(Point2::new(phase.x + dx, phase.y + dy)) {
                PositionInTriangulation::OnFace(f) => {
                    face = Some(f);
                    break;
                }
                PositionInTriangulation::OutsideOfConvexHull(_)
                | PositionInTriangulation::NoTriangulation => {
                    outside = true;
                    break;
                }
                // On a vertex or edge: nudge and retry.
                _ => continue,
            }
        }
        match face {
            Some(f) => {
                let vertices = triangulation.face(f).vertices();
                let event = |slot: usize| {
                    let v = &vertices[slot];
                    let pos = v.position();
                    Neighbor {
                        frame: step_of_vertex[v.fix().index()],
                        position: Vector2::new(pos.x, pos.y) - phase + point,
                    }
                };
                neighbors.push(Ok([event(0), event(1), event(2)]));
            }
            None => {
                if !outside {
                    tracing::warn!(index, "grid point stuck on a triangulation vertex/edge");
                }
                neighbors.push(Err(BoundaryMapping {
                    index,
                    position: [point.x, point.y],
                }));
            }
        }
    }

    Ok(NeighborMap {
        grid_dims: (grid_x.len(), grid_y.len()),
        grid,
        neighbors,
    })
}
