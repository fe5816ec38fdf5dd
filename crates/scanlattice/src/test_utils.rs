//! Synthetic fixtures shared by the unit tests.

use std::f64::consts::TAU;

use nalgebra::Vector2;
use ndarray::Array2;

/// Rectangular grid of spike coordinates (spacing `spacing`, centered on
/// the origin) within `max_radius`, sorted the way the peak extractor
/// reports them: by distance from center, ties broken deterministically.
pub fn rectangular_spike_set(spacing: f64, max_radius: f64) -> Vec<Vector2<f64>> {
    let reach = (max_radius / spacing).floor() as i64;
    let mut spikes = Vec::new();
    for i in -reach..=reach {
        for j in -reach..=reach {
            let s = Vector2::new(i as f64 * spacing, j as f64 * spacing);
            if s.norm() <= max_radius {
                spikes.push(s);
            }
        }
    }
    spikes.sort_by(|a, b| {
        (a.norm_squared(), a.x, a.y)
            .partial_cmp(&(b.norm_squared(), b.x, b.y))
            .unwrap()
    });
    spikes
}

/// Square magnitude image with a Gaussian bump of width `sigma` at each
/// spike position, relative to the center pixel `(n/2, n/2)`.
pub fn spike_magnitude_image(n: usize, spikes: &[Vector2<f64>], sigma: f64) -> Array2<f64> {
    let c = (n / 2) as f64;
    let mut image = Array2::<f64>::zeros((n, n));
    for spike in spikes {
        let (sx, sy) = (spike.x + c, spike.y + c);
        let (x0, y0) = (sx.round() as i64, sy.round() as i64);
        for x in (x0 - 4).max(0)..=(x0 + 4).min(n as i64 - 1) {
            for y in (y0 - 4).max(0)..=(y0 + 4).min(n as i64 - 1) {
                let d2 = (x as f64 - sx).powi(2) + (y as f64 - sy).powi(2);
                image[[x as usize, y as usize]] += 100.0 * (-d2 / (2.0 * sigma * sigma)).exp();
            }
        }
    }
    image
}

/// Hexagonal direct-space basis with lattice constant `a`.
pub fn hex_direct_basis(a: f64) -> [Vector2<f64>; 2] {
    [
        Vector2::new(a, 0.0),
        Vector2::new(-a / 2.0, a * 3.0_f64.sqrt() / 2.0),
    ]
}

/// Cosine harmonics of a hexagonal lattice with integer reciprocal
/// generators `g1` and `g2` (in cycles per frame). One harmonic per
/// half-lattice pair up to `max_ring` rings out, with `(m1, m2)` and
/// `(-m1, -m2)` folded into a single real cosine. Amplitudes fall off
/// geometrically with the ring index.
pub fn hex_harmonic_set(
    g1: Vector2<f64>,
    g2: Vector2<f64>,
    max_ring: i64,
    amp: f64,
    falloff: f64,
) -> Vec<(Vector2<f64>, f64)> {
    let mut harmonics = Vec::new();
    for m1 in -max_ring..=max_ring {
        for m2 in -max_ring..=max_ring {
            if !(m1 > 0 || (m1 == 0 && m2 > 0)) {
                continue;
            }
            let ring = m1.abs().max(m2.abs()).max((m1 - m2).abs());
            if ring > max_ring {
                continue;
            }
            let k = g1 * m1 as f64 + g2 * m2 as f64;
            harmonics.push((k, amp * falloff.powi(ring as i32 - 1)));
        }
    }
    harmonics
}

/// Render a stack of frames as a sum of translating cosine harmonics on
/// top of a constant base level. Integer-frequency harmonics give exact
/// discrete spectral spikes without any rasterization artifacts.
pub fn render_harmonic_stack(
    dims: (usize, usize),
    frames: usize,
    harmonics: &[(Vector2<f64>, f64)],
    base: f64,
    shift: Vector2<f64>,
    offset: Vector2<f64>,
) -> Vec<u16> {
    let (nx, ny) = dims;
    let mut data = vec![0u16; frames * nx * ny];
    for t in 0..frames {
        let frame = &mut data[t * nx * ny..(t + 1) * nx * ny];
        let origin = offset + shift * t as f64;
        for px in 0..nx {
            for py in 0..ny {
                let mut value = base;
                for &(k, amp) in harmonics {
                    let phase = TAU
                        * (k.x * (px as f64 - origin.x) / nx as f64
                            + k.y * (py as f64 - origin.y) / ny as f64);
                    value += amp * phase.cos();
                }
                frame[px * ny + py] = value.round().max(0.0) as u16;
            }
        }
    }
    data
}

/// Render a stack of frames showing a translating lattice of Gaussian
/// spots. Spot positions wrap around the frame borders, so when the
/// lattice is commensurate with `dims` every frame is exactly periodic
/// and its spectrum is a set of discrete spikes with exact phases.
pub fn render_spot_stack(
    dims: (usize, usize),
    frames: usize,
    basis: &[Vector2<f64>; 2],
    shift: Vector2<f64>,
    offset: Vector2<f64>,
    sigma: f64,
) -> Vec<u16> {
    let (nx, ny) = dims;
    let reach = (nx.max(ny) as f64 / basis[0].norm().min(basis[1].norm())).ceil() as i64 + 2;
    let halo = (4.0 * sigma).ceil() as i64;
    let amp = 2000.0;

    let mut data = vec![0u16; frames * nx * ny];
    for t in 0..frames {
        let frame = &mut data[t * nx * ny..(t + 1) * nx * ny];
        let origin = offset + shift * t as f64;

        // Reduce every lattice point into the frame; commensurate replicas
        // land on identical wrapped positions and must be drawn once.
        let mut spots: Vec<Vector2<f64>> = Vec::new();
        for i in -reach..=reach {
            for j in -reach..=reach {
                let p = origin + basis[0] * i as f64 + basis[1] * j as f64;
                let wrapped =
                    Vector2::new(p.x.rem_euclid(nx as f64), p.y.rem_euclid(ny as f64));
                if !spots.iter().any(|s| (s - wrapped).norm() < 1e-6) {
                    spots.push(wrapped);
                }
            }
        }

        for spot in spots {
            let (x0, y0) = (spot.x.round() as i64, spot.y.round() as i64);
            for x in x0 - halo..=x0 + halo {
                for y in y0 - halo..=y0 + halo {
                    let d2 = (x as f64 - spot.x).powi(2) + (y as f64 - spot.y).powi(2);
                    let v = amp * (-d2 / (2.0 * sigma * sigma)).exp();
                    let xm = x.rem_euclid(nx as i64) as usize;
                    let ym = y.rem_euclid(ny as i64) as usize;
                    let cell = &mut frame[xm * ny + ym];
                    *cell = cell.saturating_add(v.round() as u16);
                }
            }
        }
    }
    data
}
