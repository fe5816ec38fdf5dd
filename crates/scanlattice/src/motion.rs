//! Per-frame shift and absolute offset estimation from harmonic phases.

use std::f64::consts::TAU;

use nalgebra::{DMatrix, DVector, Vector2};
use ndarray::{s, Array2, ArrayView2};

use crate::config::LatticeConfig;
use crate::error::LatticeError;
use crate::filter::gaussian_blur;
use crate::lattice::generate_lattice;
use crate::peaks::{argmax, quadratic_peak};
use crate::spectrum::FourierField;

/// Estimate the rigid per-frame lattice translation from the phase ramps
/// of harmonic spike pixels.
///
/// For each reciprocal basis vector and harmonic order, the expected spike
/// pixel is snapped to the brightest pixel of its 3x3 neighborhood in the
/// filtered magnitude map. The complex spectrum value at that pixel is
/// tracked across frames; its unwrapped phase should be a clean linear
/// ramp whose slope encodes `-2*pi * (k . shift) / dims`. Pixels whose
/// residual phase noise exceeds `outlier_phase` are discarded; the
/// surviving slopes form an overdetermined system solved for the 2D shift.
pub fn estimate_shift(
    reciprocal: &[Vector2<f64>],
    field: &FourierField,
    filtered: &Array2<f64>,
    config: &LatticeConfig,
) -> Result<Vector2<f64>, LatticeError> {
    let (nx, ny) = field.dims();
    let (cx, cy) = (nx as i64 / 2, ny as i64 / 2);

    let mut pixels: Vec<(i64, i64)> = Vec::new();
    for v in reciprocal {
        for h in 1..=config.num_harmonics {
            let ex = (h as f64 * v.x).round() as i64 + cx;
            let ey = (h as f64 * v.y).round() as i64 + cy;
            if ex < 1 || ey < 1 || ex + 1 >= nx as i64 || ey + 1 >= ny as i64 {
                tracing::warn!(
                    harmonic = h,
                    vector = ?(v.x, v.y),
                    "harmonic outside the spectrum, skipping"
                );
                continue;
            }
            // Snap to the brightest pixel of the 3x3 neighborhood.
            let mut best = (0i64, 0i64);
            let mut best_val = f64::NEG_INFINITY;
            for dx in -1..=1i64 {
                for dy in -1..=1i64 {
                    let val = filtered[[(ex + dx) as usize, (ey + dy) as usize]];
                    if val > best_val {
                        best_val = val;
                        best = (dx, dy);
                    }
                }
            }
            let actual = (ex + best.0 - cx, ey + best.1 - cy);
            if !pixels.contains(&actual) {
                pixels.push(actual);
            }
        }
    }

    let frames = field.frames();
    let mut k_rows: Vec<[f64; 2]> = Vec::new();
    let mut slopes: Vec<f64> = Vec::new();
    for &(px, py) in &pixels {
        let ix = (px + cx) as usize;
        let iy = (py + cy) as usize;
        let mut phases: Vec<f64> =
            (0..frames).map(|z| field.spectrum(z)[[ix, iy]].arg()).collect();
        unwrap_phases(&mut phases);
        let slope = linear_slope(&phases);

        // Residual after removing the fitted ramp and its mean.
        let n = phases.len() as f64;
        let mean: f64 = phases
            .iter()
            .enumerate()
            .map(|(t, p)| p - slope * t as f64)
            .sum::<f64>()
            / n;
        let residual: f64 = phases
            .iter()
            .enumerate()
            .map(|(t, p)| (p - slope * t as f64 - mean).abs())
            .sum::<f64>()
            / n;

        if residual < config.outlier_phase {
            k_rows.push([
                px as f64 * (-TAU / nx as f64),
                py as f64 * (-TAU / ny as f64),
            ]);
            slopes.push(slope);
        } else {
            tracing::debug!(pixel = ?(px, py), residual, "discarding outlier harmonic sample");
        }
    }

    if k_rows.len() < 2 {
        return Err(LatticeError::InsufficientSamples {
            needed: 2,
            got: k_rows.len(),
        });
    }

    let m = k_rows.len();
    let k = DMatrix::from_fn(m, 2, |r, c| k_rows[r][c]);
    let b = DVector::from_fn(m, |r, _| slopes[r]);
    let x = k
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|_| LatticeError::InsufficientSamples { needed: 2, got: m })?;
    let shift = Vector2::new(x[0], x[1]);
    tracing::debug!(samples = m, shift = ?(shift.x, shift.y), "estimated shift vector");
    Ok(shift)
}

/// Estimate the lattice's absolute reference position in one frame.
///
/// Pixel blocks anchored at every in-bounds lattice point are summed into
/// a single window; aligned illumination spots reinforce while misaligned
/// content averages out, leaving one bright blob at the sub-lattice
/// offset. Maxima hugging the window border are rejected and the window is
/// progressively smoothed (bounded by `max_smoothing_passes`) until an
/// interior maximum emerges; the integer peak is then refined to sub-pixel
/// precision on the unsmoothed window.
pub fn estimate_offset(
    frame: ArrayView2<'_, u16>,
    direct: &[Vector2<f64>],
    config: &LatticeConfig,
) -> Result<Vector2<f64>, LatticeError> {
    let (nx, ny) = frame.dim();
    let max_component = direct
        .iter()
        .map(|v| v.x.abs().max(v.y.abs()))
        .fold(0.0, f64::max);
    let ws = 2 + 2 * (max_component as usize);
    if ws < 5 {
        return Err(LatticeError::LatticeNotFound {
            candidates: 0,
            reason: "basis vectors too small for an offset window",
        });
    }
    if ws >= nx.min(ny) {
        return Err(LatticeError::LatticeNotFound {
            candidates: 0,
            reason: "basis vectors larger than the image",
        });
    }

    let points = generate_lattice((nx, ny), direct, None, (2 + ws) as f64)?;
    if points.is_empty() {
        return Err(LatticeError::LatticeNotFound {
            candidates: 0,
            reason: "no lattice points fit inside the offset window buffer",
        });
    }

    let mut window = Array2::<f64>::zeros((ws, ws));
    for p in &points {
        let x = p.x.round() as usize;
        let y = p.y.round() as usize;
        for u in 0..ws {
            for v in 0..ws {
                window[[u, v]] += frame[[x + u, y + v]] as f64;
            }
        }
    }
    tracing::debug!(window = ws, lattice_points = points.len(), "averaged offset window");

    // Border maxima are artifacts of partially-covered cells.
    let border = config.offset.border.min(ws / 2);
    let mut buffered = window.clone();
    buffered.slice_mut(s![..border, ..]).fill(0.0);
    buffered.slice_mut(s![ws - border.., ..]).fill(0.0);
    buffered.slice_mut(s![.., ..border]).fill(0.0);
    buffered.slice_mut(s![.., ws - border..]).fill(0.0);

    let margin = config.offset.interior_margin;
    let interior = |p: (usize, usize)| {
        p.0 > margin && p.0 < ws - margin && p.1 > margin && p.1 < ws - margin
    };
    let mut max_pix = argmax(&buffered.view());
    let mut passes = 0;
    while !interior(max_pix) {
        if passes >= config.offset.max_smoothing_passes {
            tracing::warn!(
                passes,
                "offset window maximum stuck at the border, accepting border peak"
            );
            break;
        }
        buffered = gaussian_blur(&buffered, config.offset.smoothing_sigma);
        max_pix = argmax(&buffered.view());
        passes += 1;
    }

    let (mx, my) = (
        max_pix.0.clamp(1, ws - 2),
        max_pix.1.clamp(1, ws - 2),
    );
    let correction = quadratic_peak(&window.slice(s![mx - 1..=mx + 1, my - 1..=my + 1]));
    let offset = Vector2::new(
        mx as f64 + correction.x + (nx / 2) as f64,
        my as f64 + correction.y + (ny / 2) as f64,
    );
    tracing::debug!(offset = ?(offset.x, offset.y), smoothing_passes = passes, "estimated offset");
    Ok(offset)
}

/// Distribute the end-to-end drift between the predicted and measured
/// final-frame offsets over all inter-frame steps.
///
/// The lattice is generated around the final offset predicted from the
/// first-frame offset and the uncorrected shift; the residual between the
/// measured final offset and its nearest predicted lattice point is the
/// accumulated drift.
pub fn correct_shift_drift(
    dims: (usize, usize),
    direct: &[Vector2<f64>],
    shift: Vector2<f64>,
    offset_first: Vector2<f64>,
    offset_last: Vector2<f64>,
    num_frames: usize,
) -> Result<Vector2<f64>, LatticeError> {
    if num_frames < 2 {
        return Ok(shift);
    }
    let movements = (num_frames - 1) as f64;
    let predicted = offset_first + shift * movements;
    let points = generate_lattice(dims, direct, Some(predicted), 2.0)?;
    let closest = points
        .iter()
        .min_by(|a, b| {
            (*a - offset_last)
                .norm_squared()
                .partial_cmp(&(*b - offset_last).norm_squared())
                .expect("lattice point distances are finite")
        })
        .ok_or(LatticeError::LatticeNotFound {
            candidates: 0,
            reason: "no lattice points near the predicted final offset",
        })?;
    let drift = closest - offset_last;
    tracing::debug!(drift = ?(drift.x, drift.y), movements, "corrected shift drift");
    Ok(shift - drift / movements)
}

/// Remove 2*pi discontinuities from a phase sequence in place.
pub(crate) fn unwrap_phases(phases: &mut [f64]) {
    for i in 1..phases.len() {
        let delta = phases[i] - phases[i - 1];
        phases[i] -= TAU * (delta / TAU).round();
    }
}

/// Least-squares slope of a uniformly sampled sequence.
pub(crate) fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let t_mean = (n - 1) as f64 / 2.0;
    let v_mean: f64 = values.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (t, v) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        num += dt * (v - v_mean);
        den += dt * dt;
    }
    num / den
}
