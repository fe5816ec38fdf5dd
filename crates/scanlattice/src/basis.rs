//! Combinatorial reciprocal basis search and least-squares refinement.
//!
//! A seed spike is accepted as a basis vector only if its integer
//! harmonics (sums of two, three, ... copies) are themselves observed
//! spikes; combined sets are re-tested the same way, greedily rejecting
//! the newest member when consistency breaks. Once three mutually
//! consistent vectors are found, every matched harmonic contributes one
//! row to an overdetermined linear system whose least-squares solution is
//! the sub-pixel reciprocal basis.

use nalgebra::{DMatrix, Vector2};
use ndarray::Array2;

use crate::config::LatticeConfig;
use crate::error::LatticeError;
use crate::peaks::refine_peak;

/// Result of a harmonic consistency scan over a candidate vector set.
#[derive(Debug, Clone)]
pub struct HarmonicScan {
    /// Harmonic order at which the first prediction failed to match, or
    /// `max_order + 1` when every order up to the cap matched.
    pub order_reached: usize,
    /// Candidate vectors followed by every matched spike, in scan order.
    pub matched: Vec<Vector2<f64>>,
}

/// All non-decreasing index tuples of length `r` drawn from `0..n`.
pub(crate) fn combinations_with_replacement(n: usize, r: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if n == 0 || r == 0 {
        return out;
    }
    let mut state = vec![0usize; r];
    loop {
        out.push(state.clone());
        // Advance the rightmost digit that can still grow, then level the
        // tail to keep the tuple non-decreasing.
        let mut pos = r;
        while pos > 0 {
            if state[pos - 1] + 1 < n {
                let v = state[pos - 1] + 1;
                for s in state.iter_mut().skip(pos - 1) {
                    *s = v;
                }
                break;
            }
            pos -= 1;
        }
        if pos == 0 {
            return out;
        }
    }
}

/// Check a candidate basis set against the observed spikes.
///
/// For each harmonic order starting at 2, every
/// combination-with-replacement sum of the candidate vectors must match an
/// observed spike within `tolerance`. The scan stops after the first order
/// containing an unmatched prediction, or at `max_order` (termination
/// guard for malformed input).
pub fn test_basis(
    spikes: &[Vector2<f64>],
    candidates: &[Vector2<f64>],
    tolerance: f64,
    max_order: usize,
) -> HarmonicScan {
    let mut matched: Vec<Vector2<f64>> = candidates.to_vec();
    for order in 2..=max_order {
        let mut complete = true;
        for combo in combinations_with_replacement(candidates.len(), order) {
            let predicted = combo
                .iter()
                .fold(Vector2::zeros(), |acc, &k| acc + candidates[k]);
            match match_spike(spikes, predicted, tolerance) {
                Some(s) => matched.push(s),
                None => complete = false,
            }
        }
        if !complete {
            return HarmonicScan {
                order_reached: order,
                matched,
            };
        }
    }
    HarmonicScan {
        order_reached: max_order + 1,
        matched,
    }
}

/// Search the candidate spikes for three mutually consistent reciprocal
/// basis vectors and refine them to sub-pixel precision.
///
/// The returned triple is sign-disambiguated (minimal vector sum) and,
/// when `config.enforce_closure` is set, corrected so the three vectors
/// sum to exactly zero.
pub fn find_basis(
    spikes: &[Vector2<f64>],
    magnitude_sum: &Array2<f64>,
    config: &LatticeConfig,
) -> Result<[Vector2<f64>; 3], LatticeError> {
    for start in 0..spikes.len() {
        let mut basis: Vec<Vector2<f64>> = Vec::new();
        for (c, &coord) in spikes.iter().enumerate() {
            if c < start {
                continue;
            }
            if c == 0 {
                // The spike nearest the center must be the DC term itself.
                if coord.x.abs().max(coord.y.abs()) > 0.0 {
                    return Err(LatticeError::LatticeNotFound {
                        candidates: spikes.len(),
                        reason: "no spike at the central pixel",
                    });
                }
                continue;
            }
            if coord.x < 0.0 || (coord.x == 0.0 && coord.y < 0.0) {
                // Negated copy of a vector already covered by the search.
                tracing::trace!(spike = ?(coord.x, coord.y), "skipping negated spike");
                continue;
            }

            let single = test_basis(spikes, &[coord], config.tolerance, config.max_harmonic_order);
            if single.order_reached <= 3 {
                continue;
            }
            basis.push(coord);
            tracing::debug!(
                vector = ?(coord.x, coord.y),
                harmonics = single.order_reached - 1,
                "accepted seed basis vector"
            );

            if basis.len() > 1 {
                let combined =
                    test_basis(spikes, &basis, config.tolerance, config.max_harmonic_order);
                if combined.order_reached > 3 {
                    if basis.len() == 3 {
                        let precise = precise_basis(spikes, &basis, magnitude_sum, config)?;
                        return Ok(finalize_basis(precise, config.enforce_closure));
                    }
                } else {
                    // Blame the newest member and keep searching.
                    tracing::debug!(
                        vector = ?(coord.x, coord.y),
                        "combined basis set inconsistent, rejecting"
                    );
                    basis.pop();
                }
            }
        }
    }
    Err(LatticeError::LatticeNotFound {
        candidates: spikes.len(),
        reason: "candidate spikes exhausted",
    })
}

/// Re-run the combinatorial match over an accepted 3-vector basis,
/// recording harmonic indices and sub-pixel spike positions, then solve
/// the overdetermined index-to-position system by least squares.
fn precise_basis(
    spikes: &[Vector2<f64>],
    basis: &[Vector2<f64>],
    magnitude_sum: &Array2<f64>,
    config: &LatticeConfig,
) -> Result<[Vector2<f64>; 3], LatticeError> {
    let (nx, ny) = magnitude_sum.dim();
    let (cx, cy) = (nx / 2, ny / 2);

    let mut indices: Vec<[f64; 3]> = Vec::new();
    let mut locations: Vec<Vector2<f64>> = Vec::new();

    for order in 2..=config.max_harmonic_order {
        let mut complete = true;
        for combo in combinations_with_replacement(basis.len(), order) {
            let predicted = combo
                .iter()
                .fold(Vector2::zeros(), |acc, &k| acc + basis[k]);
            let key = [
                combo.iter().filter(|&&k| k == 0).count() as f64,
                combo.iter().filter(|&&k| k == 1).count() as f64,
                combo.iter().filter(|&&k| k == 2).count() as f64,
            ];
            match match_spike(spikes, predicted, config.tolerance) {
                Some(s) => {
                    let px = s.x + cx as f64;
                    let py = s.y + cy as f64;
                    let refined = if px >= 0.0 && py >= 0.0 {
                        refine_peak(magnitude_sum, px as usize, py as usize)
                            - Vector2::new(cx as f64, cy as f64)
                    } else {
                        s
                    };
                    indices.push(key);
                    locations.push(refined);
                }
                None => complete = false,
            }
        }
        if !complete {
            break;
        }
    }

    if indices.len() < 3 {
        return Err(LatticeError::LatticeNotFound {
            candidates: spikes.len(),
            reason: "too few matched harmonics for refinement",
        });
    }

    let m = indices.len();
    let a = DMatrix::from_fn(m, 3, |r, c| indices[r][c]);
    let b = DMatrix::from_fn(m, 2, |r, c| if c == 0 { locations[r].x } else { locations[r].y });
    let x = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|_| LatticeError::LatticeNotFound {
            candidates: spikes.len(),
            reason: "harmonic index system is rank deficient",
        })?;

    tracing::debug!(samples = m, "refined reciprocal basis by least squares");
    Ok([
        Vector2::new(x[(0, 0)], x[(0, 1)]),
        Vector2::new(x[(1, 0)], x[(1, 1)]),
        Vector2::new(x[(2, 0)], x[(2, 1)]),
    ])
}

/// Sign/ordering disambiguation plus optional closure correction.
///
/// Sorted by absolute x-component, the four sign variants that keep the
/// first vector fixed are ranked by the magnitude of their vector sum; a
/// triangle-closed basis should sum to (near) zero. The residual sum is
/// then split evenly across the three vectors when closure is enforced.
fn finalize_basis(mut basis: [Vector2<f64>; 3], enforce_closure: bool) -> [Vector2<f64>; 3] {
    basis.sort_by(|a, b| {
        a.x.abs()
            .partial_cmp(&b.x.abs())
            .expect("basis components are finite")
    });
    let [x1, x2, x3] = basis;
    let variants = [
        [x1, x2, x3],
        [x1, x2, -x3],
        [x1, -x2, x3],
        [x1, -x2, -x3],
    ];
    let mut best = variants[0];
    let mut best_sum = f64::INFINITY;
    for v in variants {
        let s = (v[0] + v[1] + v[2]).norm_squared();
        if s < best_sum {
            best_sum = s;
            best = v;
        }
    }

    if enforce_closure {
        let error = (best[0] + best[1] + best[2]) / 3.0;
        for v in &mut best {
            *v -= error;
        }
    }
    best
}

/// First spike (in center-distance order) within `tolerance` of a
/// predicted harmonic position.
fn match_spike(
    spikes: &[Vector2<f64>],
    predicted: Vector2<f64>,
    tolerance: f64,
) -> Option<Vector2<f64>> {
    spikes
        .iter()
        .find(|s| (predicted - **s).norm() < tolerance)
        .copied()
}
