//! Greedy spike extraction and sub-pixel peak interpolation.

use nalgebra::Vector2;
use ndarray::{s, Array2, ArrayView2};

/// Extract the `num_spikes` strongest mutually-exclusive spike coordinates
/// from a filtered magnitude map.
///
/// The DC term is a spike by definition, so the center pixel is recorded
/// first; a strong low-order spike within `extent` of the center must not
/// be able to suppress it. Each subsequent argmax is recorded relative to
/// the center pixel, then a square of half-width `extent` around it is
/// zeroed so the same spike cannot be selected twice. The result is sorted
/// by ascending squared distance from the center, so the DC spike comes
/// first.
pub fn find_spikes(filtered: &Array2<f64>, extent: usize, num_spikes: usize) -> Vec<Vector2<f64>> {
    let (nx, ny) = filtered.dim();
    let (cx, cy) = (nx / 2, ny / 2);
    let mut work = filtered.clone();
    let mut coords = Vec::with_capacity(num_spikes);

    let mut record = |px: usize, py: usize, work: &mut Array2<f64>| {
        coords.push(Vector2::new(
            px as f64 - cx as f64,
            py as f64 - cy as f64,
        ));
        let x0 = px.saturating_sub(extent);
        let x1 = (px + extent).min(nx);
        let y0 = py.saturating_sub(extent);
        let y1 = (py + extent).min(ny);
        work.slice_mut(s![x0..x1, y0..y1]).fill(0.0);
    };

    if num_spikes == 0 {
        return Vec::new();
    }
    record(cx, cy, &mut work);
    for _ in 1..num_spikes {
        let (px, py) = argmax(&work.view());
        record(px, py, &mut work);
    }

    coords.sort_by(|a, b| {
        a.norm_squared()
            .partial_cmp(&b.norm_squared())
            .expect("spike radii are finite")
    });
    coords
}

/// Index of the maximum element of a 2D map.
pub(crate) fn argmax(a: &ArrayView2<'_, f64>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f64::NEG_INFINITY;
    for ((i, j), &v) in a.indexed_iter() {
        if v > best_val {
            best_val = v;
            best = (i, j);
        }
    }
    best
}

/// Sub-pixel correction for a 3x3 window whose maximum is the center pixel.
///
/// Fits an independent parabola through the three samples along each axis
/// and returns the analytic vertex offset in `[-1, 1]`-ish units relative
/// to the window center. A flat axis yields zero correction.
pub(crate) fn quadratic_peak(window: &ArrayView2<'_, f64>) -> Vector2<f64> {
    debug_assert_eq!(window.dim(), (3, 3));
    let axis = |m1: f64, z: f64, p1: f64| -> f64 {
        let denom = 2.0 * (m1 - 2.0 * z + p1);
        if denom.abs() < 1e-300 {
            0.0
        } else {
            (m1 - p1) / denom
        }
    };
    Vector2::new(
        axis(window[[0, 1]], window[[1, 1]], window[[2, 1]]),
        axis(window[[1, 0]], window[[1, 1]], window[[1, 2]]),
    )
}

/// Sub-pixel refined peak position around an integer pixel of `map`, or the
/// unrefined position when the 3x3 window leaves the image.
pub(crate) fn refine_peak(map: &Array2<f64>, px: usize, py: usize) -> Vector2<f64> {
    let (nx, ny) = map.dim();
    let base = Vector2::new(px as f64, py as f64);
    if px == 0 || py == 0 || px + 1 >= nx || py + 1 >= ny {
        return base;
    }
    let window = map.slice(s![px - 1..=px + 1, py - 1..=py + 1]);
    base + quadratic_peak(&window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spikes_are_mutually_exclusive_at_extent() {
        let mut map = Array2::<f64>::zeros((96, 96));
        // Dense grid of bumps, many closer than the exclusion radius.
        for i in 0..96 {
            for j in 0..96 {
                map[[i, j]] = ((i * 31 + j * 17) % 97) as f64;
            }
        }
        let extent = 9;
        let spikes = find_spikes(&map, extent, 20);
        assert_eq!(spikes.len(), 20);
        for (a, s1) in spikes.iter().enumerate() {
            for s2 in spikes.iter().skip(a + 1) {
                let dx = (s1.x - s2.x).abs();
                let dy = (s1.y - s2.y).abs();
                assert!(
                    dx >= extent as f64 || dy >= extent as f64,
                    "spikes {s1:?} and {s2:?} overlap within extent"
                );
            }
        }
    }

    #[test]
    fn spikes_sorted_by_center_distance() {
        let mut map = Array2::<f64>::zeros((64, 64));
        map[[32, 32]] = 10.0;
        map[[32, 52]] = 30.0;
        map[[12, 32]] = 20.0;
        let spikes = find_spikes(&map, 5, 3);
        assert_eq!(spikes[0], Vector2::new(0.0, 0.0));
        assert!(spikes[1].norm() <= spikes[2].norm());
    }

    #[test]
    fn center_spike_survives_a_stronger_neighbor() {
        // A dominant spike 9 px from the center would normally zero the
        // center pixel before it could be extracted.
        let mut map = Array2::<f64>::zeros((64, 64));
        map[[32, 32]] = 10.0;
        map[[32, 23]] = 50.0;
        let spikes = find_spikes(&map, 15, 2);
        assert_eq!(spikes[0], Vector2::new(0.0, 0.0));
    }

    #[test]
    fn quadratic_peak_recovers_parabola_vertex() {
        // Samples of -(x - 0.3)^2 - (y + 0.2)^2 on the 3x3 grid.
        let vx = 0.3;
        let vy = -0.2;
        let w = Array2::from_shape_fn((3, 3), |(i, j)| {
            let x = i as f64 - 1.0;
            let y = j as f64 - 1.0;
            -(x - vx).powi(2) - (y - vy).powi(2)
        });
        let c = quadratic_peak(&w.view());
        assert!((c.x - vx).abs() < 1e-12);
        assert!((c.y - vy).abs() < 1e-12);
    }

    #[test]
    fn refine_peak_degrades_gracefully_at_borders() {
        let map = Array2::<f64>::zeros((8, 8));
        assert_eq!(refine_peak(&map, 0, 4), Vector2::new(0.0, 4.0));
        assert_eq!(refine_peak(&map, 4, 7), Vector2::new(4.0, 7.0));
    }
}
