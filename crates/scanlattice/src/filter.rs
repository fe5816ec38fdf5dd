//! Band-pass spike filter for the summed Fourier magnitude.

use ndarray::{Array2, Axis};

/// Isolate point-like periodic spikes in the magnitude image.
///
/// Log-compresses the input, applies a small isotropic smooth, removes
/// smooth row/column ridges by subtracting two larger single-axis blurs,
/// and z-score normalizes the absolute result. Illumination harmonics come
/// out as isolated high-value points.
pub fn spike_filter(magnitude_sum: &Array2<f64>) -> Array2<f64> {
    let log = magnitude_sum.mapv(|v| (1.0 + v).ln());
    let mut f = gaussian_blur(&log, 0.5);
    f = &f - &gaussian_blur_axis(&f, 4.0, Axis(1));
    f = &f - &gaussian_blur_axis(&f, 4.0, Axis(0));
    f.mapv_inplace(f64::abs);

    let mean = f.mean().unwrap_or(0.0);
    let std = f.std(0.0);
    f.mapv_inplace(|v| v - mean);
    if std > 0.0 {
        f.mapv_inplace(|v| v / std);
    }
    f
}

/// Separable isotropic gaussian blur with reflected boundaries.
pub(crate) fn gaussian_blur(a: &Array2<f64>, sigma: f64) -> Array2<f64> {
    gaussian_blur_axis(&gaussian_blur_axis(a, sigma, Axis(0)), sigma, Axis(1))
}

/// Gaussian blur along a single axis with reflected boundaries.
pub(crate) fn gaussian_blur_axis(a: &Array2<f64>, sigma: f64, axis: Axis) -> Array2<f64> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (nx, ny) = a.dim();
    let mut out = Array2::<f64>::zeros((nx, ny));

    match axis {
        Axis(0) => {
            for j in 0..ny {
                for i in 0..nx {
                    let mut acc = 0.0;
                    for (k, w) in kernel.iter().enumerate() {
                        let ii = reflect(i as isize + k as isize - radius, nx as isize);
                        acc += w * a[[ii, j]];
                    }
                    out[[i, j]] = acc;
                }
            }
        }
        _ => {
            for i in 0..nx {
                for j in 0..ny {
                    let mut acc = 0.0;
                    for (k, w) in kernel.iter().enumerate() {
                        let jj = reflect(j as isize + k as isize - radius, ny as isize);
                        acc += w * a[[i, jj]];
                    }
                    out[[i, j]] = acc;
                }
            }
        }
    }
    out
}

/// Normalized 1D gaussian taps truncated at four sigma.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma).ceil().max(1.0) as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for k in 0..=2 * radius {
        let x = k as f64 - radius as f64;
        kernel.push((-x * x / (2.0 * sigma * sigma)).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Reflect an index into `[0, n)`, duplicating the edge sample.
fn reflect(i: isize, n: isize) -> usize {
    let mut i = i;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}
