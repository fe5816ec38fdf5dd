//! Per-frame 2D Fourier transforms and the summed spike magnitude image.

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::error::LatticeError;
use crate::stack::ImageStack;

/// One frequency-shifted complex spectrum per stack frame, plus the
/// accumulated per-pixel magnitude over all frames.
///
/// The DC term sits at the center pixel `(nx / 2, ny / 2)` by convention.
/// Immutable once computed; callers with an external spectral cache can
/// rebuild a field from persisted parts via [`FourierField::from_parts`].
#[derive(Debug, Clone)]
pub struct FourierField {
    spectra: Vec<Array2<Complex64>>,
    magnitude_sum: Array2<f64>,
}

impl FourierField {
    /// Transform every frame of the stack. This is the most expensive step
    /// of the pipeline (one 2D FFT per frame).
    pub fn compute(stack: &ImageStack<'_>) -> Self {
        let (nx, ny) = stack.dims();
        let mut planner = FftPlanner::new();
        let row_fft = planner.plan_fft_forward(ny);
        let col_fft = planner.plan_fft_forward(nx);

        let mut spectra = Vec::with_capacity(stack.frames());
        let mut magnitude_sum = Array2::<f64>::zeros((nx, ny));
        let mut col_buf = vec![Complex64::new(0.0, 0.0); nx];

        for z in 0..stack.frames() {
            let frame = stack.frame(z);
            let mut spectrum =
                Array2::from_shape_fn((nx, ny), |(i, j)| Complex64::new(frame[[i, j]] as f64, 0.0));

            let buf = spectrum
                .as_slice_mut()
                .expect("freshly allocated spectrum is contiguous");
            for row in buf.chunks_exact_mut(ny) {
                row_fft.process(row);
            }
            for j in 0..ny {
                for i in 0..nx {
                    col_buf[i] = spectrum[[i, j]];
                }
                col_fft.process(&mut col_buf);
                for i in 0..nx {
                    spectrum[[i, j]] = col_buf[i];
                }
            }

            let shifted = fftshift(&spectrum);
            for (acc, v) in magnitude_sum.iter_mut().zip(shifted.iter()) {
                *acc += v.norm();
            }
            spectra.push(shifted);
            if (z + 1) % 16 == 0 || z + 1 == stack.frames() {
                tracing::debug!(frame = z + 1, total = stack.frames(), "transformed frames");
            }
        }

        Self {
            spectra,
            magnitude_sum,
        }
    }

    /// Rebuild a field from externally persisted spectra and magnitude sum.
    ///
    /// The parts must share one frame shape; persisted fields are required
    /// to round-trip through the same shape and complex dtype.
    pub fn from_parts(
        spectra: Vec<Array2<Complex64>>,
        magnitude_sum: Array2<f64>,
    ) -> Result<Self, LatticeError> {
        let dims = magnitude_sum.dim();
        let expected = dims.0 * dims.1;
        for s in &spectra {
            if s.dim() != dims {
                return Err(LatticeError::BadStackShape {
                    expected,
                    got: s.dim().0 * s.dim().1,
                });
            }
        }
        Ok(Self {
            spectra,
            magnitude_sum,
        })
    }

    /// Number of frames in the field.
    pub fn frames(&self) -> usize {
        self.spectra.len()
    }

    /// Per-frame dimensions `(nx, ny)`.
    pub fn dims(&self) -> (usize, usize) {
        self.magnitude_sum.dim()
    }

    /// Frequency-shifted spectrum of one frame.
    pub fn spectrum(&self, z: usize) -> &Array2<Complex64> {
        &self.spectra[z]
    }

    /// Sum of per-frame spectral magnitudes.
    pub fn magnitude_sum(&self) -> &Array2<f64> {
        &self.magnitude_sum
    }
}

/// Roll both axes by half so the DC term moves to the center pixel.
fn fftshift(spectrum: &Array2<Complex64>) -> Array2<Complex64> {
    let (nx, ny) = spectrum.dim();
    let mut out = Array2::from_elem((nx, ny), Complex64::new(0.0, 0.0));
    for i in 0..nx {
        for j in 0..ny {
            out[[(i + nx / 2) % nx, (j + ny / 2) % ny]] = spectrum[[i, j]];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_frame_concentrates_at_center() {
        let data = vec![7u16; 2 * 16 * 16];
        let stack = ImageStack::new(&data, 2, 16, 16).unwrap();
        let field = FourierField::compute(&stack);
        let mag = field.magnitude_sum();
        let dc = mag[[8, 8]];
        assert!((dc - 2.0 * 7.0 * 256.0).abs() < 1e-6, "dc = {dc}");
        for ((i, j), v) in mag.indexed_iter() {
            if (i, j) != (8, 8) {
                assert!(v.abs() < 1e-6, "leak at ({i}, {j}): {v}");
            }
        }
    }

    #[test]
    fn from_parts_rejects_mixed_shapes() {
        let spectra = vec![Array2::from_elem((4, 4), Complex64::new(0.0, 0.0))];
        let mag = Array2::<f64>::zeros((4, 5));
        assert!(FourierField::from_parts(spectra, mag).is_err());
    }

    #[test]
    fn single_cosine_lands_on_its_frequency_pixel() {
        let n = 32usize;
        let mut data = vec![0u16; n * n];
        for i in 0..n {
            for j in 0..n {
                let v = 100.0 + 50.0 * (2.0 * std::f64::consts::PI * 4.0 * j as f64 / n as f64).cos();
                data[i * n + j] = v.round() as u16;
            }
        }
        let stack = ImageStack::new(&data, 1, n, n).unwrap();
        let field = FourierField::compute(&stack);
        let mag = field.magnitude_sum();
        // Spike expected at (center, center + 4) and its mirror.
        let c = n / 2;
        assert!(mag[[c, c + 4]] > 1e4);
        assert!(mag[[c, c - 4]] > 1e4);
        assert!(mag[[c + 3, c]] < 1.0);
    }
}
