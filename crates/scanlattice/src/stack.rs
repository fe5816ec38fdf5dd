//! Read-only view over a raw image stack.

use ndarray::ArrayView2;

use crate::error::LatticeError;

/// Borrowed `(frame, x, y)` stack of unsigned 16-bit samples.
///
/// The core never copies or mutates the underlying buffer; loading and
/// memory-mapping are the caller's concern.
#[derive(Debug, Clone, Copy)]
pub struct ImageStack<'a> {
    data: &'a [u16],
    frames: usize,
    nx: usize,
    ny: usize,
}

impl<'a> ImageStack<'a> {
    /// Wrap a raw sample buffer with explicit dimensions.
    pub fn new(data: &'a [u16], frames: usize, nx: usize, ny: usize) -> Result<Self, LatticeError> {
        let expected = frames * nx * ny;
        if data.len() != expected {
            return Err(LatticeError::BadStackShape {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, frames, nx, ny })
    }

    /// Number of frames (scan steps) in the stack.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Per-frame dimensions `(nx, ny)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// 2D view of one frame.
    ///
    /// # Panics
    /// Panics if `z >= self.frames()`.
    pub fn frame(&self, z: usize) -> ArrayView2<'a, u16> {
        assert!(z < self.frames, "frame index {z} out of range");
        let len = self.nx * self.ny;
        let slab = &self.data[z * len..(z + 1) * len];
        ArrayView2::from_shape((self.nx, self.ny), slab)
            .expect("frame dimensions match buffer length")
    }
}
