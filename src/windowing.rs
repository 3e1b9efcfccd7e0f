use crate::volume::Volume;

use image::{ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("window width must be positive, got {0}")]
    InvalidWindow(f32),

    #[error("slice index {index} out of range for axis of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// An intensity display window: the sub-range
/// `[center - width/2, center + width/2]` is remapped linearly onto the full
/// 8-bit display range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    center: f32,
    width: f32,
}

impl WindowSpec {
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidWindow`] when `width <= 0` (or NaN).
    pub fn new(center: f32, width: f32) -> Result<Self, WindowError> {
        if !(width > 0.0) {
            return Err(WindowError::InvalidWindow(width));
        }
        Ok(Self { center, width })
    }

    /// Robust auto-contrast default: center and width from the 1st and 99th
    /// percentile of the volume's intensity distribution, width floored at 1.
    pub fn from_volume(volume: &Volume) -> Self {
        let mut values: Vec<f32> = volume.data().iter().copied().collect();
        values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let p1 = percentile(&values, 1.0);
        let p99 = percentile(&values, 99.0);

        Self {
            center: (p1 + p99) / 2.0,
            width: (p99 - p1).max(1.0),
        }
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// The `(lo, hi)` intensity bounds of the window.
    pub fn bounds(&self) -> (f32, f32) {
        (
            self.center - self.width / 2.0,
            self.center + self.width / 2.0,
        )
    }
}

/// Clip a scalar slice to the window bounds and rescale linearly to 8-bit.
///
/// Values at or below the lower bound map to 0, values at or above the upper
/// bound map to 255.
pub fn window(slice: ArrayView2<'_, f32>, spec: WindowSpec) -> Array2<u8> {
    let (lo, hi) = spec.bounds();
    let scale = 255.0 / spec.width();
    let (height, width) = slice.dim();

    let pixels: Vec<u8> = slice
        .into_par_iter()
        .map(|&value| {
            let clipped = value.clamp(lo, hi);
            ((clipped - lo) * scale).round().clamp(0.0, 255.0) as u8
        })
        .collect();

    Array2::from_shape_vec((height, width), pixels)
        .unwrap_or_else(|_| Array2::zeros((height, width)))
}

/// Boolean mask of the same shape, `true` where `value > threshold`.
///
/// Total over its inputs: there are no error conditions.
pub fn threshold_mask(slice: ArrayView2<'_, f32>, threshold: f32) -> Array2<bool> {
    slice.mapv(|value| value > threshold)
}

/// Convert a windowed slice into a grayscale image buffer.
pub fn to_image(display: &Array2<u8>) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let (height, width) = display.dim();
    let pixels: Vec<u8> = display.iter().copied().collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixels)
}

/// Linear-interpolation percentile over an ascending-sorted slice.
fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] * (1.0 - weight) + sorted[upper.min(sorted.len() - 1)] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, arr2};

    #[test]
    fn window_maps_bounds_to_display_extremes() {
        let slice = arr2(&[[-100.0, 0.0], [50.0, 200.0]]);
        let spec = WindowSpec::new(50.0, 100.0).unwrap();

        let display = window(slice.view(), spec);

        // Window is [0, 100]: -100 clips to 0, 200 clips to 255.
        assert_eq!(display[[0, 0]], 0);
        assert_eq!(display[[0, 1]], 0);
        assert_eq!(display[[1, 0]], 128);
        assert_eq!(display[[1, 1]], 255);
    }

    #[test]
    fn window_output_is_linear_inside_bounds() {
        let slice = arr2(&[[25.0, 75.0]]);
        let spec = WindowSpec::new(50.0, 100.0).unwrap();

        let display = window(slice.view(), spec);

        assert_eq!(display[[0, 0]], 64);
        assert_eq!(display[[0, 1]], 191);
    }

    #[test]
    fn zero_or_negative_width_is_rejected() {
        assert!(matches!(
            WindowSpec::new(0.0, 0.0),
            Err(WindowError::InvalidWindow(_))
        ));
        assert!(matches!(
            WindowSpec::new(0.0, -5.0),
            Err(WindowError::InvalidWindow(_))
        ));
        assert!(matches!(
            WindowSpec::new(0.0, f32::NAN),
            Err(WindowError::InvalidWindow(_))
        ));
    }

    #[test]
    fn auto_window_uses_percentiles() {
        // 101 values 0..=100: p1 = 1, p99 = 99.
        let data: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        let volume = Volume::new(
            Array3::from_shape_vec((101, 1, 1), data).unwrap(),
            (1.0, 1.0, 1.0),
        );

        let spec = WindowSpec::from_volume(&volume);

        assert!((spec.center() - 50.0).abs() < 1e-4);
        assert!((spec.width() - 98.0).abs() < 1e-4);
    }

    #[test]
    fn auto_window_floors_width_at_one() {
        let volume = Volume::new(Array3::from_elem((3, 3, 3), 7.0), (1.0, 1.0, 1.0));

        let spec = WindowSpec::from_volume(&volume);

        assert_eq!(spec.width(), 1.0);
        assert_eq!(spec.center(), 7.0);
    }

    #[test]
    fn mask_is_strictly_above_threshold() {
        let slice = arr2(&[[1.0, 5.0], [5.1, 9.0]]);

        let mask = threshold_mask(slice.view(), 5.0);

        assert_eq!(mask, arr2(&[[false, false], [true, true]]));
    }

    #[test]
    fn mask_count_is_monotonic_in_threshold() {
        let slice = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        let mut previous = usize::MAX;
        for threshold in [-1.0, 1.5, 3.0, 4.5, 10.0] {
            let count = threshold_mask(slice.view(), threshold)
                .iter()
                .filter(|&&inside| inside)
                .count();
            assert!(count <= previous);
            previous = count;
        }
    }

    #[test]
    fn display_converts_to_image() {
        let display = arr2(&[[0u8, 128], [255, 64]]);

        let img = to_image(&display).unwrap();

        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 0).0[0], 128);
        assert_eq!(img.get_pixel(0, 1).0[0], 255);
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 100.0), 30.0);
        assert!((percentile(&sorted, 50.0) - 15.0).abs() < 1e-6);
    }
}
