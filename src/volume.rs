use crate::enums::{ExtractionMode, Orientation, SortBy};
use crate::marching_cubes::{self, CancelToken, ExtractError, Mesh};
use crate::slice_stack::{self, Slice2D, StackError};
use crate::windowing::{self, WindowError, WindowSpec};

use ndarray::{Array2, Array3, ArrayView2, s};

/// A dense 3D scalar volume with per-axis voxel spacing.
///
/// Axis 0 enumerates slices (the stacking axis), axes 1 and 2 are the
/// in-plane rows and columns. The volume is immutable once built; every
/// derived artifact (display image, mask, mesh) is a fresh allocation.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    data: Array3<f32>,
    spacing: (f32, f32, f32),
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: (f32, f32, f32)) -> Self {
        Self { data, spacing }
    }

    /// Build a volume from unordered slices with spatial metadata.
    ///
    /// Slices are ordered along axis 0 by the selected key, ascending and
    /// stable on ties.
    ///
    /// # Errors
    ///
    /// Propagates [`StackError`] for empty input or mismatched in-plane
    /// shapes.
    pub fn from_slices(
        slices: Vec<Slice2D>,
        sort_by: SortBy,
        spacing: (f32, f32, f32),
    ) -> Result<Self, StackError> {
        let data = slice_stack::stack_slices(slices, sort_by)?;
        Ok(Self::new(data, spacing))
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Voxel spacing along (axis 0, axis 1, axis 2); unit spacing if the
    /// source carried none.
    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Extract a 2D cross-section along one of the three orthogonal axes.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::IndexOutOfRange`] when `index` does not lie in
    /// `[0, shape[axis])`.
    pub fn slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Result<ArrayView2<'_, f32>, WindowError> {
        let len = self.axis_len(orientation);
        if index >= len {
            return Err(WindowError::IndexOutOfRange { index, len });
        }

        let view = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Ok(view)
    }

    /// Window the selected cross-section into an 8-bit display image.
    pub fn window_image(
        &self,
        index: usize,
        orientation: Orientation,
        spec: WindowSpec,
    ) -> Result<Array2<u8>, WindowError> {
        let slice = self.slice_from_axis(index, orientation)?;
        Ok(windowing::window(slice, spec))
    }

    /// Threshold the selected cross-section into a boolean mask.
    pub fn mask_image(
        &self,
        index: usize,
        orientation: Orientation,
        threshold: f32,
    ) -> Result<Array2<bool>, WindowError> {
        let slice = self.slice_from_axis(index, orientation)?;
        Ok(windowing::threshold_mask(slice, threshold))
    }

    /// Extract the iso-surface above `threshold` as an indexed triangle mesh.
    ///
    /// This walks every cube of the volume and is by far the most expensive
    /// operation in the pipeline; callers should trigger it explicitly, never
    /// on every parameter change. Pass a [`CancelToken`] to allow aborting a
    /// long run.
    ///
    /// # Errors
    ///
    /// Propagates [`ExtractError`] for degenerate volumes, an empty surface,
    /// or cancellation.
    pub fn extract_surface(
        &self,
        threshold: f32,
        mode: ExtractionMode,
        cancel: Option<&CancelToken>,
    ) -> Result<Mesh, ExtractError> {
        marching_cubes::extract_surface(&self.data, threshold, mode, self.spacing, cancel)
    }

    fn axis_len(&self, orientation: Orientation) -> usize {
        let dim = self.data.dim();
        match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> Volume {
        // data[(i, j, k)] = 100*i + 10*j + k
        let data = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| {
            (100 * i + 10 * j + k) as f32
        });
        Volume::new(data, (1.0, 1.0, 1.0))
    }

    #[test]
    fn axial_slice_fixes_axis_zero() {
        let volume = ramp_volume();

        let slice = volume.slice_from_axis(1, Orientation::Axial).unwrap();

        assert_eq!(slice.dim(), (3, 4));
        assert_eq!(slice[[0, 0]], 100.0);
        assert_eq!(slice[[2, 3]], 123.0);
    }

    #[test]
    fn coronal_slice_fixes_axis_one() {
        let volume = ramp_volume();

        let slice = volume.slice_from_axis(2, Orientation::Coronal).unwrap();

        assert_eq!(slice.dim(), (2, 4));
        assert_eq!(slice[[0, 0]], 20.0);
        assert_eq!(slice[[1, 3]], 123.0);
    }

    #[test]
    fn sagittal_slice_fixes_axis_two() {
        let volume = ramp_volume();

        let slice = volume.slice_from_axis(3, Orientation::Sagittal).unwrap();

        assert_eq!(slice.dim(), (2, 3));
        assert_eq!(slice[[0, 0]], 3.0);
        assert_eq!(slice[[1, 2]], 123.0);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let volume = ramp_volume();

        let result = volume.slice_from_axis(2, Orientation::Axial);

        assert!(matches!(
            result,
            Err(WindowError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn from_slices_orders_by_position() {
        let slices = vec![
            Slice2D::new(Array2::from_elem((2, 2), 2.0), Some(8.0), None),
            Slice2D::new(Array2::from_elem((2, 2), 1.0), Some(-3.0), None),
        ];

        let volume = Volume::from_slices(slices, SortBy::Position, (1.0, 1.0, 2.5)).unwrap();

        assert_eq!(volume.dim(), (2, 2, 2));
        assert_eq!(volume.data()[[0, 0, 0]], 1.0);
        assert_eq!(volume.spacing(), (1.0, 1.0, 2.5));
    }

    #[test]
    fn mask_image_thresholds_selected_slice() {
        let volume = ramp_volume();

        let mask = volume.mask_image(1, Orientation::Axial, 111.0).unwrap();

        assert!(!mask[[1, 1]]); // 111 is not strictly above
        assert!(mask[[1, 2]]); // 112
    }
}
