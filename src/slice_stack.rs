use crate::enums::SortBy;

use ndarray::{Array2, Array3, s};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("no slices to assemble")]
    EmptyInput,

    #[error("inconsistent slice dimensions: expected {expected:?}, got {got:?}")]
    InconsistentShape {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("slice {0} has no through-plane position")]
    MissingPosition(usize),
}

/// A single decoded cross-sectional image together with the spatial metadata
/// used to order it within a stack.
///
/// `position` is the through-plane coordinate (e.g. the z component of a
/// DICOM ImagePositionPatient); `instance` is an optional ordinal hint (e.g.
/// DICOM InstanceNumber). Either may be absent, in which case stacking falls
/// back to a documented default rather than misordering silently.
#[derive(Debug, Clone)]
pub struct Slice2D {
    pub data: Array2<f32>,
    pub position: Option<f32>,
    pub instance: Option<i32>,
}

impl Slice2D {
    pub fn new(data: Array2<f32>, position: Option<f32>, instance: Option<i32>) -> Self {
        Self {
            data,
            position,
            instance,
        }
    }
}

/// Stack slices into a 3D array whose leading axis enumerates them in the
/// order selected by `sort_by`.
///
/// Sorting is stable: slices with equal keys keep their discovery order. A
/// slice missing the requested key sorts with a default of 0, so assembly is
/// deterministic even for partial metadata. Use [`stack_slices_strict`] to
/// reject missing positions instead.
///
/// # Errors
///
/// Returns [`StackError::EmptyInput`] for zero slices and
/// [`StackError::InconsistentShape`] when in-plane dimensions differ.
pub fn stack_slices(slices: Vec<Slice2D>, sort_by: SortBy) -> Result<Array3<f32>, StackError> {
    stack_impl(slices, sort_by, false)
}

/// Like [`stack_slices`] with `SortBy::Position`, but a slice without a
/// through-plane position is an error instead of sorting as 0.0.
pub fn stack_slices_strict(slices: Vec<Slice2D>) -> Result<Array3<f32>, StackError> {
    stack_impl(slices, SortBy::Position, true)
}

fn stack_impl(
    slices: Vec<Slice2D>,
    sort_by: SortBy,
    strict: bool,
) -> Result<Array3<f32>, StackError> {
    if slices.is_empty() {
        return Err(StackError::EmptyInput);
    }

    if strict {
        if let Some(index) = slices.iter().position(|slice| slice.position.is_none()) {
            return Err(StackError::MissingPosition(index));
        }
    }

    let mut ordered: Vec<Slice2D> = slices;
    match sort_by {
        SortBy::Position => {
            ordered.sort_by(|a, b| {
                let ka = a.position.unwrap_or(0.0);
                let kb = b.position.unwrap_or(0.0);
                ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        SortBy::InstanceNumber => {
            ordered.sort_by_key(|slice| slice.instance.unwrap_or(0));
        }
        SortBy::None => {}
    }

    validate_dimensions(&ordered)?;

    Ok(build_volume_array(&ordered))
}

fn validate_dimensions(slices: &[Slice2D]) -> Result<(), StackError> {
    let expected = slices[0].data.dim();
    for slice in slices {
        let got = slice.data.dim();
        if got != expected {
            return Err(StackError::InconsistentShape { expected, got });
        }
    }
    Ok(())
}

fn build_volume_array(slices: &[Slice2D]) -> Array3<f32> {
    let (height, width) = slices[0].data.dim();
    let depth = slices.len();
    let mut volume = Array3::<f32>::zeros((depth, height, width));

    for (i, slice) in slices.iter().enumerate() {
        volume.slice_mut(s![i, .., ..]).assign(&slice.data);
    }

    volume
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn flat_slice(value: f32, position: Option<f32>) -> Slice2D {
        Slice2D::new(Array2::from_elem((2, 2), value), position, None)
    }

    #[test]
    fn orders_by_ascending_position() {
        let slices = vec![
            flat_slice(5.0, Some(5.0)),
            flat_slice(1.0, Some(1.0)),
            flat_slice(3.0, Some(3.0)),
        ];

        let volume = stack_slices(slices, SortBy::Position).unwrap();

        assert_eq!(volume.dim(), (3, 2, 2));
        assert_eq!(volume[[0, 0, 0]], 1.0);
        assert_eq!(volume[[1, 0, 0]], 3.0);
        assert_eq!(volume[[2, 0, 0]], 5.0);
    }

    #[test]
    fn ordering_is_permutation_invariant() {
        let positions = [2.0_f32, -1.5, 0.0, 7.25];
        let forward: Vec<_> = positions
            .iter()
            .map(|&p| flat_slice(p, Some(p)))
            .collect();
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();

        let a = stack_slices(forward, SortBy::Position).unwrap();
        let b = stack_slices(reversed, SortBy::Position).unwrap();

        assert_eq!(a, b);
        assert_eq!(a[[0, 0, 0]], -1.5);
        assert_eq!(a[[3, 0, 0]], 7.25);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let slices = vec![
            flat_slice(10.0, Some(1.0)),
            flat_slice(20.0, Some(1.0)),
            flat_slice(30.0, Some(1.0)),
        ];

        let volume = stack_slices(slices, SortBy::Position).unwrap();

        assert_eq!(volume[[0, 0, 0]], 10.0);
        assert_eq!(volume[[1, 0, 0]], 20.0);
        assert_eq!(volume[[2, 0, 0]], 30.0);
    }

    #[test]
    fn missing_position_sorts_as_zero() {
        let slices = vec![
            flat_slice(1.0, Some(4.0)),
            flat_slice(2.0, None),
            flat_slice(3.0, Some(-2.0)),
        ];

        let volume = stack_slices(slices, SortBy::Position).unwrap();

        assert_eq!(volume[[0, 0, 0]], 3.0);
        assert_eq!(volume[[1, 0, 0]], 2.0);
        assert_eq!(volume[[2, 0, 0]], 1.0);
    }

    #[test]
    fn strict_stacking_rejects_missing_position() {
        let slices = vec![flat_slice(1.0, Some(0.0)), flat_slice(2.0, None)];

        let result = stack_slices_strict(slices);

        assert!(matches!(result, Err(StackError::MissingPosition(1))));
    }

    #[test]
    fn sort_by_instance_number() {
        let slices = vec![
            Slice2D::new(Array2::from_elem((1, 1), 1.0), None, Some(3)),
            Slice2D::new(Array2::from_elem((1, 1), 2.0), None, Some(1)),
            Slice2D::new(Array2::from_elem((1, 1), 3.0), None, Some(2)),
        ];

        let volume = stack_slices(slices, SortBy::InstanceNumber).unwrap();

        assert_eq!(volume[[0, 0, 0]], 2.0);
        assert_eq!(volume[[1, 0, 0]], 3.0);
        assert_eq!(volume[[2, 0, 0]], 1.0);
    }

    #[test]
    fn sort_by_none_keeps_input_order() {
        let slices = vec![
            flat_slice(9.0, Some(9.0)),
            flat_slice(1.0, Some(1.0)),
        ];

        let volume = stack_slices(slices, SortBy::None).unwrap();

        assert_eq!(volume[[0, 0, 0]], 9.0);
        assert_eq!(volume[[1, 0, 0]], 1.0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let result = stack_slices(Vec::new(), SortBy::Position);
        assert!(matches!(result, Err(StackError::EmptyInput)));
    }

    #[test]
    fn inconsistent_shapes_are_rejected() {
        let slices = vec![
            Slice2D::new(arr2(&[[1.0, 2.0], [3.0, 4.0]]), Some(0.0), None),
            Slice2D::new(arr2(&[[1.0, 2.0, 3.0]]), Some(1.0), None),
        ];

        let result = stack_slices(slices, SortBy::Position);

        assert!(matches!(
            result,
            Err(StackError::InconsistentShape {
                expected: (2, 2),
                got: (1, 3),
            })
        ));
    }
}
