/// Viewing orientation of a 2D cross-section through the volume.
///
/// Each orientation fixes one array axis; the slice plane is spanned by the
/// remaining two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    /// The volume axis enumerated by this orientation.
    pub fn axis(&self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }
}

/// Ordering policy for stacking 2D slices into a volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Ascending through-plane position (missing positions sort as 0.0).
    #[default]
    Position,
    /// Ascending instance number (missing numbers sort as 0).
    InstanceNumber,
    /// Keep the slices in discovery order.
    None,
}

/// How the iso-surface extractor interprets the volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Binarize at `value > threshold` and march the {0, 1} field at level 0.
    /// The surface is blocky at voxel resolution but fully deterministic.
    #[default]
    Binary,
    /// March the raw intensities at `level = threshold`, interpolating
    /// crossing points along cube edges for a smoother sub-voxel surface.
    Raw,
}
