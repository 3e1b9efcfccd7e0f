//! # CT-volume library
//!
//! This crate implements the volumetric data pipeline behind a CT slice and
//! surface viewer: assembling a correctly ordered 3D scalar volume from a
//! stack of 2D cross-sectional slices, deriving display-ready 2D images under
//! intensity windowing, thresholding the volume and extracting a triangular
//! iso-surface mesh via marching cubes, and serializing that mesh to STL.
//!
//! Volumes can either be built directly from [`Slice2D`] values, or loaded
//! through the DICOM collaborators in [`volume_loader`]: from in-memory DICOM
//! objects, from a folder where each ".dcm" file is read, or from a ZIP
//! archive of per-slice files. If the environment supports it the DICOM files
//! are decoded in parallel using rayon. The volume can be sliced in the three
//! medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Slices are ordered along the stacking axis by their through-plane
//! position (ascending, stable on ties); a slice without a usable position
//! sorts as 0.0 so assembly stays deterministic. Windowed slices are plain
//! `u8` arrays and convert to [`image::ImageBuffer`] for display or export.
//!
//! Surface extraction is explicit and synchronous: binarize at a threshold
//! and march at the binary boundary (blocky, deterministic), or march the raw
//! intensities at the threshold for a sub-voxel surface. Extraction accepts a
//! cooperative [`CancelToken`] so long runs can be aborted cleanly.
//!
//! Contributions are highly welcome!
//!
//! # Examples
//!
//! ## Reading a DICOM directory and exporting a surface
//!
//! Read all DICOM files from the dicom/ directory, sort them by through-plane
//! position, window the center axial slice, then extract the surface above a
//! threshold of 300 and write it as ASCII STL.
//!
//! ```no_run
//! # use ct_volume::enums::{ExtractionMode, Orientation, SortBy};
//! # use ct_volume::volume_loader::VolumeLoader;
//! # use ct_volume::windowing::{self, WindowSpec};
//! # use ct_volume::stl;
//! # use std::path::PathBuf;
//! let volume = VolumeLoader::load_from_directory(&PathBuf::from("dicom"), SortBy::Position)
//!     .expect("should have loaded files from directory");
//! let spec = WindowSpec::from_volume(&volume);
//! let display = volume
//!     .window_image(volume.dim().0 / 2, Orientation::Axial, spec)
//!     .expect("should have windowed center slice");
//! windowing::to_image(&display)
//!     .expect("should have converted display image")
//!     .save("slice.png")
//!     .expect("should have saved image");
//!
//! let mesh = volume
//!     .extract_surface(300.0, ExtractionMode::Binary, None)
//!     .expect("should have extracted a surface");
//! let mut out = std::fs::File::create(stl::EXPORT_FILENAME).expect("should have created file");
//! stl::write_ascii(&mesh, &mut out).expect("should have written STL");
//! ```
//!
//! [`Slice2D`]: slice_stack::Slice2D
//! [`CancelToken`]: marching_cubes::CancelToken

pub mod enums;
pub mod marching_cubes;
pub mod slice_stack;
pub mod stl;
mod tables;
pub mod volume;
pub mod volume_loader;
pub mod windowing;
