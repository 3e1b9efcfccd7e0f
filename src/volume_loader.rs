use crate::enums::SortBy;
use crate::slice_stack::{Slice2D, StackError};
use crate::volume::Volume;

use dicom::object::{FileDicomObject, InMemDicomObject, from_reader, open_file};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use rayon::prelude::*;
use std::io::{Cursor, Read};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Stack(#[from] StackError),
}

/// Decoding collaborator turning DICOM sources into [`Volume`]s.
///
/// The pipeline itself never parses format-specific headers; everything
/// entering it goes through one of these loaders, which decode pixel data and
/// spatial metadata into [`Slice2D`] values and assemble them along ascending
/// through-plane position (or the requested sort key).
pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from in-memory DICOM objects.
    ///
    /// Objects are decoded in parallel; a file that fails to decode is
    /// skipped. Voxel spacing comes from PixelSpacing and SliceThickness
    /// when present, else 1 unit per axis.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::NoValidImages`] when nothing decodes, and
    /// propagates assembly failures such as inconsistent slice dimensions.
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let slices: Vec<Slice2D> = dicom_objects
            .par_iter()
            .filter_map(Self::extract_slice)
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        let spacing = Self::get_spacing(dicom_objects).unwrap_or((1.0, 1.0, 1.0));

        Ok(Volume::from_slices(slices, sort_by, spacing)?)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Load a volume from an in-memory ZIP archive of .dcm files.
    ///
    /// This is the archive collaborator for uploads: entries are unpacked in
    /// memory, non-DICOM entries are ignored, and the discovered slices run
    /// through the same assembly path as directory loads.
    pub fn load_from_zip_bytes(
        zip_bytes: &[u8],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;

        let mut buffers: Vec<Vec<u8>> = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if !entry.name().to_ascii_lowercase().ends_with(".dcm") {
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            buffers.push(bytes);
        }

        let objects: Vec<_> = buffers
            .par_iter()
            .filter_map(|bytes| Self::object_from_bytes(bytes))
            .collect();

        Self::load_from_dicom_objects(&objects, sort_by)
    }

    fn object_from_bytes(bytes: &[u8]) -> Option<FileDicomObject<InMemDicomObject>> {
        // Files on disk start with a 128-byte preamble before the "DICM"
        // magic; from_reader expects the stream to begin at the magic.
        let stream = if bytes.len() > 132 && &bytes[128..132] == b"DICM" {
            &bytes[128..]
        } else {
            bytes
        };
        from_reader(stream).ok()
    }

    fn extract_slice(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Slice2D> {
        let data = Self::decode_image(dicom_object)?;
        let position = Self::get_position(dicom_object);
        let instance = Self::get_instance_number(dicom_object);
        Some(Slice2D::new(data, position, instance))
    }

    /// Through-plane coordinate: the z component of ImagePositionPatient.
    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<f32> {
        let position = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float32()
            .ok()?;
        position.get(2).copied()
    }

    fn get_instance_number(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<i32> {
        dicom_object
            .element(tags::INSTANCE_NUMBER)
            .ok()?
            .to_int::<i32>()
            .ok()
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        pixel_data
            .to_ndarray::<f32>()
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((slice_thickness, pixel_spacing[0], pixel_spacing[1]))
        })
    }
}
