use crate::{
    spatial_transform::{SpatialTransform, TransformError},
    volume::AnnotationVolume,
};

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions, error::NiftiError, writer::WriterOptions};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// NIfTI `NIFTI_XFORM_SCANNER_ANAT`.
const XFORM_SCANNER_ANAT: i16 = 1;

const MIN_AXIS_NORM: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Expected a 3D volume, found shape {0:?}")]
    Dimensionality(Vec<usize>),

    #[error("Invalid volume geometry: {0}")]
    Transform(#[from] TransformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] NiftiError),
}

/// Reads and writes annotation volumes as NIfTI-1 files (`.nii`, `.nii.gz`).
///
/// Physical coordinates follow the LPS convention of ITK-family readers: the
/// RAS affine stored in the file has its first two rows negated on read, and
/// negated back on write.
pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a label volume and its spatial transform from a NIfTI file
    ///
    /// Voxel data is converted to `u32` and permuted from the on-disk
    /// `(x, y, z)` order to `[z, y, x]`. Trailing singleton dimensions are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded, is not three dimensional,
    /// or describes a degenerate geometry
    pub fn read_volume(path: impl AsRef<Path>) -> Result<AnnotationVolume, VolumeLoaderError> {
        let path = path.as_ref();
        let object = ReaderOptions::new().read_file(path)?;
        let transform = Self::transform_from_header(object.header())?;
        let data = object.into_volume().into_ndarray::<u32>()?;
        let labels = Self::to_zyx(data)?;

        info!(
            path = %path.display(),
            shape = ?labels.dim(),
            "loaded annotation volume"
        );
        Ok(AnnotationVolume::new(labels, transform))
    }

    /// Write a `[z, y, x]` label array with the geometry of `reference`
    pub fn write_volume(
        labels: &Array3<u32>,
        reference: &SpatialTransform,
        path: impl AsRef<Path>,
    ) -> Result<(), VolumeLoaderError> {
        let path = path.as_ref();
        let header = Self::header_from_transform(reference);
        let xyz = labels.view().permuted_axes([2, 1, 0]);
        let xyz = xyz.as_standard_layout();

        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&xyz)?;

        info!(path = %path.display(), shape = ?labels.dim(), "wrote label volume");
        Ok(())
    }

    fn to_zyx(data: ArrayD<u32>) -> Result<Array3<u32>, VolumeLoaderError> {
        let shape = data.shape().to_vec();
        if shape.len() < 3 || shape[3..].iter().any(|&d| d != 1) {
            return Err(VolumeLoaderError::Dimensionality(shape));
        }

        let mut data = data;
        while data.ndim() > 3 {
            let last = Axis(data.ndim() - 1);
            data = data.index_axis_move(last, 0);
        }
        let xyz = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| VolumeLoaderError::Dimensionality(shape))?;

        Ok(xyz.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
    }

    /// Derive origin, spacing and direction from the header, preferring the
    /// sform, then the qform, then plain pixdim scaling.
    pub(crate) fn transform_from_header(
        header: &NiftiHeader,
    ) -> Result<SpatialTransform, VolumeLoaderError> {
        let affine = if header.sform_code > 0 {
            debug!(code = header.sform_code, "using sform");
            [header.srow_x, header.srow_y, header.srow_z]
        } else if header.qform_code > 0 {
            debug!(code = header.qform_code, "using qform");
            Self::qform_affine(header)
        } else {
            let [_, dx, dy, dz, ..] = header.pixdim;
            [
                [dx, 0.0, 0.0, 0.0],
                [0.0, dy, 0.0, 0.0],
                [0.0, 0.0, dz, 0.0],
            ]
        };

        // RAS -> LPS
        let flip = [-1.0, -1.0, 1.0];
        let linear = Matrix3::from_fn(|r, c| flip[r] * affine[r][c] as f64);
        let origin = [0usize, 1, 2].map(|r| flip[r] * affine[r][3] as f64);

        let mut spacing = [1.0; 3];
        let mut columns = [Vector3::x(), Vector3::y(), Vector3::z()];
        for (axis, column) in columns.iter_mut().enumerate() {
            let scaled = linear.column(axis).into_owned();
            let norm = scaled.norm();
            if norm > MIN_AXIS_NORM {
                spacing[axis] = norm;
                *column = scaled / norm;
            }
        }
        let direction = Matrix3::from_columns(&columns);

        Ok(SpatialTransform::new(origin, spacing, direction)?)
    }

    fn qform_affine(header: &NiftiHeader) -> [[f32; 4]; 3] {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                2.0 * (b * c - a * d) * dy,
                2.0 * (b * d + a * c) * dz,
                header.quatern_x,
            ],
            [
                2.0 * (b * c + a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                2.0 * (c * d - a * b) * dz,
                header.quatern_y,
            ],
            [
                2.0 * (b * d - a * c) * dx,
                2.0 * (c * d + a * b) * dy,
                (a * a + d * d - b * b - c * c) * dz,
                header.quatern_z,
            ],
        ]
    }

    /// Header carrying `transform` as an sform; dimensions and data type are
    /// filled in by the writer.
    pub(crate) fn header_from_transform(transform: &SpatialTransform) -> NiftiHeader {
        let flip = [-1.0, -1.0, 1.0];
        let origin = transform.origin();
        let spacing = transform.spacing();
        let direction = transform.direction();

        let row = |r: usize| -> [f32; 4] {
            [
                (flip[r] * direction[(r, 0)] * spacing[0]) as f32,
                (flip[r] * direction[(r, 1)] * spacing[1]) as f32,
                (flip[r] * direction[(r, 2)] * spacing[2]) as f32,
                (flip[r] * origin[r]) as f32,
            ]
        };

        NiftiHeader {
            sform_code: XFORM_SCANNER_ANAT,
            qform_code: 0,
            srow_x: row(0),
            srow_y: row(1),
            srow_z: row(2),
            pixdim: [
                1.0,
                spacing[0] as f32,
                spacing[1] as f32,
                spacing[2] as f32,
                1.0,
                1.0,
                1.0,
                1.0,
            ],
            ..NiftiHeader::default()
        }
    }
}
