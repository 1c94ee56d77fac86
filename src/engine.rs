//! Coordinate labeling and region masks over one annotation volume and its
//! terminology.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array3, Zip};
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::enums::CoordinateMode;
use crate::error::AnnotationError;
use crate::spatial_transform::round_index;
use crate::table::{Table, Value};
use crate::terminology::{ABBREVIATION, NAME, Terminology};
use crate::volume::AnnotationVolume;
use crate::volume_loader::VolumeLoader;

/// Label value used inside a batch for rows that did not resolve to a voxel.
/// Never a valid annotation value, which is unsigned.
pub const NO_LABEL: i64 = -1;

/// Voxel value outside a region in a mask.
pub const BACKGROUND: u32 = 0;

const COORDINATE_COLUMNS: [&str; 3] = ["x", "y", "z"];

/// Read-only query engine over an [`AnnotationVolume`] and a [`Terminology`].
///
/// All queries take `&self`; the engine can be shared across threads.
#[derive(Debug)]
pub struct AnnotationEngine {
    volume: AnnotationVolume,
    terminology: Terminology,
    pool: Option<Arc<ThreadPool>>,
}

impl AnnotationEngine {
    pub fn new(volume: AnnotationVolume, terminology: Terminology) -> Self {
        info!(
            size = ?volume.size(),
            regions = terminology.len(),
            "annotation engine ready"
        );
        Self {
            volume,
            terminology,
            pool: None,
        }
    }

    /// Load the volume from a NIfTI file and the terminology from a JSON
    /// table (see [`Table::from_json_reader`]).
    pub fn from_files(
        volume_path: impl AsRef<Path>,
        terminology_path: impl AsRef<Path>,
    ) -> Result<Self, AnnotationError> {
        let volume = VolumeLoader::read_volume(volume_path)?;
        let file = File::open(terminology_path.as_ref())?;
        let table = Table::from_json_reader(BufReader::new(file))?;
        let terminology = Terminology::load(&table)?;
        Ok(Self::new(volume, terminology))
    }

    /// Run batch operations on `pool` instead of rayon's global pool.
    pub fn with_thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn volume(&self) -> &AnnotationVolume {
        &self.volume
    }

    pub fn terminology(&self) -> &Terminology {
        &self.terminology
    }

    fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Voxel index for a coordinate under `mode`, or `None` if the coordinate
    /// is not finite or its index does not fit in `i64`.
    pub fn coordinate_to_index(
        &self,
        coordinate: [f64; 3],
        mode: CoordinateMode,
    ) -> Option<[i64; 3]> {
        let transform = self.volume.transform();
        match mode {
            CoordinateMode::Index => round_index(coordinate),
            CoordinateMode::Physical => transform.to_index(coordinate),
            CoordinateMode::PhysicalAlternate => transform.to_index_alternate_convention(coordinate),
        }
    }

    /// Label a single coordinate, returning `(abbreviation, name)`.
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::OutOfBounds`] if the coordinate falls outside the
    ///   volume or has no voxel index.
    /// - [`AnnotationError::UnknownRegion`] if the voxel holds a value the
    ///   terminology does not know.
    pub fn label_point(
        &self,
        coordinate: [f64; 3],
        mode: CoordinateMode,
    ) -> Result<(&str, &str), AnnotationError> {
        let index = self
            .coordinate_to_index(coordinate, mode)
            .ok_or(AnnotationError::OutOfBounds {
                index: None,
                size: self.volume.size(),
            })?;
        let value = self.volume.label_at_strict(index)?;
        let region = self.terminology.lookup_by_value(value)?;
        Ok((region.abbreviation.as_str(), region.name.as_str()))
    }

    /// Label every row of a table with `x`, `y`, `z` columns.
    ///
    /// Returns a copy of `coordinates` with `abbreviation` and `name` columns
    /// set. Unlike [`label_point`](Self::label_point), rows that fall outside
    /// the volume or hit a value missing from the terminology are labeled
    /// with empty strings rather than failing the batch.
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::MissingColumns`] if a coordinate column is absent.
    /// - [`AnnotationError::InvalidCoordinate`] if a coordinate cell is not
    ///   numeric.
    pub fn label_table(
        &self,
        coordinates: &Table,
        mode: CoordinateMode,
    ) -> Result<Table, AnnotationError> {
        let missing = coordinates.missing_columns(&COORDINATE_COLUMNS);
        if !missing.is_empty() {
            return Err(AnnotationError::MissingColumns { columns: missing });
        }
        let columns = COORDINATE_COLUMNS.map(|c| coordinates.column_index(c).unwrap_or_default());

        let points = coordinates
            .rows()
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let mut point = [0.0; 3];
                for (axis, &column) in columns.iter().enumerate() {
                    point[axis] = cells[column].as_f64().ok_or_else(|| {
                        AnnotationError::InvalidCoordinate {
                            row,
                            column: COORDINATE_COLUMNS[axis].to_string(),
                        }
                    })?;
                }
                Ok(point)
            })
            .collect::<Result<Vec<[f64; 3]>, AnnotationError>>()?;

        let values = self.run(|| {
            let indices: Vec<Option<[i64; 3]>> = points
                .par_iter()
                .map(|&point| self.coordinate_to_index(point, mode))
                .collect();
            let resolved: Vec<[i64; 3]> = indices.iter().flatten().copied().collect();
            let mut labels = self.volume.labels_at_batch(&resolved).into_iter();
            indices
                .iter()
                .map(|index| index.and_then(|_| labels.next().flatten()))
                .map(|label| label.map_or(NO_LABEL, i64::from))
                .collect::<Vec<i64>>()
        });

        let (abbreviations, names) = self.values_to_labels(&values);

        let mut output = coordinates.clone();
        output.set_column(ABBREVIATION, abbreviations)?;
        output.set_column(NAME, names)?;
        Ok(output)
    }

    /// Map label values to `(abbreviation, name)` columns, using empty
    /// strings for [`NO_LABEL`] and for values without a terminology entry.
    fn values_to_labels(&self, values: &[i64]) -> (Vec<Value>, Vec<Value>) {
        let mut out_of_bounds = 0usize;
        let mut unresolved = 0usize;
        let (abbreviations, names): (Vec<Value>, Vec<Value>) = values
            .iter()
            .map(|&value| {
                let region = u32::try_from(value)
                    .ok()
                    .and_then(|v| self.terminology.get_by_value(v));
                match region {
                    Some(region) => (
                        Value::Str(region.abbreviation.clone()),
                        Value::Str(region.name.clone()),
                    ),
                    None => {
                        if value == NO_LABEL {
                            out_of_bounds += 1;
                        } else {
                            unresolved += 1;
                        }
                        (Value::Str(String::new()), Value::Str(String::new()))
                    }
                }
            })
            .unzip();

        if out_of_bounds > 0 || unresolved > 0 {
            warn!(
                rows = values.len(),
                out_of_bounds, unresolved, "batch rows labeled empty"
            );
        }
        (abbreviations, names)
    }

    /// Build a mask for a region and all of its descendants.
    ///
    /// The result has the shape and transform of the source volume. Voxels
    /// whose label is in the region's descendant set hold the region's
    /// annotation value; every other voxel is [`BACKGROUND`].
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::UnknownRegion`] if the abbreviation is unknown.
    /// - [`AnnotationError::DescendantParse`] if the region's descendant
    ///   field is malformed.
    pub fn build_region_mask(&self, abbreviation: &str) -> Result<AnnotationVolume, AnnotationError> {
        let region = self.terminology.lookup_by_abbreviation(abbreviation)?;
        let descendants = region.descendant_values()?;
        let mask = self.run(|| mask_labels(self.volume.labels(), &descendants, region.annotation_value));

        debug!(
            region = abbreviation,
            descendants = descendants.len(),
            voxels = mask.iter().filter(|&&v| v != BACKGROUND).count(),
            "built region mask"
        );
        self.volume.with_labels(mask)
    }

    /// Build a region mask and write it next to the source geometry.
    pub fn write_region_mask(
        &self,
        abbreviation: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), AnnotationError> {
        let mask = self.build_region_mask(abbreviation)?;
        VolumeLoader::write_volume(mask.labels(), mask.transform(), path)?;
        Ok(())
    }
}

fn mask_labels(labels: &Array3<u32>, members: &BTreeSet<u32>, value: u32) -> Array3<u32> {
    Zip::from(labels).par_map_collect(|label| {
        if members.contains(label) {
            value
        } else {
            BACKGROUND
        }
    })
}
