use std::fmt;

use thiserror::Error;

use crate::spatial_transform::TransformError;
use crate::volume_loader::VolumeLoaderError;

/// Key used for a terminology lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKey {
    Value(u32),
    Abbreviation(String),
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKey::Value(v) => write!(f, "annotation value {v}"),
            RegionKey::Abbreviation(a) => write!(f, "abbreviation {a:?}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("invalid spatial transform: {0}")]
    InvalidTransform(#[from] TransformError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("missing required columns: {columns:?}")]
    MissingColumns { columns: Vec<String> },

    #[error("cannot parse descendant values of region {abbreviation:?}: {raw}")]
    DescendantParse { abbreviation: String, raw: String },

    /// `index` is `None` when the coordinate has no voxel index at all
    /// (NaN, infinite, or beyond the `i64` range).
    #[error(
        "index {} is out of bounds for volume of size {:?}",
        describe_index(.index),
        .size
    )]
    OutOfBounds {
        index: Option<[i64; 3]>,
        size: [usize; 3],
    },

    #[error("unknown region: {0}")]
    UnknownRegion(RegionKey),

    #[error("row {row}: column {column:?} is not numeric")]
    InvalidCoordinate { row: usize, column: String },

    #[error(transparent)]
    Volume(#[from] VolumeLoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_index(index: &Option<[i64; 3]>) -> String {
    match index {
        Some(index) => format!("{index:?}"),
        None => "(unrepresentable)".to_string(),
    }
}
