//! # Atlas annotation library
//!
//! This crate labels coordinates in a 3D anatomical annotation volume and
//! builds region masks from a hierarchical terminology.
//!
//! An [`AnnotationEngine`] owns an [`AnnotationVolume`] (integer labels
//! stored `[z, y, x]` plus a [`SpatialTransform`]) and a [`Terminology`]
//! (regions indexed by annotation value and abbreviation). It answers three
//! read-only queries:
//!
//!  - [`AnnotationEngine::label_point`]: one coordinate to
//!    `(abbreviation, name)`; out-of-bounds or unknown labels are errors.
//!  - [`AnnotationEngine::label_table`]: a table of `x`, `y`, `z` rows gets
//!    `abbreviation` and `name` columns; bad rows get empty strings.
//!  - [`AnnotationEngine::build_region_mask`]: a new volume marking a
//!    region and all of its descendants.
//!
//! Coordinates are interpreted according to a [`CoordinateMode`]: voxel
//! indices, physical points, or physical points in the alternate viewer
//! convention. All modes round to the nearest voxel, half away from zero.
//!
//! Volumes are read and written as NIfTI files through [`VolumeLoader`].
//! Batch work runs in parallel using rayon.
//!
//! # Examples
//!
//! ## Labeling a physical point
//!
//! ```no_run
//! # use atlas_annotation::{AnnotationEngine, CoordinateMode};
//! let engine = AnnotationEngine::from_files("annotation.nii.gz", "terminology.json")
//!     .expect("should have loaded the atlas");
//! let (abbreviation, name) = engine
//!     .label_point([-12.5, 4.0, 30.25], CoordinateMode::Physical)
//!     .expect("point should be inside the atlas");
//! println!("{abbreviation}: {name}");
//! ```
//!
//! ## Writing a region mask
//!
//! ```no_run
//! # use atlas_annotation::AnnotationEngine;
//! # let engine = AnnotationEngine::from_files("annotation.nii.gz", "terminology.json").unwrap();
//! engine
//!     .write_region_mask("CTX", "ctx_mask.nii.gz")
//!     .expect("should have written the mask");
//! ```

pub mod config;
pub mod engine;
pub mod enums;
pub mod error;
pub mod spatial_transform;
pub mod table;
pub mod terminology;
pub mod volume;
pub mod volume_loader;

pub use config::Config;
pub use engine::AnnotationEngine;
pub use enums::CoordinateMode;
pub use error::{AnnotationError, RegionKey};
pub use spatial_transform::{SpatialTransform, TransformError};
pub use table::{Table, Value};
pub use terminology::{Region, Terminology, parse_descendant_values};
pub use volume::AnnotationVolume;
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
