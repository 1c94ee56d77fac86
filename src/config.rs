//! Runtime configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable                | Default                  |
//! |-------------------------|--------------------------|
//! | `ATLAS_VOLUME`          | `data/annotation.nii.gz` |
//! | `ATLAS_TERMINOLOGY`     | `data/terminology.json`  |
//! | `ATLAS_COORDINATE_MODE` | `index`                  |
//! | `ATLAS_BATCH_THREADS`   | rayon global pool        |

use std::env;
use std::path::PathBuf;

use crate::enums::CoordinateMode;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Annotation volume (NIfTI)
    pub volume_path: PathBuf,
    /// Terminology table (JSON)
    pub terminology_path: PathBuf,
    /// How query coordinates are interpreted
    pub coordinate_mode: CoordinateMode,
    /// Dedicated thread count for batch operations
    pub batch_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume_path: PathBuf::from("data/annotation.nii.gz"),
            terminology_path: PathBuf::from("data/terminology.json"),
            coordinate_mode: CoordinateMode::default(),
            batch_threads: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup; unparsable
    /// values keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("ATLAS_VOLUME").filter(|p| !p.is_empty()) {
            config.volume_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ATLAS_TERMINOLOGY").filter(|p| !p.is_empty()) {
            config.terminology_path = PathBuf::from(path);
        }
        if let Some(mode) = lookup("ATLAS_COORDINATE_MODE").and_then(|m| m.parse().ok()) {
            config.coordinate_mode = mode;
        }
        if let Some(threads) = lookup("ATLAS_BATCH_THREADS")
            .and_then(|t| t.parse::<usize>().ok())
            .filter(|&t| t > 0)
        {
            config.batch_threads = Some(threads);
        }

        config
    }
}
