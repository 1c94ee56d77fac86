use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How a query coordinate is interpreted before it is resolved to a voxel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateMode {
    /// Voxel index `(x, y, z)`, rounded to the nearest integer.
    #[default]
    Index,
    /// Physical point mapped through the volume's [`SpatialTransform`].
    ///
    /// [`SpatialTransform`]: crate::spatial_transform::SpatialTransform
    Physical,
    /// Physical point in the alternate (legacy viewer) convention, see
    /// [`SpatialTransform::to_index_alternate_convention`].
    ///
    /// [`SpatialTransform::to_index_alternate_convention`]: crate::spatial_transform::SpatialTransform::to_index_alternate_convention
    PhysicalAlternate,
}

impl CoordinateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateMode::Index => "index",
            CoordinateMode::Physical => "physical",
            CoordinateMode::PhysicalAlternate => "physical_alternate",
        }
    }
}

impl fmt::Display for CoordinateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown coordinate mode {0:?} (expected index, physical or physical_alternate)")]
pub struct ParseCoordinateModeError(pub String);

impl FromStr for CoordinateMode {
    type Err = ParseCoordinateModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index" => Ok(CoordinateMode::Index),
            "physical" => Ok(CoordinateMode::Physical),
            "physical_alternate" | "physical-alternate" | "alternate" => {
                Ok(CoordinateMode::PhysicalAlternate)
            }
            _ => Err(ParseCoordinateModeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!("index".parse(), Ok(CoordinateMode::Index));
        assert_eq!(" Physical ".parse(), Ok(CoordinateMode::Physical));
        assert_eq!(
            "physical-alternate".parse(),
            Ok(CoordinateMode::PhysicalAlternate)
        );
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!("voxel".parse::<CoordinateMode>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for mode in [
            CoordinateMode::Index,
            CoordinateMode::Physical,
            CoordinateMode::PhysicalAlternate,
        ] {
            assert_eq!(mode.to_string().parse(), Ok(mode));
        }
    }
}
