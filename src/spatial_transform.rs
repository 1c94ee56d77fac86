//! Physical-space placement of an annotation volume.
//!
//! A [`SpatialTransform`] carries the origin, voxel spacing and direction
//! cosines of a volume and maps between physical points and voxel indices:
//!
//! ```text
//! index = inverse(direction) · ((point − origin) / spacing)
//! point = origin + spacing ⊙ (direction · index)
//! ```
//!
//! Continuous indices are turned into voxel indices with
//! round-half-away-from-zero ([`f64::round`]) in every code path. A continuous
//! index that is not finite, or does not fit in `i64` once rounded, has no
//! voxel index and maps to `None`.

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Fixed index offset of the alternate coordinate convention, applied after
/// the axis permutation and before the y negation.
pub const ALTERNATE_INDEX_OFFSET: [i64; 3] = [0, 6, -5];

const DETERMINANT_EPSILON: f64 = 1e-12;

// [-2^63, 2^63): every rounded value in this range converts to i64 exactly.
const INDEX_RANGE: std::ops::Range<f64> = (i64::MIN as f64)..-(i64::MIN as f64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("direction matrix is not invertible (determinant {0})")]
    NonInvertibleDirection(f64),

    #[error("spacing must be strictly positive, got {0:?}")]
    NonPositiveSpacing([f64; 3]),

    #[error("transform contains non-finite values")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialTransform {
    origin: Vector3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    inverse_direction: Matrix3<f64>,
}

impl SpatialTransform {
    /// Build a transform, validating spacing and direction once up front.
    ///
    /// # Errors
    ///
    /// Returns an error if any component is non-finite, any spacing
    /// component is not strictly positive, or `direction` is singular.
    pub fn new(
        origin: [f64; 3],
        spacing: [f64; 3],
        direction: Matrix3<f64>,
    ) -> Result<Self, TransformError> {
        let finite = origin
            .iter()
            .chain(spacing.iter())
            .chain(direction.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(TransformError::NonFinite);
        }
        if spacing.iter().any(|&s| s <= 0.0) {
            return Err(TransformError::NonPositiveSpacing(spacing));
        }

        let determinant = direction.determinant();
        if determinant.abs() < DETERMINANT_EPSILON {
            return Err(TransformError::NonInvertibleDirection(determinant));
        }
        let inverse_direction = direction
            .try_inverse()
            .ok_or(TransformError::NonInvertibleDirection(determinant))?;

        Ok(Self {
            origin: Vector3::from(origin),
            spacing: Vector3::from(spacing),
            direction,
            inverse_direction,
        })
    }

    /// Zero origin, unit spacing, identity direction.
    pub fn identity() -> Self {
        Self {
            origin: Vector3::zeros(),
            spacing: Vector3::repeat(1.0),
            direction: Matrix3::identity(),
            inverse_direction: Matrix3::identity(),
        }
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.into()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.into()
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Map a physical point to a continuous (fractional) index.
    pub fn to_continuous_index(&self, point: [f64; 3]) -> [f64; 3] {
        let scaled = (Vector3::from(point) - self.origin).component_div(&self.spacing);
        (self.inverse_direction * scaled).into()
    }

    /// Map a physical point to the nearest voxel index, or `None` if the
    /// point has no representable index.
    pub fn to_index(&self, point: [f64; 3]) -> Option<[i64; 3]> {
        round_index(self.to_continuous_index(point))
    }

    /// Map a continuous index back to physical space.
    pub fn to_physical_point(&self, index: [f64; 3]) -> [f64; 3] {
        let oriented = self.direction * Vector3::from(index);
        (self.origin + oriented.component_mul(&self.spacing)).into()
    }

    /// Map a point expressed in the alternate viewer convention to a voxel
    /// index.
    ///
    /// The convention is an empirical calibration against this transform and
    /// is kept bit-for-bit:
    ///
    /// 1. the point `(p0, p1, p2)` is permuted and sign-flipped to
    ///    `(p0, -p2, -p1)` and mapped with [`to_index`](Self::to_index);
    /// 2. [`ALTERNATE_INDEX_OFFSET`] is added, giving `(i0, i1 + 6, i2 - 5)`;
    /// 3. the y component is negated, giving `(i0, -(i1 + 6), i2 - 5)`.
    ///
    /// Returns `None` when any step leaves the `i64` range.
    pub fn to_index_alternate_convention(&self, point: [f64; 3]) -> Option<[i64; 3]> {
        let query = [point[0], -point[2], -point[1]];
        let [i0, i1, i2] = self.to_index(query)?;
        let x = i0.checked_add(ALTERNATE_INDEX_OFFSET[0])?;
        let y = i1.checked_add(ALTERNATE_INDEX_OFFSET[1])?.checked_neg()?;
        let z = i2.checked_add(ALTERNATE_INDEX_OFFSET[2])?;
        Some([x, y, z])
    }
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Round each component half away from zero.
///
/// Returns `None` if a component is NaN, infinite, or outside the `i64`
/// range after rounding.
pub fn round_index(continuous: [f64; 3]) -> Option<[i64; 3]> {
    let mut index = [0; 3];
    for (slot, c) in index.iter_mut().zip(continuous) {
        let rounded = c.round();
        if !INDEX_RANGE.contains(&rounded) {
            return None;
        }
        *slot = rounded as i64;
    }
    Some(index)
}
