use crate::error::AnnotationError;
use crate::spatial_transform::SpatialTransform;

use ndarray::Array3;
use rayon::prelude::*;

/// Integer label volume placed in physical space.
///
/// Labels are stored `(depth, height, width)`, i.e. indexed `[z, y, x]`, so
/// iteration along x is contiguous. Public accessors take voxel indices in
/// `(x, y, z)` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationVolume {
    labels: Array3<u32>,
    transform: SpatialTransform,
}

impl AnnotationVolume {
    pub fn new(labels: Array3<u32>, transform: SpatialTransform) -> Self {
        Self { labels, transform }
    }

    /// Get the dimensions of the label array (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.labels.dim()
    }

    /// Get the volume size in index order `(size_x, size_y, size_z)`
    pub fn size(&self) -> [usize; 3] {
        let (depth, height, width) = self.labels.dim();
        [width, height, depth]
    }

    /// Get a reference to the underlying labels
    pub fn labels(&self) -> &Array3<u32> {
        &self.labels
    }

    pub fn transform(&self) -> &SpatialTransform {
        &self.transform
    }

    /// New volume with the same shape and transform as `self`.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Schema`] if `labels` has a different shape.
    pub fn with_labels(&self, labels: Array3<u32>) -> Result<Self, AnnotationError> {
        if labels.dim() != self.labels.dim() {
            return Err(AnnotationError::Schema(format!(
                "label array of shape {:?} does not match volume shape {:?}",
                labels.dim(),
                self.labels.dim()
            )));
        }
        Ok(Self::new(labels, self.transform.clone()))
    }

    #[inline]
    pub fn contains(&self, index: [i64; 3]) -> bool {
        index
            .iter()
            .zip(self.size())
            .all(|(&i, size)| i >= 0 && (i as u64) < size as u64)
    }

    /// Label at voxel `(x, y, z)`, or `None` when the index is out of bounds.
    #[inline]
    pub fn label_at(&self, index: [i64; 3]) -> Option<u32> {
        if !self.contains(index) {
            return None;
        }
        let [x, y, z] = index.map(|i| i as usize);
        Some(self.labels[[z, y, x]])
    }

    pub fn label_at_strict(&self, index: [i64; 3]) -> Result<u32, AnnotationError> {
        self.label_at(index).ok_or(AnnotationError::OutOfBounds {
            index: Some(index),
            size: self.size(),
        })
    }

    /// Labels for many voxel indices, in input order.
    ///
    /// Every element is resolved independently with the same bounds test as
    /// [`label_at`](Self::label_at); out-of-bounds entries yield `None`.
    pub fn labels_at_batch(&self, indices: &[[i64; 3]]) -> Vec<Option<u32>> {
        indices
            .par_iter()
            .map(|&index| self.label_at(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> AnnotationVolume {
        // shape (z, y, x) = (2, 3, 4), value = 100 * z + 10 * y + x
        let labels = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (100 * z + 10 * y + x) as u32);
        AnnotationVolume::new(labels, SpatialTransform::identity())
    }

    #[test]
    fn size_is_reported_in_index_order() {
        let volume = ramp_volume();
        assert_eq!(volume.dim(), (2, 3, 4));
        assert_eq!(volume.size(), [4, 3, 2]);
    }

    #[test]
    fn label_at_reads_zyx_storage() {
        let volume = ramp_volume();
        assert_eq!(volume.label_at([3, 2, 1]), Some(123));
        assert_eq!(volume.label_at([0, 0, 0]), Some(0));
    }

    #[test]
    fn label_at_checks_every_axis() {
        let volume = ramp_volume();
        for index in [[4, 0, 0], [0, 3, 0], [0, 0, 2], [-1, 0, 0], [0, -1, 0], [0, 0, -1]] {
            assert_eq!(volume.label_at(index), None, "{index:?}");
        }
    }

    #[test]
    fn strict_variant_reports_index_and_size() {
        let volume = ramp_volume();
        assert!(matches!(
            volume.label_at_strict([9, 0, 0]),
            Err(AnnotationError::OutOfBounds { index: Some([9, 0, 0]), size: [4, 3, 2] })
        ));
        assert_eq!(volume.label_at_strict([1, 1, 1]).unwrap(), 111);
    }

    #[test]
    fn batch_preserves_order_and_does_not_short_circuit() {
        let volume = ramp_volume();
        let indices = [[1, 0, 0], [-5, 0, 0], [2, 2, 1], [4, 3, 2], [0, 1, 0]];
        assert_eq!(
            volume.labels_at_batch(&indices),
            vec![Some(1), None, Some(122), None, Some(10)]
        );
    }

    #[test]
    fn batch_matches_scalar_lookup() {
        let volume = ramp_volume();
        let indices: Vec<[i64; 3]> = (-1..5)
            .flat_map(|x| (-1..4).flat_map(move |y| (-1..3).map(move |z| [x, y, z])))
            .collect();
        let batch = volume.labels_at_batch(&indices);
        for (index, label) in indices.iter().zip(batch) {
            assert_eq!(volume.label_at(*index), label);
        }
    }

    #[test]
    fn with_labels_keeps_transform_and_checks_shape() {
        let volume = ramp_volume();
        let zeros = Array3::zeros((2, 3, 4));
        let copy = volume.with_labels(zeros).unwrap();
        assert_eq!(copy.transform(), volume.transform());
        assert!(volume.with_labels(Array3::zeros((1, 1, 1))).is_err());
    }
}
