//! Coordinate-frame transformations between member volumes

use serde::{Deserialize, Serialize};
use vcm_volume::Point3;

/// Affine map from one volume's coordinate frame into the reference frame
///
/// Coordinates are `(z, y, x)` in voxel units. The linear part is row-major
/// and applied before the translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Row-major linear part
    pub matrix: [[f64; 3]; 3],
    /// Translation in `(z, y, x)`
    pub translation: [f64; 3],
}

impl AffineTransform {
    /// The identity map; assigned to the reference member of a match
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// A pure translation in `(z, y, x)`
    #[must_use]
    pub const fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation,
        }
    }

    /// Map a point into the reference frame
    #[must_use]
    pub fn apply(&self, p: Point3) -> Point3 {
        let v = [p.z, p.y, p.x];
        let mut out = [0.0; 3];
        for (i, row) in self.matrix.iter().enumerate() {
            out[i] = row[0] * v[0] + row[1] * v[1] + row[2] * v[2] + self.translation[i];
        }
        Point3::new(out[0], out[1], out[2])
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}
