//! Minimal 3-D geometry for mask centroids and registration

use serde::{Deserialize, Serialize};

/// A voxel coordinate in (z, y, x) array order
pub type Voxel = [u32; 3];

/// A point in continuous volume space, (z, y, x) order to match voxel axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// Position along the optical axis
    pub z: f64,
    /// Position along rows
    pub y: f64,
    /// Position along columns
    pub x: f64,
}

impl Point3 {
    /// Create a point from (z, y, x) coordinates
    #[inline]
    #[must_use]
    pub const fn new(z: f64, y: f64, x: f64) -> Self {
        Self { z, y, x }
    }

    /// Origin point
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Euclidean distance to another point
    #[inline]
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dz = self.z - other.z;
        let dy = self.y - other.y;
        let dx = self.x - other.x;
        (dz * dz + dy * dy + dx * dx).sqrt()
    }

    /// Component-wise sum with another point
    #[inline]
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.z + other.z, self.y + other.y, self.x + other.x)
    }

    /// Component-wise difference (`self - other`)
    #[inline]
    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.z - other.z, self.y - other.y, self.x - other.x)
    }

    /// Scale all components
    #[inline]
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.z * factor, self.y * factor, self.x * factor)
    }
}

/// Mean position of a point cloud, `None` for an empty cloud
#[must_use]
pub fn centroid_of(points: &[Point3]) -> Option<Point3> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Point3::zero(), |acc, p| acc.add(*p));
    Some(sum.scale(1.0 / points.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 3.0, 6.0);
        assert!((a.distance(b) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn centroid_of_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 4.0, 6.0),
        ];
        let c = centroid_of(&points).unwrap();
        assert_eq!(c, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn centroid_of_empty_is_none() {
        assert!(centroid_of(&[]).is_none());
    }
}
