//! Coordinate frame conversion and bounding volumes
//!
//! Source data is Z-up; the renderer is Y-up. The transform optionally
//! recentres the source on its minimum bound and always applies the
//! axis remap last.

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::point::Point3d;

/// Axis-aligned bounds of a source, in source coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceBounds {
    pub min: Point3d,
    pub max: Point3d,
}

/// Axis-aligned box in renderer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub min: Point3d,
    pub max: Point3d,
    empty: bool,
}

impl BoundingVolume {
    /// The volume reported when no source is loaded
    pub fn empty() -> Self {
        Self {
            min: Point3d::origin(),
            max: Point3d::origin(),
            empty: true,
        }
    }

    /// Smallest box containing both corners
    pub fn from_corners(a: Point3d, b: Point3d) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
            empty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn contains(&self, p: &Point3d) -> bool {
        !self.empty
            && (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::empty()
    }
}

/// Affine transform from source coordinates to renderer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    pub matrix: Matrix4<f64>,
}

impl CoordinateTransform {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// The fixed Z-up to Y-up remap: `(x, y, z) -> (x, z, -y)`
    pub fn z_up_to_y_up() -> Matrix4<f64> {
        Matrix4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Build the transform for a source.
    ///
    /// With `translate_to_origin` the source minimum is moved to the origin
    /// first; the axis remap is composed on top in every case.
    pub fn compute(bounds: Option<&SourceBounds>, translate_to_origin: bool) -> Self {
        let translation = match bounds {
            Some(b) if translate_to_origin => Matrix4::new_translation(&-b.min.coords),
            _ => Matrix4::identity(),
        };
        Self {
            matrix: Self::z_up_to_y_up() * translation,
        }
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3d) -> Point3d {
        let homogeneous = self.matrix * point.to_homogeneous();
        Point3::from_homogeneous(homogeneous).unwrap_or(*point)
    }

    /// Box obtained by transforming both source corners
    pub fn bounding_volume(&self, bounds: Option<&SourceBounds>) -> BoundingVolume {
        match bounds {
            Some(b) => BoundingVolume::from_corners(
                self.transform_point(&b.min),
                self.transform_point(&b.max),
            ),
            None => BoundingVolume::empty(),
        }
    }
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bounds() -> SourceBounds {
        SourceBounds {
            min: Point3::new(100.0, 200.0, 10.0),
            max: Point3::new(150.0, 260.0, 40.0),
        }
    }

    #[test]
    fn test_axis_remap_without_translation() {
        let t = CoordinateTransform::compute(Some(&bounds()), false);
        let p = t.transform_point(&Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(p, Point3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn test_translate_then_remap() {
        let b = bounds();
        let t = CoordinateTransform::compute(Some(&b), true);

        // Before the remap the minimum lands on the origin, so the remapped origin stays put
        let translated = Matrix4::new_translation(&-b.min.coords)
            .transform_point(&b.min);
        assert_relative_eq!(translated, Point3::origin());
        assert_relative_eq!(t.transform_point(&b.min), Point3::origin());

        // The maximum comes out as (dx, dz, -dy)
        let p = t.transform_point(&b.max);
        assert_relative_eq!(p, Point3::new(50.0, 30.0, -60.0));
    }

    #[test]
    fn test_bounding_volume_is_sorted() {
        let b = bounds();
        let t = CoordinateTransform::compute(Some(&b), false);
        let vol = t.bounding_volume(Some(&b));
        assert!(!vol.is_empty());
        assert_relative_eq!(vol.min, Point3::new(100.0, 10.0, -260.0));
        assert_relative_eq!(vol.max, Point3::new(150.0, 40.0, -200.0));
        assert!(vol.contains(&t.transform_point(&Point3::new(120.0, 230.0, 20.0))));
    }

    #[test]
    fn test_no_source_gives_empty_volume() {
        let t = CoordinateTransform::compute(None, true);
        assert_eq!(t.matrix, CoordinateTransform::z_up_to_y_up());
        assert!(t.bounding_volume(None).is_empty());
    }
}
