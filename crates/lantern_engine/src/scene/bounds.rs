//! Bounding volumes and view frustum
//!
//! Used by cameras for visibility queries and by gameplay code to size
//! collision shapes from mesh bounds.

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full edge lengths
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Signed offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane from raw `(a, b, c, d)` coefficients, normalized so `|(a, b, c)| = 1`
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length > 0.0 {
            Self {
                normal: normal / length,
                distance: coefficients.w / length,
            }
        } else {
            Self { normal, distance: coefficients.w }
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far),
    /// normals pointing inward
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann)
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let row = |index: usize| -> Vec4 { view_projection.row(index).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_contains_point() {
        let aabb = AABB::new(
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
        );

        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_intersects() {
        let aabb1 = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let aabb2 = AABB::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let aabb3 = AABB::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));

        assert!(aabb1.intersects(&aabb2));
        assert!(!aabb1.intersects(&aabb3));
    }

    #[test]
    fn test_identity_frustum_is_clip_cube() {
        let frustum = Frustum::from_matrix(&Mat4::identity());

        // Left plane: x >= -1
        assert_relative_eq!(frustum.planes[0].normal, Vec3::x(), epsilon = 1e-6);
        assert_relative_eq!(frustum.planes[0].distance, 1.0, epsilon = 1e-6);

        let inside = AABB::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let straddling = AABB::from_center_extents(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5));
        let outside = AABB::from_center_extents(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5));

        assert!(frustum.intersects_aabb(&inside));
        assert!(frustum.intersects_aabb(&straddling));
        assert!(!frustum.intersects_aabb(&outside));
    }
}
