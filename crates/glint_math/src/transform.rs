// Transform utilities for Mat4
//
// glam::Mat4 already provides transform_point3(), transform_vector3() and inverse().

use glam::{Mat3, Mat4, Vec3};
use crate::Aabb;

/// Extension trait for Mat4 used when moving model data into world space.
pub trait Mat4Ext {
    /// Transform a surface normal (inverse-transpose of the upper 3x3), normalized.
    ///
    /// Falls back to the plain rotation/scale part for singular matrices.
    fn transform_normal3(&self, normal: Vec3) -> Vec3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Average of the three axis scale factors.
    fn uniform_scale(&self) -> f32;
}

impl Mat4Ext for Mat4 {
    fn transform_normal3(&self, normal: Vec3) -> Vec3 {
        let linear = Mat3::from_mat4(*self);
        let normal_matrix = if linear.determinant().abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        (normal_matrix * normal).normalize_or_zero()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        let (lo, hi) = (aabb.min, aabb.max);
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];

        Aabb::from_iter_points(corners.iter().map(|&c| self.transform_point3(c)))
    }

    fn uniform_scale(&self) -> f32 {
        let (scale, _, _) = self.to_scale_rotation_translation();
        scale.abs().dot(Vec3::splat(1.0 / 3.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_normal_non_uniform_scale() {
        // Squash Y: a 45-degree normal tilts toward Y after the inverse-transpose
        let mat = Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0));
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let transformed = mat.transform_normal3(n);

        assert!((transformed.length() - 1.0).abs() < 0.001);
        assert!(transformed.y > transformed.x);
    }

    #[test]
    fn test_transform_normal_rotation() {
        use std::f32::consts::PI;

        let mat = Mat4::from_rotation_z(PI / 2.0) * Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0));
        let transformed = mat.transform_normal3(Vec3::X);

        assert!((transformed - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::splat(5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_aabb_empty() {
        let mat = Mat4::from_translation(Vec3::splat(5.0));
        assert!(mat.transform_aabb(&Aabb::EMPTY).is_empty());
    }

    #[test]
    fn test_uniform_scale() {
        let mat = Mat4::from_scale(Vec3::new(1.0, 2.0, 3.0));
        assert!((mat.uniform_scale() - 2.0).abs() < 0.001);
        assert!((Mat4::IDENTITY.uniform_scale() - 1.0).abs() < 0.001);
    }
}
