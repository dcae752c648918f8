//! Sample points and the rays cast from them.

use glint_math::{Ray, UVec2, Vec2, Vec3};

use crate::bake_mesh::MeshId;

/// One lighting sample on a bake mesh surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub position: Vec3,
    /// Interpolated shading normal
    pub normal: Vec3,
    pub face_normal: Vec3,
    pub triangle: u32,
    /// Barycentric `(u, v)` of the sample inside `triangle`
    pub barycentric: Vec2,
    /// Lightmap texel, texel layout only
    pub texel: Option<UVec2>,
}

/// A ray leaving a sample, tagged with where it came from.
#[derive(Debug, Clone, Copy)]
pub struct LightRay {
    pub mesh: MeshId,
    pub sample: usize,
    pub point: SamplePoint,
    pub ray: Ray,
}

impl LightRay {
    /// Ray from the sample along its normal.
    pub fn new(mesh: MeshId, sample: usize, point: SamplePoint) -> Self {
        Self {
            mesh,
            sample,
            point,
            ray: Ray::new(point.position, point.normal),
        }
    }

    /// Sample position pushed off the surface along the normal.
    pub fn biased_origin(&self, bias: f32) -> Vec3 {
        self.point.position + self.point.normal * bias
    }

    /// Re-aim this ray from the biased origin.
    pub fn aim(&mut self, direction: Vec3, bias: f32, t_min: f32, t_max: f32) -> &Ray {
        self.ray = Ray::new(self.biased_origin(bias), direction).with_range(t_min, t_max);
        &self.ray
    }

    /// True if a hit on `(mesh, triangle)` would be the sample's own triangle.
    pub fn is_self(&self, mesh: MeshId, triangle: u32) -> bool {
        self.mesh == mesh && self.point.triangle == triangle
    }
}
