// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use ray::Ray;
pub use transform::Mat4Ext;

/// Cosine-weighted direction in the hemisphere around `normal`.
///
/// `r1` and `r2` are uniform samples in [0, 1).
pub fn cosine_hemisphere(normal: Vec3, r1: f32, r2: f32) -> Vec3 {
    let phi = std::f32::consts::TAU * r1;
    let radius = r2.sqrt();
    let local = Vec3::new(radius * phi.cos(), radius * phi.sin(), (1.0 - r2).max(0.0).sqrt());

    let (tangent, bitangent) = normal.any_orthonormal_pair();
    (tangent * local.x + bitangent * local.y + normal * local.z).normalize()
}

/// Interpolate three values with barycentric weights `(1 - u - v, u, v)`.
#[inline]
pub fn barycentric_lerp<T>(a: T, b: T, c: T, u: f32, v: f32) -> T
where
    T: std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    a * (1.0 - u - v) + b * u + c * v
}
