use crate::Vec3;

/// A ray segment: `origin + t * direction` for `t` in `[t_min, t_max]`.
///
/// Unlike a camera ray the valid range travels with the ray, because every
/// query in the baker (shadow, final gather, photon) is distance-limited.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}

impl Ray {
    /// Create an unbounded ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            t_min: 0.0,
            t_max: f32::INFINITY,
        }
    }

    /// Restrict the ray to `[t_min, t_max]`.
    pub fn with_range(mut self, t_min: f32, t_max: f32) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    /// Get the point along the ray at parameter t.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// True when `t` lies inside the ray's range (inclusive).
    #[inline]
    pub fn in_range(&self, t: f32) -> bool {
        self.t_min <= t && t <= self.t_max
    }
}
