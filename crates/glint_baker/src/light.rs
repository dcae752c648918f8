//! Bake lights and their evaluation strategies.
//!
//! A `BakeLight` is assembled from three optional sub-models: influence
//! (geometric factor plus distance and direction to the emitter), distance
//! attenuation, and an angular cutoff. The final factor is their product.

use std::f32::consts::{PI, TAU};

use glint_math::{Aabb, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bake_mesh::{BakeTriangle, MeshId};
use crate::light_ray::SamplePoint;
use crate::radiance::Color;

/// A point on a light: the light position itself or a sample on an emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightVertex {
    pub position: Vec3,
    /// Emitter facing, zero for point-like lights
    pub normal: Vec3,
}

impl LightVertex {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
        }
    }
}

/// Result of an influence evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    pub factor: f32,
    /// Distance to the emitter, infinite for directional lights
    pub distance: f32,
    /// Unit direction from the receiver toward the emitter
    pub direction: Vec3,
}

impl Influence {
    pub const NONE: Self = Self {
        factor: 0.0,
        distance: 0.0,
        direction: Vec3::ZERO,
    };
}

pub trait LightInfluence: Send + Sync {
    fn influence(&self, emitter: &LightVertex, point: &SamplePoint) -> Influence;

    /// Whether a shadow ray is meaningful for this influence model.
    fn casts_shadow_rays(&self) -> bool {
        true
    }
}

pub trait LightAttenuation: Send + Sync {
    fn attenuate(&self, distance: f32) -> f32;
}

pub trait LightCutoff: Send + Sync {
    /// Angular falloff for a receiver at `point`.
    fn cutoff(&self, point: Vec3) -> f32;
}

/// Cosine between the receiver normal and the direction to a position.
pub struct LambertInfluence;

impl LightInfluence for LambertInfluence {
    fn influence(&self, emitter: &LightVertex, point: &SamplePoint) -> Influence {
        let to_light = emitter.position - point.position;
        let distance = to_light.length();
        if distance <= f32::EPSILON {
            return Influence::NONE;
        }
        let direction = to_light / distance;
        Influence {
            factor: point.normal.dot(direction).max(0.0),
            distance,
            direction,
        }
    }
}

/// Cosine against the reversed light direction.
pub struct DirectionalInfluence {
    pub direction: Vec3,
}

impl LightInfluence for DirectionalInfluence {
    fn influence(&self, _emitter: &LightVertex, point: &SamplePoint) -> Influence {
        let direction = -self.direction;
        Influence {
            factor: point.normal.dot(direction).max(0.0),
            distance: f32::INFINITY,
            direction,
        }
    }
}

/// Constant, unshadowed.
pub struct AmbientInfluence;

impl LightInfluence for AmbientInfluence {
    fn influence(&self, _emitter: &LightVertex, point: &SamplePoint) -> Influence {
        Influence {
            factor: 1.0,
            distance: 0.0,
            direction: point.normal,
        }
    }

    fn casts_shadow_rays(&self) -> bool {
        false
    }
}

/// Receiver cosine times emitter cosine.
pub struct AreaInfluence;

impl LightInfluence for AreaInfluence {
    fn influence(&self, emitter: &LightVertex, point: &SamplePoint) -> Influence {
        let lambert = LambertInfluence.influence(emitter, point);
        if lambert.factor <= 0.0 {
            return lambert;
        }
        Influence {
            factor: lambert.factor * emitter.normal.dot(-lambert.direction).max(0.0),
            ..lambert
        }
    }
}

/// `max(0, 1 - d / range)`
pub struct LinearAttenuation {
    pub range: f32,
}

impl LightAttenuation for LinearAttenuation {
    fn attenuate(&self, distance: f32) -> f32 {
        if self.range <= 0.0 {
            return 0.0;
        }
        (1.0 - distance / self.range).max(0.0)
    }
}

/// `clamp(1 - d² / r², 0, 1)²`
pub struct SmoothAttenuation {
    pub range: f32,
}

impl LightAttenuation for SmoothAttenuation {
    fn attenuate(&self, distance: f32) -> f32 {
        if self.range <= 0.0 {
            return 0.0;
        }
        let falloff = (1.0 - (distance * distance) / (self.range * self.range)).clamp(0.0, 1.0);
        falloff * falloff
    }
}

/// Smoothstep between the outer and inner cone cosines.
pub struct SpotCutoff {
    pub position: Vec3,
    pub direction: Vec3,
    pub cos_inner: f32,
    pub cos_outer: f32,
}

impl SpotCutoff {
    /// Inner cone as a fraction of the outer half-angle.
    pub const INNER_FRACTION: f32 = 0.8;

    /// `angle` is the full cone angle in degrees.
    pub fn new(position: Vec3, direction: Vec3, angle: f32) -> Self {
        let half = (angle * 0.5).to_radians().clamp(0.0, PI * 0.5);
        Self {
            position,
            direction: direction.normalize_or_zero(),
            cos_inner: (half * Self::INNER_FRACTION).cos(),
            cos_outer: half.cos(),
        }
    }
}

impl LightCutoff for SpotCutoff {
    fn cutoff(&self, point: Vec3) -> f32 {
        let to_point = (point - self.position).normalize_or_zero();
        let cos = self.direction.dot(to_point);
        let span = self.cos_inner - self.cos_outer;
        if span <= f32::EPSILON {
            return if cos >= self.cos_outer { 1.0 } else { 0.0 };
        }
        let t = ((cos - self.cos_outer) / span).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BakeLightKind {
    Directional { direction: Vec3 },
    Point { position: Vec3 },
    Spot { position: Vec3, direction: Vec3, cos_outer: f32 },
    /// Emissive surface sampled through its light vertices
    Area { mesh: MeshId, vertices: Vec<LightVertex> },
    /// Zone ambient, applies only to meshes in `zone`
    Ambient { zone: usize },
}

/// Photon leaving a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotonEmission {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Inverse sampling density of the emitted direction/position
    pub weight: f32,
    /// Whether energy scales with the squared first-hit distance
    pub positional: bool,
}

pub struct BakeLight {
    pub kind: BakeLightKind,
    pub color: Color,
    pub intensity: f32,
    pub cast_shadows: bool,
    influence: Box<dyn LightInfluence>,
    attenuation: Option<Box<dyn LightAttenuation>>,
    cutoff: Option<Box<dyn LightCutoff>>,
}

impl std::fmt::Debug for BakeLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BakeLight")
            .field("kind", &self.kind)
            .field("color", &self.color)
            .field("intensity", &self.intensity)
            .field("cast_shadows", &self.cast_shadows)
            .finish_non_exhaustive()
    }
}

impl BakeLight {
    pub fn new(
        kind: BakeLightKind,
        color: Color,
        intensity: f32,
        influence: Box<dyn LightInfluence>,
    ) -> Self {
        Self {
            kind,
            color,
            intensity,
            cast_shadows: true,
            influence,
            attenuation: None,
            cutoff: None,
        }
    }

    pub fn with_attenuation(mut self, attenuation: Box<dyn LightAttenuation>) -> Self {
        self.attenuation = Some(attenuation);
        self
    }

    pub fn with_cutoff(mut self, cutoff: Box<dyn LightCutoff>) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn directional(direction: Vec3, color: Color, intensity: f32) -> Self {
        let direction = direction.normalize_or_zero();
        Self::new(
            BakeLightKind::Directional { direction },
            color,
            intensity,
            Box::new(DirectionalInfluence { direction }),
        )
    }

    pub fn point(position: Vec3, color: Color, intensity: f32, range: f32) -> Self {
        Self::new(
            BakeLightKind::Point { position },
            color,
            intensity,
            Box::new(LambertInfluence),
        )
        .with_attenuation(Box::new(LinearAttenuation { range }))
    }

    /// `angle` is the full cone angle in degrees.
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Color,
        intensity: f32,
        range: f32,
        angle: f32,
    ) -> Self {
        let cutoff = SpotCutoff::new(position, direction, angle);
        Self::new(
            BakeLightKind::Spot {
                position,
                direction: cutoff.direction,
                cos_outer: cutoff.cos_outer,
            },
            color,
            intensity,
            Box::new(LambertInfluence),
        )
        .with_attenuation(Box::new(LinearAttenuation { range }))
        .with_cutoff(Box::new(cutoff))
    }

    pub fn area(
        mesh: MeshId,
        vertices: Vec<LightVertex>,
        color: Color,
        intensity: f32,
        range: f32,
    ) -> Self {
        Self::new(
            BakeLightKind::Area { mesh, vertices },
            color,
            intensity,
            Box::new(AreaInfluence),
        )
        .with_attenuation(Box::new(SmoothAttenuation { range }))
    }

    pub fn ambient(color: Color, zone: usize) -> Self {
        Self::new(
            BakeLightKind::Ambient { zone },
            color,
            1.0,
            Box::new(AmbientInfluence),
        )
        .with_cast_shadows(false)
    }

    pub fn is_area(&self) -> bool {
        matches!(self.kind, BakeLightKind::Area { .. })
    }

    /// Ambient lights only light; everything else also emits photons.
    pub fn emits_photons(&self) -> bool {
        match &self.kind {
            BakeLightKind::Ambient { .. } => false,
            BakeLightKind::Area { vertices, .. } => !vertices.is_empty(),
            _ => true,
        }
    }

    /// Whether this light reaches a mesh at all.
    pub fn applies_to(&self, mesh: MeshId, zone: Option<usize>) -> bool {
        match &self.kind {
            BakeLightKind::Ambient { zone: light_zone } => zone == Some(*light_zone),
            BakeLightKind::Area { mesh: emitter, .. } => *emitter != mesh,
            _ => true,
        }
    }

    /// Emitter position for point-like lights.
    pub fn vertex(&self) -> LightVertex {
        match &self.kind {
            BakeLightKind::Point { position } | BakeLightKind::Spot { position, .. } => {
                LightVertex::at(*position)
            }
            _ => LightVertex::at(Vec3::ZERO),
        }
    }

    /// Sampled emitter points, area lights only.
    pub fn vertices(&self) -> &[LightVertex] {
        match &self.kind {
            BakeLightKind::Area { vertices, .. } => vertices,
            _ => &[],
        }
    }

    pub fn influence(&self, emitter: &LightVertex, point: &SamplePoint) -> Influence {
        self.influence.influence(emitter, point)
    }

    pub fn casts_shadow_rays(&self) -> bool {
        self.cast_shadows && self.influence.casts_shadow_rays()
    }

    pub fn attenuation(&self, distance: f32) -> f32 {
        self.attenuation
            .as_ref()
            .map_or(1.0, |model| model.attenuate(distance))
    }

    pub fn cutoff(&self, point: Vec3) -> f32 {
        self.cutoff.as_ref().map_or(1.0, |model| model.cutoff(point))
    }

    /// Draw a photon leaving this light. `None` for non-emitting lights.
    pub fn emit_photon<R: Rng>(&self, rng: &mut R, scene_bounds: &Aabb) -> Option<PhotonEmission> {
        match &self.kind {
            BakeLightKind::Directional { direction } => {
                // Square of side 2R facing the light, covering the bounding sphere
                let radius = scene_bounds.bounding_radius().max(1e-3);
                let (tangent, bitangent) = direction.any_orthonormal_pair();
                let x = rng.gen_range(-radius..radius);
                let y = rng.gen_range(-radius..radius);
                let origin = scene_bounds.centroid() - *direction * (radius * 2.0)
                    + tangent * x
                    + bitangent * y;
                Some(PhotonEmission {
                    origin,
                    direction: *direction,
                    weight: 4.0 * radius * radius,
                    positional: false,
                })
            }
            BakeLightKind::Point { position } => Some(PhotonEmission {
                origin: *position,
                direction: uniform_sphere(rng.gen(), rng.gen()),
                weight: 4.0 * PI,
                positional: true,
            }),
            BakeLightKind::Spot {
                position,
                direction,
                cos_outer,
            } => {
                // Uniform inside the outer cone
                let cos_theta = 1.0 - rng.gen::<f32>() * (1.0 - cos_outer);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = TAU * rng.gen::<f32>();
                let (tangent, bitangent) = direction.any_orthonormal_pair();
                let dir = tangent * (sin_theta * phi.cos())
                    + bitangent * (sin_theta * phi.sin())
                    + *direction * cos_theta;
                Some(PhotonEmission {
                    origin: *position,
                    direction: dir.normalize(),
                    weight: TAU * (1.0 - cos_outer),
                    positional: true,
                })
            }
            BakeLightKind::Area { vertices, .. } => {
                if vertices.is_empty() {
                    return None;
                }
                let vertex = vertices[rng.gen_range(0..vertices.len())];
                let direction =
                    glint_math::cosine_hemisphere(vertex.normal, rng.gen(), rng.gen());
                Some(PhotonEmission {
                    origin: vertex.position,
                    direction,
                    weight: PI,
                    positional: true,
                })
            }
            BakeLightKind::Ambient { .. } => None,
        }
    }
}

fn uniform_sphere(r1: f32, r2: f32) -> Vec3 {
    let z = 1.0 - 2.0 * r1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = TAU * r2;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Sample points over an emissive surface.
///
/// One vertex per triangle centroid, then `extra_samples` points spread over
/// the surface in proportion to triangle area.
pub struct LightVertexGenerator {
    pub extra_samples: u32,
    pub seed: u64,
}

impl LightVertexGenerator {
    pub fn new(extra_samples: u32, seed: u64) -> Self {
        Self {
            extra_samples,
            seed,
        }
    }

    pub fn generate(&self, positions: &[Vec3], triangles: &[BakeTriangle]) -> Vec<LightVertex> {
        let corners = |tri: &BakeTriangle| tri.indices.map(|i| positions[i as usize]);

        let mut vertices: Vec<LightVertex> = triangles
            .iter()
            .filter(|tri| tri.area > 0.0)
            .map(|tri| {
                let [a, b, c] = corners(tri);
                LightVertex {
                    position: (a + b + c) / 3.0,
                    normal: tri.face_normal,
                }
            })
            .collect();

        // Running area for area-weighted triangle selection
        let mut cdf = Vec::with_capacity(triangles.len());
        let mut total = 0.0;
        for tri in triangles {
            total += tri.area.max(0.0);
            cdf.push(total);
        }
        if total <= 0.0 {
            return vertices;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 0..self.extra_samples {
            let target = rng.gen::<f32>() * total;
            let index = cdf.partition_point(|&acc| acc <= target).min(triangles.len() - 1);
            let tri = &triangles[index];
            let [a, b, c] = corners(tri);

            let s = rng.gen::<f32>().sqrt();
            let t = rng.gen::<f32>();
            let position = a * (1.0 - s) + b * (s * (1.0 - t)) + c * (s * t);
            vertices.push(LightVertex {
                position,
                normal: tri.face_normal,
            });
        }
        vertices
    }
}
