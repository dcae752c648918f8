//! Per-sample light evaluation over the committed bake scene.
//!
//! `BakeScene` is the read-only snapshot shared with worker tasks: meshes,
//! lights, the intersector and settings. Evaluators take `&self` and only
//! write through the per-mesh locks.

use glint_core::BakeSettings;
use glint_math::{cosine_hemisphere, Aabb, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bake_mesh::{BakeMesh, MeshId};
use crate::error::BakeResult;
use crate::intersector::RayIntersector;
use crate::light::{BakeLight, LightVertex};
use crate::light_ray::LightRay;
use crate::radiance::Color;

/// Final gather rays start this far from the surface.
const GATHER_T_MIN: f32 = 0.001;

/// Indirect results below this on every channel are dropped.
const INDIRECT_EPSILON: f32 = 0.01;

/// Deterministic RNG for one mesh task.
pub fn bake_rng(seed: u64, mesh: MeshId, pass: u32) -> StdRng {
    let mesh_hash = (mesh as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let pass_hash = (u64::from(pass) + 1).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(seed ^ mesh_hash ^ pass_hash.rotate_left(31))
}

pub struct BakeScene {
    meshes: Vec<BakeMesh>,
    lights: Vec<BakeLight>,
    intersector: RayIntersector,
    settings: BakeSettings,
    bounds: Aabb,
}

impl BakeScene {
    /// Assemble the snapshot, committing the intersector if needed.
    pub fn new(
        meshes: Vec<BakeMesh>,
        lights: Vec<BakeLight>,
        mut intersector: RayIntersector,
        settings: BakeSettings,
    ) -> BakeResult<Self> {
        if !intersector.is_committed() {
            intersector.commit()?;
        }
        let bounds = meshes
            .iter()
            .fold(Aabb::EMPTY, |acc, mesh| Aabb::surrounding(&acc, &mesh.bounds()));
        Ok(Self {
            meshes,
            lights,
            intersector,
            settings,
            bounds,
        })
    }

    pub fn meshes(&self) -> &[BakeMesh] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&BakeMesh> {
        self.meshes.get(id)
    }

    pub fn lights(&self) -> &[BakeLight] {
        &self.lights
    }

    pub fn intersector(&self) -> &RayIntersector {
        &self.intersector
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    /// World bounds of all bake meshes.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Sum of every light reaching the ray's sample.
    pub fn direct_light(&self, ray: &mut LightRay, zone: Option<usize>) -> Color {
        let mesh = ray.mesh;
        self.lights
            .iter()
            .filter(|light| light.applies_to(mesh, zone))
            .map(|light| {
                if light.is_area() {
                    self.direct_light_from_point_set(light, ray)
                } else {
                    self.direct_light_from_point(light, ray)
                }
            })
            .sum()
    }

    /// Point, directional, spot and ambient lights.
    pub fn direct_light_from_point(&self, light: &BakeLight, ray: &mut LightRay) -> Color {
        let factor = self.influence_from_point(light, &light.vertex(), ray);
        if factor > 0.0 {
            light.color * light.intensity * factor
        } else {
            Color::ZERO
        }
    }

    /// Area lights: mean over the generated light vertices.
    pub fn direct_light_from_point_set(&self, light: &BakeLight, ray: &mut LightRay) -> Color {
        let vertices = light.vertices();
        if vertices.is_empty() {
            return Color::ZERO;
        }

        let sum: Color = vertices
            .iter()
            .map(|vertex| {
                let factor = self.influence_from_point(light, vertex, ray);
                if factor > 0.0 {
                    light.color * light.intensity * factor
                } else {
                    Color::ZERO
                }
            })
            .sum();
        sum / vertices.len() as f32
    }

    /// `influence * attenuation * cutoff`, zero if shadowed.
    fn influence_from_point(&self, light: &BakeLight, emitter: &LightVertex, ray: &mut LightRay) -> f32 {
        let influence = light.influence(emitter, &ray.point);
        if influence.factor <= 0.0 {
            return 0.0;
        }

        let factor = influence.factor
            * light.attenuation(influence.distance)
            * light.cutoff(ray.point.position);
        if factor <= 0.0 {
            return 0.0;
        }

        if light.casts_shadow_rays() {
            let bias = self.settings.ray_bias;
            let t_max = if influence.distance.is_finite() {
                influence.distance - bias
            } else {
                f32::MAX
            };
            if t_max > bias {
                let shadow = *ray.aim(influence.direction, bias, bias, t_max);
                if self.intersector.occluded(&shadow) {
                    return 0.0;
                }
            }
        }

        factor
    }

    /// Final gather against the photon maps.
    ///
    /// Returns `None` when no ray produced a usable value or the result is
    /// negligible.
    pub fn indirect_light<R: Rng>(&self, ray: &mut LightRay, rng: &mut R) -> Option<Color> {
        let samples = self.settings.final_gather_samples;
        if samples == 0 {
            return None;
        }
        let sky = self.settings.sky();
        let normal = ray.point.normal;

        let mut gathered = Color::ZERO;
        let mut hits = 0;

        for _ in 0..samples {
            let dir = cosine_hemisphere(normal, rng.gen(), rng.gen());
            let cos = normal.dot(dir).max(0.0);

            let sample_ray = *ray.aim(dir, 0.0, GATHER_T_MIN, self.settings.final_gather_distance);
            let Some(hit) = self.intersector.intersect(&sample_ray) else {
                gathered += sky * cos;
                hits += 1;
                continue;
            };

            let Some(owner) = self.intersector.owner(hit.geometry) else {
                continue;
            };
            if ray.is_self(owner, hit.primitive) {
                continue;
            }
            let Some(mesh) = self.meshes.get(owner) else {
                continue;
            };
            let Some(triangle) = mesh.triangle(hit.primitive) else {
                continue;
            };
            // Back side of the hit surface
            if dir.dot(triangle.face_normal) >= 0.0 {
                continue;
            }
            let Some(photon) = mesh.photon(hit.primitive, Vec2::new(hit.u, hit.v)) else {
                continue;
            };

            hits += 1;
            gathered += photon * cos;
        }

        if hits == 0 {
            return None;
        }
        let gathered = gathered / samples as f32;
        (gathered.max_element() >= INDIRECT_EPSILON).then_some(gathered)
    }

    /// Fraction of unoccluded hemisphere within `ao_depth`, remapped.
    pub fn ambient_occlusion<R: Rng>(&self, ray: &mut LightRay, rng: &mut R) -> f32 {
        let samples = self.settings.ao_samples;
        if samples == 0 {
            return 1.0;
        }
        let normal = ray.point.normal;
        let bias = self.settings.ray_bias;

        let occluded = (0..samples)
            .filter(|_| {
                let dir = cosine_hemisphere(normal, rng.gen(), rng.gen());
                let sample_ray = *ray.aim(dir, bias, 0.0, self.settings.ao_depth);
                self.intersector.occluded(&sample_ray)
            })
            .count();

        let open = 1.0 - occluded as f32 / samples as f32;
        (open * self.settings.ao_multiply).clamp(self.settings.ao_min.min(1.0), 1.0)
    }
}
