//! Photon emission into the per-mesh photon maps.
//!
//! Each emitting light traces `photon_pass_count * photons_per_pass` paths.
//! Lights are traced in parallel with rayon. Deposits into one mesh's map are
//! serialized by that map's write lock.

use std::sync::PoisonError;

use glint_core::BakeSettings;
use glint_math::{cosine_hemisphere, Ray, Vec2};
use rand::Rng;
use rayon::prelude::*;

use crate::lighting::{bake_rng, BakeScene};
use crate::light::BakeLight;
use crate::radiance::Color;

/// Keeps light RNG streams apart from mesh task streams.
const LIGHT_SEED_SALT: u64 = 0x5EED_0F11_6E75;

pub struct Photons<'a> {
    scene: &'a BakeScene,
    settings: &'a BakeSettings,
    pass: u32,
}

impl<'a> Photons<'a> {
    pub fn new(scene: &'a BakeScene, settings: &'a BakeSettings) -> Self {
        Self {
            scene,
            settings,
            pass: 0,
        }
    }

    /// GI pass index, mixed into the RNG seed.
    pub fn with_pass(mut self, pass: u32) -> Self {
        self.pass = pass;
        self
    }

    /// Clear every photon map.
    pub fn reset(&self) {
        self.scene.meshes().par_iter().for_each(|mesh| {
            if let Some(map) = mesh.photon_map() {
                map.write().unwrap_or_else(PoisonError::into_inner).reset();
            }
        });
    }

    /// Trace photons from every emitting light. Returns the number of deposits.
    pub fn emit(&self, lights: &[BakeLight]) -> usize {
        let emitters: Vec<(usize, &BakeLight)> = lights
            .iter()
            .enumerate()
            .filter(|(_, light)| light.emits_photons())
            .collect();

        let deposits = emitters
            .par_iter()
            .map(|&(index, light)| self.emit_light(index, light))
            .sum();

        log::info!(
            "Photons: {} deposits from {} emitting lights (pass {})",
            deposits,
            emitters.len(),
            self.pass
        );
        deposits
    }

    /// Turn deposits into irradiance estimates on every map.
    pub fn gather(&self) {
        let radius = self.settings.final_gather_radius;
        self.scene.meshes().par_iter().for_each(|mesh| {
            if let Some(map) = mesh.photon_map() {
                map.write().unwrap_or_else(PoisonError::into_inner).gather(radius);
            }
        });
    }

    fn emit_light(&self, index: usize, light: &BakeLight) -> usize {
        let passes = self.settings.photon_pass_count;
        let per_pass = self.settings.photons_per_pass;
        let total = passes as u64 * per_pass as u64;
        if total == 0 {
            return 0;
        }

        let mut rng = bake_rng(self.settings.seed ^ LIGHT_SEED_SALT, index, self.pass);
        let scale = 1.0 / total as f32;
        let mut deposits = 0;
        for _ in 0..passes {
            for _ in 0..per_pass {
                deposits += self.trace(light, &mut rng, scale);
            }
        }
        deposits
    }

    /// Follow one photon path, returning how many deposits it made.
    fn trace<R: Rng>(&self, light: &BakeLight, rng: &mut R, scale: f32) -> usize {
        let bounds = self.scene.bounds();
        let Some(emission) = light.emit_photon(rng, &bounds) else {
            return 0;
        };

        let intersector = self.scene.intersector();
        let bias = self.settings.ray_bias;
        let bounces = self.settings.effective_photon_bounces();
        let threshold = self.settings.photon_energy_threshold;

        let mut origin = emission.origin;
        let mut direction = emission.direction;
        let mut max_distance = self.settings.photon_max_distance;
        if !emission.positional {
            // Directional photons start outside the scene
            max_distance += bounds.bounding_radius() * 4.0;
        }

        let mut energy = Color::ZERO;
        let mut throughput = Color::ONE;
        let mut deposits = 0;

        for depth in 0..=bounces {
            let ray = Ray::new(origin, direction).with_range(bias, max_distance);
            let Some(hit) = intersector.intersect(&ray) else {
                break;
            };
            let position = ray.at(hit.distance);

            if depth == 0 {
                let mut factor = light.intensity * emission.weight * scale * light.cutoff(position);
                if emission.positional {
                    factor *= hit.distance * hit.distance * light.attenuation(hit.distance);
                }
                if factor <= 0.0 {
                    break;
                }
                energy = light.color * factor;
            }

            let Some(mesh) = intersector
                .owner(hit.geometry)
                .and_then(|owner| self.scene.mesh(owner))
            else {
                break;
            };
            let Some(triangle) = mesh.triangle(hit.primitive) else {
                break;
            };
            if direction.dot(triangle.face_normal) >= 0.0 {
                break;
            }

            let albedo = mesh.albedo();
            if let Some(map) = mesh.photon_map() {
                let mut map = map.write().unwrap_or_else(PoisonError::into_inner);
                if map.deposit(hit.primitive, Vec2::new(hit.u, hit.v), energy * albedo) {
                    deposits += 1;
                }
            }

            energy *= albedo;
            throughput *= albedo;
            if throughput.max_element() < threshold {
                break;
            }

            origin = position + triangle.face_normal * bias;
            direction = cosine_hemisphere(triangle.face_normal, rng.gen(), rng.gen());
            max_distance = self.settings.photon_max_distance;
        }

        deposits
    }
}
