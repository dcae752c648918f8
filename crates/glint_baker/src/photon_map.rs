//! Per-mesh photon storage and density estimation.
//!
//! Photons are binned at deposit time into the texel (texel layout) or the
//! nearest vertex (vertex layout) of the triangle they hit. `gather` turns
//! the bins into an irradiance estimate with a disk kernel.

use std::f32::consts::PI;

use glint_math::{barycentric_lerp, Vec2, Vec3};

use crate::radiance::Color;

enum Bins {
    Texel {
        width: u32,
        height: u32,
        /// Lightmap UVs per triangle corner
        triangle_uvs: Vec<[Vec2; 3]>,
        /// Texels that carry a bake sample
        covered: Vec<bool>,
        texel_world_area: f32,
    },
    Vertex {
        positions: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        texel_density: f32,
    },
}

pub struct PhotonMap {
    bins: Bins,
    energy: Vec<Color>,
    counts: Vec<u32>,
    gathered: Option<Vec<Option<Color>>>,
}

impl PhotonMap {
    /// Map over a `width x height` lightmap.
    ///
    /// `texel_world_area` is the surface area one texel stands for.
    pub fn texel(
        width: u32,
        height: u32,
        triangle_uvs: Vec<[Vec2; 3]>,
        covered: Vec<bool>,
        texel_world_area: f32,
    ) -> Self {
        let len = (width * height) as usize;
        debug_assert_eq!(covered.len(), len);
        Self {
            bins: Bins::Texel {
                width,
                height,
                triangle_uvs,
                covered,
                texel_world_area,
            },
            energy: vec![Color::ZERO; len],
            counts: vec![0; len],
            gathered: None,
        }
    }

    /// Map over world-space vertices.
    pub fn vertex(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, texel_density: f32) -> Self {
        let len = positions.len();
        Self {
            bins: Bins::Vertex {
                positions,
                triangles,
                texel_density,
            },
            energy: vec![Color::ZERO; len],
            counts: vec![0; len],
            gathered: None,
        }
    }

    fn bin(&self, triangle: u32, bary: Vec2) -> Option<usize> {
        match &self.bins {
            Bins::Texel {
                width,
                height,
                triangle_uvs,
                ..
            } => {
                let [a, b, c] = triangle_uvs.get(triangle as usize)?;
                let uv = barycentric_lerp(*a, *b, *c, bary.x, bary.y);
                let x = ((uv.x * *width as f32).floor() as i64).clamp(0, *width as i64 - 1);
                let y = ((uv.y * *height as f32).floor() as i64).clamp(0, *height as i64 - 1);
                Some((y as u32 * width + x as u32) as usize)
            }
            Bins::Vertex { triangles, .. } => {
                let tri = triangles.get(triangle as usize)?;
                let weights = [1.0 - bary.x - bary.y, bary.x, bary.y];
                let corner = (0..3)
                    .max_by(|&i, &j| weights[i].total_cmp(&weights[j]))
                    .unwrap_or(0);
                Some(tri[corner] as usize)
            }
        }
    }

    /// Store photon energy at a hit. Returns false if the location is invalid.
    pub fn deposit(&mut self, triangle: u32, bary: Vec2, energy: Color) -> bool {
        match self.bin(triangle, bary) {
            Some(index) if index < self.energy.len() => {
                self.energy[index] += energy;
                self.counts[index] += 1;
                true
            }
            _ => false,
        }
    }

    pub fn photon_count(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn is_gathered(&self) -> bool {
        self.gathered.is_some()
    }

    /// Drop all deposits and gathered values.
    pub fn reset(&mut self) {
        self.energy.fill(Color::ZERO);
        self.counts.fill(0);
        self.gathered = None;
    }

    /// Estimate irradiance per bin with a disk kernel of `radius` texels.
    pub fn gather(&mut self, radius: f32) {
        let radius = radius.max(0.5);
        let gathered = match &self.bins {
            Bins::Texel {
                width,
                height,
                covered,
                texel_world_area,
                ..
            } => {
                let (w, h) = (*width as i64, *height as i64);
                let reach = radius.ceil() as i64;
                let r2 = radius * radius;
                let kernel_area = PI * r2 * texel_world_area;

                (0..h)
                    .flat_map(|y| (0..w).map(move |x| (x, y)))
                    .map(|(x, y)| {
                        if !covered[(y * w + x) as usize] || kernel_area <= 0.0 {
                            return None;
                        }
                        let mut sum = Color::ZERO;
                        for ny in (y - reach).max(0)..=(y + reach).min(h - 1) {
                            for nx in (x - reach).max(0)..=(x + reach).min(w - 1) {
                                let (dx, dy) = ((nx - x) as f32, (ny - y) as f32);
                                if dx * dx + dy * dy <= r2 {
                                    sum += self.energy[(ny * w + nx) as usize];
                                }
                            }
                        }
                        Some(sum / kernel_area)
                    })
                    .collect()
            }
            Bins::Vertex {
                positions,
                texel_density,
                ..
            } => {
                let world_radius = radius / texel_density.max(f32::EPSILON);
                let r2 = world_radius * world_radius;
                let kernel_area = PI * r2;

                positions
                    .iter()
                    .map(|p| {
                        let sum = positions
                            .iter()
                            .zip(&self.energy)
                            .filter(|(q, _)| p.distance_squared(**q) <= r2)
                            .fold(Color::ZERO, |acc, (_, e)| acc + *e);
                        Some(sum / kernel_area)
                    })
                    .collect()
            }
        };
        self.gathered = Some(gathered);
    }

    /// Gathered color at a surface location.
    ///
    /// `None` before `gather` or where the location has no sample.
    pub fn photon(&self, triangle: u32, bary: Vec2) -> Option<Color> {
        let gathered = self.gathered.as_ref()?;
        let index = self.bin(triangle, bary)?;
        gathered.get(index).copied().flatten()
    }
}
