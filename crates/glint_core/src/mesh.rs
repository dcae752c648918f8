//! Model geometry as handed to the baker.
//!
//! A `Model` is a named list of `Mesh` geometries. Each geometry carries its
//! vertex streams in model space; the lightmap UV set (second texture
//! coordinate channel) is optional and may be produced later by a
//! `LightmapUvGenerator`.

use glint_math::{Aabb, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// One triangle geometry of a model.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - computed on demand if missing)
    pub normals: Option<Vec<Vec3>>,

    /// Material texture coordinates (channel 0)
    pub uvs: Option<Vec<Vec2>>,

    /// Lightmap texture coordinates (channel 1), in [0, 1]
    pub lightmap_uvs: Option<Vec<Vec2>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Aabb::from_iter_points(positions.iter().copied());
        Self {
            positions,
            normals,
            uvs: None,
            lightmap_uvs: None,
            indices,
            bounds,
        }
    }

    /// Set the material UV channel.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Set the lightmap UV channel.
    pub fn with_lightmap_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.lightmap_uvs = Some(uvs);
        self
    }

    /// Compute smooth vertex normals by averaging counter-clockwise face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for [i0, i1, i2] in self.triangles() {
            let (i0, i1, i2) = (i0 as usize, i1 as usize, i2 as usize);
            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Ensure the mesh has per-vertex normals, computing them if necessary.
    pub fn ensure_normals(&mut self) {
        let should_compute = match &self.normals {
            None => true,
            Some(normals) => normals.len() != self.positions.len(),
        };

        if should_compute {
            if let Some(normals) = &self.normals {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    normals.len(),
                    self.positions.len()
                );
            }
            self.compute_normals();
        }
    }

    /// True if a lightmap UV per vertex is present.
    pub fn has_lightmap_uvs(&self) -> bool {
        self.lightmap_uvs
            .as_ref()
            .is_some_and(|uvs| uvs.len() == self.positions.len())
    }

    /// Number of texture coordinate channels with one entry per vertex.
    pub fn uv_channel_count(&self) -> usize {
        let channel = |c: &Option<Vec<Vec2>>| {
            c.as_ref().is_some_and(|uvs| uvs.len() == self.positions.len()) as usize
        };
        channel(&self.uvs) + channel(&self.lightmap_uvs)
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Iterate triangle index triplets, skipping any that reference missing vertices.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        let vertex_count = self.positions.len();
        self.indices.chunks_exact(3).filter_map(move |chunk| {
            let tri = [chunk[0], chunk[1], chunk[2]];
            if tri.iter().any(|&i| i as usize >= vertex_count) {
                log::warn!(
                    "Invalid triangle indices: {:?}, vertex count: {}",
                    tri,
                    vertex_count
                );
                return None;
            }
            Some(tri)
        })
    }

    /// Total surface area in model space.
    pub fn surface_area(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| {
                let p0 = self.positions[a as usize];
                let p1 = self.positions[b as usize];
                let p2 = self.positions[c as usize];
                (p1 - p0).cross(p2 - p0).length() * 0.5
            })
            .sum()
    }
}

/// Authored lightmap resolution of a model, at a known texel density.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightmapSizeHint {
    pub width: u32,
    pub height: u32,
    /// Texels per world unit the size was authored for
    pub texel_density: f32,
}

/// A named collection of geometries sharing one transform.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub name: String,
    pub geometries: Vec<Mesh>,
    pub lightmap_size: Option<LightmapSizeHint>,
}

impl Model {
    pub fn new(name: impl Into<String>, geometries: Vec<Mesh>) -> Self {
        Self {
            name: name.into(),
            geometries,
            lightmap_size: None,
        }
    }

    pub fn with_lightmap_size(mut self, hint: LightmapSizeHint) -> Self {
        self.lightmap_size = Some(hint);
        self
    }

    /// Local-space bounds of all geometries.
    pub fn bounds(&self) -> Aabb {
        self.geometries
            .iter()
            .fold(Aabb::EMPTY, |acc, g| Aabb::surrounding(&acc, &g.bounds))
    }

    /// True when every geometry carries a lightmap UV set.
    pub fn has_lightmap_uvs(&self) -> bool {
        !self.geometries.is_empty() && self.geometries.iter().all(Mesh::has_lightmap_uvs)
    }

    pub fn surface_area(&self) -> f32 {
        self.geometries.iter().map(Mesh::surface_area).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.geometries.iter().map(Mesh::triangle_count).sum()
    }
}
