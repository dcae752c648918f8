//! Lightmap UV generation seam.
//!
//! Unwrapping is done by an external tool. It sees the whole model (all
//! geometries concatenated) and returns a new vertex list where every vertex
//! names the geometry and source vertex it was split from, plus the new
//! lightmap UV. `apply_generated_uvs` turns that back into per-geometry meshes.

use std::collections::HashMap;

use glint_math::Vec2;
use thiserror::Error;

use crate::mesh::{LightmapSizeHint, Mesh, Model};

#[derive(Error, Debug)]
pub enum UvGenError {
    #[error("Model '{model}': triangle {triangle} mixes vertices from different geometries")]
    MixedGeometry { model: String, triangle: usize },

    #[error("Model '{model}': lightmap UV generation failed: {reason}")]
    Failed { model: String, reason: String },
}

/// One output vertex of an unwrap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratedVertex {
    /// Geometry index within the model
    pub geometry: usize,
    /// Vertex index within that geometry
    pub source_index: u32,
    /// Lightmap UV in [0, 1]
    pub uv: Vec2,
}

/// Result of unwrapping one model.
#[derive(Clone, Debug, Default)]
pub struct GeneratedUvs {
    pub vertices: Vec<GeneratedVertex>,
    /// Triangles over `vertices`
    pub indices: Vec<u32>,
    pub size_hint: Option<LightmapSizeHint>,
}

/// Produces a lightmap UV set for models that lack one.
pub trait LightmapUvGenerator: Send + Sync {
    fn generate(&self, model: &Model) -> Result<GeneratedUvs, UvGenError>;
}

/// Rebuild `model`'s geometries from an unwrap result.
///
/// Source vertex attributes are duplicated where the unwrap split a vertex.
/// A triangle whose corners come from different geometries is rejected.
pub fn apply_generated_uvs(model: &Model, generated: &GeneratedUvs) -> Result<Model, UvGenError> {
    let failed = |reason: String| UvGenError::Failed {
        model: model.name.clone(),
        reason,
    };

    if generated.indices.len() % 3 != 0 {
        return Err(failed(format!(
            "index count {} is not a multiple of 3",
            generated.indices.len()
        )));
    }

    for v in &generated.vertices {
        let geometry = model
            .geometries
            .get(v.geometry)
            .ok_or_else(|| failed(format!("unknown geometry {}", v.geometry)))?;
        if v.source_index as usize >= geometry.positions.len() {
            return Err(failed(format!(
                "source vertex {} out of range in geometry {}",
                v.source_index, v.geometry
            )));
        }
    }

    // Per geometry: output vertex -> new local index, and the triangles
    let mut remaps: Vec<HashMap<u32, u32>> = vec![HashMap::new(); model.geometries.len()];
    let mut rebuilt: Vec<Mesh> = model
        .geometries
        .iter()
        .map(|_| Mesh::default())
        .collect();

    for (triangle, corners) in generated.indices.chunks_exact(3).enumerate() {
        let mut geometry = None;
        for &corner in corners {
            let vertex = generated
                .vertices
                .get(corner as usize)
                .ok_or_else(|| failed(format!("index {} out of range", corner)))?;
            match geometry {
                None => geometry = Some(vertex.geometry),
                Some(g) if g != vertex.geometry => {
                    return Err(UvGenError::MixedGeometry {
                        model: model.name.clone(),
                        triangle,
                    });
                }
                Some(_) => {}
            }
        }

        let Some(g) = geometry else { continue };
        let source = &model.geometries[g];
        let target = &mut rebuilt[g];
        let remap = &mut remaps[g];

        for &corner in corners {
            let local = *remap.entry(corner).or_insert_with(|| {
                let vertex = &generated.vertices[corner as usize];
                let si = vertex.source_index as usize;

                target.positions.push(source.positions[si]);
                if let Some(normals) = source.normals.as_ref().filter(|n| n.len() == source.positions.len()) {
                    target.normals.get_or_insert_with(Vec::new).push(normals[si]);
                }
                if let Some(uvs) = source.uvs.as_ref().filter(|u| u.len() == source.positions.len()) {
                    target.uvs.get_or_insert_with(Vec::new).push(uvs[si]);
                }
                target
                    .lightmap_uvs
                    .get_or_insert_with(Vec::new)
                    .push(vertex.uv);

                (target.positions.len() - 1) as u32
            });
            target.indices.push(local);
        }
    }

    for mesh in &mut rebuilt {
        mesh.bounds = glint_math::Aabb::from_iter_points(mesh.positions.iter().copied());
    }

    Ok(Model {
        name: model.name.clone(),
        geometries: rebuilt,
        lightmap_size: generated.size_hint.or(model.lightmap_size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_math::Vec3;

    fn two_triangle_model() -> Model {
        let tri = |z: f32| {
            Mesh::new(
                vec![Vec3::new(0.0, 0.0, z), Vec3::new(1.0, 0.0, z), Vec3::new(0.0, 1.0, z)],
                vec![0, 1, 2],
                None,
            )
            .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::Y])
        };
        Model::new("pair", vec![tri(0.0), tri(1.0)])
    }

    fn vertex(geometry: usize, source_index: u32, u: f32, v: f32) -> GeneratedVertex {
        GeneratedVertex {
            geometry,
            source_index,
            uv: Vec2::new(u, v),
        }
    }

    #[test]
    fn test_apply_rebuilds_each_geometry() {
        let model = two_triangle_model();
        let generated = GeneratedUvs {
            vertices: vec![
                vertex(0, 0, 0.0, 0.0),
                vertex(0, 1, 0.5, 0.0),
                vertex(0, 2, 0.0, 0.5),
                vertex(1, 0, 0.5, 0.5),
                vertex(1, 1, 1.0, 0.5),
                vertex(1, 2, 0.5, 1.0),
            ],
            indices: vec![0, 1, 2, 3, 4, 5],
            size_hint: None,
        };

        let result = apply_generated_uvs(&model, &generated).unwrap();
        assert_eq!(result.geometries.len(), 2);
        assert!(result.has_lightmap_uvs());

        let second = &result.geometries[1];
        assert_eq!(second.indices, vec![0, 1, 2]);
        assert_eq!(second.positions[1], Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(second.lightmap_uvs.as_ref().unwrap()[2], Vec2::new(0.5, 1.0));
        assert_eq!(second.uvs.as_ref().unwrap()[1], Vec2::X);
    }

    #[test]
    fn test_apply_duplicates_split_vertices() {
        let model = two_triangle_model();
        // Same source vertex used twice with different UVs (a seam)
        let generated = GeneratedUvs {
            vertices: vec![
                vertex(0, 0, 0.0, 0.0),
                vertex(0, 1, 0.5, 0.0),
                vertex(0, 2, 0.0, 0.5),
                vertex(0, 0, 0.9, 0.9),
            ],
            indices: vec![0, 1, 2, 3, 1, 2],
            size_hint: None,
        };

        let result = apply_generated_uvs(&model, &generated).unwrap();
        let first = &result.geometries[0];
        assert_eq!(first.vertex_count(), 4);
        assert_eq!(first.indices, vec![0, 1, 2, 3, 1, 2]);
        assert_eq!(first.positions[3], first.positions[0]);
        // Untouched geometry ends up empty
        assert_eq!(result.geometries[1].triangle_count(), 0);
    }

    #[test]
    fn test_mixed_geometry_rejected() {
        let model = two_triangle_model();
        let generated = GeneratedUvs {
            vertices: vec![
                vertex(0, 0, 0.0, 0.0),
                vertex(0, 1, 0.5, 0.0),
                vertex(1, 2, 0.0, 0.5),
            ],
            indices: vec![0, 1, 2],
            size_hint: None,
        };

        let err = apply_generated_uvs(&model, &generated).unwrap_err();
        assert!(matches!(err, UvGenError::MixedGeometry { triangle: 0, .. }));
    }

    #[test]
    fn test_out_of_range_source_rejected() {
        let model = two_triangle_model();
        let generated = GeneratedUvs {
            vertices: vec![vertex(0, 7, 0.0, 0.0)],
            indices: vec![],
            size_hint: None,
        };
        assert!(matches!(
            apply_generated_uvs(&model, &generated),
            Err(UvGenError::Failed { .. })
        ));
    }
}
