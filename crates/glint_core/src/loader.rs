//! JSON scene loading.
//!
//! The file lists models and materials once and references them by name from
//! node components:
//!
//! ```json
//! {
//!   "name": "courtyard",
//!   "models": [{ "name": "floor", "geometries": [{ "positions": [[0,0,0], ...], "indices": [0,1,2] }] }],
//!   "materials": [{ "name": "stone", "albedo": [0.6, 0.6, 0.6] }],
//!   "nodes": [
//!     { "id": 1, "name": "Floor", "static_model": { "id": 1, "model": "floor", "material": "stone" } },
//!     { "id": 2, "name": "Sun", "light": { "kind": "directional", "direction": [0, -1, 0] } }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glint_math::{Vec2, Vec3};
use serde::Deserialize;
use thiserror::Error;

use crate::material::Material;
use crate::mesh::{LightmapSizeHint, Mesh, Model};
use crate::scene::{
    BakeTarget, LightComponent, Node, Scene, StaticModel, Transform, ZoneComponent,
};

/// Errors that can occur during scene loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node '{node}' references unknown model '{model}'")]
    UnknownModel { node: String, model: String },

    #[error("Node '{node}' references unknown material '{material}'")]
    UnknownMaterial { node: String, material: String },

    #[error("Invalid geometry {index} in model '{model}': {reason}")]
    InvalidGeometry {
        model: String,
        index: usize,
        reason: String,
    },
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Deserialize)]
struct SceneDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    models: Vec<ModelDocument>,
    #[serde(default)]
    materials: Vec<Material>,
    #[serde(default)]
    nodes: Vec<NodeDocument>,
}

#[derive(Deserialize)]
struct ModelDocument {
    name: String,
    geometries: Vec<GeometryDocument>,
    #[serde(default)]
    lightmap_size: Option<LightmapSizeHint>,
}

#[derive(Deserialize)]
struct GeometryDocument {
    #[serde(default)]
    positions: Vec<Vec3>,
    #[serde(default)]
    normals: Option<Vec<Vec3>>,
    #[serde(default)]
    uvs: Option<Vec<Vec2>>,
    #[serde(default)]
    lightmap_uvs: Option<Vec<Vec2>>,
    #[serde(default)]
    indices: Vec<u32>,
}

#[derive(Deserialize)]
struct NodeDocument {
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default)]
    transform: Transform,
    #[serde(default)]
    static_model: Option<StaticModelDocument>,
    #[serde(default)]
    light: Option<LightComponent>,
    #[serde(default)]
    zone: Option<ZoneComponent>,
}

#[derive(Deserialize)]
struct StaticModelDocument {
    id: u32,
    model: String,
    #[serde(default)]
    material: Option<String>,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default = "all_bits")]
    light_mask: u32,
    #[serde(default = "all_bits")]
    zone_mask: u32,
    #[serde(default = "enabled")]
    cast_shadows: bool,
    #[serde(default = "enabled")]
    lightmap: bool,
    #[serde(default)]
    target: BakeTarget,
}

fn enabled() -> bool {
    true
}

fn all_bits() -> u32 {
    u32::MAX
}

/// Load a JSON scene file. Relative texture paths resolve against its directory.
pub fn load_scene<P: AsRef<Path>>(path: P) -> LoadResult<Scene> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let mut scene = load_scene_from_str(&json)?;

    if scene.name.is_empty() {
        scene.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
    }
    scene.base_dir = path.parent().map(Path::to_path_buf);

    log::info!(
        "Loaded scene '{}': {} nodes, {} static models",
        scene.name,
        scene.nodes.len(),
        scene.static_model_count()
    );

    Ok(scene)
}

/// Parse a scene from a JSON string.
pub fn load_scene_from_str(json: &str) -> LoadResult<Scene> {
    let doc: SceneDocument = serde_json::from_str(json)?;

    let mut models: HashMap<String, Arc<Model>> = HashMap::new();
    for model_doc in doc.models {
        let model = build_model(model_doc)?;
        models.insert(model.name.clone(), Arc::new(model));
    }

    let materials: HashMap<String, Arc<Material>> = doc
        .materials
        .into_iter()
        .map(|m| (m.name.clone(), Arc::new(m)))
        .collect();

    let mut scene = Scene::new(doc.name);
    for node_doc in doc.nodes {
        let static_model = match node_doc.static_model {
            Some(sm) => Some(resolve_static_model(&node_doc.name, sm, &models, &materials)?),
            None => None,
        };

        scene.add_node(Node {
            id: node_doc.id,
            name: node_doc.name,
            enabled: node_doc.enabled,
            transform: node_doc.transform,
            static_model,
            light: node_doc.light,
            zone: node_doc.zone,
        });
    }

    Ok(scene)
}

fn build_model(doc: ModelDocument) -> LoadResult<Model> {
    let mut geometries = Vec::with_capacity(doc.geometries.len());

    for (index, geom) in doc.geometries.into_iter().enumerate() {
        let invalid = |reason: String| LoadError::InvalidGeometry {
            model: doc.name.clone(),
            index,
            reason,
        };

        if geom.indices.len() % 3 != 0 {
            return Err(invalid(format!(
                "index count {} is not a multiple of 3",
                geom.indices.len()
            )));
        }
        if let Some(&bad) = geom
            .indices
            .iter()
            .find(|&&i| i as usize >= geom.positions.len())
        {
            return Err(invalid(format!(
                "index {} out of range for {} vertices",
                bad,
                geom.positions.len()
            )));
        }

        let mut mesh = Mesh::new(geom.positions, geom.indices, geom.normals);
        mesh.uvs = geom.uvs;
        mesh.lightmap_uvs = geom.lightmap_uvs;
        geometries.push(mesh);
    }

    let mut model = Model::new(doc.name, geometries);
    model.lightmap_size = doc.lightmap_size;
    Ok(model)
}

fn resolve_static_model(
    node_name: &str,
    doc: StaticModelDocument,
    models: &HashMap<String, Arc<Model>>,
    materials: &HashMap<String, Arc<Material>>,
) -> LoadResult<StaticModel> {
    let model = models
        .get(&doc.model)
        .cloned()
        .ok_or_else(|| LoadError::UnknownModel {
            node: node_name.to_string(),
            model: doc.model.clone(),
        })?;

    let material = match doc.material {
        Some(name) => Some(materials.get(&name).cloned().ok_or_else(|| {
            LoadError::UnknownMaterial {
                node: node_name.to_string(),
                material: name.clone(),
            }
        })?),
        None => None,
    };

    let mut static_model = StaticModel::new(doc.id, model)
        .with_cast_shadows(doc.cast_shadows)
        .with_lightmap(doc.lightmap)
        .with_target(doc.target)
        .with_zone_mask(doc.zone_mask);
    static_model.enabled = doc.enabled;
    static_model.light_mask = doc.light_mask;
    static_model.material = material;

    Ok(static_model)
}
