//! Glint Core - scene description consumed by the lightmap baker.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Node`, `StaticModel`, `LightComponent`, `ZoneComponent`
//! - **Geometry**: `Model` made of `Mesh` geometries with an optional lightmap UV set
//! - **Materials**: `Material` and the `TextureCache` used for alpha-masked occluders
//! - **Settings**: `BakeSettings`, the complete configuration of one bake
//! - **Loading**: JSON scene files via `load_scene`
//! - **UV generation**: the `LightmapUvGenerator` seam for meshes without a second UV set
//!
//! # Example
//!
//! ```ignore
//! use glint_core::{load_scene, BakeSettings};
//!
//! let scene = load_scene("courtyard.json")?;
//! let settings = BakeSettings::from_json_file("bake.json")?;
//! println!("{} nodes, {} static models", scene.nodes.len(), scene.static_model_count());
//! ```

pub mod loader;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod settings;
pub mod texture;
pub mod uvgen;

// Re-export commonly used types
pub use loader::{load_scene, load_scene_from_str, LoadError, LoadResult};
pub use material::Material;
pub use mesh::{LightmapSizeHint, Mesh, Model};
pub use scene::{
    BakeTarget, LightComponent, LightKind, Node, Scene, StaticModel, Transform, ZoneComponent,
};
pub use settings::{BakeSettings, ConfigError, OutputFormat, ToneMapping};
pub use texture::{Texture, TextureCache, TextureError};
pub use uvgen::{apply_generated_uvs, GeneratedUvs, GeneratedVertex, LightmapUvGenerator, UvGenError};
