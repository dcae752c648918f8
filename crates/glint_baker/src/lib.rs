//! Glint Baker - CPU lightmap baking
//!
//! Direct light, photon-mapped indirect light with a final gather, and
//! ambient occlusion, evaluated per lightmap texel (or per vertex) and
//! packed into atlases.
//!
//! ```ignore
//! let mut baker = SceneBaker::new(settings.clone())?;
//! baker.load_scene(&scene, None)?;
//! let queue = WorkQueue::new(settings.worker_threads)?;
//! baker.bake(&queue)?;
//! let output = baker.generate_lightmaps()?;
//! output.save("lightmaps", settings.output_format)?;
//! baker.bake_data().write("lightmaps/scene.bake")?;
//! ```

mod bake_data;
mod bake_mesh;
mod bvh;
#[cfg(feature = "embree")]
mod embree;
mod error;
mod intersector;
mod light;
mod light_ray;
mod lighting;
mod packer;
mod photon_map;
mod photons;
mod radiance;
mod scene_baker;
mod skyline;
mod work_queue;

#[cfg(test)]
mod test_scenes;

pub use bake_data::{ApplyError, BakeData, BakeRecord, VertexColorData, VertexColorRecord};
pub use bake_mesh::{
    lightmap_size, BakeMesh, BakeTriangle, BakeVertex, MeshId, MeshSource, Placement, SampleLayout,
};
pub use bvh::BvhAccelerator;
#[cfg(feature = "embree")]
pub use embree::EmbreeAccelerator;
pub use error::{BakeError, BakeResult};
pub use intersector::{Accelerator, AlphaMask, GeometryId, RayHit, RayIntersector};
pub use light::{
    AmbientInfluence, AreaInfluence, BakeLight, BakeLightKind, DirectionalInfluence, Influence,
    LambertInfluence, LightAttenuation, LightCutoff, LightInfluence, LightVertex,
    LightVertexGenerator, LinearAttenuation, PhotonEmission, SmoothAttenuation, SpotCutoff,
};
pub use light_ray::{LightRay, SamplePoint};
pub use lighting::{bake_rng, BakeScene};
pub use packer::{lightmap_name, save_atlases, LightMapPacker};
pub use photon_map::PhotonMap;
pub use photons::Photons;
pub use radiance::{clamp_01, color_to_rgb, linear_to_gamma, Color, Radiance};
pub use scene_baker::{Advance, LightCycle, LightMode, LightmapOutput, SceneBaker};
pub use skyline::{Rect, SkylinePacker};
pub use work_queue::{Job, WorkQueue};
