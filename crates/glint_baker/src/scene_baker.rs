//! Bake orchestration: scene loading and the light-mode state machine.
//!
//! ```text
//! Undefined --light(Direct)--> Direct --light(Indirect)--> Indirect --+
//!                                 |                          ^        |
//!                                 |                          +--------+  (gi_passes)
//!                                 +------------------------------------> Complete
//! ```
//!
//! Every stage queues one task per receiving mesh on a `WorkQueue`. The
//! caller drains the queue between stages, either by hand or through
//! `advance` / `bake`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use glint_core::{
    apply_generated_uvs, BakeSettings, BakeTarget, LightKind, LightmapUvGenerator, Model, Scene,
    StaticModel, TextureCache, UvGenError,
};
use glint_math::{Aabb, Mat4Ext, Vec3};
use image::RgbImage;
use rayon::prelude::*;

use crate::bake_data::{BakeData, BakeRecord, VertexColorData, VertexColorRecord};
use crate::bake_mesh::{lightmap_size, BakeMesh, MeshId, MeshSource, Placement, SampleLayout};
use crate::error::{BakeError, BakeResult};
use crate::intersector::{AlphaMask, RayIntersector};
use crate::light::{BakeLight, LightVertexGenerator};
use crate::lighting::BakeScene;
use crate::packer::{lightmap_name, save_atlases, LightMapPacker};
use crate::photons::Photons;
use crate::radiance::Color;
use crate::work_queue::WorkQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightMode {
    Undefined,
    Direct,
    Indirect,
    Complete,
}

/// Result of requesting a light stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCycle {
    WorkQueued,
    NoWork,
}

/// Result of one `advance` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    WorkQueued,
    StageComplete,
}

/// Everything `generate_lightmaps` produces.
pub struct LightmapOutput {
    pub atlases: Vec<RgbImage>,
    pub placements: Vec<(MeshId, Placement)>,
    /// Gamma-corrected colors of vertex-target meshes
    pub vertex_colors: Vec<(MeshId, Vec<Color>)>,
}

impl LightmapOutput {
    pub fn save<P: AsRef<std::path::Path>>(
        &self,
        dir: P,
        format: glint_core::OutputFormat,
    ) -> BakeResult<Vec<String>> {
        save_atlases(&self.atlases, dir, format)
    }
}

/// World-space zone volume used for ambient assignment.
struct ZoneVolume {
    bounds: Aabb,
    priority: i32,
    zone_mask: u32,
}

/// Highest priority zone containing `center`, first wins ties.
fn assign_zone(zones: &[ZoneVolume], center: Vec3, zone_mask: u32) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (index, zone) in zones.iter().enumerate() {
        if zone.zone_mask & zone_mask == 0 || !zone.bounds.contains(center) {
            continue;
        }
        if best.map_or(true, |(_, priority)| zone.priority > priority) {
            best = Some((index, zone.priority));
        }
    }
    best.map(|(index, _)| index)
}

/// Lightmap-UV prepared models, keyed by source model identity.
type PreparedModels = HashMap<usize, Option<Arc<Model>>>;

pub struct SceneBaker {
    settings: BakeSettings,
    scene: Option<Arc<BakeScene>>,
    mode: LightMode,
    gi_pass: u32,
    priority: u32,
    atlas_count: Option<usize>,
}

impl SceneBaker {
    pub fn new(settings: BakeSettings) -> BakeResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            scene: None,
            mode: LightMode::Undefined,
            gi_pass: 0,
            priority: 0,
            atlas_count: None,
        })
    }

    /// Work queue priority used for this baker's tasks.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    pub fn mode(&self) -> LightMode {
        self.mode
    }

    /// GI passes finished so far.
    pub fn gi_pass(&self) -> u32 {
        self.gi_pass
    }

    pub fn scene(&self) -> Option<&Arc<BakeScene>> {
        self.scene.as_ref()
    }

    /// Build bake meshes and lights from `scene` and commit the intersector.
    ///
    /// Models without a lightmap UV set go through `uv_generator` when given.
    /// A model whose UVs are missing or fail to generate still casts shadows.
    pub fn load_scene(
        &mut self,
        scene: &Scene,
        uv_generator: Option<&dyn LightmapUvGenerator>,
    ) -> BakeResult<()> {
        let start = Instant::now();
        let settings = &self.settings;

        let mut intersector = RayIntersector::new()?;
        let mut textures = match &scene.base_dir {
            Some(dir) => TextureCache::with_base_dir(dir),
            None => TextureCache::new(),
        };
        let mut prepared = PreparedModels::new();
        let mut meshes: Vec<BakeMesh> = Vec::new();
        let mut lights: Vec<BakeLight> = Vec::new();

        // Zones first, so ambient lights line up with zone indices
        let mut zones = Vec::new();
        for node in scene.nodes.iter().filter(|n| n.enabled) {
            let Some(zone) = node.zone.as_ref().filter(|z| z.enabled) else {
                continue;
            };
            lights.push(BakeLight::ambient(zone.ambient_color, zones.len()));
            zones.push(ZoneVolume {
                bounds: node.world_matrix().transform_aabb(&zone.bounds),
                priority: zone.priority,
                zone_mask: zone.zone_mask,
            });
        }

        for (node, static_model) in scene.static_models() {
            let id = meshes.len();
            let world = node.world_matrix();
            let material = static_model.material.as_deref();

            let (model, layout) = if !static_model.lightmap {
                (Arc::clone(&static_model.model), None)
            } else if static_model.target == BakeTarget::Vertex {
                (Arc::clone(&static_model.model), Some(SampleLayout::Vertex))
            } else {
                match prepare_model(&mut prepared, static_model, uv_generator) {
                    Some(model) => {
                        let size = lightmap_size(&model, &world, settings);
                        let layout = SampleLayout::Texel {
                            width: size.x,
                            height: size.y,
                        };
                        (model, Some(layout))
                    }
                    None => (Arc::clone(&static_model.model), None),
                }
            };

            let name = format!("{}/{}", node.name, model.name);
            let diffuse = material
                .and_then(|m| m.diffuse_texture.as_deref())
                .and_then(|path| match textures.load(path) {
                    Ok(texture) => Some(texture),
                    Err(e) => {
                        log::warn!("Mesh '{}': diffuse texture dropped: {}", name, e);
                        None
                    }
                });
            // Textured surfaces bounce the texture's mean color
            let albedo = match (material, &diffuse) {
                (Some(m), Some(texture)) => m.albedo * texture.average_color(),
                (Some(m), None) => m.albedo,
                (None, _) => Vec3::splat(0.5),
            };

            let center = world.transform_aabb(&model.bounds()).centroid();
            let source = MeshSource {
                name,
                node_id: node.id,
                static_model_id: static_model.id,
                light_mask: static_model.light_mask,
                model: &model,
                world,
                albedo,
                cast_shadows: static_model.cast_shadows,
                layout,
                zone: assign_zone(&zones, center, static_model.zone_mask),
            };
            let mut mesh = BakeMesh::preprocess(id, source, settings)?;

            let mask = material
                .filter(|m| m.is_occlusion_masked())
                .zip(diffuse)
                .map(|(m, texture)| {
                    Arc::new(AlphaMask::new(
                        texture,
                        m,
                        &mesh.uvs(),
                        &mesh.triangle_indices(),
                    ))
                });
            mesh.register(&mut intersector, mask);

            if let Some(m) = material.filter(|m| m.is_emissive()) {
                let generator =
                    LightVertexGenerator::new(settings.area_light_samples, settings.seed ^ id as u64);
                let vertices = generator.generate(&mesh.positions(), mesh.triangles());
                log::debug!(
                    "Mesh '{}' is an area light with {} vertices",
                    mesh.name(),
                    vertices.len()
                );
                lights.push(BakeLight::area(
                    id,
                    vertices,
                    m.emissive_color,
                    m.emissive_intensity,
                    settings.area_light_range,
                ));
            }

            meshes.push(mesh);
        }

        for node in scene.nodes.iter().filter(|n| n.enabled) {
            let Some(light) = node.light.as_ref().filter(|l| l.enabled) else {
                continue;
            };
            let position = node.transform.translation;
            let direction = node.world_direction(light.direction);
            let bake_light = match light.kind {
                LightKind::Directional => {
                    BakeLight::directional(direction, light.color, light.brightness)
                }
                LightKind::Point => {
                    BakeLight::point(position, light.color, light.brightness, light.range)
                }
                LightKind::Spot => BakeLight::spot(
                    position,
                    direction,
                    light.color,
                    light.brightness,
                    light.range,
                    light.spot_angle,
                ),
            };
            lights.push(bake_light.with_cast_shadows(light.cast_shadows));
        }

        let receivers = meshes.iter().filter(|m| m.is_receiver()).count();
        let mesh_count = meshes.len();
        let light_count = lights.len();
        let bake_scene = BakeScene::new(meshes, lights, intersector, settings.clone())?;

        log::info!(
            "Loaded scene '{}': {} meshes ({} receivers), {} lights, {} zones in {:.2?}",
            scene.name,
            mesh_count,
            receivers,
            light_count,
            zones.len(),
            start.elapsed()
        );

        self.scene = Some(Arc::new(bake_scene));
        self.mode = LightMode::Undefined;
        self.gi_pass = 0;
        self.atlas_count = None;
        Ok(())
    }

    fn loaded_scene(&self) -> BakeResult<Arc<BakeScene>> {
        self.scene.clone().ok_or(BakeError::InvalidState {
            mode: self.mode,
            reason: "no scene loaded",
        })
    }

    /// Request a light stage and queue its work.
    ///
    /// `Direct` runs once from a fresh load and `Indirect` only after it.
    /// Nothing can be requested once the bake is `Complete`.
    pub fn light(&mut self, queue: &WorkQueue, mode: LightMode) -> BakeResult<LightCycle> {
        let pending = queue.num_incomplete(self.priority);
        if pending > 0 {
            return Err(BakeError::WorkPending { pending });
        }
        let scene = self.loaded_scene()?;

        match (self.mode, mode) {
            (LightMode::Undefined, LightMode::Direct) => {
                if scene.meshes().is_empty() {
                    log::info!("No meshes to bake");
                    self.mode = LightMode::Complete;
                    return Ok(LightCycle::NoWork);
                }
                let queued = self.queue_mesh_tasks(queue, &scene, LightMode::Direct, 0);
                log::info!("Direct lighting: {} mesh tasks", queued);
                self.mode = LightMode::Direct;
                Ok(LightCycle::WorkQueued)
            }
            (LightMode::Direct | LightMode::Indirect, LightMode::Indirect) => {
                let settings = scene.settings();
                if !settings.gi_enabled || self.gi_pass >= settings.gi_passes {
                    self.mode = LightMode::Complete;
                    return Ok(LightCycle::NoWork);
                }

                log::info!("GI pass {} of {}", self.gi_pass + 1, settings.gi_passes);
                let photons = Photons::new(&scene, settings).with_pass(self.gi_pass);
                if self.gi_pass > 0 {
                    photons.reset();
                }
                if photons.emit(scene.lights()) == 0 {
                    log::info!("No photons deposited, skipping indirect lighting");
                    self.mode = LightMode::Complete;
                    return Ok(LightCycle::NoWork);
                }
                photons.gather();

                let queued =
                    self.queue_mesh_tasks(queue, &scene, LightMode::Indirect, self.gi_pass + 1);
                log::info!("Final gather: {} mesh tasks", queued);
                self.mode = LightMode::Indirect;
                Ok(LightCycle::WorkQueued)
            }
            (current, requested) => Err(BakeError::InvalidState {
                mode: current,
                reason: match requested {
                    LightMode::Direct => "direct lighting only runs once, from a fresh load",
                    LightMode::Indirect => "indirect lighting needs a finished direct stage",
                    LightMode::Undefined | LightMode::Complete => {
                        "only Direct and Indirect can be requested"
                    }
                },
            }),
        }
    }

    fn queue_mesh_tasks(
        &self,
        queue: &WorkQueue,
        scene: &Arc<BakeScene>,
        mode: LightMode,
        pass: u32,
    ) -> usize {
        let mut queued = 0;
        for mesh in scene.meshes().iter().filter(|m| m.is_receiver()) {
            let id = mesh.id();
            let scene = Arc::clone(scene);
            queue.add_work_item(self.priority, move || {
                if let Some(mesh) = scene.mesh(id) {
                    mesh.light(&scene, mode, pass);
                }
            });
            queued += 1;
        }
        queued
    }

    /// Bookkeeping after the caller drained a stage.
    pub fn light_finish_cycle(&mut self) {
        if self.mode == LightMode::Indirect {
            self.gi_pass += 1;
        }
        log::debug!("Finished {:?} cycle (GI passes done: {})", self.mode, self.gi_pass);
    }

    /// Step to the next stage once the queue is drained.
    pub fn advance(&mut self, queue: &WorkQueue) -> BakeResult<Advance> {
        let pending = queue.num_incomplete(self.priority);
        if pending > 0 {
            return Err(BakeError::WorkPending { pending });
        }

        let next = match self.mode {
            LightMode::Undefined => LightMode::Direct,
            LightMode::Direct | LightMode::Indirect => {
                self.light_finish_cycle();
                LightMode::Indirect
            }
            LightMode::Complete => return Ok(Advance::StageComplete),
        };

        match self.light(queue, next)? {
            LightCycle::WorkQueued => Ok(Advance::WorkQueued),
            LightCycle::NoWork => Ok(Advance::StageComplete),
        }
    }

    /// Run every stage to completion on `queue`.
    pub fn bake(&mut self, queue: &WorkQueue) -> BakeResult<()> {
        let start = Instant::now();
        while self.advance(queue)? == Advance::WorkQueued {
            queue.complete(self.priority);
        }
        log::info!("Bake complete in {:.2?}", start.elapsed());
        Ok(())
    }

    /// Rasterize, pack and place every receiver. Valid once, after `Complete`.
    pub fn generate_lightmaps(&mut self) -> BakeResult<LightmapOutput> {
        if self.mode != LightMode::Complete {
            return Err(BakeError::InvalidState {
                mode: self.mode,
                reason: "lightmaps can only be generated after the bake completes",
            });
        }
        if self.atlas_count.is_some() {
            return Err(BakeError::InvalidState {
                mode: self.mode,
                reason: "lightmaps were already generated",
            });
        }
        let scene = self.loaded_scene()?;
        let tone = self.settings.tone_mapping;

        let maps: Vec<(MeshId, RgbImage)> = scene
            .meshes()
            .par_iter()
            .filter_map(|mesh| mesh.generate_radiance_map(tone).map(|map| (mesh.id(), map)))
            .collect();
        let vertex_colors: Vec<(MeshId, Vec<Color>)> = scene
            .meshes()
            .iter()
            .filter_map(|mesh| mesh.vertex_colors(tone).map(|colors| (mesh.id(), colors)))
            .collect();

        let mut packer = LightMapPacker::new(&self.settings);
        for (id, map) in maps {
            packer.add_radiance_map(id, map);
        }
        let placements = packer.pack().to_vec();
        for (id, placement) in &placements {
            if let Some(mesh) = scene.mesh(*id) {
                mesh.pack(placement.atlas, placement.scale_offset);
            }
        }

        let atlases = packer.into_atlases();
        self.atlas_count = Some(atlases.len());
        Ok(LightmapOutput {
            atlases,
            placements,
            vertex_colors,
        })
    }

    /// Records for every placed mesh, with the atlas names `save` writes.
    pub fn bake_data(&self) -> BakeData {
        let Some(scene) = &self.scene else {
            return BakeData::default();
        };
        let format = self.settings.output_format;
        let lightmaps = (0..self.atlas_count.unwrap_or(0))
            .map(|index| lightmap_name(index, format))
            .collect();
        let records = scene
            .meshes()
            .iter()
            .filter_map(|mesh| {
                mesh.placement().map(|placement| BakeRecord {
                    node_id: mesh.node_id(),
                    static_model_id: mesh.static_model_id(),
                    light_mask: mesh.light_mask(),
                    lightmap_index: placement.atlas,
                    scale_offset: placement.scale_offset.to_array(),
                })
            })
            .collect();
        BakeData { lightmaps, records }
    }

    /// Sidecar records for the vertex colors in `output`.
    pub fn vertex_color_data(&self, output: &LightmapOutput) -> VertexColorData {
        let Some(scene) = &self.scene else {
            return VertexColorData::default();
        };
        let records = output
            .vertex_colors
            .iter()
            .filter_map(|(id, colors)| {
                scene.mesh(*id).map(|mesh| VertexColorRecord {
                    node_id: mesh.node_id(),
                    static_model_id: mesh.static_model_id(),
                    colors: colors.iter().map(|c| c.to_array()).collect(),
                })
            })
            .collect();
        VertexColorData { records }
    }
}

/// Model with a lightmap UV set for `static_model`, or `None` if it has none.
fn prepare_model(
    prepared: &mut PreparedModels,
    static_model: &StaticModel,
    uv_generator: Option<&dyn LightmapUvGenerator>,
) -> Option<Arc<Model>> {
    let source = &static_model.model;
    if source.has_lightmap_uvs() {
        return Some(Arc::clone(source));
    }
    let Some(generator) = uv_generator else {
        log::warn!(
            "Model '{}': missing lightmap UV channel, baked as occluder only",
            source.name
        );
        return None;
    };

    let key = Arc::as_ptr(source) as usize;
    prepared
        .entry(key)
        .or_insert_with(|| {
            let generated = generator
                .generate(source)
                .and_then(|uvs| apply_generated_uvs(source, &uvs));
            match generated {
                Ok(model) => {
                    log::debug!("Generated lightmap UVs for model '{}'", source.name);
                    Some(Arc::new(model))
                }
                Err(e @ UvGenError::MixedGeometry { .. }) => {
                    log::error!("{}, baked as occluder only", e);
                    None
                }
                Err(e) => {
                    log::warn!("{}, baked as occluder only", e);
                    None
                }
            }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_scenes::unit_quad_model;
    use glint_core::{
        GeneratedUvs, GeneratedVertex, LightComponent, Material, Node, StaticModel, Transform,
        ZoneComponent,
    };
    use glint_math::Vec2;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn quad_scene() -> Scene {
        let mut scene = Scene::new("quad");
        scene.add_node(
            Node::new(1, "floor").with_static_model(StaticModel::new(10, Arc::new(unit_quad_model()))),
        );
        scene
    }

    fn sun_scene() -> Scene {
        let mut scene = quad_scene();
        scene.add_node(
            Node::new(2, "sun").with_light(LightComponent::directional(Vec3::NEG_Y, Vec3::ONE, 1.0)),
        );
        scene
    }

    fn small_atlas() -> BakeSettings {
        BakeSettings::default().with_lightmap_size(64, 2)
    }

    /// Pixels of a placed rect in its atlas.
    fn placed_pixels(output: &LightmapOutput, mesh: MeshId) -> Vec<[u8; 3]> {
        let (_, placement) = output.placements.iter().find(|(id, _)| *id == mesh).unwrap();
        let atlas = &output.atlases[placement.atlas as usize];
        let (w, h) = atlas.dimensions();
        let so = placement.scale_offset;
        let x0 = (so.z * w as f32).round() as u32;
        let y0 = (so.w * h as f32).round() as u32;
        let rw = (so.x * w as f32).round() as u32;
        let rh = (so.y * h as f32).round() as u32;
        (y0..y0 + rh)
            .flat_map(|y| (x0..x0 + rw).map(move |x| (x, y)))
            .map(|(x, y)| atlas.get_pixel(x, y).0)
            .collect()
    }

    #[test]
    fn test_zero_meshes_completes_immediately() {
        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(BakeSettings::default()).unwrap();
        baker.load_scene(&Scene::new("empty"), None).unwrap();

        assert_eq!(baker.light(&queue, LightMode::Direct).unwrap(), LightCycle::NoWork);
        assert_eq!(baker.mode(), LightMode::Complete);
    }

    #[test]
    fn test_light_before_load() {
        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(BakeSettings::default()).unwrap();
        assert!(matches!(
            baker.light(&queue, LightMode::Direct),
            Err(BakeError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = BakeSettings::default().with_texel_density(0.0);
        assert!(matches!(SceneBaker::new(settings), Err(BakeError::Config(_))));
    }

    #[test]
    fn test_end_to_end_quad_under_sun() {
        let _ = env_logger::builder().is_test(true).try_init();
        let settings = small_atlas().with_worker_threads(2);
        let queue = WorkQueue::new(settings.worker_threads).unwrap();
        assert_eq!(queue.thread_count(), 2);
        let mut baker = SceneBaker::new(settings).unwrap();
        baker.load_scene(&sun_scene(), None).unwrap();
        baker.bake(&queue).unwrap();
        assert_eq!(baker.mode(), LightMode::Complete);

        let output = baker.generate_lightmaps().unwrap();
        assert_eq!(output.atlases.len(), 1);
        assert_eq!(output.placements.len(), 1);
        assert!(output.vertex_colors.is_empty());

        let pixels = placed_pixels(&output, 0);
        assert_eq!(pixels.len(), 16 * 16);
        assert!(pixels.iter().all(|p| *p == [255, 255, 255]));

        let data = baker.bake_data();
        assert_eq!(data.lightmaps, vec!["Lightmap0.png".to_string()]);
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].node_id, 1);
        assert_eq!(data.records[0].static_model_id, 10);
    }

    #[test]
    fn test_generate_lightmaps_state_checks() {
        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&sun_scene(), None).unwrap();
        assert!(matches!(
            baker.generate_lightmaps(),
            Err(BakeError::InvalidState { mode: LightMode::Undefined, .. })
        ));

        baker.bake(&queue).unwrap();
        assert!(baker.generate_lightmaps().is_ok());
        assert!(matches!(
            baker.generate_lightmaps(),
            Err(BakeError::InvalidState { mode: LightMode::Complete, .. })
        ));
    }

    #[test]
    fn test_light_rejects_out_of_order_stages() {
        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&sun_scene(), None).unwrap();

        // Indirect before any direct pass
        assert!(matches!(
            baker.light(&queue, LightMode::Indirect),
            Err(BakeError::InvalidState { mode: LightMode::Undefined, .. })
        ));
        assert_eq!(baker.mode(), LightMode::Undefined);

        assert_eq!(baker.light(&queue, LightMode::Direct).unwrap(), LightCycle::WorkQueued);
        queue.complete(0);
        baker.light_finish_cycle();
        // Direct runs only once
        assert!(matches!(
            baker.light(&queue, LightMode::Direct),
            Err(BakeError::InvalidState { mode: LightMode::Direct, .. })
        ));

        baker.bake(&queue).unwrap();
        assert_eq!(baker.mode(), LightMode::Complete);
        let before = baker.scene().unwrap().meshes()[0].radiance();

        for mode in [LightMode::Direct, LightMode::Indirect, LightMode::Complete] {
            assert!(matches!(
                baker.light(&queue, mode),
                Err(BakeError::InvalidState { mode: LightMode::Complete, .. })
            ));
        }
        assert_eq!(queue.num_incomplete(0), 0);
        assert_eq!(baker.mode(), LightMode::Complete);
        assert_eq!(baker.scene().unwrap().meshes()[0].radiance(), before);
        assert_eq!(baker.advance(&queue).unwrap(), Advance::StageComplete);
        assert!(baker.generate_lightmaps().is_ok());
    }

    #[test]
    fn test_gi_passes_run_indirect_cycles() {
        let settings = small_atlas()
            .with_gi(true)
            .with_gi_passes(2)
            .with_photons(1, 512, 1)
            .with_final_gather(8, 10.0, 2.0);
        let queue = WorkQueue::new(2).unwrap();
        let mut baker = SceneBaker::new(settings).unwrap();
        baker.load_scene(&sun_scene(), None).unwrap();

        assert_eq!(baker.light(&queue, LightMode::Direct).unwrap(), LightCycle::WorkQueued);
        queue.complete(0);
        baker.light_finish_cycle();

        let mut indirect_cycles = 0;
        while baker.light(&queue, LightMode::Indirect).unwrap() == LightCycle::WorkQueued {
            assert_eq!(baker.mode(), LightMode::Indirect);
            indirect_cycles += 1;
            queue.complete(0);
            baker.light_finish_cycle();
        }
        assert_eq!(indirect_cycles, 2);
        assert_eq!(baker.gi_pass(), 2);
        assert_eq!(baker.mode(), LightMode::Complete);
    }

    #[test]
    fn test_gi_without_emitters_completes() {
        let settings = small_atlas().with_gi(true).with_photons(1, 64, 1);
        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(settings).unwrap();
        baker.load_scene(&quad_scene(), None).unwrap();

        assert_eq!(baker.advance(&queue).unwrap(), Advance::WorkQueued);
        queue.complete(0);
        assert_eq!(baker.advance(&queue).unwrap(), Advance::StageComplete);
        assert_eq!(baker.mode(), LightMode::Complete);
        assert_eq!(baker.gi_pass(), 0);
    }

    #[test]
    fn test_work_pending_blocks_state_machine() {
        let queue = WorkQueue::new(2).unwrap();
        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&sun_scene(), None).unwrap();

        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        queue.add_work_item(0, move || {
            let _ = gate.lock().unwrap().recv();
        });

        assert!(matches!(
            baker.light(&queue, LightMode::Direct),
            Err(BakeError::WorkPending { pending: 1 })
        ));
        assert!(matches!(baker.advance(&queue), Err(BakeError::WorkPending { .. })));

        release.send(()).unwrap();
        queue.complete(0);
        baker.bake(&queue).unwrap();
        assert_eq!(baker.mode(), LightMode::Complete);
    }

    #[test]
    fn test_priority_ignores_lower_priority_work() {
        let queue = WorkQueue::new(2).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        queue.add_work_item(0, move || {
            let _ = gate.lock().unwrap().recv();
        });

        // Unrelated background work below the baker's priority does not block it
        let mut baker = SceneBaker::new(small_atlas()).unwrap().with_priority(5);
        baker.load_scene(&sun_scene(), None).unwrap();
        baker.bake(&queue).unwrap();
        assert_eq!(baker.mode(), LightMode::Complete);
        assert_eq!(queue.num_incomplete(0), 1);

        release.send(()).unwrap();
        queue.complete(0);
        assert!(queue.is_completed(0));
    }

    #[test]
    fn test_diffuse_texture_tints_albedo() {
        let dir = std::env::temp_dir().join(format!("glint_albedo_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("red.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let red = Arc::new(Material::new("red").with_diffuse_texture(path.to_string_lossy()));
        let lost = Arc::new(Material::new("lost").with_diffuse_texture("no/such/texture.png"));
        let mut scene = Scene::new("textured");
        scene.add_node(Node::new(1, "red").with_static_model(
            StaticModel::new(10, Arc::new(unit_quad_model())).with_material(red),
        ));
        scene.add_node(Node::new(2, "lost").with_static_model(
            StaticModel::new(11, Arc::new(unit_quad_model())).with_material(lost),
        ));

        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, None).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        let meshes = baker.scene().unwrap().meshes();
        assert!((meshes[0].albedo() - Vec3::new(0.5, 0.0, 0.0)).length() < 0.001);
        // Unloadable texture falls back to the material albedo
        assert!((meshes[1].albedo() - Vec3::splat(0.5)).length() < 0.001);
    }

    #[test]
    fn test_zone_ambient_reaches_assigned_mesh() {
        let mut scene = quad_scene();
        // Lower priority zone covering everything
        scene.add_node(Node::new(3, "outer").with_zone(ZoneComponent {
            ambient_color: Vec3::splat(1.0),
            ..Default::default()
        }));
        scene.add_node(
            Node::new(4, "inner")
                .with_transform(Transform::from_translation(Vec3::new(0.5, 0.0, 0.5)))
                .with_zone(ZoneComponent {
                    ambient_color: Vec3::splat(0.25),
                    bounds: Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0)),
                    priority: 5,
                    ..Default::default()
                }),
        );
        // Higher priority but a disjoint mask
        scene.add_node(Node::new(5, "masked").with_zone(ZoneComponent {
            ambient_color: Vec3::ZERO,
            priority: 10,
            zone_mask: 0,
            ..Default::default()
        }));

        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, None).unwrap();
        let bake_scene = Arc::clone(baker.scene().unwrap());
        assert_eq!(bake_scene.meshes()[0].zone(), Some(1));
        assert_eq!(bake_scene.lights().len(), 3);

        baker.bake(&queue).unwrap();
        let output = baker.generate_lightmaps().unwrap();
        // sqrt(0.25) = 0.5
        assert!(placed_pixels(&output, 0).iter().all(|p| *p == [127, 127, 127]));
    }

    #[test]
    fn test_missing_lightmap_uvs_make_occluder() {
        let mut model = unit_quad_model();
        model.geometries[0].lightmap_uvs = None;
        let mut scene = Scene::new("no uvs");
        scene.add_node(Node::new(1, "floor").with_static_model(StaticModel::new(10, Arc::new(model))));

        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, None).unwrap();
        let mesh = &baker.scene().unwrap().meshes()[0];
        assert!(!mesh.is_receiver());
        assert!(mesh.geometry().is_some());
    }

    /// Maps every vertex to its own lightmap UV, copying the diffuse set.
    struct CopyUvs;

    impl LightmapUvGenerator for CopyUvs {
        fn generate(&self, model: &Model) -> Result<GeneratedUvs, UvGenError> {
            let mut generated = GeneratedUvs::default();
            for (geometry, mesh) in model.geometries.iter().enumerate() {
                let base = generated.vertices.len() as u32;
                let uvs = mesh.uvs.clone().unwrap_or_default();
                for i in 0..mesh.positions.len() {
                    generated.vertices.push(GeneratedVertex {
                        geometry,
                        source_index: i as u32,
                        uv: uvs.get(i).copied().unwrap_or(Vec2::ZERO),
                    });
                }
                generated.indices.extend(mesh.indices.iter().map(|i| i + base));
            }
            Ok(generated)
        }
    }

    #[test]
    fn test_uv_generator_makes_receiver() {
        let mut model = unit_quad_model();
        model.geometries[0].lightmap_uvs = None;
        let model = Arc::new(model);
        let mut scene = Scene::new("generated");
        scene.add_node(Node::new(1, "a").with_static_model(StaticModel::new(10, model.clone())));
        scene.add_node(Node::new(2, "b").with_static_model(StaticModel::new(11, model)));

        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, Some(&CopyUvs)).unwrap();
        let meshes = baker.scene().unwrap().meshes();
        assert!(meshes.iter().all(BakeMesh::is_receiver));
        assert_eq!(meshes[0].sample_count(), 16 * 16);
    }

    #[test]
    fn test_emissive_material_adds_area_light() {
        let lamp = Arc::new(Material::new("lamp").with_emissive(Vec3::ONE, 2.0));
        let mut scene = quad_scene();
        scene.add_node(
            Node::new(2, "lamp")
                .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
                .with_static_model(
                    StaticModel::new(20, Arc::new(unit_quad_model())).with_material(lamp),
                ),
        );

        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, None).unwrap();
        let lights = baker.scene().unwrap().lights();
        assert_eq!(lights.len(), 1);
        assert!(lights[0].is_area());
        assert!(!lights[0].vertices().is_empty());
        assert!((lights[0].intensity - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_vertex_target_outputs_colors() {
        let mut scene = Scene::new("vertex");
        scene.add_node(
            Node::new(1, "floor").with_static_model(
                StaticModel::new(10, Arc::new(unit_quad_model())).with_target(BakeTarget::Vertex),
            ),
        );
        scene.add_node(
            Node::new(2, "sun").with_light(LightComponent::directional(Vec3::NEG_Y, Vec3::ONE, 1.0)),
        );

        let queue = WorkQueue::new(1).unwrap();
        let mut baker = SceneBaker::new(small_atlas()).unwrap();
        baker.load_scene(&scene, None).unwrap();
        baker.bake(&queue).unwrap();
        let output = baker.generate_lightmaps().unwrap();

        assert!(output.atlases.is_empty());
        assert_eq!(output.vertex_colors.len(), 1);
        let (_, colors) = &output.vertex_colors[0];
        assert_eq!(colors.len(), 4);
        assert!(colors.iter().all(|c| (c.x - 1.0).abs() < 0.001));

        let sidecar = baker.vertex_color_data(&output);
        assert_eq!(sidecar.records.len(), 1);
        assert_eq!(sidecar.records[0].node_id, 1);
        assert_eq!(sidecar.records[0].static_model_id, 10);
        assert_eq!(sidecar.records[0].colors.len(), 4);
        // Vertex targets get no lightmap records
        assert!(baker.bake_data().records.is_empty());
    }

    #[test]
    fn test_assign_zone_priority_and_ties() {
        let everywhere = Aabb::from_points(Vec3::splat(-10.0), Vec3::splat(10.0));
        let zones = vec![
            ZoneVolume { bounds: everywhere, priority: 1, zone_mask: 1 },
            ZoneVolume { bounds: everywhere, priority: 1, zone_mask: 1 },
            ZoneVolume { bounds: everywhere, priority: 0, zone_mask: 1 },
        ];
        assert_eq!(assign_zone(&zones, Vec3::ZERO, u32::MAX), Some(0));
        assert_eq!(assign_zone(&zones, Vec3::splat(20.0), u32::MAX), None);
        assert_eq!(assign_zone(&zones, Vec3::ZERO, 2), None);
    }
}
