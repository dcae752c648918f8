//! Ray-trace-ready surfaces.
//!
//! A `BakeMesh` is one static model moved into world space, with the sample
//! points lighting is evaluated at and the accumulators results land in.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use glint_core::{BakeSettings, Model, ToneMapping};
use glint_math::{barycentric_lerp, Aabb, Mat4, Mat4Ext, UVec2, Vec2, Vec3, Vec4};
use image::{Rgb, RgbImage};

use crate::error::{BakeError, BakeResult};
use crate::intersector::{AlphaMask, GeometryId, RayIntersector};
use crate::light_ray::{LightRay, SamplePoint};
use crate::lighting::{bake_rng, BakeScene};
use crate::photon_map::PhotonMap;
use crate::radiance::{color_to_rgb, Color, Radiance};
use crate::scene_baker::LightMode;

/// Dense index into the bake scene's mesh arena.
pub type MeshId = usize;

/// Slack on the texel-center inside test, in barycentric units.
const EDGE_TOLERANCE: f32 = 1e-4;

/// Passes of neighbour fill around covered texels.
const DILATION_PASSES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub lightmap_uv: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeTriangle {
    pub indices: [u32; 3],
    pub face_normal: Vec3,
    pub area: f32,
}

/// Where lighting samples live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One sample per covered lightmap texel
    Texel { width: u32, height: u32 },
    /// One sample per world-space vertex
    Vertex,
}

/// Atlas slot assigned by the packer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub atlas: u32,
    /// `(scale.x, scale.y, offset.x, offset.y)` in atlas UV space
    pub scale_offset: Vec4,
}

/// Everything needed to turn a static model into a bake mesh.
pub struct MeshSource<'a> {
    pub name: String,
    pub node_id: u32,
    pub static_model_id: u32,
    pub light_mask: u32,
    pub model: &'a Model,
    pub world: Mat4,
    pub albedo: Vec3,
    pub cast_shadows: bool,
    /// `None` makes the mesh an occluder only
    pub layout: Option<SampleLayout>,
    pub zone: Option<usize>,
}

pub struct BakeMesh {
    id: MeshId,
    name: String,
    node_id: u32,
    static_model_id: u32,
    light_mask: u32,
    zone: Option<usize>,
    albedo: Vec3,
    cast_shadows: bool,
    layout: Option<SampleLayout>,

    vertices: Vec<BakeVertex>,
    triangles: Vec<BakeTriangle>,
    bounds: Aabb,
    area: f32,

    samples: Vec<SamplePoint>,
    /// Texel to sample index, texel layout only
    coverage: Vec<Option<u32>>,

    radiance: Mutex<Vec<Radiance>>,
    photons: Option<RwLock<PhotonMap>>,
    placement: Mutex<Option<Placement>>,
    geometry: Option<GeometryId>,
}

impl BakeMesh {
    /// Move a model into world space and build its samples.
    pub fn preprocess(id: MeshId, source: MeshSource<'_>, settings: &BakeSettings) -> BakeResult<Self> {
        let model = source.model;

        let mut vertices = Vec::new();
        let mut triangles = Vec::new();

        for (index, geometry) in model.geometries.iter().enumerate() {
            if geometry.positions.is_empty() {
                return Err(BakeError::NoPositions {
                    model: model.name.clone(),
                    geometry: index,
                });
            }

            let normals = match &geometry.normals {
                Some(normals) if normals.len() == geometry.positions.len() => normals.clone(),
                _ => {
                    let mut copy = geometry.clone();
                    copy.ensure_normals();
                    copy.normals.unwrap_or_default()
                }
            };

            let base = vertices.len() as u32;
            for (i, &position) in geometry.positions.iter().enumerate() {
                let channel = |c: &Option<Vec<Vec2>>| {
                    c.as_ref().and_then(|uvs| uvs.get(i).copied()).unwrap_or(Vec2::ZERO)
                };
                vertices.push(BakeVertex {
                    position: source.world.transform_point3(position),
                    normal: normals
                        .get(i)
                        .map(|&n| source.world.transform_normal3(n))
                        .unwrap_or(Vec3::ZERO),
                    uv: channel(&geometry.uvs),
                    lightmap_uv: channel(&geometry.lightmap_uvs),
                });
            }

            for [a, b, c] in geometry.triangles() {
                let indices = [a + base, b + base, c + base];
                let [p0, p1, p2] = indices.map(|i| vertices[i as usize].position);
                let cross = (p1 - p0).cross(p2 - p0);
                triangles.push(BakeTriangle {
                    indices,
                    face_normal: cross.normalize_or_zero(),
                    area: cross.length() * 0.5,
                });
            }
        }

        let bounds = Aabb::from_iter_points(vertices.iter().map(|v| v.position));
        let area = triangles.iter().map(|t| t.area).sum();

        let (samples, coverage) = match source.layout {
            Some(SampleLayout::Texel { width, height }) => {
                rasterize_texels(&vertices, &triangles, width, height)
            }
            Some(SampleLayout::Vertex) => (vertex_samples(&vertices, &triangles), Vec::new()),
            None => (Vec::new(), Vec::new()),
        };

        let layout = if samples.is_empty() {
            if source.layout.is_some() {
                log::warn!("Model '{}' produced no bake samples, occluder only", source.name);
            }
            None
        } else {
            source.layout
        };

        let photons = layout.map(|layout| {
            let map = match layout {
                SampleLayout::Texel { width, height } => PhotonMap::texel(
                    width,
                    height,
                    triangles
                        .iter()
                        .map(|t| t.indices.map(|i| vertices[i as usize].lightmap_uv))
                        .collect(),
                    coverage.iter().map(Option::is_some).collect(),
                    area / samples.len() as f32,
                ),
                SampleLayout::Vertex => PhotonMap::vertex(
                    vertices.iter().map(|v| v.position).collect(),
                    triangles.iter().map(|t| t.indices).collect(),
                    settings.texel_density,
                ),
            };
            RwLock::new(map)
        });

        log::debug!(
            "Bake mesh {} '{}': {} triangles, {} samples, layout {:?}",
            id,
            source.name,
            triangles.len(),
            samples.len(),
            layout
        );

        Ok(Self {
            id,
            name: source.name,
            node_id: source.node_id,
            static_model_id: source.static_model_id,
            light_mask: source.light_mask,
            zone: source.zone,
            albedo: source.albedo,
            cast_shadows: source.cast_shadows,
            layout,
            vertices,
            triangles,
            bounds,
            area,
            radiance: Mutex::new(vec![Radiance::default(); samples.len()]),
            samples,
            coverage,
            photons,
            placement: Mutex::new(None),
            geometry: None,
        })
    }

    /// Add this mesh to the intersector. Non-shadow-casting meshes are skipped.
    pub fn register(&mut self, intersector: &mut RayIntersector, mask: Option<Arc<AlphaMask>>) {
        if !self.cast_shadows || self.triangles.is_empty() {
            return;
        }
        let positions: Vec<Vec3> = self.vertices.iter().map(|v| v.position).collect();
        let indices = self.triangle_indices();
        self.geometry = Some(intersector.add_geometry(&positions, &indices, Some(self.id), mask));
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn static_model_id(&self) -> u32 {
        self.static_model_id
    }

    pub fn light_mask(&self) -> u32 {
        self.light_mask
    }

    pub fn zone(&self) -> Option<usize> {
        self.zone
    }

    pub fn albedo(&self) -> Vec3 {
        self.albedo
    }

    pub fn layout(&self) -> Option<SampleLayout> {
        self.layout
    }

    /// True when the mesh has samples to light.
    pub fn is_receiver(&self) -> bool {
        self.layout.is_some()
    }

    pub fn vertices(&self) -> &[BakeVertex] {
        &self.vertices
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    pub fn uvs(&self) -> Vec<Vec2> {
        self.vertices.iter().map(|v| v.uv).collect()
    }

    pub fn triangles(&self) -> &[BakeTriangle] {
        &self.triangles
    }

    pub fn triangle(&self, index: u32) -> Option<&BakeTriangle> {
        self.triangles.get(index as usize)
    }

    pub fn triangle_indices(&self) -> Vec<[u32; 3]> {
        self.triangles.iter().map(|t| t.indices).collect()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// World-space surface area.
    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn samples(&self) -> &[SamplePoint] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn geometry(&self) -> Option<GeometryId> {
        self.geometry
    }

    pub fn photon_map(&self) -> Option<&RwLock<PhotonMap>> {
        self.photons.as_ref()
    }

    /// Gathered photon color at a surface location.
    pub fn photon(&self, triangle: u32, bary: Vec2) -> Option<Color> {
        let map = self.photons.as_ref()?;
        let map = map.read().unwrap_or_else(PoisonError::into_inner);
        map.photon(triangle, bary)
    }

    /// Snapshot of the accumulators.
    pub fn radiance(&self) -> Vec<Radiance> {
        self.radiance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Evaluate one lighting stage over every sample.
    pub fn light(&self, scene: &BakeScene, mode: LightMode, pass: u32) {
        if self.samples.is_empty() {
            return;
        }

        let settings = scene.settings();
        let mut rng = bake_rng(settings.seed, self.id, pass);
        // Each GI pass adds an equal share of the indirect estimate
        let pass_weight = 1.0 / settings.gi_passes.max(1) as f32;
        let mut radiance = self.radiance.lock().unwrap_or_else(PoisonError::into_inner);

        for (index, point) in self.samples.iter().enumerate() {
            let mut ray = LightRay::new(self.id, index, *point);
            match mode {
                LightMode::Direct => {
                    let color = scene.direct_light(&mut ray, self.zone);
                    accumulate(&mut radiance[index], color, mode);
                    if settings.ao_enabled {
                        radiance[index].ao = scene.ambient_occlusion(&mut ray, &mut rng);
                    }
                }
                LightMode::Indirect => {
                    if let Some(color) = scene.indirect_light(&mut ray, &mut rng) {
                        accumulate(&mut radiance[index], color * pass_weight, mode);
                    }
                }
                LightMode::Undefined | LightMode::Complete => {}
            }
        }
    }

    /// Add a color to the sample a ray came from.
    pub fn contribute_radiance(&self, ray: &LightRay, color: Color, mode: LightMode) {
        let mut radiance = self.radiance.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = radiance.get_mut(ray.sample) {
            accumulate(slot, color, mode);
        }
    }

    /// Rasterize the accumulators into an 8-bit lightmap, texel layout only.
    pub fn generate_radiance_map(&self, tone: ToneMapping) -> Option<RgbImage> {
        let Some(SampleLayout::Texel { width, height }) = self.layout else {
            return None;
        };

        let radiance = self.radiance.lock().unwrap_or_else(PoisonError::into_inner);
        let mut colors: Vec<Option<Color>> = self
            .coverage
            .iter()
            .map(|sample| sample.map(|s| radiance[s as usize].resolve(tone)))
            .collect();
        drop(radiance);

        dilate(&mut colors, width, height, DILATION_PASSES);

        Some(RgbImage::from_fn(width, height, |x, y| {
            let color = colors[(y * width + x) as usize].unwrap_or(Color::ZERO);
            Rgb(color_to_rgb(color))
        }))
    }

    /// Gamma-corrected colors per world-space vertex, vertex layout only.
    pub fn vertex_colors(&self, tone: ToneMapping) -> Option<Vec<Color>> {
        if self.layout != Some(SampleLayout::Vertex) {
            return None;
        }
        let radiance = self.radiance.lock().unwrap_or_else(PoisonError::into_inner);
        Some(radiance.iter().map(|r| r.resolve(tone)).collect())
    }

    /// Record the atlas slot for this mesh.
    pub fn pack(&self, atlas: u32, scale_offset: Vec4) {
        *self.placement.lock().unwrap_or_else(PoisonError::into_inner) = Some(Placement {
            atlas,
            scale_offset,
        });
    }

    pub fn placement(&self) -> Option<Placement> {
        *self.placement.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn accumulate(slot: &mut Radiance, color: Color, mode: LightMode) {
    match mode {
        LightMode::Direct => slot.direct += color,
        LightMode::Indirect => slot.indirect += color,
        LightMode::Undefined | LightMode::Complete => {}
    }
}

/// Lightmap resolution for a model placed with `world`.
///
/// `rescale = max(min_scale, node_scale * texel_density / model_density)`,
/// applied to the model's own lightmap size.
pub fn lightmap_size(model: &Model, world: &Mat4, settings: &BakeSettings) -> UVec2 {
    let node_scale = world.uniform_scale();
    let (model_size, model_density) = match model.lightmap_size {
        Some(hint) if hint.texel_density > 0.0 => {
            (Vec2::new(hint.width as f32, hint.height as f32), hint.texel_density)
        }
        _ => {
            let side = (model.surface_area().sqrt() * settings.texel_density).ceil();
            (Vec2::splat(side), settings.texel_density)
        }
    };

    let rescale = (node_scale * settings.texel_density / model_density).max(settings.min_lightmap_scale);
    let size = (model_size * rescale).ceil();
    UVec2::new((size.x as u32).max(1), (size.y as u32).max(1))
}

/// Barycentric `(u, v)` of `p` in the 2D triangle `abc`, `None` if degenerate.
fn barycentric_2d(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<Vec2> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let denom = v0.x * v1.y - v1.x * v0.y;
    if denom.abs() < 1e-12 {
        return None;
    }
    let u = (v2.x * v1.y - v1.x * v2.y) / denom;
    let v = (v0.x * v2.y - v2.x * v0.y) / denom;
    Some(Vec2::new(u, v))
}

fn inside(bary: Vec2) -> bool {
    bary.x >= -EDGE_TOLERANCE && bary.y >= -EDGE_TOLERANCE && bary.x + bary.y <= 1.0 + EDGE_TOLERANCE
}

fn make_sample(
    vertices: &[BakeVertex],
    triangle_index: usize,
    triangle: &BakeTriangle,
    bary: Vec2,
    texel: Option<UVec2>,
) -> SamplePoint {
    let [a, b, c] = triangle.indices.map(|i| vertices[i as usize]);
    let normal = barycentric_lerp(a.normal, b.normal, c.normal, bary.x, bary.y);
    SamplePoint {
        position: barycentric_lerp(a.position, b.position, c.position, bary.x, bary.y),
        normal: normal.try_normalize().unwrap_or(triangle.face_normal),
        face_normal: triangle.face_normal,
        triangle: triangle_index as u32,
        barycentric: bary,
        texel,
    }
}

/// Claim every texel whose center lies inside a triangle's lightmap UVs.
///
/// Triangles are visited in order and the first claim wins. A triangle too
/// small to cover any center claims the texel under its UV centroid.
fn rasterize_texels(
    vertices: &[BakeVertex],
    triangles: &[BakeTriangle],
    width: u32,
    height: u32,
) -> (Vec<SamplePoint>, Vec<Option<u32>>) {
    let size = Vec2::new(width as f32, height as f32);
    let mut samples = Vec::new();
    let mut coverage: Vec<Option<u32>> = vec![None; (width * height) as usize];

    for (index, triangle) in triangles.iter().enumerate() {
        let [a, b, c] = triangle.indices.map(|i| vertices[i as usize].lightmap_uv * size);
        let lo = a.min(b).min(c).floor().max(Vec2::ZERO);
        let hi = a.max(b).max(c).ceil().min(size);

        let mut covered_any = false;
        for y in lo.y as u32..hi.y as u32 {
            for x in lo.x as u32..hi.x as u32 {
                let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let Some(bary) = barycentric_2d(center, a, b, c) else {
                    continue;
                };
                if !inside(bary) {
                    continue;
                }
                covered_any = true;
                let slot = &mut coverage[(y * width + x) as usize];
                if slot.is_none() {
                    *slot = Some(samples.len() as u32);
                    samples.push(make_sample(
                        vertices,
                        index,
                        triangle,
                        bary,
                        Some(UVec2::new(x, y)),
                    ));
                }
            }
        }

        if !covered_any {
            let centroid = (a + b + c) / 3.0;
            if centroid.x < 0.0 || centroid.y < 0.0 || centroid.x >= size.x || centroid.y >= size.y {
                continue;
            }
            let (x, y) = (centroid.x as u32, centroid.y as u32);
            let slot = &mut coverage[(y * width + x) as usize];
            if slot.is_none() {
                *slot = Some(samples.len() as u32);
                let third = Vec2::splat(1.0 / 3.0);
                samples.push(make_sample(vertices, index, triangle, third, Some(UVec2::new(x, y))));
            }
        }
    }

    (samples, coverage)
}

/// One sample per vertex, owned by the first triangle using it.
fn vertex_samples(vertices: &[BakeVertex], triangles: &[BakeTriangle]) -> Vec<SamplePoint> {
    let mut owner: Vec<Option<(usize, usize)>> = vec![None; vertices.len()];
    for (index, triangle) in triangles.iter().enumerate() {
        for (corner, &vertex) in triangle.indices.iter().enumerate() {
            owner[vertex as usize].get_or_insert((index, corner));
        }
    }

    vertices
        .iter()
        .zip(owner)
        .map(|(vertex, owner)| match owner {
            Some((index, corner)) => {
                let bary = match corner {
                    1 => Vec2::X,
                    2 => Vec2::Y,
                    _ => Vec2::ZERO,
                };
                make_sample(vertices, index, &triangles[index], bary, None)
            }
            None => SamplePoint {
                position: vertex.position,
                normal: vertex.normal,
                face_normal: vertex.normal,
                triangle: u32::MAX,
                barycentric: Vec2::ZERO,
                texel: None,
            },
        })
        .collect()
}

/// Fill empty texels from filled 8-neighbours, one ring per pass.
fn dilate(colors: &mut [Option<Color>], width: u32, height: u32, passes: usize) {
    let (w, h) = (width as i64, height as i64);
    for _ in 0..passes {
        let source = colors.to_vec();
        let mut changed = false;

        for y in 0..h {
            for x in 0..w {
                let index = (y * w + x) as usize;
                if source[index].is_some() {
                    continue;
                }
                let mut sum = Color::ZERO;
                let mut count = 0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if (dx, dy) == (0, 0) || nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        if let Some(color) = source[(ny * w + nx) as usize] {
                            sum += color;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    colors[index] = Some(sum / count as f32);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }
}
