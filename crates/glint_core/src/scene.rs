//! Scene description read by the baker.
//!
//! A flat list of nodes with world transforms. Each node may carry a static
//! model, a light and a zone. The baker only reads the scene, except for
//! `BakeData::apply` which writes lightmap indices and UV transforms back onto
//! the static models.

use std::path::PathBuf;
use std::sync::Arc;

use glint_math::{Aabb, Mat4, Mat4Ext, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::material::Material;
use crate::mesh::Model;

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Which output a static model's baked light goes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BakeTarget {
    /// Texel samples packed into a lightmap atlas (needs a lightmap UV set)
    #[default]
    Lightmap,
    /// One sample per vertex, exported as vertex colors
    Vertex,
}

/// A renderable static mesh attached to a node.
#[derive(Clone, Debug)]
pub struct StaticModel {
    /// Component id, unique within the scene
    pub id: u32,
    pub enabled: bool,
    pub model: Arc<Model>,
    pub material: Option<Arc<Material>>,
    pub light_mask: u32,
    pub zone_mask: u32,
    pub cast_shadows: bool,
    /// Receive baked light
    pub lightmap: bool,
    pub target: BakeTarget,

    /// Written back after a bake
    pub lightmap_index: Option<u32>,
    pub lightmap_scale_offset: Vec4,
}

impl StaticModel {
    pub fn new(id: u32, model: Arc<Model>) -> Self {
        Self {
            id,
            enabled: true,
            model,
            material: None,
            light_mask: u32::MAX,
            zone_mask: u32::MAX,
            cast_shadows: true,
            lightmap: true,
            target: BakeTarget::Lightmap,
            lightmap_index: None,
            lightmap_scale_offset: Vec4::new(1.0, 1.0, 0.0, 0.0),
        }
    }

    pub fn with_material(mut self, material: Arc<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn with_lightmap(mut self, lightmap: bool) -> Self {
        self.lightmap = lightmap;
        self
    }

    pub fn with_target(mut self, target: BakeTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_zone_mask(mut self, zone_mask: u32) -> Self {
        self.zone_mask = zone_mask;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// A light attached to a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightComponent {
    pub enabled: bool,
    pub kind: LightKind,
    pub color: Vec3,
    pub brightness: f32,
    /// Falloff distance for point and spot lights
    pub range: f32,
    pub cast_shadows: bool,
    /// Direction the light travels, in node space
    pub direction: Vec3,
    /// Full spot cone angle in degrees
    pub spot_angle: f32,
}

impl Default for LightComponent {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: LightKind::Point,
            color: Vec3::ONE,
            brightness: 1.0,
            range: 10.0,
            cast_shadows: true,
            direction: Vec3::NEG_Y,
            spot_angle: 30.0,
        }
    }
}

impl LightComponent {
    pub fn directional(direction: Vec3, color: Vec3, brightness: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            direction,
            color,
            brightness,
            ..Default::default()
        }
    }

    pub fn point(color: Vec3, brightness: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            brightness,
            range,
            ..Default::default()
        }
    }

    pub fn spot(direction: Vec3, color: Vec3, brightness: f32, range: f32, angle: f32) -> Self {
        Self {
            kind: LightKind::Spot,
            direction,
            color,
            brightness,
            range,
            spot_angle: angle,
            ..Default::default()
        }
    }
}

/// Ambient lighting volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneComponent {
    pub enabled: bool,
    pub ambient_color: Vec3,
    /// Volume in node space
    pub bounds: Aabb,
    pub priority: i32,
    pub zone_mask: u32,
}

impl Default for ZoneComponent {
    fn default() -> Self {
        Self {
            enabled: true,
            ambient_color: Vec3::splat(0.1),
            bounds: Aabb::from_points(Vec3::splat(-1000.0), Vec3::splat(1000.0)),
            priority: 0,
            zone_mask: u32::MAX,
        }
    }
}

/// A scene node with its world transform and components.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: u32,
    pub name: String,
    pub enabled: bool,
    pub transform: Transform,
    pub static_model: Option<StaticModel>,
    pub light: Option<LightComponent>,
    pub zone: Option<ZoneComponent>,
}

impl Node {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            transform: Transform::default(),
            static_model: None,
            light: None,
            zone: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_static_model(mut self, static_model: StaticModel) -> Self {
        self.static_model = Some(static_model);
        self
    }

    pub fn with_light(mut self, light: LightComponent) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_zone(mut self, zone: ZoneComponent) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    /// World-space direction a light on this node travels.
    pub fn world_direction(&self, local: Vec3) -> Vec3 {
        (self.transform.rotation * local).normalize_or_zero()
    }
}

/// A complete bakeable scene.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name (usually from filename)
    pub name: String,
    pub nodes: Vec<Node>,
    /// Lightmap atlas file names, in atlas index order
    pub lightmaps: Vec<String>,
    /// Directory relative asset paths resolve against
    pub base_dir: Option<PathBuf>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, node: Node) -> &mut Node {
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: u32) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Enabled static models with their owning node.
    pub fn static_models(&self) -> impl Iterator<Item = (&Node, &StaticModel)> {
        self.nodes
            .iter()
            .filter(|n| n.enabled)
            .filter_map(|n| n.static_model.as_ref().map(|sm| (n, sm)))
            .filter(|(_, sm)| sm.enabled)
    }

    pub fn static_model_count(&self) -> usize {
        self.static_models().count()
    }

    /// World-space bounds of all enabled static models.
    pub fn world_bounds(&self) -> Aabb {
        self.static_models().fold(Aabb::EMPTY, |acc, (node, sm)| {
            let world = node.world_matrix().transform_aabb(&sm.model.bounds());
            Aabb::surrounding(&acc, &world)
        })
    }
}
