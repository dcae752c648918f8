//! Surface materials as far as baking cares about them.

use glint_math::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Technique name fragments that mark a material as alpha-tested.
const ALPHA_MASK_TECHNIQUES: [&str; 2] = ["diffalpha", "difflightmapalpha"];

/// A material reference resolved from the scene.
///
/// Only the diffuse texture, its UV transform and the technique are needed to
/// decide whether a surface blocks shadow rays everywhere or only where its
/// diffuse alpha is opaque. Albedo and emission feed the photon pass and area
/// lights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,

    /// Render technique name, e.g. `Techniques/DiffAlpha.xml`
    pub technique: String,

    /// Path to the diffuse texture
    pub diffuse_texture: Option<String>,

    /// U transform: `u' = dot(uoffset.xy, uv) + uoffset.w`
    pub uoffset: Vec4,

    /// V transform: `v' = dot(voffset.xy, uv) + voffset.w`
    pub voffset: Vec4,

    /// Diffuse reflectance used for photon bounces, tinted by the diffuse
    /// texture's mean color when there is one
    pub albedo: Vec3,

    /// Emitted color; non-zero turns the surface into an area light
    pub emissive_color: Vec3,

    pub emissive_intensity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            technique: String::new(),
            diffuse_texture: None,
            uoffset: Vec4::new(1.0, 0.0, 0.0, 0.0),
            voffset: Vec4::new(0.0, 1.0, 0.0, 0.0),
            albedo: Vec3::splat(0.5),
            emissive_color: Vec3::ZERO,
            emissive_intensity: 1.0,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_technique(mut self, technique: impl Into<String>) -> Self {
        self.technique = technique.into();
        self
    }

    pub fn with_diffuse_texture(mut self, path: impl Into<String>) -> Self {
        self.diffuse_texture = Some(path.into());
        self
    }

    pub fn with_emissive(mut self, color: Vec3, intensity: f32) -> Self {
        self.emissive_color = color;
        self.emissive_intensity = intensity;
        self
    }

    /// True when the technique alpha-tests its diffuse texture.
    pub fn is_occlusion_masked(&self) -> bool {
        let technique = self.technique.to_lowercase();
        ALPHA_MASK_TECHNIQUES.iter().any(|t| technique.contains(t))
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive_intensity > 0.0 && self.emissive_color.max_element() > 0.0
    }

    /// Apply the diffuse UV transform.
    pub fn transform_uv(&self, uv: Vec2) -> Vec2 {
        Vec2::new(
            self.uoffset.x * uv.x + self.uoffset.y * uv.y + self.uoffset.w,
            self.voffset.x * uv.x + self.voffset.y * uv.y + self.voffset.w,
        )
    }
}
