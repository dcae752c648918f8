//! Bake configuration.
//!
//! One `BakeSettings` value is passed explicitly to the scene baker, photon
//! emitter and packer. Settings files are JSON; missing fields take their
//! defaults.

use std::path::Path;

use glint_math::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Image format for saved atlases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Tga,
    Bmp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Tga => "tga",
            OutputFormat::Bmp => "bmp",
        }
    }
}

/// How accumulated radiance is compressed before gamma and quantization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapping {
    /// Values above 1 saturate
    #[default]
    Clamp,
    /// `c / (1 + c)` per channel
    Reinhard,
}

impl ToneMapping {
    pub fn apply(&self, color: Vec3) -> Vec3 {
        match self {
            ToneMapping::Clamp => color,
            ToneMapping::Reinhard => color / (Vec3::ONE + color.max(Vec3::ZERO)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    /// Lightmap texels per world unit
    pub texel_density: f32,
    /// Lower clamp on the per-model lightmap rescale factor
    pub min_lightmap_scale: f32,
    /// Atlas width and height in pixels
    pub lightmap_size: u32,
    /// Dilation border around each packed rectangle
    pub lightmap_padding: u32,
    pub output_format: OutputFormat,
    pub tone_mapping: ToneMapping,

    pub gi_enabled: bool,
    /// Orchestration-level indirect passes
    pub gi_passes: u32,
    /// Upper bound on photon bounces
    pub gi_max_bounces: u32,

    pub final_gather_samples: u32,
    pub final_gather_distance: f32,
    /// Photon gather kernel radius, in texels
    pub final_gather_radius: f32,

    pub photon_pass_count: u32,
    pub photon_bounce_count: u32,
    /// Photon paths per light per pass
    pub photons_per_pass: u32,
    pub photon_energy_threshold: f32,
    pub photon_max_distance: f32,

    /// Radiance of final-gather rays that leave the scene
    pub sky_color: [f32; 3],

    pub ao_enabled: bool,
    pub ao_depth: f32,
    pub ao_samples: u32,
    pub ao_min: f32,
    pub ao_multiply: f32,

    /// Extra random sample points per emissive mesh
    pub area_light_samples: u32,
    pub area_light_range: f32,

    /// Offset along the normal for rays leaving a surface
    pub ray_bias: f32,

    /// 0 lets rayon pick
    pub worker_threads: usize,
    pub seed: u64,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            texel_density: 16.0,
            min_lightmap_scale: 0.1,
            lightmap_size: 1024,
            lightmap_padding: 2,
            output_format: OutputFormat::Png,
            tone_mapping: ToneMapping::Clamp,

            gi_enabled: false,
            gi_passes: 1,
            gi_max_bounces: 3,

            final_gather_samples: 64,
            final_gather_distance: 50.0,
            final_gather_radius: 7.0,

            photon_pass_count: 16,
            photon_bounce_count: 3,
            photons_per_pass: 4096,
            photon_energy_threshold: 0.05,
            photon_max_distance: 50.0,

            sky_color: [0.15, 0.15, 0.15],

            ao_enabled: false,
            ao_depth: 0.25,
            ao_samples: 64,
            ao_min: 0.45,
            ao_multiply: 1.0,

            area_light_samples: 32,
            area_light_range: 10.0,

            ray_bias: 0.001,

            worker_threads: 0,
            seed: 0,
        }
    }
}

impl BakeSettings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: BakeSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject combinations the baker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.texel_density > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "texel_density must be positive, got {}",
                self.texel_density
            )));
        }
        // One texel, its padding, and the wrap seam row
        if self.lightmap_size < 2 * self.lightmap_padding + 2 {
            return Err(ConfigError::Invalid(format!(
                "lightmap_size {} cannot hold a texel with padding {}",
                self.lightmap_size, self.lightmap_padding
            )));
        }
        if self.gi_enabled && self.final_gather_samples == 0 {
            return Err(ConfigError::Invalid(
                "final_gather_samples must be non-zero when GI is enabled".to_string(),
            ));
        }
        if self.min_lightmap_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_lightmap_scale must not be negative, got {}",
                self.min_lightmap_scale
            )));
        }
        Ok(())
    }

    /// Photon bounces after applying the GI bounce cap.
    pub fn effective_photon_bounces(&self) -> u32 {
        self.photon_bounce_count.min(self.gi_max_bounces)
    }

    pub fn sky(&self) -> Vec3 {
        Vec3::from_array(self.sky_color)
    }

    pub fn with_gi(mut self, enabled: bool) -> Self {
        self.gi_enabled = enabled;
        self
    }

    pub fn with_gi_passes(mut self, passes: u32) -> Self {
        self.gi_passes = passes;
        self
    }

    pub fn with_ao(mut self, enabled: bool) -> Self {
        self.ao_enabled = enabled;
        self
    }

    pub fn with_texel_density(mut self, density: f32) -> Self {
        self.texel_density = density;
        self
    }

    pub fn with_lightmap_size(mut self, size: u32, padding: u32) -> Self {
        self.lightmap_size = size;
        self.lightmap_padding = padding;
        self
    }

    pub fn with_final_gather(mut self, samples: u32, distance: f32, radius: f32) -> Self {
        self.final_gather_samples = samples;
        self.final_gather_distance = distance;
        self.final_gather_radius = radius;
        self
    }

    pub fn with_photons(mut self, passes: u32, per_pass: u32, bounces: u32) -> Self {
        self.photon_pass_count = passes;
        self.photons_per_pass = per_pass;
        self.photon_bounce_count = bounces;
        self
    }

    pub fn with_sky_color(mut self, color: Vec3) -> Self {
        self.sky_color = color.to_array();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}
