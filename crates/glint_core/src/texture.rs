//! Texture loading and caching for materials.
//!
//! The baker only reads textures to resolve alpha-masked occluders and to
//! estimate a surface's average albedo for photon bounces, so samples are
//! nearest-neighbour.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glint_math::{Vec2, Vec3};
use thiserror::Error;

/// Errors that can occur during texture loading.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

pub type TextureResult<T> = Result<T, TextureError>;

/// A loaded texture with linear RGBA pixel data, row-major, top row first.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
    /// Original file path (for diagnostics)
    pub path: String,
}

impl Texture {
    /// Create a new texture from pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<[f32; 4]>, path: impl Into<String>) -> Self {
        Self {
            width,
            height,
            pixels,
            path: path.into(),
        }
    }

    /// Nearest texel at `uv`, wrapping outside [0, 1). V runs bottom to top.
    pub fn sample_nearest(&self, uv: Vec2) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0, 0.0, 0.0, 1.0];
        }

        let u = uv.x.rem_euclid(1.0);
        let v = uv.y.rem_euclid(1.0);
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = (((1.0 - v) * self.height as f32) as u32).min(self.height - 1);

        self.pixels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    /// Alpha channel at `uv`.
    pub fn sample_alpha(&self, uv: Vec2) -> f32 {
        self.sample_nearest(uv)[3]
    }

    /// Mean linear color over all pixels.
    pub fn average_color(&self) -> Vec3 {
        if self.pixels.is_empty() {
            return Vec3::ONE;
        }
        let sum = self
            .pixels
            .iter()
            .fold(Vec3::ZERO, |acc, p| acc + Vec3::new(p[0], p[1], p[2]));
        sum / self.pixels.len() as f32
    }
}

/// Cache for loaded textures, keyed by the path as written in the material.
pub struct TextureCache {
    textures: HashMap<String, Arc<Texture>>,

    /// Base directory for resolving relative paths
    base_dir: Option<PathBuf>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            base_dir: None,
        }
    }

    /// Create a texture cache with a base directory for relative paths.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            textures: HashMap::new(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Load a texture from file, using cache if available.
    pub fn load(&mut self, path: &str) -> TextureResult<Arc<Texture>> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(texture.clone());
        }

        let full_path = self.resolve_path(path);
        let texture = Arc::new(load_texture_file(&full_path)?);
        self.textures.insert(path.to_string(), texture.clone());

        log::debug!(
            "Loaded texture: {} ({}x{})",
            path,
            texture.width,
            texture.height
        );

        Ok(texture)
    }

    /// Insert an already decoded texture under `path`.
    pub fn insert(&mut self, path: impl Into<String>, texture: Texture) -> Arc<Texture> {
        let texture = Arc::new(texture);
        self.textures.insert(path.into(), texture.clone());
        texture
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);

        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

fn load_texture_file(path: &Path) -> TextureResult<Texture> {
    let img = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(e) => TextureError::Io(e),
        source => TextureError::Image {
            path: path.display().to_string(),
            source,
        },
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let pixels: Vec<[f32; 4]> = rgba
        .pixels()
        .map(|p| {
            [
                srgb_to_linear(p[0]),
                srgb_to_linear(p[1]),
                srgb_to_linear(p[2]),
                p[3] as f32 / 255.0, // Alpha is linear
            ]
        })
        .collect();

    Ok(Texture::new(
        width,
        height,
        pixels,
        path.to_string_lossy().to_string(),
    ))
}

/// Convert sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Texture {
        // Left column opaque, right column cut out
        Texture::new(
            2,
            2,
            vec![
                [1.0, 1.0, 1.0, 1.0],
                [0.0, 0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0, 1.0],
                [0.0, 0.0, 0.0, 0.0],
            ],
            "<checker>",
        )
    }

    #[test]
    fn test_sample_alpha() {
        let tex = checker();
        assert_eq!(tex.sample_alpha(Vec2::new(0.25, 0.5)), 1.0);
        assert_eq!(tex.sample_alpha(Vec2::new(0.75, 0.5)), 0.0);
        // Wraps
        assert_eq!(tex.sample_alpha(Vec2::new(1.25, -0.5)), 1.0);
    }

    #[test]
    fn test_average_color() {
        let avg = checker().average_color();
        assert!((avg - Vec3::splat(0.5)).length() < 0.001);
    }

    #[test]
    fn test_cache_insert_and_load_cached() {
        let mut cache = TextureCache::new();
        assert!(cache.is_empty());

        cache.insert("masks/leaf.png", checker());
        let loaded = cache.load("masks/leaf.png").unwrap();
        assert_eq!(loaded.width, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut cache = TextureCache::with_base_dir("/nonexistent-glint-dir");
        assert!(cache.load("nope.png").is_err());
    }

    #[test]
    fn test_srgb_to_linear() {
        assert!((srgb_to_linear(0) - 0.0).abs() < 0.001);
        assert!((srgb_to_linear(255) - 1.0).abs() < 0.001);

        let mid = srgb_to_linear(128);
        assert!(mid < 0.5);
        assert!(mid > 0.1);
    }
}
