//! Packs per-mesh radiance maps into fixed-size lightmap atlases.
//!
//! Inputs are packed largest first (by `w + h`, ties in input order). Each
//! atlas starts from the largest unpacked input and is filled greedily with
//! every other input that still fits. Every rectangle gets a padding border
//! of replicated edge texels so bilinear lookups do not bleed.
//!
//! The last row and column of a shared atlas hold a copy of the first, for
//! wrapping samplers, and are never packed into.

use std::cmp::Reverse;
use std::path::Path;

use glint_core::{BakeSettings, OutputFormat};
use glint_math::Vec4;
use image::{imageops, Rgb, RgbImage};

use crate::bake_mesh::{MeshId, Placement};
use crate::error::BakeResult;
use crate::skyline::{Rect, SkylinePacker};

/// Atlas background, visible only where nothing was packed.
const ATLAS_CLEAR: Rgb<u8> = Rgb([0, 255, 255]);

pub struct LightMapPacker {
    atlas_size: u32,
    padding: u32,
    inputs: Vec<(MeshId, RgbImage)>,
    atlases: Vec<RgbImage>,
    placements: Vec<(MeshId, Placement)>,
}

impl LightMapPacker {
    pub fn new(settings: &BakeSettings) -> Self {
        Self {
            atlas_size: settings.lightmap_size,
            padding: settings.lightmap_padding,
            inputs: Vec::new(),
            atlases: Vec::new(),
            placements: Vec::new(),
        }
    }

    pub fn add_radiance_map(&mut self, mesh: MeshId, image: RgbImage) {
        self.inputs.push((mesh, image));
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Lay out every input. Repacking starts over from the same inputs.
    pub fn pack(&mut self) -> &[(MeshId, Placement)] {
        self.atlases.clear();
        self.placements.clear();

        let size = self.atlas_size;
        let pad = self.padding;
        let oversize = |image: &RgbImage| image.width() >= size || image.height() >= size;

        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        order.sort_by_key(|&i| {
            let image = &self.inputs[i].1;
            Reverse(image.width() + image.height())
        });

        let mut packed = vec![false; self.inputs.len()];
        for (position, &seed) in order.iter().enumerate() {
            if packed[seed] {
                continue;
            }
            packed[seed] = true;

            let (mesh, image) = &self.inputs[seed];
            if oversize(image) {
                log::debug!(
                    "Radiance map of mesh {} ({}x{}) gets its own atlas",
                    mesh,
                    image.width(),
                    image.height()
                );
                self.placements.push((
                    *mesh,
                    Placement {
                        atlas: self.atlases.len() as u32,
                        scale_offset: Vec4::new(1.0, 1.0, 0.0, 0.0),
                    },
                ));
                self.atlases.push(image.clone());
                continue;
            }

            // Last row and column are the wrap seam
            let mut bin = SkylinePacker::new(size.saturating_sub(1), size.saturating_sub(1));
            let Some(rect) = bin.insert(image.width() + 2 * pad, image.height() + 2 * pad) else {
                log::warn!(
                    "Radiance map of mesh {} ({}x{}) does not fit a {}x{} atlas with padding {}, skipped",
                    mesh,
                    image.width(),
                    image.height(),
                    size.saturating_sub(1),
                    size.saturating_sub(1),
                    pad
                );
                continue;
            };

            let mut members = vec![(seed, rect)];
            for &other in &order[position + 1..] {
                let candidate = &self.inputs[other].1;
                if packed[other] || oversize(candidate) {
                    continue;
                }
                if let Some(rect) =
                    bin.insert(candidate.width() + 2 * pad, candidate.height() + 2 * pad)
                {
                    packed[other] = true;
                    members.push((other, rect));
                }
            }

            self.emit(&members);
        }

        log::info!(
            "Packed {} radiance maps into {} atlases",
            self.placements.len(),
            self.atlases.len()
        );
        &self.placements
    }

    /// Render one atlas from its packed members.
    fn emit(&mut self, members: &[(usize, Rect)]) {
        let size = self.atlas_size;
        let pad = self.padding;
        let atlas_index = self.atlases.len() as u32;
        let mut atlas = RgbImage::from_pixel(size, size, ATLAS_CLEAR);

        for &(input, rect) in members {
            let (mesh, image) = &self.inputs[input];
            let (w, h) = image.dimensions();
            let (x0, y0) = (rect.x + pad, rect.y + pad);

            imageops::replace(&mut atlas, image, x0 as i64, y0 as i64);
            pad_edges(&mut atlas, image, x0, y0, pad);

            self.placements.push((
                *mesh,
                Placement {
                    atlas: atlas_index,
                    scale_offset: Vec4::new(
                        w as f32 / size as f32,
                        h as f32 / size as f32,
                        x0 as f32 / size as f32,
                        y0 as f32 / size as f32,
                    ),
                },
            ));
        }

        // Wrap seam
        for y in 0..size {
            let pixel = *atlas.get_pixel(0, y);
            atlas.put_pixel(size - 1, y, pixel);
        }
        for x in 0..size {
            let pixel = *atlas.get_pixel(x, 0);
            atlas.put_pixel(x, size - 1, pixel);
        }

        self.atlases.push(atlas);
    }

    pub fn atlases(&self) -> &[RgbImage] {
        &self.atlases
    }

    pub fn placements(&self) -> &[(MeshId, Placement)] {
        &self.placements
    }

    pub fn placement(&self, mesh: MeshId) -> Option<Placement> {
        self.placements
            .iter()
            .find(|(id, _)| *id == mesh)
            .map(|(_, placement)| *placement)
    }

    pub fn into_atlases(self) -> Vec<RgbImage> {
        self.atlases
    }

    /// Write `Lightmap{index}.{ext}` files, returning the names in atlas order.
    pub fn save_lightmaps<P: AsRef<Path>>(&self, dir: P, format: OutputFormat) -> BakeResult<Vec<String>> {
        save_atlases(&self.atlases, dir, format)
    }
}

/// Replicate the image border into `pad` texels around it.
fn pad_edges(atlas: &mut RgbImage, image: &RgbImage, x0: u32, y0: u32, pad: u32) {
    let (w, h) = image.dimensions();
    for p in 1..=pad {
        for x in 0..w {
            atlas.put_pixel(x0 + x, y0 - p, *image.get_pixel(x, 0));
            atlas.put_pixel(x0 + x, y0 + h - 1 + p, *image.get_pixel(x, h - 1));
        }
        for y in 0..h {
            atlas.put_pixel(x0 - p, y0 + y, *image.get_pixel(0, y));
            atlas.put_pixel(x0 + w - 1 + p, y0 + y, *image.get_pixel(w - 1, y));
        }
    }
    for dy in 1..=pad {
        for dx in 1..=pad {
            atlas.put_pixel(x0 - dx, y0 - dy, *image.get_pixel(0, 0));
            atlas.put_pixel(x0 + w - 1 + dx, y0 - dy, *image.get_pixel(w - 1, 0));
            atlas.put_pixel(x0 - dx, y0 + h - 1 + dy, *image.get_pixel(0, h - 1));
            atlas.put_pixel(x0 + w - 1 + dx, y0 + h - 1 + dy, *image.get_pixel(w - 1, h - 1));
        }
    }
}

pub fn lightmap_name(index: usize, format: OutputFormat) -> String {
    format!("Lightmap{}.{}", index, format.extension())
}

pub fn save_atlases<P: AsRef<Path>>(
    atlases: &[RgbImage],
    dir: P,
    format: OutputFormat,
) -> BakeResult<Vec<String>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut names = Vec::with_capacity(atlases.len());
    for (index, atlas) in atlases.iter().enumerate() {
        let name = lightmap_name(index, format);
        atlas.save(dir.join(&name))?;
        log::info!("Saved {} ({}x{})", name, atlas.width(), atlas.height());
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(size: u32, padding: u32) -> BakeSettings {
        BakeSettings::default().with_lightmap_size(size, padding)
    }

    fn solid(w: u32, h: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
    }

    #[test]
    fn test_pack_is_idempotent() {
        let mut packer = LightMapPacker::new(&settings(64, 2));
        for (i, (w, h)) in [(20, 20), (30, 10), (8, 8), (40, 40), (12, 30)].iter().enumerate() {
            packer.add_radiance_map(i, solid(*w, *h, 100));
        }

        let first: Vec<_> = packer.pack().to_vec();
        let first_dims: Vec<_> = packer.atlases().iter().map(RgbImage::dimensions).collect();
        let second: Vec<_> = packer.pack().to_vec();
        let second_dims: Vec<_> = packer.atlases().iter().map(RgbImage::dimensions).collect();

        assert_eq!(first_dims, second_dims);
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_placement_round_trip() {
        let size = 128;
        let pad = 2;
        let mut packer = LightMapPacker::new(&settings(size, pad));
        let dims = [(16, 16), (32, 8), (5, 40)];
        for (i, (w, h)) in dims.iter().enumerate() {
            packer.add_radiance_map(i, solid(*w, *h, 50 + i as u8 * 50));
        }
        packer.pack();

        for (i, (w, h)) in dims.iter().enumerate() {
            let placement = packer.placement(i).unwrap();
            let so = placement.scale_offset;
            assert!((so.x * size as f32 - *w as f32).abs() < 0.001);
            assert!((so.y * size as f32 - *h as f32).abs() < 0.001);

            // Offset lands inside the padded rect, on the image itself
            let x0 = (so.z * size as f32).round() as u32;
            let y0 = (so.w * size as f32).round() as u32;
            assert!(x0 >= pad && y0 >= pad);
            let atlas = &packer.atlases()[placement.atlas as usize];
            let expected = 50 + i as u8 * 50;
            assert_eq!(atlas.get_pixel(x0, y0)[0], expected);
            assert_eq!(atlas.get_pixel(x0 + w - 1, y0 + h - 1)[0], expected);
            // Padding replicates the edge
            assert_eq!(atlas.get_pixel(x0 - 1, y0 - 1)[0], expected);
        }
    }

    #[test]
    fn test_oversize_gets_dedicated_atlas() {
        let mut packer = LightMapPacker::new(&settings(32, 1));
        packer.add_radiance_map(0, solid(10, 10, 1));
        packer.add_radiance_map(1, solid(40, 8, 2));
        packer.pack();

        assert_eq!(packer.atlases().len(), 2);
        let big = packer.placement(1).unwrap();
        assert_eq!(big.scale_offset, Vec4::new(1.0, 1.0, 0.0, 0.0));
        assert_eq!(packer.atlases()[big.atlas as usize].dimensions(), (40, 8));
        assert_eq!(packer.atlases()[packer.placement(0).unwrap().atlas as usize].dimensions(), (32, 32));
    }

    #[test]
    fn test_padding_overflow_is_skipped() {
        // Smaller than the atlas, but not with padding
        let mut packer = LightMapPacker::new(&settings(16, 2));
        packer.add_radiance_map(0, solid(14, 4, 1));
        packer.add_radiance_map(1, solid(4, 4, 2));
        packer.pack();

        assert!(packer.placement(0).is_none());
        assert!(packer.placement(1).is_some());
        assert_eq!(packer.atlases().len(), 1);
    }

    #[test]
    fn test_overflow_starts_new_atlas() {
        let mut packer = LightMapPacker::new(&settings(32, 0));
        for i in 0..3 {
            packer.add_radiance_map(i, solid(20, 20, 9));
        }
        packer.pack();
        assert_eq!(packer.atlases().len(), 3);
        assert!(packer.atlases().iter().all(|a| a.dimensions() == (32, 32)));
    }

    #[test]
    fn test_empty_packer() {
        let mut packer = LightMapPacker::new(&BakeSettings::default());
        assert_eq!(packer.input_count(), 0);
        assert!(packer.pack().is_empty());
        assert!(packer.atlases().is_empty());
    }

    /// Every texel of each placed rect and its padding still holds the input value.
    fn assert_rects_intact(packer: &LightMapPacker, values: &[u8], pad: u32) {
        for (mesh, placement) in packer.placements() {
            let atlas = &packer.atlases()[placement.atlas as usize];
            let size = atlas.width() as f32;
            let so = placement.scale_offset;
            let x0 = (so.z * size).round() as u32;
            let y0 = (so.w * size).round() as u32;
            let w = (so.x * size).round() as u32;
            let h = (so.y * size).round() as u32;

            let mut wrong = 0;
            for y in y0 - pad..y0 + h + pad {
                for x in x0 - pad..x0 + w + pad {
                    if atlas.get_pixel(x, y)[0] != values[*mesh] {
                        wrong += 1;
                    }
                }
            }
            assert_eq!(wrong, 0, "mesh {} at ({}, {}) lost texels", mesh, x0, y0);
        }
    }

    fn assert_wrap_seam(atlas: &RgbImage) {
        let (w, h) = atlas.dimensions();
        for y in 0..h {
            assert_eq!(atlas.get_pixel(w - 1, y), atlas.get_pixel(0, y));
        }
        for x in 0..w {
            assert_eq!(atlas.get_pixel(x, h - 1), atlas.get_pixel(x, 0));
        }
    }

    #[test]
    fn test_wrap_seam_keeps_edge_rects() {
        let values = [10, 20, 30, 40];

        // No padding: rects would otherwise reach the last row and column
        let mut packer = LightMapPacker::new(&settings(32, 0));
        for (i, value) in values.iter().enumerate() {
            packer.add_radiance_map(i, solid(16, 16, *value));
        }
        packer.pack();
        assert_eq!(packer.placements().len(), 4);
        assert_rects_intact(&packer, &values, 0);
        packer.atlases().iter().for_each(assert_wrap_seam);

        // Padded rects keep their own edge color in the border
        let mut packer = LightMapPacker::new(&settings(40, 2));
        for (i, value) in values.iter().enumerate() {
            packer.add_radiance_map(i, solid(16, 16, *value));
        }
        packer.pack();
        assert_eq!(packer.placements().len(), 4);
        assert_rects_intact(&packer, &values, 2);
        packer.atlases().iter().for_each(assert_wrap_seam);
    }

    #[test]
    fn test_rect_filling_atlas_stops_before_seam() {
        let mut packer = LightMapPacker::new(&settings(32, 0));
        packer.add_radiance_map(0, solid(31, 31, 77));
        packer.add_radiance_map(1, solid(2, 2, 5));
        assert_eq!(packer.input_count(), 2);
        packer.pack();

        // The small map no longer fits beside the full one
        assert_eq!(packer.atlases().len(), 2);
        assert_eq!(packer.placement(0).unwrap().atlas, 0);
        assert_rects_intact(&packer, &[77, 5], 0);
        assert_wrap_seam(&packer.atlases()[0]);
    }

    #[test]
    fn test_save_lightmaps_writes_atlases() {
        let dir = std::env::temp_dir().join(format!("glint_packer_{}", std::process::id()));
        let mut packer = LightMapPacker::new(&settings(32, 0));
        for i in 0..2 {
            packer.add_radiance_map(i, solid(20, 20, 9));
        }
        packer.pack();

        let names = packer.save_lightmaps(&dir, OutputFormat::Png).unwrap();
        assert_eq!(names, vec!["Lightmap0.png".to_string(), "Lightmap1.png".to_string()]);
        let reread = image::open(dir.join(&names[1])).unwrap().to_rgb8();
        assert_eq!(reread.dimensions(), (32, 32));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lightmap_name() {
        assert_eq!(lightmap_name(0, OutputFormat::Png), "Lightmap0.png");
        assert_eq!(lightmap_name(3, OutputFormat::Tga), "Lightmap3.tga");
    }
}
