//! Radiance accumulation and conversion to 8-bit texels.

use glint_core::ToneMapping;
use glint_math::Vec3;

/// Linear RGB radiance.
pub type Color = Vec3;

/// Per-sample accumulator, kept as separate channels until rasterization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radiance {
    pub direct: Color,
    pub indirect: Color,
    /// Ambient occlusion factor, 1 when AO is off
    pub ao: f32,
}

impl Default for Radiance {
    fn default() -> Self {
        Self {
            direct: Color::ZERO,
            indirect: Color::ZERO,
            ao: 1.0,
        }
    }
}

impl Radiance {
    /// Combined linear color: `(direct + indirect) * ao`.
    pub fn combined(&self) -> Color {
        (self.direct + self.indirect) * self.ao
    }

    /// Tone-mapped, gamma-corrected color in [0, 1].
    pub fn resolve(&self, tone: ToneMapping) -> Color {
        let mapped = tone.apply(self.combined());
        Color::new(
            clamp_01(linear_to_gamma(mapped.x)),
            clamp_01(linear_to_gamma(mapped.y)),
            clamp_01(linear_to_gamma(mapped.z)),
        )
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Clamp a value to [0, 1] range.
#[inline]
pub fn clamp_01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// Quantize an already gamma-corrected color to 8 bits.
pub fn color_to_rgb(color: Color) -> [u8; 3] {
    [
        (255.0 * clamp_01(color.x)) as u8,
        (255.0 * clamp_01(color.y)) as u8,
        (255.0 * clamp_01(color.z)) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(-1.0), 0.0);
        assert!((linear_to_gamma(1.0) - 1.0).abs() < 0.0001);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 0.0001);
    }

    #[test]
    fn test_resolve_applies_ao_and_clamps() {
        let radiance = Radiance {
            direct: Color::new(0.5, 2.0, 0.0),
            indirect: Color::new(0.5, 0.0, 0.0),
            ao: 0.25,
        };
        let c = radiance.resolve(ToneMapping::Clamp);
        assert!((c.x - 0.5).abs() < 0.0001);
        assert!((c.y - 0.7071).abs() < 0.001);
        assert_eq!(c.z, 0.0);

        let bright = Radiance {
            direct: Color::splat(10.0),
            ..Default::default()
        };
        assert_eq!(bright.resolve(ToneMapping::Clamp), Color::ONE);
        assert!(bright.resolve(ToneMapping::Reinhard).x < 1.0);
    }

    #[test]
    fn test_color_to_rgb() {
        assert_eq!(color_to_rgb(Color::new(0.0, 1.0, 2.0)), [0, 255, 255]);
        assert_eq!(color_to_rgb(Color::splat(0.5)), [127, 127, 127]);
    }
}
