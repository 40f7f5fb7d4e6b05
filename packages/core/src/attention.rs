//! Attention overlays for the uploaded image.
//!
//! [`SyntheticAttention`] paints a fixed-seed heatmap of soft hotspots. It is
//! a visual aid only and is not derived from the backbone's activations; a
//! class-activation implementation can be swapped in through [`AttentionMap`].

use histofuse_types::image::{DynamicImage, GenericImageView, Pixel, Rgba, RgbaImage};
use histofuse_types::imageproc::{drawing::draw_filled_circle_mut, filter::gaussian_blur_f32};
use histofuse_types::rand::{Rng, SeedableRng, rngs::StdRng};
use histofuse_types::utils::img;

use crate::error::{FusionError, FusionResult};

/// Produces an overlay with the same dimensions as its input
pub trait AttentionMap: Send + Sync {
    fn overlay(&self, image: &DynamicImage) -> FusionResult<DynamicImage>;
}

#[derive(Clone, Debug)]
pub struct SyntheticAttention {
    pub seed: u64,
    pub min_hotspots: u32,
    pub max_hotspots: u32,
    pub min_radius: u32,
    pub blur_sigma: f32,
}

impl Default for SyntheticAttention {
    fn default() -> Self {
        Self {
            seed: 42,
            min_hotspots: 3,
            max_hotspots: 6,
            min_radius: 20,
            blur_sigma: 3.0,
        }
    }
}

/// Uniform draw from `[lo, hi)`, or `lo` when the range is empty
fn draw_in(rng: &mut StdRng, lo: u32, hi: u32) -> u32 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

impl SyntheticAttention {
    /// RGBA heatmap of `width x height`, transparent outside the hotspots
    pub fn heatmap(&self, width: u32, height: u32) -> RgbaImage {
        let mut heatmap = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut rng = StdRng::seed_from_u64(self.seed);

        let hotspots = draw_in(&mut rng, self.min_hotspots, self.max_hotspots + 1);
        for _ in 0..hotspots {
            let cx = draw_in(&mut rng, width / 4, 3 * width / 4);
            let cy = draw_in(&mut rng, height / 4, 3 * height / 4);
            // small images cannot fit the minimum radius
            let max_radius = width.min(height) / 8;
            let radius = if max_radius > self.min_radius {
                rng.random_range(self.min_radius..max_radius)
            } else {
                max_radius.max(2)
            };
            let intensity: f32 = rng.random_range(0.3..0.8);

            let green = (255.0 * (1.0 - intensity)) as u8;
            for r in (1..=radius).rev().step_by(2) {
                let alpha = (255.0 * intensity * (radius - r) as f32 / radius as f32) as u8;
                draw_filled_circle_mut(
                    &mut heatmap,
                    (cx as i32, cy as i32),
                    r as i32,
                    Rgba([255, green, 0, alpha]),
                );
            }
        }

        gaussian_blur_f32(&heatmap, self.blur_sigma)
    }
}

impl AttentionMap for SyntheticAttention {
    fn overlay(&self, image: &DynamicImage) -> FusionResult<DynamicImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FusionError::invalid_input(format!(
                "cannot draw attention on an empty image ({width}x{height})"
            )));
        }

        let heatmap = self.heatmap(width, height);
        let mut base = image.to_rgba8();
        for (dst, src) in base.pixels_mut().zip(heatmap.pixels()) {
            dst.blend(src);
        }
        Ok(DynamicImage::ImageRgba8(base).to_rgb8().into())
    }
}

/// Decode upload bytes, draw the overlay and encode it as PNG
pub fn render_overlay_png(attention: &dyn AttentionMap, bytes: &[u8]) -> FusionResult<Vec<u8>> {
    let image = img::decode(bytes)
        .map_err(|e| FusionError::invalid_input(format!("image could not be used: {e}")))?;
    let overlay = attention.overlay(&image)?;
    img::encode_png(&overlay)
        .map_err(|e| FusionError::inference(format!("failed to encode overlay: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use histofuse_types::image::{Rgb, RgbImage};

    fn tissue(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 160, 190])))
    }

    #[test]
    fn dimensions_are_preserved() {
        let attention = SyntheticAttention::default();
        for (w, h) in [(64, 64), (512, 384), (1000, 1000)] {
            let out = attention.overlay(&tissue(w, h)).unwrap();
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let attention = SyntheticAttention::default();
        let img = tissue(400, 300);
        let a = attention.overlay(&img).unwrap();
        let b = attention.overlay(&img).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn hotspots_tint_the_image() {
        let img = tissue(512, 512);
        let out = SyntheticAttention::default().overlay(&img).unwrap();
        assert_ne!(out.to_rgb8().as_raw(), img.to_rgb8().as_raw());
    }

    #[test]
    fn tiny_images_still_render() {
        let out = SyntheticAttention::default().overlay(&tissue(1, 1)).unwrap();
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn png_rendering() {
        let png = img::encode_png(&tissue(256, 200)).unwrap();
        let attention = SyntheticAttention::default();
        let out = render_overlay_png(&attention, &png).unwrap();
        let decoded = img::decode(&out).unwrap();
        assert_eq!(decoded.dimensions(), (256, 200));

        let err = render_overlay_png(&attention, b"definitely not an image").unwrap_err();
        assert!(err.is_invalid_input());
    }
}
