//! Image decoding and normalization into the backbone's input tensor.

use histofuse_model_provider::backbone::DEFAULT_RESOLUTION;
use histofuse_types::image::{DynamicImage, GenericImageView, imageops::FilterType};
use histofuse_types::utils::img;
use ndarray::{Array3, Array4, ArrayView4, Axis};

use crate::error::{FusionError, FusionResult};

/// Per-channel statistics of the ImageNet training distribution
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized `[1, 3, R, R]` input for one request
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn resolution(&self) -> u32 {
        self.data.shape()[3] as u32
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.data
    }
}

#[derive(Clone, Debug)]
pub struct ImagePreprocessor {
    resolution: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION)
    }
}

impl ImagePreprocessor {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution: resolution.max(1),
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn with_stats(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Decode raw upload bytes into an image
    pub fn decode(&self, bytes: &[u8]) -> FusionResult<DynamicImage> {
        let image = img::decode(bytes).map_err(|e| FusionError::invalid_image(e.to_string()))?;
        check_image(&image)?;
        Ok(image)
    }

    pub fn preprocess_bytes(&self, bytes: &[u8]) -> FusionResult<ImageTensor> {
        let image = self.decode(bytes)?;
        self.preprocess(&image)
    }

    pub fn preprocess(&self, image: &DynamicImage) -> FusionResult<ImageTensor> {
        check_image(image)?;

        let r = self.resolution;
        let (w, h) = image.dimensions();
        let rgb = if w == r && h == r {
            image.to_rgb8()
        } else {
            image.resize_exact(r, r, FilterType::Triangle).to_rgb8()
        };

        let (mean, std) = (self.mean, self.std);
        let buf: Vec<f32> = rgb
            .into_raw()
            .chunks_exact(3)
            .flat_map(|px| {
                (0..3).map(move |c| ((px[c] as f32) / 255.0 - mean[c]) / std[c])
            })
            .collect();

        // HWC -> NCHW
        let data = Array3::from_shape_vec((r as usize, r as usize, 3), buf)
            .map_err(|e| FusionError::invalid_image(e.to_string()))?
            .permuted_axes([2, 0, 1])
            .insert_axis(Axis(0))
            .as_standard_layout()
            .into_owned();

        Ok(ImageTensor { data })
    }
}

/// Anything decodable converts to RGB, so only degenerate sizes are rejected here
fn check_image(image: &DynamicImage) -> FusionResult<()> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(FusionError::invalid_image(format!(
            "image has no pixels ({w}x{h})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use histofuse_types::image::{GrayImage, Luma, Rgb, RgbImage};

    fn solid(w: u32, h: u32, px: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(px)))
    }

    #[test]
    fn output_resolution_is_fixed() {
        let pre = ImagePreprocessor::default();
        for (w, h) in [(50, 50), (1000, 1000), (300, 120), (17, 640)] {
            let t = pre.preprocess(&solid(w, h, [12, 200, 90])).unwrap();
            assert_eq!(t.shape(), &[1, 3, 224, 224], "input {w}x{h}");
        }
    }

    #[test]
    fn normalization_uses_channel_stats() {
        let pre = ImagePreprocessor::new(4);
        let t = pre.preprocess(&solid(4, 4, [255, 0, 128])).unwrap();
        let v = t.view();
        assert!((v[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((v[[0, 1, 2, 3]] - (0.0 - 0.456) / 0.224).abs() < 1e-5);
        assert!((v[[0, 2, 1, 1]] - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }

    #[test]
    fn channels_land_in_nchw_order() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        let pre = ImagePreprocessor::new(2).with_stats([0.0; 3], [1.0; 3]);
        let t = pre.preprocess(&DynamicImage::ImageRgb8(img)).unwrap();
        let v = t.view();
        // row 0, column 1, red channel
        assert_eq!(v[[0, 0, 0, 1]], 1.0);
        assert_eq!(v[[0, 0, 1, 0]], 0.0);
        assert_eq!(v[[0, 1, 0, 1]], 0.0);
    }

    #[test]
    fn grayscale_is_expanded() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 30, Luma([128])));
        let t = ImagePreprocessor::default().preprocess(&gray).unwrap();
        assert_eq!(t.resolution(), 224);
    }

    #[test]
    fn deterministic() {
        let pre = ImagePreprocessor::default();
        let img = solid(333, 77, [1, 2, 3]);
        assert_eq!(pre.preprocess(&img).unwrap(), pre.preprocess(&img).unwrap());
    }

    #[test]
    fn undecodable_bytes_are_invalid_image() {
        let err = ImagePreprocessor::default()
            .preprocess_bytes(b"not a png")
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidImage(_)));
    }

    #[test]
    fn empty_image_is_invalid() {
        let err = ImagePreprocessor::default()
            .preprocess(&solid(0, 0, [0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidImage(_)));
    }
}
