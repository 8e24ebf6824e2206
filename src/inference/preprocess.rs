//! Image preprocessing
//!
//! Turns an arbitrary-size colour image into the `[1, 3, H, W]` tensor the
//! network expects: shorter side resized with a bicubic filter, center crop,
//! scale to `[0, 1]`, ImageNet mean/std normalization, CHW layout.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, ColorType, DynamicImage, ImageBuffer, RgbImage};
use serde::{Deserialize, Serialize};

use crate::model::EfficientNetConfig;
use crate::utils::error::PreprocessError;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Target length of the shorter image side after resizing
    pub resize_size: u32,
    /// Side of the square center crop fed to the network
    pub crop_size: u32,
    /// Per-channel mean, applied after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Per-channel standard deviation
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_size: 288,
            crop_size: 288,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessConfig {
    /// Constants matching a model's input resolution
    pub fn for_model(config: &EfficientNetConfig) -> Self {
        let size = config.image_size as u32;
        Self {
            resize_size: size,
            crop_size: size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.crop_size == 0 || self.resize_size == 0 {
            return Err("resize_size and crop_size must be positive".to_string());
        }

        if self.crop_size > self.resize_size {
            return Err(format!(
                "crop_size ({}) cannot exceed resize_size ({})",
                self.crop_size, self.resize_size
            ));
        }

        if self.std.iter().any(|&s| !(s > 0.0)) {
            return Err("std values must be positive".to_string());
        }

        Ok(())
    }
}

/// Normalized input of shape `[1, 3, height, width]`, channel-major
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl InputTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height, self.width]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Upload to a device as a 4D tensor
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 4>::from_floats(TensorData::new(self.data.clone(), self.shape()), device)
    }
}

/// Deterministic image-to-tensor transform
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Preprocess an image for inference
    pub fn preprocess(&self, image: &DynamicImage) -> Result<InputTensor, PreprocessError> {
        ensure_color(image)?;

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage { width, height });
        }

        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let resized = resize_shorter_side(&rgb, self.config.resize_size)?;
        let cropped = center_crop(&resized, self.config.crop_size);

        Ok(self.normalize(&cropped))
    }

    /// Decode encoded bytes (PNG, JPEG, ...) and preprocess them
    pub fn preprocess_encoded(&self, bytes: &[u8]) -> Result<InputTensor, PreprocessError> {
        let image = decode_image(bytes)?;
        self.preprocess(&image)
    }

    /// Scale to [0, 1], normalize, and lay out as CHW
    fn normalize(&self, rgb: &RgbImage) -> InputTensor {
        let (width, height) = rgb.dimensions();
        let num_pixels = (width * height) as usize;
        let PreprocessConfig { mean, std, .. } = &self.config;

        let mut data = vec![0.0f32; 3 * num_pixels];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                data[c * num_pixels + i] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
            }
        }

        InputTensor {
            data,
            height: height as usize,
            width: width as usize,
        }
    }
}

/// Reject layouts that have no colour information
fn ensure_color(image: &DynamicImage) -> Result<(), PreprocessError> {
    match image.color() {
        ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::Rgb16
        | ColorType::Rgba16
        | ColorType::Rgb32F
        | ColorType::Rgba32F => Ok(()),
        other => Err(PreprocessError::UnsupportedLayout(format!(
            "{:?} cannot be used as 3-channel colour",
            other
        ))),
    }
}

/// Output size when the shorter side becomes `target`, keeping aspect ratio
///
/// Fails when the scaled long side does not fit in a `u32`.
pub fn resized_dimensions(
    width: u32,
    height: u32,
    target: u32,
) -> Result<(u32, u32), PreprocessError> {
    let (long, short) = (width.max(height) as u64, width.min(height) as u64);
    let scaled = u32::try_from(target as u64 * long / short)
        .map_err(|_| PreprocessError::AspectRatio { width, height })?;

    if width <= height {
        Ok((target, scaled))
    } else {
        Ok((scaled, target))
    }
}

fn resize_shorter_side(
    image: &DynamicImage,
    target: u32,
) -> Result<DynamicImage, PreprocessError> {
    let (width, height) = resized_dimensions(image.width(), image.height(), target)?;
    Ok(image.resize_exact(width, height, FilterType::CatmullRom))
}

/// Offset of a centered window; halves round to even
fn crop_offset(length: u32, crop: u32) -> u32 {
    (length.saturating_sub(crop) as f64 / 2.0).round_ties_even() as u32
}

fn center_crop(image: &DynamicImage, size: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let left = crop_offset(width, size);
    let top = crop_offset(height, size);

    image::imageops::crop_imm(&rgb, left, top, size.min(width), size.min(height)).to_image()
}

/// Decode an encoded image held in memory
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

/// Wrap an interleaved 8-bit pixel buffer as an image
///
/// `channels` selects the layout: 1 = L, 2 = LA, 3 = RGB, 4 = RGBA.
pub fn image_from_raw(
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
) -> Result<DynamicImage, PreprocessError> {
    let expected = width as usize * height as usize * channels as usize;
    if data.len() != expected {
        return Err(PreprocessError::BufferSize {
            width,
            height,
            channels,
            actual: data.len(),
        });
    }

    let image = match channels {
        1 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        2 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
        3 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        4 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        other => {
            return Err(PreprocessError::UnsupportedLayout(format!(
                "{other} channels per pixel"
            )))
        }
    };

    image.ok_or(PreprocessError::BufferSize {
        width,
        height,
        channels,
        actual: expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, Rgba, RgbaImage};

    fn small() -> Preprocessor {
        Preprocessor::new(PreprocessConfig {
            resize_size: 40,
            crop_size: 32,
            ..Default::default()
        })
    }

    #[test]
    fn test_resized_dimensions() {
        assert_eq!(resized_dimensions(500, 375, 288).unwrap(), (384, 288));
        assert_eq!(resized_dimensions(256, 256, 288).unwrap(), (288, 288));
        assert_eq!(resized_dimensions(100, 300, 288).unwrap(), (288, 864));
    }

    #[test]
    fn test_resized_long_side_never_wraps() {
        assert!(matches!(
            resized_dimensions(1, 14_913_081, 288),
            Err(PreprocessError::AspectRatio {
                width: 1,
                height: 14_913_081
            })
        ));
        assert!(matches!(
            resized_dimensions(u32::MAX, 1, 2),
            Err(PreprocessError::AspectRatio { .. })
        ));

        let (w, h) = resized_dimensions(1, 14_913_081, 1).unwrap();
        assert_eq!((w, h), (1, 14_913_081));
    }

    #[test]
    fn test_crop_offset_rounds_half_to_even() {
        assert_eq!(crop_offset(289, 288), 0);
        assert_eq!(crop_offset(291, 288), 2);
        assert_eq!(crop_offset(384, 288), 48);
        assert_eq!(crop_offset(288, 288), 0);
    }

    #[test]
    fn test_output_shape_for_arbitrary_sizes() {
        let preprocessor = small();
        for (w, h) in [(100, 100), (640, 480), (31, 97), (1, 1)] {
            let image = DynamicImage::new_rgb8(w, h);
            let tensor = preprocessor.preprocess(&image).unwrap();
            assert_eq!(tensor.shape(), [1, 3, 32, 32]);
            assert_eq!(tensor.data().len(), 3 * 32 * 32);
        }
    }

    #[test]
    fn test_default_shape_is_b2_input() {
        let tensor = Preprocessor::default()
            .preprocess(&DynamicImage::new_rgb8(256, 256))
            .unwrap();
        assert_eq!(tensor.shape(), [1, 3, 288, 288]);
    }

    #[test]
    fn test_normalization_values() {
        let image = RgbImage::from_pixel(50, 50, Rgb([255, 0, 128]));
        let tensor = small()
            .preprocess(&DynamicImage::ImageRgb8(image))
            .unwrap();

        let plane = 32 * 32;
        let data = tensor.data();
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        let b = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];

        assert!((data[0] - r).abs() < 1e-5);
        assert!((data[plane] - g).abs() < 1e-5);
        assert!((data[2 * plane] - b).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic() {
        let image = RgbImage::from_fn(70, 45, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 77]));
        let image = DynamicImage::ImageRgb8(image);
        let preprocessor = small();

        let a = preprocessor.preprocess(&image).unwrap();
        let b = preprocessor.preprocess(&image).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let rgba = RgbaImage::from_pixel(40, 40, Rgba([10, 20, 30, 0]));
        let rgb = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));

        let a = small().preprocess(&DynamicImage::ImageRgba8(rgba)).unwrap();
        let b = small().preprocess(&DynamicImage::ImageRgb8(rgb)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_grayscale_rejected() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(64, 64));
        let result = small().preprocess(&gray);
        assert!(matches!(result, Err(PreprocessError::UnsupportedLayout(_))));
    }

    #[test]
    fn test_empty_image_rejected() {
        let result = small().preprocess(&DynamicImage::new_rgb8(0, 10));
        assert!(matches!(
            result,
            Err(PreprocessError::EmptyImage {
                width: 0,
                height: 10
            })
        ));
    }

    #[test]
    fn test_image_from_raw() {
        let rgb = image_from_raw(2, 2, 3, vec![0; 12]).unwrap();
        assert_eq!(rgb.color(), ColorType::Rgb8);

        let gray = image_from_raw(2, 2, 1, vec![0; 4]).unwrap();
        assert!(small().preprocess(&gray).is_err());

        assert!(matches!(
            image_from_raw(2, 2, 3, vec![0; 11]),
            Err(PreprocessError::BufferSize { actual: 11, .. })
        ));
        assert!(matches!(
            image_from_raw(1, 1, 5, vec![0; 5]),
            Err(PreprocessError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn test_decode_garbage() {
        let result = small().preprocess_encoded(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(PreprocessConfig::default().validate().is_ok());

        let config = PreprocessConfig {
            crop_size: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PreprocessConfig {
            std: [0.2, 0.0, 0.2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
