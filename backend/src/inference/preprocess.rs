use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

use crate::config::{ConfigError, DEFAULT_IMAGE_SIZE, InferenceConfig};

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to build input tensor: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Turns encoded image bytes into the `(1, H, W, 3)` tensor the classifier expects.
///
/// The image is forced to RGB, stretched to the target size without keeping its
/// aspect ratio, and scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    height: u32,
    width: u32,
    filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE, FilterType::CatmullRom)
    }
}

impl Preprocessor {
    pub fn new(height: u32, width: u32, filter: FilterType) -> Self {
        Self {
            height,
            width,
            filter,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Result<Self, ConfigError> {
        let (height, width) = config.target_size();
        Ok(Self::new(height, width, config.resize_filter()?))
    }

    /// NHWC shape of the produced tensor.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
        let image = image::load_from_memory(bytes)?;
        self.preprocess_image(&image)
    }

    pub fn preprocess_image(&self, image: &DynamicImage) -> Result<Array4<f32>, PreprocessError> {
        let rgb: RgbImage = image.to_rgb8();
        let resized = imageops::resize(&rgb, self.width, self.height, self.filter);
        let data: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|value| value as f32 / 255.0)
            .collect();

        // RgbImage rows are contiguous HWC, which is the tensor layout.
        let tensor = Array4::from_shape_vec(
            (1, self.height as usize, self.width as usize, 3),
            data,
        )?;
        Ok(tensor)
    }
}
