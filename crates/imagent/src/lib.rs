// imagent - AI Image Generation Library
// Provides a batch text-to-image interface over Stable Diffusion via Candle

mod preview;
mod stable_diffusion;

pub mod error;

pub use error::{ImageGenError, Result};
pub use preview::PreviewGenerator;
pub use stable_diffusion::{StableDiffusionGenerator, StableDiffusionVersion};

use image::RgbImage;
use serde::Serialize;
use std::fmt;

/// Parameters for one generation batch
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Text prompt describing the image to generate
    pub prompt: String,

    /// What to steer away from; empty means no negative conditioning
    pub negative_prompt: String,

    /// Number of images in the batch (the prompt is replicated this many times)
    pub num_images: usize,

    /// Classifier-free guidance scale
    pub guidance_scale: f64,

    /// Number of inference steps (more steps = better quality but slower)
    pub steps: usize,

    /// Height of the generated images (must be multiple of 8)
    pub height: usize,

    /// Width of the generated images (must be multiple of 8)
    pub width: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            num_images: 1,
            guidance_scale: 7.5,
            steps: 30,
            height: 512,
            width: 512,
        }
    }
}

impl GenerationParams {
    /// Check the constraints every backend relies on
    pub fn validate(&self) -> Result<()> {
        if self.width % 8 != 0 || self.height % 8 != 0 {
            return Err(ImageGenError::InvalidConfig(
                "Width and height must be multiples of 8".into(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ImageGenError::InvalidConfig(
                "Width and height must be non-zero".into(),
            ));
        }
        if self.num_images == 0 {
            return Err(ImageGenError::InvalidConfig(
                "At least one image must be requested".into(),
            ));
        }
        if self.steps == 0 {
            return Err(ImageGenError::InvalidConfig(
                "At least one inference step is required".into(),
            ));
        }
        Ok(())
    }

    /// The negative prompt, or `None` when no negative conditioning was asked for
    pub fn negative(&self) -> Option<&str> {
        let negative = self.negative_prompt.trim();
        (!negative.is_empty()).then_some(self.negative_prompt.as_str())
    }
}

/// Compute device a model handle was loaded on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cuda,
    Cpu,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for image generation backends.
///
/// Implementations hold an already loaded model; construction is the
/// expensive part, `generate` only runs inference.
pub trait ImageGenerator: Send {
    /// Generate exactly `params.num_images` images
    fn generate(&mut self, params: &GenerationParams) -> Result<Vec<RgbImage>>;

    /// Device the model runs on
    fn device(&self) -> ComputeDevice;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(GenerationParams::default().validate().is_ok());
    }

    #[test]
    fn test_dimensions_must_be_multiple_of_eight() {
        let params = GenerationParams {
            width: 500,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ImageGenError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_images_rejected() {
        let params = GenerationParams {
            num_images: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_blank_negative_prompt_is_none() {
        let mut params = GenerationParams::default();
        assert_eq!(params.negative(), None);

        params.negative_prompt = "   ".into();
        assert_eq!(params.negative(), None);

        params.negative_prompt = "blurry".into();
        assert_eq!(params.negative(), Some("blurry"));
    }

    #[test]
    fn test_device_names() {
        assert_eq!(ComputeDevice::Cuda.to_string(), "cuda");
        assert_eq!(ComputeDevice::Cpu.as_str(), "cpu");
    }

    #[test]
    fn test_device_serializes_like_its_name() {
        for device in [ComputeDevice::Cuda, ComputeDevice::Cpu] {
            let json = serde_json::to_value(device).unwrap();
            assert_eq!(json, device.as_str());
        }
    }
}
