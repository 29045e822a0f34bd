// Procedural preview backend - produces placeholder images without model weights

use crate::{ComputeDevice, GenerationParams, ImageGenerator, Result};
use image::{Rgb, RgbImage};
use rand::Rng;

/// Generator that paints a gradient with per-pixel noise.
///
/// Useful for trying the rest of the pipeline on machines without the
/// Stable Diffusion weights, and as a test double.
#[derive(Debug, Default)]
pub struct PreviewGenerator;

impl PreviewGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ImageGenerator for PreviewGenerator {
    fn generate(&mut self, params: &GenerationParams) -> Result<Vec<RgbImage>> {
        params.validate()?;

        tracing::warn!("Using preview backend - generating placeholder images");
        tracing::info!("Prompt: {}", params.prompt);

        let mut rng = rand::thread_rng();
        let width = params.width as u32;
        let height = params.height as u32;

        let images = (0..params.num_images)
            .map(|_| {
                let tint: u8 = rng.gen_range(0..=80);
                RgbImage::from_fn(width, height, |x, y| {
                    let r = ((x as f32 / width as f32) * 255.0) as u8;
                    let g = ((y as f32 / height as f32) * 255.0) as u8;
                    let b = (rng.gen::<f32>() * 50.0 + 100.0) as u8;
                    Rgb([r, g, b.saturating_add(tint)])
                })
            })
            .collect();

        Ok(images)
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_batch_size_and_dimensions() {
        let mut generator = PreviewGenerator::new();
        let params = GenerationParams {
            prompt: "a lighthouse".into(),
            num_images: 3,
            height: 64,
            width: 96,
            ..Default::default()
        };

        let images = generator.generate(&params).unwrap();
        assert_eq!(images.len(), 3);
        for image in &images {
            assert_eq!(image.dimensions(), (96, 64));
        }
    }

    #[test]
    fn test_preview_rejects_invalid_params() {
        let mut generator = PreviewGenerator::new();
        let params = GenerationParams {
            height: 63,
            ..Default::default()
        };
        assert!(generator.generate(&params).is_err());
    }

    #[test]
    fn test_preview_runs_on_cpu() {
        assert_eq!(PreviewGenerator::new().device(), ComputeDevice::Cpu);
    }
}
