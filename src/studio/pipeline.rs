// Studio - runs one request through validate, style, generate, watermark, persist

use super::storage::{ArtifactWriter, StorageError};
use super::style::apply_style;
use super::types::{
    GenerationParameters, GenerationRequest, PersistedArtifact, Progress, ValidationError,
};
use super::watermark::Watermarker;
use image::RgbImage;
use imagent::{ComputeDevice, ImageGenError, ImageGenerator};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Generation failed: {0}")]
    Generation(#[from] ImageGenError),

    #[error("Saving failed: {0}")]
    Storage(#[from] StorageError),
}

impl StudioError {
    /// Validation failures are meant to be shown to the user as-is
    pub fn is_validation(&self) -> bool {
        matches!(self, StudioError::Validation(_))
    }
}

/// One watermarked image and where it was written
#[derive(Debug, Clone)]
pub struct StudioImage {
    pub index: usize,
    pub image: RgbImage,
    pub artifact: PersistedArtifact,
}

/// Owns the loaded model handle and the post-processing steps
pub struct Studio {
    generator: Box<dyn ImageGenerator>,
    watermarker: Watermarker,
    writer: ArtifactWriter,
}

impl Studio {
    pub fn new(
        generator: Box<dyn ImageGenerator>,
        watermarker: Watermarker,
        writer: ArtifactWriter,
    ) -> Self {
        Self {
            generator,
            watermarker,
            writer,
        }
    }

    pub fn device(&self) -> ComputeDevice {
        self.generator.device()
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub fn run(&mut self, request: &GenerationRequest) -> Result<Vec<StudioImage>, StudioError> {
        self.run_with_progress(request, |_| {})
    }

    /// Process one request, calling `on_progress` as stages complete.
    ///
    /// No retries and no rollback: if saving image N fails, images before
    /// it stay on disk and the error is returned.
    pub fn run_with_progress(
        &mut self,
        request: &GenerationRequest,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<Vec<StudioImage>, StudioError> {
        request.validate()?;
        on_progress(Progress::Validated);

        let styled_prompt = apply_style(&request.prompt, request.style);
        let device = self.generator.device();
        let parameters = GenerationParameters::from_request(request, device.as_str());

        tracing::info!(
            "Generating {} image(s) on {} ({} steps, guidance {})",
            request.num_images,
            device,
            request.steps,
            request.guidance_scale
        );
        on_progress(Progress::Generating);
        let images = self.generator.generate(&request.to_params(&styled_prompt))?;

        let total = images.len();
        let mut results = Vec::with_capacity(total);
        for (index, image) in images.into_iter().enumerate() {
            on_progress(Progress::PostProcessing { index, total });

            let marked = self.watermarker.watermark(&image);
            let artifact = self.writer.save(
                &marked,
                &styled_prompt,
                &request.negative_prompt,
                &parameters,
                index,
            )?;
            tracing::info!("Saved variant {} to {}", index + 1, artifact.png_path.display());

            results.push(StudioImage {
                index,
                image: marked,
                artifact,
            });
        }

        on_progress(Progress::Completed);
        Ok(results)
    }
}
