// Stable Diffusion implementation using Candle

use crate::{ComputeDevice, GenerationParams, ImageGenError, ImageGenerator, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::sync::{Api, ApiBuilder};
use image::RgbImage;
use std::path::PathBuf;
use tokenizers::Tokenizer;

/// Stable Diffusion model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableDiffusionVersion {
    /// Stable Diffusion v1.5
    V1_5,
    /// Stable Diffusion v2.1
    V2_1,
}

impl StableDiffusionVersion {
    pub fn repo(&self) -> &str {
        match self {
            Self::V1_5 => "runwayml/stable-diffusion-v1-5",
            Self::V2_1 => "stabilityai/stable-diffusion-2-1",
        }
    }

    fn tokenizer_repo(&self) -> &str {
        "openai/clip-vit-base-patch32"
    }

    fn sd_config(&self) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(None, None, None),
            Self::V2_1 => StableDiffusionConfig::v2_1(None, None, None),
        }
    }
}

/// Loaded Stable Diffusion pipeline.
///
/// Tokenizer, CLIP text encoder, VAE and UNet are loaded once in [`load`]
/// and reused for every call to `generate`.
///
/// [`load`]: StableDiffusionGenerator::load
pub struct StableDiffusionGenerator {
    version: StableDiffusionVersion,
    device: Device,
    dtype: DType,
    sd_config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    text_model: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
    vae_scale: f64,
}

impl StableDiffusionGenerator {
    /// Download (if needed) and load all model components
    pub fn load(version: StableDiffusionVersion, use_cpu: bool) -> Result<Self> {
        let device = if use_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0)?
        };

        let dtype = if device.is_cuda() {
            DType::F16
        } else {
            DType::F32
        };

        tracing::info!(
            "Loading Stable Diffusion {:?} on {}",
            version,
            if device.is_cuda() { "cuda" } else { "cpu" }
        );

        let api = hub_api()?;
        let sd_config = version.sd_config();

        tracing::info!("Loading CLIP tokenizer and encoder");
        tracing::debug!("Downloading tokenizer from: {}", version.tokenizer_repo());
        let tokenizer_path = api
            .model(version.tokenizer_repo().to_string())
            .get("tokenizer.json")
            .map_err(|e| ImageGenError::HfHub(format!("Failed to download tokenizer.json: {}", e)))?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ImageGenError::Tokenization(e.to_string()))?;

        let pad_token = sd_config
            .clip
            .pad_with
            .clone()
            .unwrap_or_else(|| "<|endoftext|>".to_string());
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token.as_str())
            .ok_or_else(|| ImageGenError::Tokenization(format!("Pad token {pad_token} not found")))?;

        let clip_weights = weights(
            &api,
            version,
            dtype,
            "text_encoder/model.fp16.safetensors",
            "text_encoder/model.safetensors",
        )?;
        let text_model =
            stable_diffusion::build_clip_transformer(&sd_config.clip, clip_weights, &device, dtype)
                .map_err(|e| ImageGenError::ModelLoading(format!("CLIP: {e}")))?;

        tracing::info!("Loading VAE");
        let vae_weights = weights(
            &api,
            version,
            dtype,
            "vae/diffusion_pytorch_model.fp16.safetensors",
            "vae/diffusion_pytorch_model.safetensors",
        )?;
        let vae = sd_config
            .build_vae(vae_weights, &device, dtype)
            .map_err(|e| ImageGenError::ModelLoading(format!("VAE: {e}")))?;

        tracing::info!("Loading UNet");
        let unet_weights = weights(
            &api,
            version,
            dtype,
            "unet/diffusion_pytorch_model.fp16.safetensors",
            "unet/diffusion_pytorch_model.safetensors",
        )?;
        let unet = sd_config
            .build_unet(
                unet_weights,
                &device,
                4,     // standard latent channels
                false, // no flash attention
                dtype,
            )
            .map_err(|e| ImageGenError::ModelLoading(format!("UNet: {e}")))?;

        tracing::info!("Stable Diffusion {:?} ready", version);

        Ok(Self {
            version,
            device,
            dtype,
            sd_config,
            tokenizer,
            pad_id,
            text_model,
            vae,
            unet,
            vae_scale: 0.18215,
        })
    }

    /// Encode one prompt into a `(1, max_len, hidden)` embedding
    fn text_embeddings(&self, prompt: &str) -> Result<Tensor> {
        let max_len = self.sd_config.clip.max_position_embeddings;

        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ImageGenError::Tokenization(e.to_string()))?
            .get_ids()
            .to_vec();

        if tokens.len() > max_len {
            tracing::warn!(
                "Prompt is {} tokens, truncating to the CLIP context of {}",
                tokens.len(),
                max_len
            );
            tokens.truncate(max_len);
        }
        while tokens.len() < max_len {
            tokens.push(self.pad_id);
        }

        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.text_model.forward(&tokens)?)
    }
}

impl ImageGenerator for StableDiffusionGenerator {
    fn generate(&mut self, params: &GenerationParams) -> Result<Vec<RgbImage>> {
        params.validate()?;

        tracing::info!("Generating {} image(s) with Stable Diffusion {:?}", params.num_images, self.version);
        tracing::info!("Prompt: {}", params.prompt);

        let batch = params.num_images;
        let use_guidance = params.guidance_scale > 1.0;

        // 1. Encode prompts, replicated across the batch
        let cond = self.text_embeddings(&params.prompt)?.repeat((batch, 1, 1))?;
        let text_embeddings = if use_guidance {
            let uncond = self
                .text_embeddings(params.negative().unwrap_or(""))?
                .repeat((batch, 1, 1))?;
            Tensor::cat(&[uncond, cond], 0)?
        } else {
            cond
        };
        let text_embeddings = text_embeddings.to_dtype(self.dtype)?;

        // 2. Initialize latents
        let mut scheduler = self.sd_config.build_scheduler(params.steps)?;
        let latents = Tensor::randn(
            0f32,
            1f32,
            (batch, 4, params.height / 8, params.width / 8),
            &self.device,
        )?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        // 3. Diffusion loop
        let timesteps = scheduler.timesteps().to_vec();
        tracing::info!("Running diffusion for {} steps", timesteps.len());
        for (step_idx, &timestep) in timesteps.iter().enumerate() {
            tracing::debug!("Step {}/{}", step_idx + 1, timesteps.len());

            let latent_model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;

            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;

            let noise_pred = if use_guidance {
                let noise_pred = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&noise_pred[0], &noise_pred[1]);
                (uncond + ((text - uncond)? * params.guidance_scale)?)?
            } else {
                noise_pred
            };

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
        }

        // 4. Decode latents
        tracing::info!("Decoding latents to images");
        let images = self.vae.decode(&(&latents / self.vae_scale)?)?;
        let images = ((images / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let images = (images.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?;

        // 5. Convert to RGB buffers
        let (n, _, height, width) = images.dims4()?;
        let mut out = Vec::with_capacity(n);
        for idx in 0..n {
            let data = images.i(idx)?.permute((1, 2, 0))?.to_vec3::<u8>()?;
            let data: Vec<u8> = data.into_iter().flatten().flatten().collect();
            let image = RgbImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
                ImageGenError::ImageProcessing("Failed to create image buffer".into())
            })?;
            out.push(image);
        }

        tracing::info!("Image generation complete!");
        Ok(out)
    }

    fn device(&self) -> ComputeDevice {
        if self.device.is_cuda() {
            ComputeDevice::Cuda
        } else {
            ComputeDevice::Cpu
        }
    }
}

fn hub_api() -> Result<Api> {
    let token = std::env::var("HF_TOKEN")
        .or_else(|_| std::env::var("HUGGING_FACE_HUB_TOKEN"))
        .ok();
    Ok(ApiBuilder::new().with_token(token).build()?)
}

/// Fetch a weight file, preferring the fp16 variant when running in F16
fn weights(
    api: &Api,
    version: StableDiffusionVersion,
    dtype: DType,
    fp16_file: &str,
    fp32_file: &str,
) -> Result<PathBuf> {
    let repo = api.model(version.repo().to_string());
    if dtype == DType::F16 {
        match repo.get(fp16_file) {
            Ok(path) => return Ok(path),
            Err(_) => tracing::warn!("{} not found, falling back to fp32", fp16_file),
        }
    }
    Ok(repo.get(fp32_file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_repos() {
        assert_eq!(
            StableDiffusionVersion::V1_5.repo(),
            "runwayml/stable-diffusion-v1-5"
        );
        assert_eq!(
            StableDiffusionVersion::V2_1.repo(),
            "stabilityai/stable-diffusion-2-1"
        );
    }

    #[test]
    fn test_clip_context_matches_config() {
        let config = StableDiffusionVersion::V1_5.sd_config();
        assert_eq!(config.clip.max_position_embeddings, 77);
    }
}
