// Core types for the studio pipeline

use imagent::GenerationParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const IMAGE_COUNT_RANGE: (usize, usize) = (1, 4);
pub const GUIDANCE_RANGE: (f64, f64) = (3.0, 15.0);
pub const GUIDANCE_STEP: f64 = 0.5;
pub const STEPS_RANGE: (usize, usize) = (10, 50);
pub const STEPS_STEP: usize = 5;
pub const DIMENSIONS: [usize; 3] = [512, 640, 768];

pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted, extra limbs";

/// Look and feel applied to the raw prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Style {
    #[default]
    Photorealistic,
    Artistic,
    Cartoon,
    ConceptArt,
}

impl Style {
    pub const ALL: [Style; 4] = [
        Style::Photorealistic,
        Style::Artistic,
        Style::Cartoon,
        Style::ConceptArt,
    ];

    /// Label shown to users and recorded in metadata
    pub fn label(&self) -> &'static str {
        match self {
            Style::Photorealistic => "Photorealistic",
            Style::Artistic => "Artistic / Painting",
            Style::Cartoon => "Cartoon / Anime",
            Style::ConceptArt => "Concept Art",
        }
    }

    /// Short command-line name
    pub fn slug(&self) -> &'static str {
        match self {
            Style::Photorealistic => "photorealistic",
            Style::Artistic => "artistic",
            Style::Cartoon => "cartoon",
            Style::ConceptArt => "concept-art",
        }
    }

    /// Parse from either the display label or the short name
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(label) || s.slug().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for Style {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Style::from_label(&value).ok_or_else(|| format!("unknown style: {value}"))
    }
}

impl From<Style> for String {
    fn from(style: Style) -> Self {
        style.label().to_string()
    }
}

/// One user submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub style: Style,
    pub num_images: usize,
    pub guidance_scale: f64,
    pub steps: usize,
    pub height: usize,
    pub width: usize,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            style: Style::default(),
            num_images: 1,
            guidance_scale: 7.5,
            steps: 30,
            height: 512,
            width: 512,
        }
    }
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_num_images(mut self, num_images: usize) -> Self {
        self.num_images = num_images;
        self
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Check the prompt and every slider against the allowed values
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if !super::guard::is_allowed(&self.prompt) {
            return Err(ValidationError::DisallowedContent);
        }

        let (min, max) = IMAGE_COUNT_RANGE;
        if !(min..=max).contains(&self.num_images) {
            return Err(ValidationError::invalid(
                "num_images",
                format!("must be between {min} and {max}"),
            ));
        }

        let (min, max) = GUIDANCE_RANGE;
        let on_grid = ((self.guidance_scale - min) / GUIDANCE_STEP).fract().abs() < 1e-9;
        if !(min..=max).contains(&self.guidance_scale) || !on_grid {
            return Err(ValidationError::invalid(
                "guidance_scale",
                format!("must be between {min} and {max} in steps of {GUIDANCE_STEP}"),
            ));
        }

        let (min, max) = STEPS_RANGE;
        if !(min..=max).contains(&self.steps) || (self.steps - min) % STEPS_STEP != 0 {
            return Err(ValidationError::invalid(
                "steps",
                format!("must be between {min} and {max} in steps of {STEPS_STEP}"),
            ));
        }

        for (field, value) in [("height", self.height), ("width", self.width)] {
            if !DIMENSIONS.contains(&value) {
                return Err(ValidationError::invalid(
                    field,
                    format!("must be one of {DIMENSIONS:?}"),
                ));
            }
        }

        Ok(())
    }

    /// Model-facing parameters for an already styled prompt
    pub fn to_params(&self, styled_prompt: &str) -> GenerationParams {
        GenerationParams {
            prompt: styled_prompt.to_string(),
            negative_prompt: self.negative_prompt.clone(),
            num_images: self.num_images,
            guidance_scale: self.guidance_scale,
            steps: self.steps,
            height: self.height,
            width: self.width,
        }
    }
}

/// Reasons a request is refused before any generation happens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Prompt cannot be empty.")]
    EmptyPrompt,

    #[error("Prompt violates content guidelines. Please enter a safer description.")]
    DisallowedContent,

    #[error("Invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

impl ValidationError {
    fn invalid(field: &'static str, reason: String) -> Self {
        ValidationError::InvalidParameter { field, reason }
    }
}

/// Parameter set recorded in the metadata sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub num_images: usize,
    pub guidance_scale: f64,
    pub steps: usize,
    pub height: usize,
    pub width: usize,
    pub device: String,
    pub style: String,
}

impl GenerationParameters {
    pub fn from_request(request: &GenerationRequest, device: impl Into<String>) -> Self {
        Self {
            num_images: request.num_images,
            guidance_scale: request.guidance_scale,
            steps: request.steps,
            height: request.height,
            width: request.width,
            device: device.into(),
            style: request.style.label().to_string(),
        }
    }
}

/// Paths of the two encoded images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub png: String,
    pub jpg: String,
}

/// Contents of the JSON sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub prompt: String,
    pub negative_prompt: String,
    pub timestamp: String,
    pub parameters: GenerationParameters,
    pub files: ArtifactFiles,
}

/// Everything written to disk for one image
#[derive(Debug, Clone)]
pub struct PersistedArtifact {
    pub png_path: PathBuf,
    pub jpg_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: ImageMetadata,
}

/// Pipeline stages reported while a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Validated,
    Generating,
    PostProcessing { index: usize, total: usize },
    Completed,
}

impl Progress {
    /// Rough completion percentage, for progress bars
    pub fn percent(&self) -> u8 {
        match self {
            Progress::Validated => 10,
            Progress::Generating => 20,
            Progress::PostProcessing { index, total } => {
                let total = (*total).max(1);
                (70 + 30 * index / total).min(99) as u8
            }
            Progress::Completed => 100,
        }
    }
}
