//! Configuration file support for the studio

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::studio::watermark::DEFAULT_WATERMARK_TEXT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub studio: OutputConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Stable Diffusion through candle
    StableDiffusion,
    /// Procedural placeholder images, no weights needed
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ModelVersion {
    #[serde(rename = "v1-5")]
    #[value(name = "v1-5")]
    V1_5,
    #[serde(rename = "v2-1")]
    #[value(name = "v2-1")]
    V2_1,
}

impl From<ModelVersion> for imagent::StableDiffusionVersion {
    fn from(version: ModelVersion) -> Self {
        match version {
            ModelVersion::V1_5 => imagent::StableDiffusionVersion::V1_5,
            ModelVersion::V2_1 => imagent::StableDiffusionVersion::V2_1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,

    #[serde(default = "default_version")]
    pub version: ModelVersion,

    /// Force CPU even when CUDA is available
    #[serde(default)]
    pub cpu: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default = "default_watermark_text")]
    pub text: String,

    /// TrueType font to render with; system fonts and then the built-in font otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

// Defaults

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_backend() -> Backend {
    Backend::StableDiffusion
}

fn default_version() -> ModelVersion {
    ModelVersion::V1_5
}

fn default_watermark_text() -> String {
    DEFAULT_WATERMARK_TEXT.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            version: default_version(),
            cpu: false,
        }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: default_watermark_text(),
            font_path: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl StudioConfig {
    /// `<config dir>/text2image/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("text2image").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An explicit path must exist; the default location is optional
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }
}
