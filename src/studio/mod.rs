// Studio - prompt screening, styling, generation, watermarking and persistence

pub mod guard;
pub mod pipeline;
pub mod storage;
pub mod style;
pub mod types;
pub mod watermark;

pub use guard::is_allowed;
pub use pipeline::{Studio, StudioError, StudioImage};
pub use storage::{ArtifactWriter, StorageError};
pub use style::{apply_style, apply_style_label};
pub use types::{
    GenerationParameters, GenerationRequest, ImageMetadata, PersistedArtifact, Progress, Style,
    ValidationError,
};
pub use watermark::{FontSource, WatermarkFont, Watermarker};
