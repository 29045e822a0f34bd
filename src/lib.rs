//! text2image - a local text-to-image studio
//!
//! Screens prompts, appends style descriptors, runs a diffusion backend from
//! the `imagent` crate, watermarks every image and stores it as PNG, JPEG and
//! a JSON sidecar. Served from the command line or a small web front end.

pub mod config;
pub mod server;
pub mod studio;

pub use config::StudioConfig;
pub use studio::{GenerationRequest, Studio, StudioError, Style};
