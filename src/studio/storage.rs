// Persistence writer - PNG, JPEG and JSON sidecar per generated image

use super::types::{ArtifactFiles, GenerationParameters, ImageMetadata, PersistedArtifact};
use chrono::{Local, NaiveDateTime};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 95;
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes artifacts into one flat output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    base_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Save `image` as `img_<YYYYMMDD_HHMMSS>_<index>.{png,jpg,json}`
    pub fn save(
        &self,
        image: &RgbImage,
        prompt: &str,
        negative_prompt: &str,
        params: &GenerationParameters,
        index: usize,
    ) -> Result<PersistedArtifact, StorageError> {
        self.save_at(
            Local::now().naive_local(),
            image,
            prompt,
            negative_prompt,
            params,
            index,
        )
    }

    /// Same as [`save`](Self::save) with an explicit timestamp.
    ///
    /// Writes are independent: a failure part-way leaves the files already
    /// written in place.
    pub fn save_at(
        &self,
        now: NaiveDateTime,
        image: &RgbImage,
        prompt: &str,
        negative_prompt: &str,
        params: &GenerationParameters,
        index: usize,
    ) -> Result<PersistedArtifact, StorageError> {
        std::fs::create_dir_all(&self.base_dir)?;

        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let reserved = self.reserve_stem(&timestamp, index)?;

        let png_path = self.base_dir.join(format!("{}.png", reserved.stem));
        let jpg_path = self.base_dir.join(format!("{}.jpg", reserved.stem));
        let metadata_path = self.base_dir.join(format!("{}.json", reserved.stem));

        let mut writer = BufWriter::new(reserved.png);
        image.write_with_encoder(PngEncoder::new(&mut writer))?;
        writer.flush()?;
        tracing::debug!("Wrote {}", png_path.display());

        let mut writer = BufWriter::new(reserved.jpg);
        image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?;
        writer.flush()?;
        tracing::debug!("Wrote {}", jpg_path.display());

        let metadata = ImageMetadata {
            prompt: prompt.to_string(),
            negative_prompt: negative_prompt.to_string(),
            timestamp,
            parameters: params.clone(),
            files: ArtifactFiles {
                png: png_path.display().to_string(),
                jpg: jpg_path.display().to_string(),
            },
        };

        let mut writer = BufWriter::new(reserved.json);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        metadata.serialize(&mut serializer)?;
        writer.flush()?;
        tracing::debug!("Wrote {}", metadata_path.display());

        Ok(PersistedArtifact {
            png_path,
            jpg_path,
            metadata_path,
            metadata,
        })
    }

    /// Claim a free stem by creating all three of its files exclusively.
    ///
    /// `img_<ts>_<index>` is tried first, then `img_<ts>_<index>_1`,
    /// `_2`, ... A stem is taken if any of its `.png`, `.jpg` or `.json`
    /// already exists, so neither a same-second save nor a stale sibling
    /// is ever overwritten.
    fn reserve_stem(&self, timestamp: &str, index: usize) -> Result<ReservedStem, StorageError> {
        let base = format!("img_{timestamp}_{index}");
        let mut attempt = 0usize;
        loop {
            let stem = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            if let Some(reserved) = self.try_reserve(&stem)? {
                return Ok(reserved);
            }
            tracing::debug!("Stem {} is taken, trying next suffix", stem);
            attempt += 1;
        }
    }

    /// Create `<stem>.{png,jpg,json}`; `None` if one exists already.
    ///
    /// Files created before the clash are removed again.
    fn try_reserve(&self, stem: &str) -> Result<Option<ReservedStem>, StorageError> {
        let Some(png) = self.create_new(stem, "png")? else {
            return Ok(None);
        };
        let Some(jpg) = self.create_new(stem, "jpg")? else {
            drop(png);
            self.release(stem, &["png"])?;
            return Ok(None);
        };
        let Some(json) = self.create_new(stem, "json")? else {
            drop((png, jpg));
            self.release(stem, &["png", "jpg"])?;
            return Ok(None);
        };

        Ok(Some(ReservedStem {
            stem: stem.to_string(),
            png,
            jpg,
            json,
        }))
    }

    fn create_new(&self, stem: &str, extension: &str) -> Result<Option<File>, StorageError> {
        let path = self.base_dir.join(format!("{stem}.{extension}"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self, stem: &str, extensions: &[&str]) -> Result<(), StorageError> {
        for extension in extensions {
            std::fs::remove_file(self.base_dir.join(format!("{stem}.{extension}")))?;
        }
        Ok(())
    }
}

/// Exclusively created, still empty files for one stem
struct ReservedStem {
    stem: String,
    png: File,
    jpg: File,
    json: File,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::Rgb;

    fn params() -> GenerationParameters {
        GenerationParameters {
            num_images: 2,
            guidance_scale: 7.5,
            steps: 30,
            height: 64,
            width: 64,
            device: "cpu".into(),
            style: "Concept Art".into(),
        }
    }

    fn pattern() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8]))
    }

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    #[test]
    fn test_save_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested").join("outputs"));

        let artifact = writer
            .save(&pattern(), "a castle, concept art", "blurry", &params(), 0)
            .unwrap();

        assert!(artifact.png_path.exists());
        assert!(artifact.jpg_path.exists());
        assert!(artifact.metadata_path.exists());
    }

    #[test]
    fn test_file_names_follow_timestamp_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let artifact = writer
            .save_at(fixed_time(), &pattern(), "p", "n", &params(), 3)
            .unwrap();

        assert_eq!(
            artifact.png_path.file_name().unwrap(),
            "img_20240102_030405_3.png"
        );
        assert_eq!(
            artifact.jpg_path.file_name().unwrap(),
            "img_20240102_030405_3.jpg"
        );
        assert_eq!(
            artifact.metadata_path.file_name().unwrap(),
            "img_20240102_030405_3.json"
        );
        assert_eq!(artifact.metadata.timestamp, "20240102_030405");
    }

    #[test]
    fn test_metadata_sidecar_contents() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let artifact = writer
            .save(&pattern(), "a castle", "low quality", &params(), 1)
            .unwrap();

        let raw = std::fs::read_to_string(&artifact.metadata_path).unwrap();
        assert!(raw.contains("\n    \"prompt\""), "expected 4-space indent");

        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["prompt"], "a castle");
        assert_eq!(json["negative_prompt"], "low quality");
        assert_eq!(json["parameters"]["steps"], 30);
        assert_eq!(json["parameters"]["guidance_scale"], 7.5);
        assert_eq!(json["parameters"]["style"], "Concept Art");
        assert_eq!(json["parameters"]["device"], "cpu");
        assert_eq!(json["files"]["png"], artifact.png_path.display().to_string());
        assert_eq!(json["files"]["jpg"], artifact.jpg_path.display().to_string());

        let parsed: ImageMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.parameters, params());
    }

    #[test]
    fn test_png_is_lossless_and_jpeg_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let image = pattern();

        let artifact = writer.save(&image, "p", "", &params(), 0).unwrap();

        let png = image::open(&artifact.png_path).unwrap().to_rgb8();
        assert_eq!(png, image);

        let jpg = image::open(&artifact.jpg_path).unwrap().to_rgb8();
        assert_eq!(jpg.dimensions(), image.dimensions());
    }

    #[test]
    fn test_same_second_same_index_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());

        let first = writer
            .save_at(fixed_time(), &pattern(), "first", "", &params(), 0)
            .unwrap();
        let second = writer
            .save_at(fixed_time(), &pattern(), "second", "", &params(), 0)
            .unwrap();

        assert_ne!(first.png_path, second.png_path);
        assert_eq!(
            second.png_path.file_name().unwrap(),
            "img_20240102_030405_0_1.png"
        );

        let first_meta: ImageMetadata =
            serde_json::from_str(&std::fs::read_to_string(&first.metadata_path).unwrap()).unwrap();
        assert_eq!(first_meta.prompt, "first");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 6);
    }

    #[test]
    fn test_create_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"));
        writer.save(&pattern(), "a", "", &params(), 0).unwrap();
        writer.save(&pattern(), "b", "", &params(), 1).unwrap();
        assert_eq!(std::fs::read_dir(writer.base_dir()).unwrap().count(), 6);
    }

    #[test]
    fn test_stale_sibling_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let stale = dir.path().join("img_20240102_030405_0.json");
        std::fs::write(&stale, "left over").unwrap();

        let artifact = writer
            .save_at(fixed_time(), &pattern(), "fresh", "", &params(), 0)
            .unwrap();

        assert_eq!(
            artifact.png_path.file_name().unwrap(),
            "img_20240102_030405_0_1.png"
        );
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), "left over");
        // the half-claimed stem is released again
        assert!(!dir.path().join("img_20240102_030405_0.png").exists());
        assert!(!dir.path().join("img_20240102_030405_0.jpg").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn test_base_dir_that_is_a_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("outputs");
        std::fs::write(&occupied, b"not a directory").unwrap();

        let err = ArtifactWriter::new(&occupied)
            .save(&pattern(), "p", "", &params(), 0)
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(std::fs::read(&occupied).unwrap(), b"not a directory");
    }
}
