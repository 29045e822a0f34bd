// Watermarker - stamps a label into the bottom-right corner of an image

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};

pub const DEFAULT_WATERMARK_TEXT: &str = "AI GENERATED";

/// DejaVu Sans, compiled in so a watermark can always be drawn
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Font size as a fraction of image width
const FONT_SIZE_RATIO: f32 = 0.03;
/// Distance between the text and the image edges
const MARGIN: i64 = 10;
/// Extra room between the text and the edges of the backing box
const BOX_PADDING: i64 = 5;
/// Opacity of the black backing box, out of 255
const BOX_ALPHA: u32 = 128;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Where a watermark font was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    File(PathBuf),
    Bundled,
}

/// Font used to render the watermark
#[derive(Clone)]
pub struct WatermarkFont {
    font: FontArc,
    source: FontSource,
}

impl std::fmt::Debug for WatermarkFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WatermarkFont").field(&self.source).finish()
    }
}

impl WatermarkFont {
    /// Load a TrueType/OpenType font file
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })?;
        Ok(Self {
            font,
            source: FontSource::File(path.to_path_buf()),
        })
    }

    /// The font shipped inside the binary
    pub fn bundled() -> Result<Self, InvalidFont> {
        Ok(Self {
            font: FontArc::try_from_slice(BUNDLED_FONT)?,
            source: FontSource::Bundled,
        })
    }

    /// Use the preferred font if it loads, the bundled one otherwise
    pub fn resolve(preferred: Option<&Path>) -> Result<Self, InvalidFont> {
        if let Some(path) = preferred {
            match Self::from_file(path) {
                Ok(font) => return Ok(font),
                Err(e) => tracing::warn!(
                    "Watermark font {} unusable, using bundled DejaVu Sans: {}",
                    path.display(),
                    e
                ),
            }
        }
        Self::bundled()
    }

    pub fn source(&self) -> &FontSource {
        &self.source
    }

    fn measure(&self, text: &str, scale: PxScale) -> (u32, u32) {
        text_size(scale, &self.font, text)
    }
}

/// Overlays a fixed label on a copy of each image
#[derive(Debug, Clone)]
pub struct Watermarker {
    text: String,
    font: WatermarkFont,
}

impl Watermarker {
    pub fn new(text: impl Into<String>, font: WatermarkFont) -> Self {
        Self {
            text: text.into(),
            font,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font(&self) -> &WatermarkFont {
        &self.font
    }

    /// Return a watermarked copy; the input is left untouched.
    ///
    /// Text is white, sized to 3% of the image width, sitting 10px from the
    /// bottom and right edges on a half-transparent black box.
    pub fn watermark(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        let (width, height) = out.dimensions();

        let font_size = ((width as f32 * FONT_SIZE_RATIO) as u32).max(1);
        let scale = PxScale::from(font_size as f32);
        let (text_width, text_height) = self.font.measure(&self.text, scale);

        let x = width as i64 - text_width as i64 - MARGIN;
        let y = height as i64 - text_height as i64 - MARGIN;

        darken_rect(
            &mut out,
            x - BOX_PADDING,
            y - BOX_PADDING,
            x + text_width as i64 + BOX_PADDING,
            y + text_height as i64 + BOX_PADDING,
        );
        draw_text_mut(
            &mut out,
            TEXT_COLOR,
            x as i32,
            y as i32,
            scale,
            &self.font.font,
            &self.text,
        );

        out
    }
}

/// Blend black over the inclusive rectangle, clipped to the image
fn darken_rect(image: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64) {
    let (width, height) = image.dimensions();
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(width as i64 - 1);
    let y1 = y1.min(height as i64 - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as u32 * (255 - BOX_ALPHA) / 255) as u8;
            }
        }
    }
}
