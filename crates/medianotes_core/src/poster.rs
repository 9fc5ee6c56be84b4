use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use serde_yaml::Value;

use crate::frontmatter::Document;
use crate::http::{HttpClient, HttpSettings};

pub const POSTER_EXTENSION: &str = "jpg";
pub const POSTER_PROPERTY: &str = "poster";
const JPEG_QUALITY: u8 = 85;

/// Downloads a cover image and returns it resized as JPEG bytes.
pub trait PosterFetcher {
    fn fetch_and_resize(&mut self, url: &str, width: u32) -> Result<Vec<u8>>;
}

pub struct HttpPosterFetcher {
    http: HttpClient,
}

impl HttpPosterFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(settings, "poster download", Duration::ZERO)?,
        })
    }
}

impl PosterFetcher for HttpPosterFetcher {
    fn fetch_and_resize(&mut self, url: &str, width: u32) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get_bytes(url)
            .with_context(|| format!("failed to download poster {url}"))?;
        resize_to_jpeg(&bytes, width)
    }
}

/// Scale to `width` keeping the aspect ratio, flatten any transparency onto
/// white and encode as JPEG.
pub fn resize_to_jpeg(bytes: &[u8], width: u32) -> Result<Vec<u8>> {
    if width == 0 {
        bail!("poster width must be positive");
    }
    let decoded = image::load_from_memory(bytes).context("failed to decode poster image")?;
    let (source_width, source_height) = decoded.dimensions();
    if source_width == 0 || source_height == 0 {
        bail!("poster image has no pixels");
    }
    let height = ((u64::from(width) * u64::from(source_height)) / u64::from(source_width)).max(1);
    let height = u32::try_from(height).context("poster height out of range")?;
    let resized = decoded.resize_exact(width, height, FilterType::Lanczos3);
    let flattened = flatten_onto_white(&resized);

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(flattened))
        .context("failed to encode poster as JPEG")?;
    Ok(encoded)
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [red, green, blue, alpha] = rgba.get_pixel(x, y).0;
        let blend = |channel: u8| -> u8 {
            let value = u32::from(channel) * u32::from(alpha) + 255 * (255 - u32::from(alpha));
            u8::try_from(value / 255).unwrap_or(u8::MAX)
        };
        Rgb([blend(red), blend(green), blend(blue)])
    })
}

/// `<note stem>.jpg`
pub fn poster_filename(note_stem: &str) -> String {
    format!("{note_stem}.{POSTER_EXTENSION}")
}

/// Sibling image path for a note.
pub fn poster_path_for(note_path: &Path) -> PathBuf {
    note_path.with_extension(POSTER_EXTENSION)
}

pub fn save_poster(path: &Path, jpeg: &[u8]) -> Result<()> {
    fs::write(path, jpeg).with_context(|| format!("failed to write {}", path.display()))
}

/// Frontmatter value for a poster file: `[[name.jpg]]`.
pub fn poster_link(filename: &str) -> String {
    format!("[[{filename}]]")
}

/// Set `poster: "[[filename]]"`, creating the frontmatter when absent.
pub fn set_poster(document: &mut Document, filename: &str) {
    document.set(POSTER_PROPERTY, Value::String(poster_link(filename)));
}

/// Filename inside a `[[...]]` poster value, or the raw value.
pub fn poster_target(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix("[[")
        .and_then(|inner| inner.strip_suffix("]]"))
        .unwrap_or(trimmed)
}


#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageFormat, Rgba};

    use super::*;

    fn png_bytes(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, pixel));
        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .expect("png encoding should succeed");
        encoded.into_inner()
    }

    #[test]
    fn resize_keeps_aspect_ratio_and_emits_jpeg() {
        let source = png_bytes(400, 600, Rgba([10, 200, 30, 255]));
        let jpeg = resize_to_jpeg(&source, 200).expect("resize");

        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg");
        assert_eq!(decoded.dimensions(), (200, 300));
        assert_eq!(
            image::guess_format(&jpeg).expect("format"),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let source = png_bytes(20, 20, Rgba([0, 0, 0, 0]));
        let jpeg = resize_to_jpeg(&source, 10).expect("resize");
        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg").to_rgb8();
        let pixel = decoded.get_pixel(5, 5);
        assert!(pixel.0.iter().all(|channel| *channel > 240));
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        assert!(resize_to_jpeg(b"not an image", 200).is_err());
    }

    #[test]
    fn poster_property_round_trips() {
        let mut document = Document::parse("---\ntags:\n- movie\n---\n\nBody\n");
        set_poster(&mut document, &poster_filename("Heat (1995)"));
        let rendered = document.render();
        let reparsed = Document::parse(&rendered);
        let value = reparsed
            .get(POSTER_PROPERTY)
            .and_then(Value::as_str)
            .expect("poster value");
        assert_eq!(value, "[[Heat (1995).jpg]]");
        assert_eq!(poster_target(value), "Heat (1995).jpg");
        assert!(rendered.ends_with("\n\nBody\n"));
    }

    #[test]
    fn poster_path_sits_next_to_note() {
        assert_eq!(
            poster_path_for(Path::new("/v/Movies/Heat (1995).md")),
            Path::new("/v/Movies/Heat (1995).jpg")
        );
    }
}
