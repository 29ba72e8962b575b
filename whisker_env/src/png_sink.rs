//! Production `ImageSink` that encodes PNG files.

use crate::error::EnvError;
use crate::render::ImageSink;
use crate::types::CapturedImage;
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// Writes captured images as PNG via the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngImageSink;

impl PngImageSink {
    /// Creates a new sink.
    pub fn new() -> Self {
        Self
    }
}

impl ImageSink for PngImageSink {
    fn write_image(&mut self, path: &Path, image: &CapturedImage) -> Result<(), EnvError> {
        let buffer = RgbImage::from_raw(image.width, image.height, image.pixels.clone())
            .ok_or_else(|| {
                EnvError::encode(format!(
                    "pixel buffer of {} bytes does not match {}x{}",
                    image.pixels.len(),
                    image.width,
                    image.height
                ))
            })?;

        buffer
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => EnvError::io(path, io),
                other => EnvError::encode(other.to_string()),
            })
    }

    fn extension(&self) -> &'static str {
        "png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        let mut img = CapturedImage::new(4, 4);
        img.put(1, 2, [255, 128, 0]);

        let mut sink = PngImageSink::new();
        sink.write_image(&path, &img).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // PNG signature
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_png_sink_rejects_bad_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let img = CapturedImage {
            width: 4,
            height: 4,
            pixels: vec![0; 5],
        };
        let mut sink = PngImageSink::new();
        assert!(matches!(
            sink.write_image(&dir.path().join("bad.png"), &img),
            Err(EnvError::Encode(_))
        ));
    }
}
