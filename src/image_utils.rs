use std::{io::Cursor, ops::RangeInclusive};

use image::{codecs::jpeg::JpegEncoder, ImageFormat, Rgb, RgbImage, RgbaImage};
use log::warn;

use crate::EditorError;

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const JPEG_QUALITY: u8 = 90;
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Rejects anything that is not an `image/*` type before decoding is attempted.
pub fn validate_mime(mime: &str) -> Result<(), EditorError> {
    if mime.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(EditorError::Validation(format!(
            "'{mime}' is not an image, please choose a photo"
        )))
    }
}

pub fn mime_for_path(path: &std::path::Path) -> Option<&'static str> {
    ImageFormat::from_path(path).ok().map(|f| f.to_mime_type())
}

/// File extension for a MIME type, `bin` when unknown.
pub fn mime_extension(mime: &str) -> &'static str {
    ImageFormat::from_mime_type(mime)
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("bin")
}

pub fn decode(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    image::load_from_memory(bytes)
        .map(|image| image.to_rgba8())
        .map_err(|e| EditorError::Decode(e.to_string()))
}

/// Encodes in the format named by `mime`. Returns the bytes together with
/// the MIME actually produced, which is PNG for formats without an encoder.
pub fn encode_for_mime(image: &RgbaImage, mime: &str) -> Result<(Vec<u8>, &'static str), EditorError> {
    match ImageFormat::from_mime_type(mime) {
        Some(ImageFormat::Jpeg) => Ok((encode_jpeg(image, WHITE, JPEG_QUALITY)?, JPEG_MIME)),
        Some(ImageFormat::Png) => Ok((encode(image, ImageFormat::Png)?, PNG_MIME)),
        Some(ImageFormat::Tiff) => Ok((
            encode(image, ImageFormat::Tiff)?,
            ImageFormat::Tiff.to_mime_type(),
        )),
        _ => {
            warn!("No encoder for {mime}, falling back to PNG");
            Ok((encode(image, ImageFormat::Png)?, PNG_MIME))
        }
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EditorError> {
    encode(image, ImageFormat::Png)
}

fn encode(image: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, EditorError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| EditorError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn encode_jpeg(image: &RgbaImage, background: Rgb<u8>, quality: u8) -> Result<Vec<u8>, EditorError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&flatten(image, background))
        .map_err(|e| EditorError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Composites `image` over an opaque `background`.
pub fn flatten(image: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let alpha = px[3] as f32 / 255.0;
        Rgb(std::array::from_fn(|c| {
            (px[c] as f32 * alpha + background[c] as f32 * (1.0 - alpha)).round() as u8
        }))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }
}

/// Encodes a result for saving. JPEG output is flattened over `background`.
pub fn export(image: &RgbaImage, format: ExportFormat, background: Rgb<u8>) -> Result<Vec<u8>, EditorError> {
    match format {
        ExportFormat::Png => encode_png(image),
        ExportFormat::Jpeg => encode_jpeg(image, background, JPEG_QUALITY),
    }
}

/// Tonal adjustments in percent, applied like the CSS `brightness`,
/// `contrast` and `saturate` filters in that order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Adjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
        }
    }
}

impl Adjustments {
    pub const RANGE: RangeInclusive<f32> = 50.0..=150.0;

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let clamp = |v: f32| v.clamp(*Self::RANGE.start(), *Self::RANGE.end()) / 100.0;
        let brightness = clamp(self.brightness);
        let contrast = clamp(self.contrast);
        let s = clamp(self.saturation);
        let saturate = [
            [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
            [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
            [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
        ];

        let mut out = image.clone();
        for px in out.pixels_mut() {
            let toned: [f32; 3] = std::array::from_fn(|c| {
                let v = (px[c] as f32 / 255.0 * brightness).clamp(0.0, 1.0);
                ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
            });
            for (c, row) in saturate.iter().enumerate() {
                let v = row[0] * toned[0] + row[1] * toned[1] + row[2] * toned[2];
                px[c] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn only_image_types_pass_validation() {
        assert!(validate_mime("image/png").is_ok());
        assert!(validate_mime("IMAGE/JPEG").is_ok());
        assert!(matches!(
            validate_mime("application/pdf"),
            Err(EditorError::Validation(_))
        ));
        assert!(validate_mime("").is_err());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(decode(b"not an image"), Err(EditorError::Decode(_))));
    }

    #[test]
    fn unsupported_mime_falls_back_to_png() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 128]));
        let (bytes, mime) = encode_for_mime(&image, "image/heic").unwrap();
        assert_eq!(PNG_MIME, mime);
        assert_eq!(image, decode(&bytes).unwrap());
    }

    #[test]
    fn jpeg_export_is_opaque_over_white() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let bytes = export(&image, ExportFormat::Jpeg, WHITE).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.pixels().all(|p| p[3] == 255));
        assert!(decoded.pixels().all(|p| p[0] > 245 && p[1] > 245 && p[2] > 245));
    }

    #[test]
    fn png_export_keeps_alpha() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 40]));
        let bytes = export(&image, ExportFormat::Png, WHITE).unwrap();
        assert_eq!(image, decode(&bytes).unwrap());
    }

    #[test]
    fn neutral_adjustments_are_identity() {
        let image = RgbaImage::from_fn(16, 1, |x, _| Rgba([x as u8 * 16, 100, 200, 255]));
        assert!(Adjustments::default().is_identity());
        assert_eq!(image, Adjustments::default().apply(&image));
    }

    #[test]
    fn low_saturation_moves_towards_grey() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        let adjusted = Adjustments {
            saturation: 50.0,
            ..Default::default()
        }
        .apply(&image);
        let px = adjusted.get_pixel(0, 0);
        assert!(px[0] < 255 && px[1] > 0, "{px:?}");
        assert_eq!(255, px[3]);
    }

    #[test]
    fn brightness_is_clamped_to_range() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        let extreme = Adjustments {
            brightness: 400.0,
            ..Default::default()
        };
        let capped = Adjustments {
            brightness: 150.0,
            ..Default::default()
        };
        assert_eq!(capped.apply(&image), extreme.apply(&image));
    }
}
