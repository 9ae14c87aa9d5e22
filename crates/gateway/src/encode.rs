use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ExtendedColorType, ImageEncoder, codecs::jpeg::JpegEncoder};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Channel order of an interleaved 8-bit, 3-channel raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Pixel buffer has {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Encode an interleaved raster to JPEG. Only `Bgr` input is reordered.
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    order: PixelOrder,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let expected = width as usize * height as usize * 3;
    if pixels.len() != expected {
        return Err(EncodeError::BufferSize {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }

    let swapped;
    let rgb: &[u8] = match order {
        PixelOrder::Rgb => pixels,
        PixelOrder::Bgr => {
            let mut rgb_data = Vec::with_capacity(pixels.len());
            for chunk in pixels.chunks_exact(3) {
                rgb_data.push(chunk[2]); // R
                rgb_data.push(chunk[1]); // G
                rgb_data.push(chunk[0]); // B
            }
            swapped = rgb_data;
            &swapped
        }
    };

    let mut jpeg_bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100)).write_image(
        rgb,
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;

    Ok(jpeg_bytes)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
