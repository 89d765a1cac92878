//! Texture decoding and texel lookup.
//!
//! Embedded mesh images (JPEG or PNG) are decoded to RGBA8 so every image
//! the rasterizer samples has the same layout.

use crate::error::{DecodeError, DecodeResult};

/// A decoded pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per pixel.
    pub channels: u8,
    /// Row-major pixel data.
    pub pixels: Vec<u8>,
}

impl Image {
    /// Wrap raw pixel data, checking that the size matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if `pixels` is not `width * height * channels` bytes
    /// or if `channels` is not between 1 and 4.
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> DecodeResult<Self> {
        if !(1..=4).contains(&channels) {
            return Err(DecodeError::InvalidFormat {
                context: "image",
                detail: format!("unsupported channel count {channels}"),
            });
        }
        let expected = width as usize * height as usize * usize::from(channels);
        if pixels.len() != expected {
            return Err(DecodeError::BufferTooSmall {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Texel at the given UV, wrapping with a floored modulo on both axes.
    ///
    /// Grayscale images are expanded to RGB; images without alpha are opaque.
    #[must_use]
    pub fn sample(&self, u: f64, v: f64) -> Option<[u8; 4]> {
        if self.width == 0 || self.height == 0 || !u.is_finite() || !v.is_finite() {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let x = ((u * f64::from(self.width)).floor() as i64).rem_euclid(i64::from(self.width));
        #[allow(clippy::cast_possible_truncation)]
        let y = ((v * f64::from(self.height)).floor() as i64).rem_euclid(i64::from(self.height));

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let index = (y as usize * self.width as usize + x as usize) * usize::from(self.channels);
        let texel = self.pixels.get(index..index + usize::from(self.channels))?;

        Some(match *texel {
            [l] => [l, l, l, 255],
            [l, a] => [l, l, l, a],
            [r, g, b] => [r, g, b, 255],
            [r, g, b, a] => [r, g, b, a],
            _ => return None,
        })
    }
}

/// Decode an encoded image (JPEG or PNG) to RGBA8.
///
/// # Errors
///
/// Returns an error if the format is unrecognized or the data is corrupt.
pub fn decode_image(data: &[u8]) -> DecodeResult<Image> {
    let rgba = image::load_from_memory(data)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Image::new(width, height, 4, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Image {
        // 2x2: red, green / blue, white.
        Image::new(
            2,
            2,
            3,
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        )
        .unwrap()
    }

    #[test]
    fn test_sample_corners() {
        let image = checker();
        assert_eq!(image.sample(0.0, 0.0), Some([255, 0, 0, 255]));
        assert_eq!(image.sample(0.75, 0.0), Some([0, 255, 0, 255]));
        assert_eq!(image.sample(0.0, 0.75), Some([0, 0, 255, 255]));
        assert_eq!(image.sample(0.75, 0.75), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_sample_wraps_with_floored_modulo() {
        let image = checker();
        // -0.25 floors to texel -1, which wraps to the last column.
        assert_eq!(image.sample(-0.25, 0.0), image.sample(0.75, 0.0));
        assert_eq!(image.sample(1.25, 1.25), image.sample(0.25, 0.25));
    }

    #[test]
    fn test_sample_grayscale_expands() {
        let image = Image::new(1, 1, 1, vec![42]).unwrap();
        assert_eq!(image.sample(0.5, 0.5), Some([42, 42, 42, 255]));
    }

    #[test]
    fn test_sample_non_finite_uv() {
        assert_eq!(checker().sample(f64::NAN, 0.0), None);
    }

    #[test]
    fn test_new_rejects_short_buffer() {
        let result = Image::new(2, 2, 4, vec![0; 15]);
        assert!(matches!(result, Err(DecodeError::BufferTooSmall { .. })));
    }

    #[test]
    fn test_decode_png() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&png).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (3, 2, 4));
        assert_eq!(decoded.sample(0.9, 0.9), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_image(&[0, 1, 2, 3]).is_err());
    }
}
