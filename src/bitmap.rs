use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

use crate::error::{PipelineError, Result};

/// An RGBA pixel grid, 8 bits per channel.
///
/// Drawings are expected to be monochrome, so downstream stages usually only
/// read the red channel. Use [`Bitmap::is_grayscale`] to check that assumption.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pixels: RgbaImage,
}

impl Bitmap {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(PipelineError::Bitmap(format!(
                "expected {expected} bytes for {width}x{height} RGBA, got {}",
                data.len()
            )));
        }
        RgbaImage::from_raw(width, height, data)
            .map(Self::from)
            .ok_or_else(|| PipelineError::Bitmap("raw buffer rejected".into()))
    }

    /// Expands each gray value into R, G and B with an opaque alpha.
    pub fn from_gray(width: u32, height: u32, gray: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize;
        if gray.len() != expected {
            return Err(PipelineError::Bitmap(format!(
                "expected {expected} gray values for {width}x{height}, got {}",
                gray.len()
            )));
        }
        let data = gray.iter().flat_map(|&v| [v, v, v, 255]).collect();
        Self::from_rgba(width, height, data)
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.pixels.pixels().map(|p| p.0)
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// True when every pixel has equal red, green and blue channels.
    pub fn is_grayscale(&self) -> bool {
        self.pixels().all(|[r, g, b, _]| r == g && g == b)
    }

    /// Mean of the red channel, in `0.0..=255.0`.
    pub fn mean_intensity(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels().map(|[r, ..]| r as u64).sum();
        sum as f32 / (self.width() as u64 * self.height() as u64) as f32
    }

    /// Dark strokes on a light background: the opposite of the
    /// white-on-black digits the classifier is trained on.
    pub fn is_light_background(&self) -> bool {
        self.mean_intensity() > 128.0
    }

    pub fn inverted(&self) -> Self {
        let mut pixels = self.pixels.clone();
        for p in pixels.pixels_mut() {
            let [r, g, b, a] = p.0;
            p.0 = [255 - r, 255 - g, 255 - b, a];
        }
        Self { pixels }
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(pixels: RgbaImage) -> Self {
        Self { pixels }
    }
}

impl From<&DynamicImage> for Bitmap {
    fn from(image: &DynamicImage) -> Self {
        Self {
            pixels: image.to_rgba8(),
        }
    }
}

impl From<&GrayImage> for Bitmap {
    fn from(gray: &GrayImage) -> Self {
        let pixels = RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y).0[0];
            Rgba([v, v, v, 255])
        });
        Self { pixels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_buffer_length_is_checked() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Bitmap::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Bitmap::from_gray(3, 1, &[1, 2]).is_err());
    }

    #[test]
    fn gray_values_fill_rgb() {
        let bitmap = Bitmap::from_gray(2, 1, &[10, 200]).unwrap();
        assert_eq!(bitmap.pixel(0, 0), [10, 10, 10, 255]);
        assert_eq!(bitmap.pixel(1, 0), [200, 200, 200, 255]);
        assert!(bitmap.is_grayscale());
    }

    #[test]
    fn colored_pixels_are_not_grayscale() {
        let bitmap = Bitmap::from_rgba(1, 1, vec![255, 0, 0, 255]).unwrap();
        assert!(!bitmap.is_grayscale());
    }

    #[test]
    fn polarity_follows_mean_intensity() {
        let dark = Bitmap::filled(4, 4, [0, 0, 0, 255]);
        assert_eq!(dark.mean_intensity(), 0.0);
        assert!(!dark.is_light_background());

        let light = dark.inverted();
        assert_eq!(light.pixel(3, 3), [255, 255, 255, 255]);
        assert!(light.is_light_background());
    }

    #[test]
    fn inversion_keeps_alpha() {
        let bitmap = Bitmap::from_rgba(1, 1, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(bitmap.inverted().pixel(0, 0), [245, 235, 225, 40]);
    }
}
