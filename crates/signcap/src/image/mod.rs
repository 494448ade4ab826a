//! Frames as they move from the webcam through the detector to the preview.
//!
//! [`Image`] stores RGBA8 pixels, the layout the preview uploads to the GPU as is. The detector
//! wants RGB, see [`Image::to_rgb8`].

pub mod draw;

use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Deserialize;

/// An owned RGBA8 frame.
#[derive(Clone)]
pub struct Image {
    buf: RgbaImage,
}

impl Image {
    /// Decodes a webcam frame (JFIF or Motion JPEG).
    pub fn decode_jpeg(jpeg: &[u8]) -> anyhow::Result<Self> {
        let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
        Ok(Self {
            buf: decoded.into_rgba8(),
        })
    }

    /// Wraps RGBA8 pixel data, row by row without padding.
    ///
    /// # Panics
    ///
    /// Panics if `rgba` does not hold exactly `res.num_pixels()` pixels.
    pub fn from_rgba8(res: Resolution, rgba: &[u8]) -> Self {
        match RgbaImage::from_raw(res.width(), res.height(), rgba.to_vec()) {
            Some(buf) if rgba.len() as u64 == res.num_pixels() * 4 => Self { buf },
            _ => panic!("incorrect buffer size {} for a {} image", rgba.len(), res),
        }
    }

    /// Creates an image with every pixel set to transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: RgbaImage::new(width, height),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Panics if `(x, y)` is out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf.get_pixel(x, y).0)
    }

    /// Panics if `(x, y)` is out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf.put_pixel(x, y, Rgba(color.0));
    }

    /// Mirrors the frame left to right, turning the webcam view into a selfie view.
    pub fn flip_horizontal_in_place(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Copies the pixel data without its alpha channel.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.data()
            .chunks_exact(4)
            .flat_map(|px| &px[..3])
            .copied()
            .collect()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({})", self.resolution())
    }
}

/// Width and height of a frame, in pixels.
///
/// Deserializes from `{"width": 640, "height": 480}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// `640x480`, the default recording size.
    pub const VGA: Self = Self::new(640, 480);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An sRGB color with straight alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);

    /// Creates an opaque color.
    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror() {
        let (red, blue) = (Color::from_rgb8(255, 0, 0), Color::from_rgb8(0, 0, 255));
        let mut image = Image::new(3, 1);
        image.set(0, 0, red);
        image.set(2, 0, blue);
        image.flip_horizontal_in_place();
        assert_eq!(image.get(0, 0), blue);
        assert_eq!(image.get(1, 0), Color([0; 4]));
        assert_eq!(image.get(2, 0), red);
    }

    #[test]
    fn rgb8() {
        let mut image = Image::new(2, 1);
        image.set(0, 0, Color::from_rgb8(1, 2, 3));
        image.set(1, 0, Color::from_rgb8(255, 255, 0));
        assert_eq!(image.to_rgb8(), [1, 2, 3, 255, 255, 0]);
    }

    #[test]
    fn from_rgba8() {
        let image = Image::from_rgba8(Resolution::new(1, 2), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(image.resolution(), Resolution::new(1, 2));
        assert_eq!(image.get(0, 1), Color([5, 6, 7, 8]));
        assert_eq!(image.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(format!("{:?}", image.get(0, 0)), "#01020304");
    }

    #[test]
    #[should_panic(expected = "incorrect buffer size")]
    fn from_rgba8_wrong_size() {
        Image::from_rgba8(Resolution::new(2, 2), &[0; 4]);
    }
}
