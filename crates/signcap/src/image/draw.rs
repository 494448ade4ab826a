//! Annotation of preview frames.
//!
//! [`line`], [`circle`] and [`text`] return guards that can be customized and draw when dropped:
//!
//! ```
//! # use signcap::image::{draw, Color, Image};
//! let mut image = Image::new(64, 48);
//! draw::line(&mut image, 0, 0, 63, 47).color(Color::GREEN).stroke_width(2);
//! ```
//!
//! Anything outside the image is clipped.

use embedded_graphics::{
    mono_font::{ascii, MonoFont, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
    text::{Baseline, Text},
};

use crate::image::{Color, Image};

enum Shape {
    Line(Point, Point),
    Circle(Point, u32),
}

/// Guard returned by [`line`] and [`circle`].
pub struct DrawShape<'a> {
    image: &'a mut Image,
    shape: Shape,
    color: Color,
    stroke_width: u32,
}

impl DrawShape<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the stroke width in pixels (1 by default).
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawShape<'_> {
    fn drop(&mut self) {
        let style = PrimitiveStyle::with_stroke(self.color, self.stroke_width);
        let target = &mut Target(self.image);
        let result = match self.shape {
            Shape::Line(start, end) => Line::new(start, end).into_styled(style).draw(target),
            Shape::Circle(center, diameter) => Circle::with_center(center, diameter)
                .into_styled(style)
                .draw(target),
        };
        result.unwrap_or_else(|never| match never {})
    }
}

/// Guard returned by [`text`].
pub struct DrawText<'a> {
    image: &'a mut Image,
    origin: Point,
    text: &'a str,
    color: Color,
    font: &'static MonoFont<'static>,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Switches to a 10x20 font, readable from where a signer stands.
    pub fn large(&mut self) -> &mut Self {
        self.font = &ascii::FONT_10X20;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let style = MonoTextStyle::new(self.font, self.color);
        Text::with_baseline(self.text, self.origin, style, Baseline::Alphabetic)
            .draw(&mut Target(self.image))
            .map(drop)
            .unwrap_or_else(|never| match never {})
    }
}

/// Draws a line from `(start_x, start_y)` to `(end_x, end_y)`, blue by default.
pub fn line(
    image: &mut Image,
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
) -> DrawShape<'_> {
    DrawShape {
        image,
        shape: Shape::Line(Point::new(start_x, start_y), Point::new(end_x, end_y)),
        color: Color::from_rgb8(0, 0, 255),
        stroke_width: 1,
    }
}

/// Draws a circle outline centered on `(x, y)`, green by default.
pub fn circle(image: &mut Image, x: i32, y: i32, diameter: u32) -> DrawShape<'_> {
    DrawShape {
        image,
        shape: Shape::Circle(Point::new(x, y), diameter),
        color: Color::GREEN,
        stroke_width: 1,
    }
}

/// Draws a line of text in red, starting at `x` with its baseline at `y`.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        origin: Point::new(x, y),
        text,
        color: Color::from_rgb8(255, 0, 0),
        font: &ascii::FONT_6X10,
    }
}

struct Target<'a>(&'a mut Image);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;
    type Error = std::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Color>>,
    {
        let (width, height) = (self.0.width(), self.0.height());
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) {
                if x < width && y < height {
                    self.0.set(x, y, color);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(image: &Image, color: Color) -> usize {
        image
            .data()
            .chunks_exact(4)
            .filter(|px| **px == color.0)
            .count()
    }

    #[test]
    fn horizontal_line() {
        let mut image = Image::new(8, 3);
        let red = Color::from_rgb8(255, 0, 0);
        line(&mut image, 1, 1, 6, 1).color(red);
        assert_eq!(count(&image, red), 6);
        assert_eq!(image.get(1, 1), red);
        assert_eq!(image.get(6, 1), red);
        assert_eq!(image.get(0, 1), Color([0; 4]));
    }

    #[test]
    fn clipped() {
        let mut image = Image::new(4, 4);
        let white = Color::from_rgb8(255, 255, 255);
        line(&mut image, -10, 2, 10, 2).color(white);
        circle(&mut image, 100, 100, 9);
        assert_eq!(count(&image, white), 4);
        assert_eq!(count(&image, Color::GREEN), 0);
    }

    #[test]
    fn circle_outline() {
        let mut image = Image::new(16, 16);
        circle(&mut image, 8, 8, 9).stroke_width(1);
        assert!(count(&image, Color::GREEN) > 0);
        assert_eq!(image.get(8, 8), Color([0; 4]));
    }

    #[test]
    fn text_sits_on_baseline() {
        let mut image = Image::new(64, 32);
        text(&mut image, 2, 16, "A 0").large();
        let red = Color::from_rgb8(255, 0, 0);
        assert!(count(&image, red) > 0);
        for y in 18..32 {
            for x in 0..64 {
                assert_ne!(image.get(x, y), red, "({x}, {y}) is below the baseline");
            }
        }
    }
}
