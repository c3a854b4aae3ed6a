use core::convert::Infallible;

use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::{DrawTarget, OriginDimensions, Pixel, Point, Size},
    primitives::Rectangle,
};

/// Packed 1-bit bitmap in the layout the panel expects: rows padded to
/// whole bytes, most significant bit first, `1` is white paper and `0` is
/// ink. `BinaryColor::On` draws ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapPlane {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl BitmapPlane {
    pub fn new(width: u32, height: u32) -> Self {
        let len = Self::row_bytes(width) * height as usize;
        Self {
            width,
            height,
            bytes: vec![0xFF; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        match self.locate(x, y) {
            Some((index, mask)) => self.bytes[index] & mask == 0,
            None => false,
        }
    }

    pub fn set(&mut self, x: u32, y: u32, ink: bool) {
        if let Some((index, mask)) = self.locate(x, y) {
            if ink {
                self.bytes[index] &= !mask;
            } else {
                self.bytes[index] |= mask;
            }
        }
    }

    pub fn ink_count(&self) -> usize {
        let mut count = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.is_ink(x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    fn row_bytes(width: u32) -> usize {
        (width as usize).div_ceil(8)
    }

    fn locate(&self, x: u32, y: u32) -> Option<(usize, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * Self::row_bytes(self.width) + x as usize / 8;
        let mask = 0x80 >> (x % 8);
        Some((index, mask))
    }
}

impl OriginDimensions for BitmapPlane {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for BitmapPlane {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) {
                self.set(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

// Blows each logical pixel up to a factor x factor block.
pub struct Scaled<'a> {
    inner: &'a mut BitmapPlane,
    factor: u32,
    origin: Point,
}

impl<'a> Scaled<'a> {
    pub fn new(inner: &'a mut BitmapPlane, factor: u32, origin: Point) -> Self {
        Self {
            inner,
            factor: factor.max(1),
            origin,
        }
    }
}

impl OriginDimensions for Scaled<'_> {
    fn size(&self) -> Size {
        let size = self.inner.size();
        Size::new(size.width / self.factor, size.height / self.factor)
    }
}

impl DrawTarget for Scaled<'_> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let factor = i32::try_from(self.factor).unwrap_or(1);
        for Pixel(point, color) in pixels {
            let top_left = self.origin + point * factor;
            let block = Rectangle::new(top_left, Size::new_equal(self.factor));
            self.inner.fill_solid(&block, color)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub primary: BitmapPlane,
    pub accent: BitmapPlane,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            primary: BitmapPlane::new(width, height),
            accent: BitmapPlane::new(width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_graphics::{
        prelude::*,
        primitives::{PrimitiveStyle, Rectangle},
    };

    use super::*;

    #[test]
    fn new_plane_is_white() {
        let plane = BitmapPlane::new(13, 4);
        assert_eq!(plane.as_bytes().len(), 2 * 4);
        assert!(plane.as_bytes().iter().all(|byte| *byte == 0xFF));
        assert_eq!(plane.ink_count(), 0);
    }

    #[test]
    fn set_uses_msb_first_with_zero_as_ink() {
        let mut plane = BitmapPlane::new(16, 2);
        plane.set(0, 0, true);
        plane.set(9, 1, true);
        assert_eq!(plane.as_bytes(), &[0x7F, 0xFF, 0xFF, 0xBF]);
        assert!(plane.is_ink(9, 1));

        plane.set(9, 1, false);
        assert!(!plane.is_ink(9, 1));
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut plane = BitmapPlane::new(8, 8);
        plane.set(8, 0, true);
        plane.set(0, 8, true);
        assert_eq!(plane.ink_count(), 0);
        assert!(!plane.is_ink(100, 100));
    }

    #[test]
    fn draw_target_clips_negative_coordinates() {
        let mut plane = BitmapPlane::new(10, 10);
        Rectangle::new(Point::new(-5, -5), Size::new(8, 8))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut plane)
            .unwrap();
        assert_eq!(plane.ink_count(), 9);
    }

    #[test]
    fn scaled_target_expands_pixels() {
        let mut plane = BitmapPlane::new(20, 20);
        {
            let mut scaled = Scaled::new(&mut plane, 4, Point::new(2, 2));
            Pixel(Point::new(1, 1), BinaryColor::On)
                .draw(&mut scaled)
                .unwrap();
        }
        assert_eq!(plane.ink_count(), 16);
        assert!(plane.is_ink(6, 6));
        assert!(plane.is_ink(9, 9));
        assert!(!plane.is_ink(10, 10));
    }
}
