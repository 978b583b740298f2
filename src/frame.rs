/// A single RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

/// A fully composited frame covering the whole logical screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifFrame {
    /// Row-major pixels, `width * height` of them.
    pub pixels: Vec<Rgba>,
    pub width: u16,
    pub height: u16,
    /// Display time in hundredths of a second.
    pub delay: u16,
}

impl GifFrame {
    pub fn pixel(&self, x: u16, y: u16) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(usize::from(y) * usize::from(self.width) + usize::from(x)).copied()
    }
}
