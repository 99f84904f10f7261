/// Viewport size in logical pixels plus the physical scale factor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// Physical pixels per logical pixel.
    pub scale: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height, scale: 1.0 }
    }

    #[inline]
    pub const fn with_scale(self, scale: f32) -> Self {
        Self { scale, ..self }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.width.is_finite()
            && self.height.is_finite()
            && self.scale > 0.0
    }

    /// Physical size, at least 1x1.
    pub fn physical_size(self) -> (u32, u32) {
        (
            (self.width * self.scale).max(1.0) as u32,
            (self.height * self.scale).max(1.0) as u32,
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}
