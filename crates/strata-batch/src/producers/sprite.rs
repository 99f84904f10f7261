use crate::backend::{BackendResult, TextureId};
use crate::batch::QuadInstance;
use crate::coords::Rect;
use crate::paint::Color;
use crate::renderer::Renderer;

/// A sub-rectangle of a texture, in normalized texture coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AtlasRegion {
    pub texture: TextureId,
    pub uv: Rect,
}

impl AtlasRegion {
    /// The whole texture.
    pub fn whole(texture: TextureId) -> Self {
        Self {
            texture,
            uv: Rect::unit(),
        }
    }

    /// Region given in texels of an `atlas_width` x `atlas_height` texture.
    pub fn from_texels(texture: TextureId, texels: Rect, atlas_width: u32, atlas_height: u32) -> Self {
        let (w, h) = (atlas_width.max(1) as f32, atlas_height.max(1) as f32);
        Self {
            texture,
            uv: Rect::new(
                texels.origin.x / w,
                texels.origin.y / h,
                texels.size.x / w,
                texels.size.y / h,
            ),
        }
    }
}

/// Quad producer for sprites and solid fills.
pub struct SpriteBatch<'r> {
    renderer: &'r mut dyn Renderer,
    tint: Color,
    drawn: u32,
}

impl<'r> SpriteBatch<'r> {
    pub fn new(renderer: &'r mut dyn Renderer) -> Self {
        Self {
            renderer,
            tint: Color::WHITE,
            drawn: 0,
        }
    }

    /// Color multiplied into every textured sprite.
    #[must_use]
    pub fn with_tint(mut self, tint: Color) -> Self {
        self.tint = tint;
        self
    }

    pub fn draw(&mut self, region: AtlasRegion, dest: Rect) -> BackendResult<()> {
        self.draw_rotated(region, dest, 0.0)
    }

    /// Draws `region` into `dest`, spun by `radians` around the center of `dest`.
    pub fn draw_rotated(&mut self, region: AtlasRegion, dest: Rect, radians: f32) -> BackendResult<()> {
        let quad = QuadInstance::textured(dest, region.texture)
            .with_uv(region.uv)
            .with_color(self.tint)
            .with_rotation(radians);
        self.submit(&quad)
    }

    pub fn fill(&mut self, dest: Rect, color: Color) -> BackendResult<()> {
        self.submit(&QuadInstance::solid(dest, color))
    }

    /// Quads handed to the renderer so far.
    #[inline]
    pub fn drawn(&self) -> u32 {
        self.drawn
    }

    fn submit(&mut self, quad: &QuadInstance) -> BackendResult<()> {
        if quad.rect.normalized().is_empty() {
            return Ok(());
        }
        self.renderer.draw_quad(quad)?;
        self.drawn += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDriver;
    use crate::backend::{Capabilities, FrameUniforms};
    use crate::renderer::{create_renderer, RendererConfig};

    #[test]
    fn texel_regions_normalize_against_atlas_size() {
        let region = AtlasRegion::from_texels(TextureId(1), Rect::new(64.0, 0.0, 32.0, 128.0), 128, 256);
        assert_eq!(region.uv, Rect::new(0.5, 0.0, 0.25, 0.5));
    }

    #[test]
    fn empty_destinations_are_skipped() {
        let driver = RecordingDriver::new(Capabilities::instanced(4));
        let journal = driver.journal();
        let mut renderer = create_renderer(driver, &RendererConfig::default()).unwrap();
        renderer.begin(&FrameUniforms::IDENTITY).unwrap();

        let mut sprites = SpriteBatch::new(renderer.as_mut());
        sprites.fill(Rect::new(0.0, 0.0, 0.0, 4.0), Color::BLACK).unwrap();
        sprites.draw(AtlasRegion::whole(TextureId(2)), Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
        assert_eq!(sprites.drawn(), 1);

        renderer.end().unwrap();
        let subs = journal.submissions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].instances().len(), 1);
        assert_eq!(subs[0].texture_in_slot(0), Some(TextureId(2)));
    }
}
