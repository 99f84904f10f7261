//! Producers: call sites that feed a [`Renderer`](crate::renderer::Renderer).
//!
//! Each producer translates its own vocabulary into renderer calls:
//! - [`SpriteBatch`]: textured and solid quads through `draw_quad`
//! - [`write_glyph_run`]: already positioned glyphs through multi-quad `reserve`
//! - [`Overlay`]: UI rectangles, borders, lines and fans through `reserve`
//!
//! Producers never flush on their own; the renderer decides.

mod overlay;
mod sprite;
mod text;

pub use overlay::Overlay;
pub use sprite::{AtlasRegion, SpriteBatch};
pub use text::{write_glyph_run, GlyphRun, PositionedGlyph};
