use crate::backend::{BackendResult, TextureId};
use crate::batch::{QuadInstance, QUAD_INDICES};
use crate::coords::Rect;
use crate::paint::Color;
use crate::renderer::Renderer;

/// One glyph already placed by layout: where it goes and where it lives in the atlas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PositionedGlyph {
    /// Destination in logical pixels.
    pub rect: Rect,
    /// Source in normalized atlas coordinates.
    pub uv: Rect,
}

/// A run of glyphs sharing one atlas texture and color.
#[derive(Debug, Clone, Copy)]
pub struct GlyphRun<'a> {
    pub atlas: TextureId,
    pub color: Color,
    pub glyphs: &'a [PositionedGlyph],
}

/// Writes a glyph run as raw geometry.
///
/// Glyphs are written in chunks: each chunk is one reservation of `4 * n`
/// vertices and `6 * n` indices, as large as one batch allows. Empty glyphs
/// (spaces) produce no geometry. Returns the number of glyph quads written.
pub fn write_glyph_run(renderer: &mut dyn Renderer, run: &GlyphRun<'_>) -> BackendResult<u32> {
    let limits = *renderer.limits();
    let per_reservation = (limits.max_vertices / 4).min(limits.max_indices() / 6).max(1) as usize;

    let visible: Vec<&PositionedGlyph> = run.glyphs.iter().filter(|g| !g.rect.normalized().is_empty()).collect();

    for chunk in visible.chunks(per_reservation) {
        let n = chunk.len() as u32;
        let mapped = renderer.reserve(4 * n, 6 * n, Some(run.atlas))?;
        let slot = mapped.texture_slot;
        let base = mapped.index_offset;

        for (k, glyph) in chunk.iter().enumerate() {
            let quad = QuadInstance::textured(glyph.rect, run.atlas)
                .with_uv(glyph.uv)
                .with_color(run.color);
            mapped.vertices[k * 4..k * 4 + 4].copy_from_slice(&quad.to_vertices(slot));

            let first = base + k as u32 * 4;
            for (dst, &i) in mapped.indices[k * 6..k * 6 + 6].iter_mut().zip(&QUAD_INDICES) {
                *dst = first + i;
            }
        }
    }
    Ok(visible.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDriver;
    use crate::backend::{Capabilities, FrameUniforms};
    use crate::batch::BatchLimits;
    use crate::renderer::{create_renderer, RendererConfig};

    fn glyphs(n: usize) -> Vec<PositionedGlyph> {
        (0..n)
            .map(|i| PositionedGlyph {
                rect: Rect::new(i as f32 * 8.0, 0.0, 8.0, 12.0),
                uv: Rect::new(0.0, 0.0, 0.1, 0.1),
            })
            .collect()
    }

    #[test]
    fn long_runs_split_into_batch_sized_reservations() {
        let driver = RecordingDriver::new(Capabilities::software(2));
        let journal = driver.journal();
        let config = RendererConfig {
            limits: BatchLimits::new(8, 16, 2),
            ..Default::default()
        };
        let mut renderer = create_renderer(driver, &config).unwrap();
        renderer.begin(&FrameUniforms::IDENTITY).unwrap();

        let glyphs = glyphs(5);
        let run = GlyphRun {
            atlas: TextureId(7),
            color: Color::WHITE,
            glyphs: &glyphs,
        };
        assert_eq!(write_glyph_run(renderer.as_mut(), &run).unwrap(), 5);
        let stats = renderer.end().unwrap();

        // 2 + 2 + 1 glyphs, one reservation per batch.
        assert_eq!(stats.flushes, 3);
        let subs = journal.submissions();
        assert_eq!(subs[0].indices(), &[0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
        assert_eq!(subs[2].vertex_count(), 4);
        assert!(subs.iter().all(|s| s.texture_in_slot(0) == Some(TextureId(7))));
    }

    #[test]
    fn blank_glyphs_write_nothing() {
        let driver = RecordingDriver::new(Capabilities::legacy(2));
        let journal = driver.journal();
        let mut renderer = create_renderer(driver, &RendererConfig::default()).unwrap();
        renderer.begin(&FrameUniforms::IDENTITY).unwrap();

        let space = [PositionedGlyph {
            rect: Rect::new(0.0, 0.0, 0.0, 12.0),
            uv: Rect::unit(),
        }];
        let run = GlyphRun {
            atlas: TextureId(1),
            color: Color::BLACK,
            glyphs: &space,
        };
        assert_eq!(write_glyph_run(renderer.as_mut(), &run).unwrap(), 0);
        renderer.end().unwrap();
        assert!(journal.submissions().is_empty());
    }
}
