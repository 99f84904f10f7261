//! The studio scene: sprites, a glyph run and a UI overlay, all fed
//! through one renderer per window.

use anyhow::{Context, Result};

use strata_batch::backend::gpu::{RenderTarget, WgpuDriver, WgpuDriverConfig};
use strata_batch::backend::FrameUniforms;
use strata_batch::batch::{BatchLimits, BatchStats};
use strata_batch::coords::{Rect, Vec2, Viewport};
use strata_batch::dispose::{DisposalQueue, GpuHandle};
use strata_batch::paint::Color;
use strata_batch::producers::{write_glyph_run, AtlasRegion, GlyphRun, Overlay, PositionedGlyph, SpriteBatch};
use strata_batch::renderer::{create_renderer, Renderer, RendererConfig, Strategy};
use strata_batch::TextureId;

use crate::clock::FrameTime;
use crate::gpu::Gpu;

const GRID_COLS: u32 = 48;
const GRID_ROWS: u32 = 27;
const GLYPH_CELL: u32 = 8;
const GLYPH_CELLS: u32 = 16;
const LABEL: &str = "STRATA BATCH STUDIO";

pub struct Demo {
    renderer: Box<dyn Renderer>,
    target: RenderTarget,
    /// Owned textures; dropping a handle queues the texture for release.
    textures: Vec<GpuHandle<'static>>,
    checker: TextureId,
    glyph_atlas: TextureId,
    label: Vec<PositionedGlyph>,
}

impl Demo {
    pub fn new(gpu: &Gpu<'_>, strategy: Option<Strategy>) -> Result<Self> {
        let mut driver = WgpuDriver::new(
            gpu.device().clone(),
            gpu.queue().clone(),
            gpu.surface_format(),
            WgpuDriverConfig::default(),
        );
        let target = driver.target();

        let checker = driver
            .create_texture_rgba8(16, 16, &checker_rgba(16))
            .context("failed to upload checker texture")?;
        let glyph_atlas = driver
            .create_texture_rgba8(GLYPH_CELL * GLYPH_CELLS, GLYPH_CELL, &glyph_atlas_rgba())
            .context("failed to upload glyph atlas")?;

        let queue = DisposalQueue::global();
        let textures = vec![GpuHandle::texture(queue, checker), GpuHandle::texture(queue, glyph_atlas)];

        let config = RendererConfig {
            limits: BatchLimits::from_device(&gpu.device().limits()),
            strategy,
            ..Default::default()
        };
        let renderer = create_renderer(driver, &config).context("failed to create renderer")?;
        log::info!(
            "renderer: {} ({:?}, {} texture units)",
            renderer.strategy(),
            renderer.policy(),
            renderer.limits().max_texture_units
        );

        Ok(Self {
            renderer,
            target,
            textures,
            checker,
            glyph_atlas,
            label: layout_label(LABEL, Vec2::new(24.0, 24.0), 2.0),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.renderer.strategy()
    }

    /// Records and submits one frame into `view`, then releases whatever was
    /// queued for disposal.
    pub fn draw(&mut self, view: wgpu::TextureView, viewport: Viewport, time: &FrameTime) -> Result<BatchStats> {
        self.target.set(view, viewport);

        let result = self.record(viewport, time);

        self.target.clear();
        DisposalQueue::global().drain_all(self.renderer.driver_mut());
        result
    }

    fn record(&mut self, viewport: Viewport, time: &FrameTime) -> Result<BatchStats> {
        self.renderer.begin(&FrameUniforms::orthographic(viewport))?;
        let drawn = self.draw_scene(viewport, time);
        // Always close the session, even when a producer failed.
        let ended = self.renderer.end();
        drawn?;
        Ok(ended?)
    }

    fn draw_scene(&mut self, viewport: Viewport, time: &FrameTime) -> Result<()> {
        let t = time.elapsed;

        // Background sprite grid.
        {
            let cell = Vec2::new(
                viewport.width / GRID_COLS as f32,
                viewport.height / GRID_ROWS as f32,
            );
            let mut sprites = SpriteBatch::new(self.renderer.as_mut()).with_tint(Color::WHITE.with_opacity(0.35));
            for row in 0..GRID_ROWS {
                for col in 0..GRID_COLS {
                    let phase = (row * GRID_COLS + col) as f32 * 0.07;
                    let inset = cell * 0.2;
                    let dest = Rect::new(
                        col as f32 * cell.x + inset.x,
                        row as f32 * cell.y + inset.y,
                        cell.x - inset.x * 2.0,
                        cell.y - inset.y * 2.0,
                    );
                    sprites.draw_rotated(AtlasRegion::whole(self.checker), dest, t * 0.6 + phase)?;
                }
            }
        }

        write_glyph_run(
            self.renderer.as_mut(),
            &GlyphRun {
                atlas: self.glyph_atlas,
                color: Color::from_rgba8(235, 240, 255, 255),
                glyphs: &self.label,
            },
        )?;

        // Overlay panel.
        let mut overlay = Overlay::new(self.renderer.as_mut());
        let panel = Rect::new(viewport.width - 280.0, 20.0, 260.0, 180.0);
        overlay.fill_rect(panel, Color::from_rgba8(18, 22, 30, 230))?;
        overlay.set_line_width(2.0)?;
        overlay.stroke_rect(panel, Color::from_rgba8(110, 160, 255, 255))?;

        overlay.push_clip(panel)?;
        let wave: Vec<Vec2> = (0..=64)
            .map(|i| {
                let u = i as f32 / 64.0;
                Vec2::new(
                    panel.origin.x + u * panel.size.x,
                    panel.center().y + (u * 12.0 + t * 3.0).sin() * 40.0,
                )
            })
            .collect();
        overlay.polyline(&wave, Color::from_rgba8(120, 230, 160, 255))?;
        overlay.fan(
            &regular_polygon(panel.origin + Vec2::new(40.0, 40.0), 24.0, 6, t),
            Color::from_rgba8(255, 170, 60, 200),
        )?;
        overlay.pop_clip()?;
        Ok(())
    }
}

impl Drop for Demo {
    fn drop(&mut self) {
        self.textures.clear();
        let released = DisposalQueue::global().drain_all(self.renderer.driver_mut());
        log::debug!("demo teardown released {released} texture(s)");
    }
}

fn layout_label(text: &str, origin: Vec2, scale: f32) -> Vec<PositionedGlyph> {
    let size = GLYPH_CELL as f32 * scale;
    let advance = size + scale * 2.0;
    text.bytes()
        .enumerate()
        .map(|(i, b)| {
            let x = origin.x + i as f32 * advance;
            if b == b' ' {
                // Blank glyphs take space but produce no quad.
                return PositionedGlyph {
                    rect: Rect::new(x, origin.y, 0.0, 0.0),
                    uv: Rect::new(0.0, 0.0, 0.0, 0.0),
                };
            }
            let cell = (b as u32) % GLYPH_CELLS;
            PositionedGlyph {
                rect: Rect::new(x, origin.y, size, size),
                uv: Rect::new(cell as f32 / GLYPH_CELLS as f32, 0.0, 1.0 / GLYPH_CELLS as f32, 1.0),
            }
        })
        .collect()
}

fn regular_polygon(center: Vec2, radius: f32, sides: u32, spin: f32) -> Vec<Vec2> {
    (0..sides)
        .map(|k| {
            let a = spin + k as f32 * std::f32::consts::TAU / sides as f32;
            center + Vec2::new(a.cos(), a.sin()) * radius
        })
        .collect()
}

fn checker_rgba(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / 4) + (y / 4)) % 2 == 0;
            pixels.extend_from_slice(if light { &[200, 210, 230, 255] } else { &[60, 70, 90, 255] });
        }
    }
    pixels
}

/// A strip of procedural 8x8 block glyphs (white, premultiplied).
fn glyph_atlas_rgba() -> Vec<u8> {
    let width = GLYPH_CELL * GLYPH_CELLS;
    let mut pixels = Vec::with_capacity((width * GLYPH_CELL * 4) as usize);
    for y in 0..GLYPH_CELL {
        for x in 0..width {
            let (cell, cx) = (x / GLYPH_CELL, x % GLYPH_CELL);
            let inside = (1..GLYPH_CELL - 1).contains(&cx) && (1..GLYPH_CELL - 1).contains(&y);
            let lit = inside && ((cx * 3 + y * 5 + cell * 7) % (2 + cell % 3)) != 0;
            pixels.extend_from_slice(if lit { &[255; 4] } else { &[0; 4] });
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_layout_skips_blank_glyph_size() {
        let glyphs = layout_label("A B", Vec2::zero(), 1.0);
        assert_eq!(glyphs.len(), 3);
        assert!(glyphs[1].rect.is_empty());
        assert_eq!(glyphs[2].rect.origin.x, 20.0);
    }

    #[test]
    fn procedural_textures_have_rgba8_sizes() {
        assert_eq!(checker_rgba(16).len(), 16 * 16 * 4);
        assert_eq!(glyph_atlas_rgba().len(), (GLYPH_CELL * GLYPH_CELLS * GLYPH_CELL * 4) as usize);
    }
}
