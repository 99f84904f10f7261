use crate::backend::BackendResult;
use crate::batch::{Vertex, NO_TEXTURE, QUAD_INDICES};
use crate::coords::{Rect, Vec2};
use crate::paint::Color;
use crate::renderer::Renderer;

/// Untextured UI geometry: fills, borders, lines and convex fans.
///
/// Clip rectangles nest: each `push_clip` intersects with the enclosing clip
/// and becomes the renderer's primitive-state clip until the matching
/// `pop_clip`. Line-based shapes use the renderer's current line width.
pub struct Overlay<'r> {
    renderer: &'r mut dyn Renderer,
    clip_stack: Vec<Rect>,
}

impl<'r> Overlay<'r> {
    pub fn new(renderer: &'r mut dyn Renderer) -> Self {
        Self {
            renderer,
            clip_stack: Vec::new(),
        }
    }

    // ── state ─────────────────────────────────────────────────────────────

    pub fn set_line_width(&mut self, width: f32) -> BackendResult<()> {
        let state = self.renderer.primitive_state().with_line_width(width.max(0.0));
        self.renderer.set_primitive_state(state)
    }

    #[inline]
    pub fn line_width(&self) -> f32 {
        self.renderer.primitive_state().line_width
    }

    /// Narrows the clip to `rect` intersected with the current clip.
    ///
    /// Disjoint rectangles produce an empty clip that hides everything
    /// until it is popped.
    pub fn push_clip(&mut self, rect: Rect) -> BackendResult<()> {
        let rect = rect.normalized();
        let clip = match self.clip_stack.last() {
            Some(parent) => parent
                .intersect(rect)
                .unwrap_or(Rect::new(parent.origin.x, parent.origin.y, 0.0, 0.0)),
            None => rect,
        };
        self.clip_stack.push(clip);
        self.apply_clip()
    }

    /// Restores the enclosing clip. Popping an empty stack is a no-op.
    pub fn pop_clip(&mut self) -> BackendResult<()> {
        if self.clip_stack.pop().is_none() {
            log::warn!("pop_clip without a matching push_clip");
            return Ok(());
        }
        self.apply_clip()
    }

    #[inline]
    pub fn current_clip(&self) -> Option<Rect> {
        self.clip_stack.last().copied()
    }

    fn apply_clip(&mut self) -> BackendResult<()> {
        let state = self.renderer.primitive_state().with_clip(self.current_clip());
        self.renderer.set_primitive_state(state)
    }

    // ── shapes ────────────────────────────────────────────────────────────

    pub fn fill_rect(&mut self, rect: Rect, color: Color) -> BackendResult<()> {
        let rect = rect.normalized();
        if rect.is_empty() {
            return Ok(());
        }
        let mut mapped = self.renderer.reserve(4, 6, None)?;
        mapped.vertices.copy_from_slice(&solid_quad(rect.corners(0.0), color));
        mapped.write_indices(&QUAD_INDICES);
        Ok(())
    }

    /// Border drawn inside `rect`, one line width thick, as one reservation.
    pub fn stroke_rect(&mut self, rect: Rect, color: Color) -> BackendResult<()> {
        let rect = rect.normalized();
        let w = self.line_width().min(rect.size.x * 0.5).min(rect.size.y * 0.5);
        if rect.is_empty() || w <= 0.0 {
            return Ok(());
        }
        let (x, y) = (rect.origin.x, rect.origin.y);
        let (rw, rh) = (rect.size.x, rect.size.y);
        let edges = [
            Rect::new(x, y, rw, w),
            Rect::new(x, y + rh - w, rw, w),
            Rect::new(x, y + w, w, rh - 2.0 * w),
            Rect::new(x + rw - w, y + w, w, rh - 2.0 * w),
        ];

        let mut mapped = self.renderer.reserve(16, 24, None)?;
        let mut local = [0u32; 24];
        for (k, edge) in edges.iter().enumerate() {
            mapped.vertices[k * 4..k * 4 + 4].copy_from_slice(&solid_quad(edge.corners(0.0), color));
            for (j, &i) in QUAD_INDICES.iter().enumerate() {
                local[k * 6 + j] = k as u32 * 4 + i;
            }
        }
        mapped.write_indices(&local);
        Ok(())
    }

    /// Segment from `from` to `to`, one line width thick, centered on the segment.
    pub fn line(&mut self, from: Vec2, to: Vec2, color: Color) -> BackendResult<()> {
        let dir = (to - from).normalized_or_zero();
        let width = self.line_width();
        if dir == Vec2::zero() || width <= 0.0 {
            return Ok(());
        }
        let n = dir.perp() * (width * 0.5);
        let corners = [from + n, to + n, to - n, from - n];

        let mut mapped = self.renderer.reserve(4, 6, None)?;
        mapped.vertices.copy_from_slice(&solid_quad(corners, color));
        mapped.write_indices(&QUAD_INDICES);
        Ok(())
    }

    /// Consecutive segments through `points`.
    pub fn polyline(&mut self, points: &[Vec2], color: Color) -> BackendResult<()> {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color)?;
        }
        Ok(())
    }

    /// Filled convex polygon, triangulated as a fan around `points[0]`.
    ///
    /// Fewer than three points draw nothing.
    pub fn fan(&mut self, points: &[Vec2], color: Color) -> BackendResult<()> {
        if points.len() < 3 {
            return Ok(());
        }
        let n = points.len() as u32;
        let mut mapped = self.renderer.reserve(n, 3 * (n - 2), None)?;
        for (v, p) in mapped.vertices.iter_mut().zip(points) {
            *v = Vertex::new(p.to_array(), [0.0, 0.0], color.to_array(), NO_TEXTURE);
        }
        let local: Vec<u32> = (1..n - 1).flat_map(|k| [0, k, k + 1]).collect();
        mapped.write_indices(&local);
        Ok(())
    }
}

fn solid_quad(corners: [Vec2; 4], color: Color) -> [Vertex; 4] {
    corners.map(|c| Vertex::new(c.to_array(), [0.0, 0.0], color.to_array(), NO_TEXTURE))
}
