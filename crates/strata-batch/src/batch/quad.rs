use crate::backend::TextureId;
use crate::coords::Rect;
use crate::paint::Color;

use super::vertex::{InstanceRecord, Vertex, NO_TEXTURE, QUAD_INDICES};

/// One quad as a producer describes it.
///
/// Renderers turn this into an [`InstanceRecord`] (instanced strategies) or
/// into four vertices and six indices (immediate strategy). Either way the
/// visible result is the same.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QuadInstance {
    pub rect: Rect,
    /// Radians, around the rect center.
    pub rotation: f32,
    pub color: Color,
    pub texture: Option<TextureId>,
    /// Texture-space source rect. Ignored when `texture` is `None`.
    pub uv: Rect,
}

impl QuadInstance {
    /// Untextured, unrotated quad.
    pub fn solid(rect: Rect, color: Color) -> Self {
        Self {
            rect,
            rotation: 0.0,
            color,
            texture: None,
            uv: Rect::unit(),
        }
    }

    /// Quad sampling the whole of `texture`, tinted white.
    pub fn textured(rect: Rect, texture: TextureId) -> Self {
        Self {
            texture: Some(texture),
            ..Self::solid(rect, Color::WHITE)
        }
    }

    #[must_use]
    pub fn with_uv(mut self, uv: Rect) -> Self {
        self.uv = uv;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, radians: f32) -> Self {
        self.rotation = radians;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Instance record for a resolved slot (`None` = untextured).
    pub fn to_record(&self, slot: Option<u32>) -> InstanceRecord {
        let r = self.rect.normalized();
        InstanceRecord {
            position: r.origin.to_array(),
            size: r.size.to_array(),
            color: self.color.to_array(),
            uv_rect: [self.uv.origin.x, self.uv.origin.y, self.uv.size.x, self.uv.size.y],
            rotation: self.rotation,
            texture_slot: slot.unwrap_or(NO_TEXTURE),
            _pad: [0; 2],
        }
    }

    /// Expands to four vertices in `QUAD_INDICES` winding.
    pub fn to_vertices(&self, slot: Option<u32>) -> [Vertex; 4] {
        let corners = self.rect.corners(self.rotation);
        let uv = self.uv.corners(0.0);
        let color = self.color.to_array();
        let slot = slot.unwrap_or(NO_TEXTURE);
        std::array::from_fn(|i| Vertex::new(corners[i].to_array(), uv[i].to_array(), color, slot))
    }

    /// Local indices matching [`to_vertices`](Self::to_vertices).
    #[inline]
    pub const fn local_indices() -> [u32; 6] {
        QUAD_INDICES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_slot_and_uv() {
        let q = QuadInstance::textured(Rect::new(1.0, 2.0, 3.0, 4.0), TextureId(9))
            .with_uv(Rect::new(0.5, 0.0, 0.5, 1.0));
        let rec = q.to_record(Some(2));
        assert_eq!(rec.position, [1.0, 2.0]);
        assert_eq!(rec.size, [3.0, 4.0]);
        assert_eq!(rec.uv_rect, [0.5, 0.0, 0.5, 1.0]);
        assert_eq!(rec.texture_slot, 2);
    }

    #[test]
    fn untextured_vertices_use_sentinel_slot() {
        let v = QuadInstance::solid(Rect::new(0.0, 0.0, 2.0, 2.0), Color::BLACK).to_vertices(None);
        assert!(v.iter().all(|v| v.texture_slot == NO_TEXTURE));
        assert_eq!(v[2].position, [2.0, 2.0]);
        assert_eq!(v[2].uv, [1.0, 1.0]);
    }
}
