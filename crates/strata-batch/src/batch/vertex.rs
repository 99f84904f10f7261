//! GPU-visible record layouts shared by every strategy and driver.

use bytemuck::{Pod, Zeroable};

/// `texture_slot` value for untextured geometry; shaders substitute white.
pub const NO_TEXTURE: u32 = u32::MAX;

/// Instances per uniform-array batch. Matches the array length declared by
/// the uniform-array shader.
pub const UNIFORM_BATCH_INSTANCES: usize = 128;

// ── arena vertex ──────────────────────────────────────────────────────────

/// Full vertex written into the arena by producers (40 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// Linear premultiplied RGBA.
    pub color: [f32; 4],
    pub texture_slot: u32,
    pub _pad: u32,
}

impl Vertex {
    #[inline]
    pub const fn new(position: [f32; 2], uv: [f32; 2], color: [f32; 4], texture_slot: u32) -> Self {
        Self {
            position,
            uv,
            color,
            texture_slot,
            _pad: 0,
        }
    }
}

// ── instance record ───────────────────────────────────────────────────────

/// Per-quad attributes for the instanced and uniform-array strategies.
///
/// Layout (64 bytes, std140 compatible so the same bytes serve as a vertex
/// buffer and as a uniform array element):
///
///  offset  0  position      [f32; 2]
///  offset  8  size          [f32; 2]
///  offset 16  color         [f32; 4]
///  offset 32  uv_rect       [f32; 4]  (x, y, w, h in texture space)
///  offset 48  rotation      f32       (radians, around the quad center)
///  offset 52  texture_slot  u32
///  offset 56  _pad          [u32; 2]
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub position: [f32; 2],
    pub size: [f32; 2],
    pub color: [f32; 4],
    pub uv_rect: [f32; 4],
    pub rotation: f32,
    pub texture_slot: u32,
    pub _pad: [u32; 2],
}

// ── shared quad templates ─────────────────────────────────────────────────

/// Unit-quad corner used by the hardware-instanced template.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadCorner {
    pub corner: [f32; 2], // 0..1
}

/// Corner of the baked uniform-array template: the instance index is part
/// of the geometry, so one ordinary indexed draw addresses
/// `UNIFORM_BATCH_INSTANCES` different uniform records.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BakedCorner {
    pub corner: [f32; 2],
    pub instance: u32,
    pub _pad: u32,
}

pub const QUAD_CORNERS: [QuadCorner; 4] = [
    QuadCorner { corner: [0.0, 0.0] },
    QuadCorner { corner: [1.0, 0.0] },
    QuadCorner { corner: [1.0, 1.0] },
    QuadCorner { corner: [0.0, 1.0] },
];

/// Two triangles over `QUAD_CORNERS`, local indices.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Builds the uniform-array template: `count` quads, each corner tagged with
/// its quad's instance index, plus matching absolute indices.
pub(crate) fn baked_template(count: usize) -> (Vec<BakedCorner>, Vec<u32>) {
    let mut corners = Vec::with_capacity(count * 4);
    let mut indices = Vec::with_capacity(count * 6);
    for instance in 0..count as u32 {
        let base = instance * 4;
        corners.extend(QUAD_CORNERS.iter().map(|c| BakedCorner {
            corner: c.corner,
            instance,
            _pad: 0,
        }));
        indices.extend(QUAD_INDICES.iter().map(|&i| base + i));
    }
    (corners, indices)
}
