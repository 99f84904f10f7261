use bytemuck::{Pod, Zeroable};

use crate::coords::Viewport;

/// Per-frame uniforms bound at `begin` (column-major clip-space transform).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub transform: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub const IDENTITY: FrameUniforms = FrameUniforms {
        transform: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Maps logical pixels (top-left origin, +Y down) to clip space.
    pub fn orthographic(viewport: Viewport) -> Self {
        let w = viewport.width.max(1.0);
        let h = viewport.height.max(1.0);
        Self {
            transform: [
                [2.0 / w, 0.0, 0.0, 0.0],
                [0.0, -2.0 / h, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [-1.0, 1.0, 0.0, 1.0],
            ],
        }
    }

    /// Applies the transform to a 2D point (z = 0, w = 1).
    pub fn apply(&self, p: [f32; 2]) -> [f32; 2] {
        let m = &self.transform;
        [
            m[0][0] * p[0] + m[1][0] * p[1] + m[3][0],
            m[0][1] * p[0] + m[1][1] * p[1] + m[3][1],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthographic_maps_corners_to_clip_space() {
        let u = FrameUniforms::orthographic(Viewport::new(200.0, 100.0));
        assert_eq!(u.apply([0.0, 0.0]), [-1.0, 1.0]);
        assert_eq!(u.apply([200.0, 100.0]), [1.0, -1.0]);
        assert_eq!(u.apply([100.0, 50.0]), [0.0, 0.0]);
    }
}
