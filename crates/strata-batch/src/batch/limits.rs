use crate::backend::Capabilities;

use super::slots::MAX_TEXTURE_UNITS;
use super::vertex::{InstanceRecord, Vertex};

/// Invalid batch configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_vertices must hold at least one quad (4), got {0}")]
    TooFewVertices(u32),

    #[error("max_primitives must hold at least one quad (2 triangles), got {0}")]
    TooFewPrimitives(u32),

    #[error("max_texture_units must be within 1..={max}, got {got}")]
    TextureUnits { got: u32, max: u32 },
}

/// Per-batch capacity. Crossing any of these flushes the batch first.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BatchLimits {
    /// Vertices per submission.
    pub max_vertices: u32,
    /// Triangles per submission; indices are `3 * max_primitives`.
    pub max_primitives: u32,
    /// Distinct textures per submission.
    pub max_texture_units: u32,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_vertices: 16_384,
            max_primitives: 16_384,
            max_texture_units: 8,
        }
    }
}

impl BatchLimits {
    pub const fn new(max_vertices: u32, max_primitives: u32, max_texture_units: u32) -> Self {
        Self {
            max_vertices,
            max_primitives,
            max_texture_units,
        }
    }

    /// Limits sized for a wgpu device: texture units from the sampled-texture
    /// limit, vertex count from the largest vertex buffer the device accepts.
    pub fn from_device(limits: &wgpu::Limits) -> Self {
        let defaults = Self::default();
        let by_buffer = limits.max_buffer_size / std::mem::size_of::<Vertex>() as u64;
        Self {
            max_vertices: defaults.max_vertices.min(by_buffer.min(u32::MAX as u64) as u32),
            max_primitives: defaults.max_primitives,
            max_texture_units: limits
                .max_sampled_textures_per_shader_stage
                .min(MAX_TEXTURE_UNITS as u32),
        }
    }

    #[inline]
    pub const fn max_indices(&self) -> u32 {
        self.max_primitives.saturating_mul(3)
    }

    /// Quads one batch can hold, whichever of vertices or triangles runs out first.
    #[inline]
    pub fn max_quads(&self) -> u32 {
        (self.max_vertices / 4).min(self.max_primitives / 2)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_vertices < 4 {
            return Err(ConfigError::TooFewVertices(self.max_vertices));
        }
        if self.max_primitives < 2 {
            return Err(ConfigError::TooFewPrimitives(self.max_primitives));
        }
        if self.max_texture_units == 0 || self.max_texture_units as usize > MAX_TEXTURE_UNITS {
            return Err(ConfigError::TextureUnits {
                got: self.max_texture_units,
                max: MAX_TEXTURE_UNITS as u32,
            });
        }
        Ok(())
    }

    /// Narrows these limits to what `caps` can actually submit.
    pub fn clamp_to(&self, caps: &Capabilities) -> Self {
        let clamped = Self {
            max_vertices: self.max_vertices.min(caps.max_vertices),
            max_primitives: self.max_primitives.min(caps.max_indices / 3),
            max_texture_units: self.max_texture_units.min(caps.max_texture_units),
        };
        if clamped != *self {
            log::warn!("batch limits {self:?} clamped to backend capabilities: {clamped:?}");
        }
        clamped
    }

    /// Staging bytes the arenas of one geometry batch need.
    pub fn arena_bytes(&self) -> (u64, u64) {
        (
            self.max_vertices as u64 * std::mem::size_of::<Vertex>() as u64,
            self.max_indices() as u64 * 4,
        )
    }

    /// Bytes of one instance buffer holding `count` records.
    #[inline]
    pub fn instance_bytes(count: u32) -> u64 {
        count as u64 * std::mem::size_of::<InstanceRecord>() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(BatchLimits::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_less_than_one_quad() {
        assert_eq!(
            BatchLimits::new(3, 10, 1).validate(),
            Err(ConfigError::TooFewVertices(3))
        );
        assert_eq!(
            BatchLimits::new(8, 1, 1).validate(),
            Err(ConfigError::TooFewPrimitives(1))
        );
    }

    #[test]
    fn rejects_texture_units_out_of_range() {
        assert!(BatchLimits::new(8, 4, 0).validate().is_err());
        assert!(BatchLimits::new(8, 4, 33).validate().is_err());
    }

    #[test]
    fn max_quads_takes_tighter_bound() {
        assert_eq!(BatchLimits::new(8, 100, 1).max_quads(), 2);
        assert_eq!(BatchLimits::new(100, 6, 1).max_quads(), 3);
    }

    #[test]
    fn clamp_respects_capabilities() {
        let caps = Capabilities {
            max_vertices: 1024,
            max_indices: 300,
            ..Capabilities::software(4)
        };
        let l = BatchLimits::default().clamp_to(&caps);
        assert_eq!(l, BatchLimits::new(1024, 100, 4));
    }

    #[test]
    fn device_limits_cap_texture_units() {
        let l = BatchLimits::from_device(&wgpu::Limits::downlevel_webgl2_defaults());
        assert!(l.max_texture_units <= MAX_TEXTURE_UNITS as u32);
        assert!(l.validate().is_ok());
    }
}
