//! Backend driver contract.
//!
//! The batching core never talks to a graphics API directly. Everything it
//! needs from a device goes through [`BackendDriver`]: buffer allocation and
//! upload, texture-unit binding, per-frame uniforms and the submissions
//! themselves. All calls are synchronous from the core's point of view.
//!
//! Two drivers ship with the crate:
//! - [`recording::RecordingDriver`]: headless, keeps buffer contents in memory
//!   and journals every call (software/capture backends, tests)
//! - [`gpu::WgpuDriver`]: submits through wgpu

mod error;
mod frame;
pub mod gpu;
pub mod recording;

pub use error::{BackendError, BackendResult};
pub use frame::FrameUniforms;

use crate::batch::InstanceRecord;
use crate::coords::Rect;

/// Opaque texture identity. Equality is handle equality.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Driver-issued buffer handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// What a buffer is bound as when submitted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Instance,
}

/// Device/backend-reported batching capabilities.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Capabilities {
    /// Vertex-rate instancing (`submit_instanced`).
    pub instancing: bool,
    /// Per-draw uniform arrays (`upload_instance_uniforms`).
    pub uniform_arrays: bool,
    pub max_texture_units: u32,
    /// Largest vertex count one submission may reference.
    pub max_vertices: u32,
    /// Largest index count one submission may reference.
    pub max_indices: u32,
}

impl Capabilities {
    /// A backend with hardware instancing.
    pub const fn instanced(max_texture_units: u32) -> Self {
        Self {
            instancing: true,
            uniform_arrays: true,
            max_texture_units,
            max_vertices: u32::MAX,
            max_indices: u32::MAX,
        }
    }

    /// A legacy backend: uniform arrays, no vertex-rate instancing.
    pub const fn legacy(max_texture_units: u32) -> Self {
        Self {
            instancing: false,
            ..Self::instanced(max_texture_units)
        }
    }

    /// No batching hardware at all (software rasterizer, capture).
    pub const fn software(max_texture_units: u32) -> Self {
        Self {
            instancing: false,
            uniform_arrays: false,
            ..Self::instanced(max_texture_units)
        }
    }
}

/// A byte range of a driver buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferRegion {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub len: u64,
}

impl BufferRegion {
    #[inline]
    pub const fn new(buffer: BufferHandle, offset: u64, len: u64) -> Self {
        Self { buffer, offset, len }
    }
}

/// Vertex layout an indexed draw reads.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VertexLayout {
    /// Arena geometry: [`crate::batch::Vertex`].
    Geometry,
    /// Baked uniform-array template: [`crate::batch::BakedCorner`], attributes
    /// come from the last `upload_instance_uniforms`.
    UniformTemplate,
}

/// An ordinary indexed submission.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IndexedDraw {
    pub vertices: BufferRegion,
    pub indices: BufferRegion,
    /// u32 indices to draw, starting at the index region's offset.
    pub index_count: u32,
    pub layout: VertexLayout,
}

/// One instanced submission over the shared quad template.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct InstancedDraw {
    pub template_vertices: BufferRegion,
    pub template_indices: BufferRegion,
    pub instances: BufferRegion,
    pub instance_count: u32,
}

/// Operations the batching core consumes from a backend.
pub trait BackendDriver {
    fn capabilities(&self) -> Capabilities;

    /// Binds the per-frame transform for subsequent submissions.
    fn set_per_frame_uniforms(&mut self, uniforms: &FrameUniforms) -> BackendResult<()>;

    /// Binds `texture` to texture unit `slot` for subsequent submissions.
    fn bind_texture(&mut self, texture: TextureId, slot: u32) -> BackendResult<()>;

    /// Logical-pixel clip for subsequent submissions; `None` disables clipping.
    fn set_scissor(&mut self, clip: Option<Rect>) -> BackendResult<()>;

    fn allocate_buffer(&mut self, usage: BufferUsage, capacity_bytes: u64) -> BackendResult<BufferHandle>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroys a texture previously handed out by the driver.
    fn release_texture(&mut self, texture: TextureId);

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> BackendResult<()>;

    /// True once the device has finished consuming every submission that
    /// read `buffer`. Buffers never submitted are retired.
    fn buffer_retired(&self, buffer: BufferHandle) -> bool;

    /// Replaces the uniform instance array read by `VertexLayout::UniformTemplate` draws.
    fn upload_instance_uniforms(&mut self, instances: &[InstanceRecord]) -> BackendResult<()>;

    fn submit_indexed(&mut self, draw: &IndexedDraw) -> BackendResult<()>;

    fn submit_instanced(&mut self, draw: &InstancedDraw) -> BackendResult<()>;
}

impl<D: BackendDriver + ?Sized> BackendDriver for Box<D> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn set_per_frame_uniforms(&mut self, uniforms: &FrameUniforms) -> BackendResult<()> {
        (**self).set_per_frame_uniforms(uniforms)
    }

    fn bind_texture(&mut self, texture: TextureId, slot: u32) -> BackendResult<()> {
        (**self).bind_texture(texture, slot)
    }

    fn set_scissor(&mut self, clip: Option<Rect>) -> BackendResult<()> {
        (**self).set_scissor(clip)
    }

    fn allocate_buffer(&mut self, usage: BufferUsage, capacity_bytes: u64) -> BackendResult<BufferHandle> {
        (**self).allocate_buffer(usage, capacity_bytes)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        (**self).destroy_buffer(buffer)
    }

    fn release_texture(&mut self, texture: TextureId) {
        (**self).release_texture(texture)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> BackendResult<()> {
        (**self).write_buffer(buffer, offset, bytes)
    }

    fn buffer_retired(&self, buffer: BufferHandle) -> bool {
        (**self).buffer_retired(buffer)
    }

    fn upload_instance_uniforms(&mut self, instances: &[InstanceRecord]) -> BackendResult<()> {
        (**self).upload_instance_uniforms(instances)
    }

    fn submit_indexed(&mut self, draw: &IndexedDraw) -> BackendResult<()> {
        (**self).submit_indexed(draw)
    }

    fn submit_instanced(&mut self, draw: &InstancedDraw) -> BackendResult<()> {
        (**self).submit_instanced(draw)
    }
}
