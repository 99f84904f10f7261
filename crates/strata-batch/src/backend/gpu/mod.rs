//! wgpu implementation of [`BackendDriver`](super::BackendDriver).
//!
//! Convention:
//! - one bind group: frame transform, uniform instance array, sampler and
//!   `TEXTURE_BINDINGS` texture units (unused units see a 1x1 white texture)
//! - every submission is its own command buffer, so `write_buffer` and
//!   `upload_instance_uniforms` calls between submissions are ordered
//!   correctly by the queue
//! - retirement is tracked per buffer through `on_submitted_work_done`

mod driver;
mod pipelines;
mod scissor;

pub use driver::{RenderTarget, WgpuDriver, WgpuDriverConfig};
pub use scissor::logical_clip_to_scissor;

/// Texture units declared by the shader.
pub const TEXTURE_BINDINGS: u32 = 8;
