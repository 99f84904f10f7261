use super::{BufferHandle, TextureId};

pub type BackendResult<T> = Result<T, BackendError>;

/// Driver-reported failure.
///
/// The batching core never retries or masks these; they propagate to the
/// caller of the renderer operation that triggered the driver call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("write of {len} bytes at offset {offset} overflows buffer {buffer:?} ({capacity} bytes)")]
    BufferOverflow {
        buffer: BufferHandle,
        offset: u64,
        len: u64,
        capacity: u64,
    },

    #[error("texture slot {slot} out of range (backend exposes {max} units)")]
    SlotOutOfRange { slot: u32, max: u32 },

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("no render target bound for this frame")]
    NoTarget,

    #[error("device error: {0}")]
    Device(String),
}
