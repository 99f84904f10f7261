//! Batch bookkeeping: everything a renderer accumulates between two flushes.
//!
//! Nothing in here submits work on its own. Renderers compose these pieces
//! and decide when to flush.

mod arena;
mod bind;
mod geometry;
mod limits;
mod mapped;
mod owner;
mod quad;
mod ring;
mod slots;
mod stats;
mod vertex;

pub use arena::Arena;
pub use bind::BindLock;
pub use geometry::{GeometryBatch, GeometrySubmit};
pub use limits::{BatchLimits, ConfigError};
pub use mapped::MappedData;
pub use owner::OwnerThread;
pub use quad::QuadInstance;
pub use ring::{BufferRing, BufferSet};
pub use slots::{TextureSlotCache, MAX_TEXTURE_UNITS};
pub use stats::{BatchStats, FlushReason};
pub use vertex::{
    BakedCorner, InstanceRecord, QuadCorner, Vertex, NO_TEXTURE, QUAD_CORNERS, QUAD_INDICES,
    UNIFORM_BATCH_INSTANCES,
};
pub(crate) use vertex::baked_template;
