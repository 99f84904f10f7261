//! Deferred destruction of GPU-owned resources.
//!
//! GPU objects may only be destroyed on the thread that owns the graphics
//! context, but the values owning them are dropped wherever they happen to
//! die. Dropping a [`GpuHandle`] only enqueues its resource; the owning
//! thread destroys queued resources when it drains the [`DisposalQueue`]
//! (typically once per frame).
//!
//! Guarantees:
//! - a resource is enqueued at most once and destroyed at most once
//! - destruction happens in enqueue order, on the draining thread only

mod handle;
mod queue;

pub use handle::GpuHandle;
pub use queue::{DisposalQueue, GpuResource, Tracked};
