//! Strata batching core.
//!
//! This crate turns a stream of draw requests (quads, glyphs, UI geometry)
//! into a bounded number of backend submissions. It owns the staging arena,
//! the per-batch texture slot table and the renderer state machine, and
//! talks to the GPU only through the [`backend::BackendDriver`] contract.

pub mod backend;
pub mod batch;
pub mod coords;
pub mod dispose;
pub mod logging;
pub mod paint;
pub mod producers;
pub mod renderer;

pub use backend::{BackendDriver, BackendError, Capabilities, TextureId};
pub use batch::{BatchLimits, BatchStats, FlushReason, MappedData, QuadInstance};
pub use dispose::{DisposalQueue, GpuHandle};
pub use renderer::{create_renderer, Renderer, RendererConfig, RendererError, Strategy};
