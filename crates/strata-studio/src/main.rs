//! Strata studio: a windowed driver for the batching core.
//!
//! Usage: `strata-studio [instanced|uniform|immediate]`. Without an
//! argument the renderer picks the best strategy the device supports.

mod clock;
mod demo;
mod gpu;
mod runtime;

use anyhow::{Context, Result};

use strata_batch::logging::{init_logging, LoggingConfig};
use strata_batch::renderer::Strategy;

use crate::gpu::GpuInit;
use crate::runtime::{Runtime, RuntimeConfig};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let strategy = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<Strategy>())
        .transpose()
        .context("usage: strata-studio [instanced|uniform|immediate]")?;
    if let Some(strategy) = strategy {
        log::info!("requested strategy: {strategy}");
    }

    Runtime::run(
        RuntimeConfig {
            strategy,
            ..Default::default()
        },
        GpuInit::default(),
    )
}
