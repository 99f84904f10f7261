//! Renderer state machine.
//!
//! A renderer turns `begin` / `reserve` / `draw_quad` / `end` calls into a
//! bounded number of driver submissions. Three strategies share one contract:
//! - [`InstancedRenderer`]: hardware instancing over a shared quad template
//! - [`UniformArrayRenderer`]: baked template + per-draw uniform arrays
//! - [`ImmediateRenderer`]: full geometry through the vertex/index arenas
//!
//! Whatever the strategy, primitives reach the driver in call order, texture
//! identity is preserved across flushes, and overflow is absorbed by flushing
//! before the overflowing primitive is written.
//!
//! Phases: `Idle -> Begun -> (Flushing -> Begun)* -> Idle`. Calling an
//! operation in the wrong phase is a contract violation and panics.

mod immediate;
mod instanced;
mod session;
mod strategy;
mod uniform_array;

pub use immediate::ImmediateRenderer;
pub use instanced::InstancedRenderer;
pub use strategy::{BatchPhase, ParseStrategyError, PrimitiveState, StateChangePolicy, Strategy};
pub use uniform_array::UniformArrayRenderer;

use crate::backend::{BackendDriver, BackendError, BackendResult, FrameUniforms, TextureId};
use crate::batch::{BatchLimits, BatchStats, ConfigError, MappedData, QuadInstance};

/// Failure constructing a renderer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RendererError {
    #[error("invalid batch limits: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Renderer construction parameters.
#[derive(Debug, Clone, Default)]
pub struct RendererConfig {
    /// Requested limits; clamped to the driver's capabilities.
    pub limits: BatchLimits,

    /// Forces a strategy. Ignored (with a warning) if the driver can't run it.
    pub strategy: Option<Strategy>,

    /// Overrides the strategy's default state-change policy.
    pub state_change_policy: Option<StateChangePolicy>,
}

/// Begin/Reserve/Draw/Flush/End over one backend driver.
pub trait Renderer {
    fn strategy(&self) -> Strategy;

    /// Effective limits (requested limits clamped to the driver).
    fn limits(&self) -> &BatchLimits;

    fn phase(&self) -> BatchPhase;

    fn policy(&self) -> StateChangePolicy;

    /// Counters of the current (or last finished) session.
    fn stats(&self) -> &BatchStats;

    fn primitive_state(&self) -> PrimitiveState;

    /// Opens a session: resets the batch and bind state and forwards the
    /// per-frame uniforms to the driver.
    ///
    /// # Panics
    /// Panics if a session is already open.
    fn begin(&mut self, uniforms: &FrameUniforms) -> BackendResult<()>;

    /// Reserves room for one primitive of raw geometry, flushing first if
    /// the texture or the counts do not fit the open batch.
    ///
    /// # Panics
    /// Panics outside a session, or if the counts exceed a whole batch.
    fn reserve(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        texture: Option<TextureId>,
    ) -> BackendResult<MappedData<'_>>;

    /// Slot `texture` occupies in the open batch, flushing if every unit is taken.
    ///
    /// The slot is only valid until the next flush; producers writing
    /// geometry should pass the texture to `reserve` instead.
    fn texture_slot(&mut self, texture: TextureId) -> BackendResult<u32>;

    fn draw_quad(&mut self, quad: &QuadInstance) -> BackendResult<()>;

    /// Changes line width and clip. Flushes the open batch when the
    /// renderer's [`StateChangePolicy`] says the change cannot share it.
    fn set_primitive_state(&mut self, state: PrimitiveState) -> BackendResult<()>;

    /// Submits everything accumulated so far without closing the session.
    /// A no-op on an empty batch.
    fn flush(&mut self) -> BackendResult<()>;

    /// Final flush, then back to `Idle`. Returns the session's counters.
    fn end(&mut self) -> BackendResult<BatchStats>;

    fn driver(&self) -> &dyn BackendDriver;

    fn driver_mut(&mut self) -> &mut dyn BackendDriver;
}

/// Builds the renderer best suited to `driver`.
///
/// An explicit `config.strategy` is honored only if the driver supports it.
pub fn create_renderer<D: BackendDriver + 'static>(
    driver: D,
    config: &RendererConfig,
) -> Result<Box<dyn Renderer>, RendererError> {
    let caps = driver.capabilities();
    let strategy = match config.strategy {
        Some(requested) if requested.supported_by(&caps) => requested,
        Some(requested) => {
            let fallback = Strategy::select(&caps);
            log::warn!("{requested} is not supported by this backend, falling back to {fallback}");
            fallback
        }
        None => Strategy::select(&caps),
    };
    log::debug!("creating {strategy} renderer for {caps:?}");

    Ok(match strategy {
        Strategy::HardwareInstanced => Box::new(InstancedRenderer::new(driver, config)?),
        Strategy::UniformArray => Box::new(UniformArrayRenderer::new(driver, config)?),
        Strategy::Immediate => Box::new(ImmediateRenderer::new(driver, config)?),
    })
}

/// Requested limits validated, clamped to `driver`, and validated again.
fn effective_limits(driver: &dyn BackendDriver, config: &RendererConfig) -> Result<BatchLimits, ConfigError> {
    config.limits.validate()?;
    let limits = config.limits.clamp_to(&driver.capabilities());
    limits.validate()?;
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDriver;
    use crate::backend::Capabilities;

    #[test]
    fn create_picks_strategy_from_capabilities() {
        let config = RendererConfig::default();
        let cases = [
            (Capabilities::instanced(8), Strategy::HardwareInstanced),
            (Capabilities::legacy(8), Strategy::UniformArray),
            (Capabilities::software(8), Strategy::Immediate),
        ];
        for (caps, expected) in cases {
            let r = create_renderer(RecordingDriver::new(caps), &config).unwrap();
            assert_eq!(r.strategy(), expected);
        }
    }

    #[test]
    fn unsupported_override_falls_back() {
        let config = RendererConfig {
            strategy: Some(Strategy::HardwareInstanced),
            ..Default::default()
        };
        let r = create_renderer(RecordingDriver::new(Capabilities::software(4)), &config).unwrap();
        assert_eq!(r.strategy(), Strategy::Immediate);
    }

    #[test]
    fn supported_override_is_honored() {
        let config = RendererConfig {
            strategy: Some(Strategy::Immediate),
            ..Default::default()
        };
        let r = create_renderer(RecordingDriver::new(Capabilities::instanced(4)), &config).unwrap();
        assert_eq!(r.strategy(), Strategy::Immediate);
    }

    #[test]
    fn limits_are_clamped_to_driver_units() {
        let r = create_renderer(RecordingDriver::new(Capabilities::software(2)), &RendererConfig::default())
            .unwrap();
        assert_eq!(r.limits().max_texture_units, 2);
    }

    #[test]
    fn invalid_limits_are_rejected() {
        let config = RendererConfig {
            limits: BatchLimits::new(2, 16, 1),
            ..Default::default()
        };
        let err = create_renderer(RecordingDriver::new(Capabilities::software(2)), &config).err();
        assert_eq!(err, Some(RendererError::Config(ConfigError::TooFewVertices(2))));
    }
}
