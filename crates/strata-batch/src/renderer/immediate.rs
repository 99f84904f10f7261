use crate::backend::{BackendDriver, BackendResult, FrameUniforms, TextureId};
use crate::batch::{BatchLimits, BatchStats, FlushReason, GeometryBatch, MappedData, QuadInstance};

use super::session::Session;
use super::strategy::{BatchPhase, PrimitiveState, StateChangePolicy, Strategy};
use super::{effective_limits, Renderer, RendererConfig, RendererError};

/// Renderer for backends without batching hardware.
///
/// Every primitive is written as full geometry into the vertex/index arenas.
/// A flush uploads exactly the written prefix into a buffer pair from the
/// ring and issues one indexed submission.
pub struct ImmediateRenderer<D> {
    driver: D,
    limits: BatchLimits,
    session: Session,
    geometry: GeometryBatch,
}

impl<D: BackendDriver> ImmediateRenderer<D> {
    pub fn new(driver: D, config: &RendererConfig) -> Result<Self, RendererError> {
        let limits = effective_limits(&driver, config)?;
        let policy = config
            .state_change_policy
            .unwrap_or(Strategy::Immediate.default_policy());
        Ok(Self {
            session: Session::new(&limits, policy),
            geometry: GeometryBatch::new(&limits),
            limits,
            driver,
        })
    }

    /// Destroys the renderer's buffers and hands the driver back.
    pub fn into_driver(mut self) -> D {
        self.geometry.destroy(&mut self.driver);
        self.driver
    }

    /// Buffer pairs the ring has allocated so far.
    pub fn buffer_sets(&self) -> usize {
        self.geometry.ring().allocated()
    }

    fn flush_with(&mut self, reason: FlushReason) -> BackendResult<()> {
        if self.geometry.is_empty() {
            // Slots claimed through `texture_slot` alone are released too.
            self.session.slots.reset();
            return Ok(());
        }
        self.session.phase = BatchPhase::Flushing;

        let result = match self.session.apply_bindings(&mut self.driver) {
            Ok(()) => self.geometry.submit(&mut self.driver),
            Err(err) => {
                self.geometry.reset();
                Err(err)
            }
        };
        if let Ok(Some(submit)) = &result {
            self.session.stats.vertices += submit.vertices as u64;
            self.session.stats.indices += submit.indices as u64;
        }
        self.session.finish_flush(reason, result.is_ok());
        result.map(|_| ())
    }
}

impl<D: BackendDriver> Renderer for ImmediateRenderer<D> {
    fn strategy(&self) -> Strategy {
        Strategy::Immediate
    }

    fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    fn phase(&self) -> BatchPhase {
        self.session.phase
    }

    fn policy(&self) -> StateChangePolicy {
        self.session.policy
    }

    fn stats(&self) -> &BatchStats {
        &self.session.stats
    }

    fn primitive_state(&self) -> PrimitiveState {
        self.session.state
    }

    fn begin(&mut self, uniforms: &FrameUniforms) -> BackendResult<()> {
        self.session.begin(&mut self.driver, uniforms)?;
        self.geometry.begin(&self.driver);
        Ok(())
    }

    fn reserve(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        texture: Option<TextureId>,
    ) -> BackendResult<MappedData<'_>> {
        self.session.require_begun("reserve");
        Session::check_reservation(&self.limits, vertex_count, index_count);

        if self.session.needs_slot_flush(texture) {
            self.flush_with(FlushReason::TextureSlots)?;
        }
        if !self.geometry.fits(vertex_count, index_count) {
            self.flush_with(FlushReason::Capacity)?;
            assert!(
                self.geometry.fits(vertex_count, index_count),
                "reservation of {vertex_count}/{index_count} failed on an empty batch"
            );
        }

        let slot = self.session.assign_slot(texture);
        self.session.stats.primitives += 1;
        match self.geometry.reserve(vertex_count, index_count, slot) {
            Some(mapped) => Ok(mapped),
            None => panic!("reservation of {vertex_count}/{index_count} failed after a capacity check"),
        }
    }

    fn texture_slot(&mut self, texture: TextureId) -> BackendResult<u32> {
        self.session.require_begun("texture_slot");
        if self.session.needs_slot_flush(Some(texture)) {
            self.flush_with(FlushReason::TextureSlots)?;
        }
        Ok(self.session.assign_slot(Some(texture)).unwrap_or_default())
    }

    fn draw_quad(&mut self, quad: &QuadInstance) -> BackendResult<()> {
        let mut mapped = self.reserve(4, 6, quad.texture)?;
        mapped.write_quad(quad);
        Ok(())
    }

    fn set_primitive_state(&mut self, state: PrimitiveState) -> BackendResult<()> {
        self.session.require_begun("set_primitive_state");
        if !self.geometry.is_empty() && self.session.state_change_flushes(&state) {
            self.flush_with(FlushReason::StateChange)?;
        }
        self.session.state = state;
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.session.require_begun("flush");
        self.flush_with(FlushReason::Explicit)
    }

    fn end(&mut self) -> BackendResult<BatchStats> {
        self.session.require_begun("end");
        let result = self.flush_with(FlushReason::End);
        let stats = self.session.end();
        result.map(|()| stats)
    }

    fn driver(&self) -> &dyn BackendDriver {
        &self.driver
    }

    fn driver_mut(&mut self) -> &mut dyn BackendDriver {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDriver;
    use crate::backend::{BackendError, Capabilities};
    use crate::coords::Rect;
    use crate::paint::Color;

    fn renderer(limits: BatchLimits) -> ImmediateRenderer<RecordingDriver> {
        let config = RendererConfig {
            limits,
            ..Default::default()
        };
        ImmediateRenderer::new(RecordingDriver::new(Capabilities::software(4)), &config).unwrap()
    }

    fn quad(x: f32) -> QuadInstance {
        QuadInstance::solid(Rect::new(x, 0.0, 1.0, 1.0), Color::WHITE)
    }

    #[test]
    fn second_reservation_is_offset_by_first() {
        let mut r = renderer(BatchLimits::default());
        let journal = r.driver.journal();
        r.begin(&FrameUniforms::IDENTITY).unwrap();

        let first = r.reserve(4, 6, None).unwrap();
        assert_eq!(first.index_offset, 0);
        let mut second = r.reserve(4, 6, None).unwrap();
        assert_eq!(second.index_offset, 4);
        second.write_indices(&[0, 1, 2, 0, 2, 3]);
        r.end().unwrap();

        let subs = journal.submissions();
        assert_eq!(subs.len(), 1);
        assert_eq!(&subs[0].indices()[6..], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn failed_submit_drops_batch_and_reports_error() {
        let mut r = renderer(BatchLimits::default());
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.driver.fail_next_submit(BackendError::Device("lost".into()));

        assert_eq!(r.flush(), Err(BackendError::Device("lost".into())));
        assert_eq!(r.phase(), BatchPhase::Begun);
        assert_eq!(r.stats().flushes, 0);

        // The failed batch is gone; `end` has nothing left to submit.
        let stats = r.end().unwrap();
        assert_eq!(stats.flushes, 0);
    }

    #[test]
    fn empty_flush_is_a_noop() {
        let mut r = renderer(BatchLimits::default());
        let journal = r.driver.journal();
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.flush().unwrap();
        assert_eq!(r.end().unwrap().flushes, 0);
        assert!(journal.submissions().is_empty());
    }

    #[test]
    fn into_driver_destroys_ring_buffers() {
        let mut r = renderer(BatchLimits::default());
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.end().unwrap();
        assert_eq!(r.buffer_sets(), 1);

        let driver = r.into_driver();
        assert_eq!(driver.live_buffers(), 0);
    }

    #[test]
    #[should_panic(expected = "outside begin/end")]
    fn draw_before_begin_panics() {
        let mut r = renderer(BatchLimits::default());
        let _ = r.draw_quad(&quad(0.0));
    }
}
