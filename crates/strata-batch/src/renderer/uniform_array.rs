use crate::backend::{
    BackendDriver, BackendResult, BufferHandle, BufferRegion, BufferUsage, FrameUniforms,
    IndexedDraw, TextureId, VertexLayout,
};
use crate::batch::{
    baked_template, Arena, BatchLimits, BatchStats, FlushReason, GeometryBatch, InstanceRecord,
    MappedData, QuadInstance, UNIFORM_BATCH_INSTANCES,
};

use super::session::{upload_static, Session};
use super::strategy::{BatchPhase, PrimitiveState, StateChangePolicy, Strategy};
use super::{effective_limits, Renderer, RendererConfig, RendererError};

/// Renderer for backends that fake instancing with uniform arrays.
///
/// A template of `UNIFORM_BATCH_INSTANCES` quads, each vertex tagged with
/// its quad index, is uploaded once. A flush uploads the accumulated
/// records with `upload_instance_uniforms` and draws `6 * n` template
/// indices in one ordinary indexed submission.
///
/// The default policy flushes on any primitive-state change, for legacy
/// backends that bind line width as a per-submission uniform. Producers in
/// this crate bake line width into geometry, so the driver never sees it.
pub struct UniformArrayRenderer<D> {
    driver: D,
    limits: BatchLimits,
    session: Session,
    geometry: GeometryBatch,
    instances: Arena<InstanceRecord>,
    template_vertices: BufferRegion,
    template_indices: BufferHandle,
}

impl<D: BackendDriver> UniformArrayRenderer<D> {
    pub fn new(mut driver: D, config: &RendererConfig) -> Result<Self, RendererError> {
        let limits = effective_limits(&driver, config)?;
        let policy = config
            .state_change_policy
            .unwrap_or(Strategy::UniformArray.default_policy());
        let capacity = (limits.max_quads() as usize).min(UNIFORM_BATCH_INSTANCES);

        let (corners, indices) = baked_template(UNIFORM_BATCH_INSTANCES);
        let corner_bytes: &[u8] = bytemuck::cast_slice(&corners);
        let vertex_buffer = upload_static(&mut driver, BufferUsage::Vertex, corner_bytes)?;
        let template_indices =
            match upload_static(&mut driver, BufferUsage::Index, bytemuck::cast_slice(&indices)) {
                Ok(buffer) => buffer,
                Err(err) => {
                    driver.destroy_buffer(vertex_buffer);
                    return Err(err.into());
                }
            };

        Ok(Self {
            session: Session::new(&limits, policy),
            geometry: GeometryBatch::new(&limits),
            instances: Arena::with_capacity(capacity),
            template_vertices: BufferRegion::new(vertex_buffer, 0, corner_bytes.len() as u64),
            template_indices,
            limits,
            driver,
        })
    }

    /// Destroys the renderer's buffers and hands the driver back.
    pub fn into_driver(mut self) -> D {
        self.geometry.destroy(&mut self.driver);
        self.driver.destroy_buffer(self.template_vertices.buffer);
        self.driver.destroy_buffer(self.template_indices);
        self.driver
    }

    /// Quads one submission can carry (at most `UNIFORM_BATCH_INSTANCES`).
    pub fn instance_capacity(&self) -> usize {
        self.instances.capacity()
    }

    fn is_batch_empty(&self) -> bool {
        self.instances.is_empty() && self.geometry.is_empty()
    }

    fn flush_with(&mut self, reason: FlushReason) -> BackendResult<()> {
        if self.is_batch_empty() {
            // Slots claimed through `texture_slot` alone are released too.
            self.session.slots.reset();
            return Ok(());
        }
        self.session.phase = BatchPhase::Flushing;

        let result = self.submit_pending();
        self.instances.reset();
        self.geometry.reset();
        self.session.finish_flush(reason, result.is_ok());
        result
    }

    fn submit_pending(&mut self) -> BackendResult<()> {
        self.session.apply_bindings(&mut self.driver)?;

        if self.instances.is_empty() {
            if let Some(submit) = self.geometry.submit(&mut self.driver)? {
                self.session.stats.vertices += submit.vertices as u64;
                self.session.stats.indices += submit.indices as u64;
            }
            return Ok(());
        }

        let count = self.instances.len() as u32;
        let index_count = count * 6;
        self.driver.upload_instance_uniforms(self.instances.unmap())?;
        self.driver.submit_indexed(&IndexedDraw {
            vertices: self.template_vertices,
            indices: BufferRegion::new(self.template_indices, 0, index_count as u64 * 4),
            index_count,
            layout: VertexLayout::UniformTemplate,
        })?;
        self.session.stats.instances += count as u64;
        Ok(())
    }
}

impl<D: BackendDriver> Renderer for UniformArrayRenderer<D> {
    fn strategy(&self) -> Strategy {
        Strategy::UniformArray
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
        self.instances.reset();
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

        if !self.instances.is_empty() {
            self.flush_with(FlushReason::ModeSwitch)?;
        }
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
        self.session.require_begun("draw_quad");

        if !self.geometry.is_empty() {
            self.flush_with(FlushReason::ModeSwitch)?;
        }
        if self.session.needs_slot_flush(quad.texture) {
            self.flush_with(FlushReason::TextureSlots)?;
        }
        if self.instances.remaining() == 0 {
            self.flush_with(FlushReason::Capacity)?;
        }

        let slot = self.session.assign_slot(quad.texture);
        let Some(range) = self.instances.reserve(1) else {
            panic!("uniform array of {} full right after a flush", self.instances.capacity());
        };
        self.instances.slice_mut(range)[0] = quad.to_record(slot);
        self.session.stats.primitives += 1;
        Ok(())
    }

    fn set_primitive_state(&mut self, state: PrimitiveState) -> BackendResult<()> {
        self.session.require_begun("set_primitive_state");
        if !self.is_batch_empty() && self.session.state_change_flushes(&state) {
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
    use crate::backend::recording::{DriverCall, RecordingDriver, SubmissionKind};
    use crate::backend::Capabilities;
    use crate::coords::Rect;
    use crate::paint::Color;

    fn renderer(limits: BatchLimits) -> UniformArrayRenderer<RecordingDriver> {
        let config = RendererConfig {
            limits,
            ..Default::default()
        };
        UniformArrayRenderer::new(RecordingDriver::new(Capabilities::legacy(4)), &config).unwrap()
    }

    fn quad(x: f32) -> QuadInstance {
        QuadInstance::solid(Rect::new(x, 0.0, 1.0, 1.0), Color::WHITE)
    }

    #[test]
    fn flush_uploads_uniforms_then_draws_template_prefix() {
        let mut r = renderer(BatchLimits::default());
        let journal = r.driver.journal();
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.draw_quad(&quad(5.0)).unwrap();
        r.end().unwrap();

        let uploads = journal.count(|c| matches!(c, DriverCall::UploadInstanceUniforms { count: 2 }));
        assert_eq!(uploads, 1);
        let subs = journal.submissions();
        assert_eq!(subs.len(), 1);
        match &subs[0].kind {
            SubmissionKind::UniformArray { instances, index_count } => {
                assert_eq!(*index_count, 12);
                assert_eq!(instances[1].position, [5.0, 0.0]);
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn capacity_is_capped_by_the_uniform_array() {
        assert_eq!(renderer(BatchLimits::default()).instance_capacity(), UNIFORM_BATCH_INSTANCES);
        assert_eq!(renderer(BatchLimits::new(8, 16, 1)).instance_capacity(), 2);
    }

    #[test]
    fn line_width_change_flushes_by_default() {
        let mut r = renderer(BatchLimits::default());
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        let state = r.primitive_state().with_line_width(4.0);
        r.set_primitive_state(state).unwrap();
        r.draw_quad(&quad(1.0)).unwrap();
        let stats = r.end().unwrap();
        assert_eq!(stats.flushes_for(FlushReason::StateChange), 1);
        assert_eq!(stats.flushes, 2);
    }

    #[test]
    fn pipeline_policy_override_keeps_batch_across_line_width() {
        let config = RendererConfig {
            state_change_policy: Some(StateChangePolicy::FlushOnPipelineChange),
            ..Default::default()
        };
        let mut r = UniformArrayRenderer::new(RecordingDriver::new(Capabilities::legacy(4)), &config).unwrap();
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.set_primitive_state(PrimitiveState::default().with_line_width(4.0)).unwrap();
        r.draw_quad(&quad(1.0)).unwrap();
        assert_eq!(r.end().unwrap().flushes, 1);
    }

    #[test]
    fn overflow_past_128_quads_flushes() {
        let mut r = renderer(BatchLimits::default());
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        for i in 0..(UNIFORM_BATCH_INSTANCES + 1) {
            r.draw_quad(&quad(i as f32)).unwrap();
        }
        let stats = r.end().unwrap();
        assert_eq!(stats.flushes_for(FlushReason::Capacity), 1);
        assert_eq!(stats.instances, UNIFORM_BATCH_INSTANCES as u64 + 1);
    }
}
