use crate::backend::{
    BackendDriver, BackendResult, BufferHandle, BufferRegion, BufferUsage, FrameUniforms,
    InstancedDraw, TextureId,
};
use crate::batch::{
    Arena, BatchLimits, BatchStats, BufferRing, FlushReason, GeometryBatch, InstanceRecord,
    MappedData, QuadInstance, QUAD_CORNERS, QUAD_INDICES,
};

use super::session::{upload_static, Session};
use super::strategy::{BatchPhase, PrimitiveState, StateChangePolicy, Strategy};
use super::{effective_limits, Renderer, RendererConfig, RendererError};

/// Renderer for backends with vertex-rate instancing.
///
/// The unit quad template is uploaded once at construction. `draw_quad`
/// appends one [`InstanceRecord`]; a flush writes the records into an
/// instance buffer from the ring and issues a single `submit_instanced`.
///
/// Raw geometry from `reserve` is batched separately. Switching between
/// quads and raw geometry flushes the pending side first
/// ([`FlushReason::ModeSwitch`]), so submissions stay in call order.
pub struct InstancedRenderer<D> {
    driver: D,
    limits: BatchLimits,
    session: Session,
    geometry: GeometryBatch,
    instances: Arena<InstanceRecord>,
    instance_ring: BufferRing,
    template_vertices: BufferHandle,
    template_indices: BufferHandle,
}

impl<D: BackendDriver> InstancedRenderer<D> {
    pub fn new(mut driver: D, config: &RendererConfig) -> Result<Self, RendererError> {
        let limits = effective_limits(&driver, config)?;
        let policy = config
            .state_change_policy
            .unwrap_or(Strategy::HardwareInstanced.default_policy());
        let capacity = limits.max_quads();

        let template_vertices =
            upload_static(&mut driver, BufferUsage::Vertex, bytemuck::cast_slice(&QUAD_CORNERS))?;
        let template_indices =
            match upload_static(&mut driver, BufferUsage::Index, bytemuck::cast_slice(&QUAD_INDICES)) {
                Ok(buffer) => buffer,
                Err(err) => {
                    driver.destroy_buffer(template_vertices);
                    return Err(err.into());
                }
            };

        Ok(Self {
            session: Session::new(&limits, policy),
            geometry: GeometryBatch::new(&limits),
            instances: Arena::with_capacity(capacity as usize),
            instance_ring: BufferRing::new(&[(
                BufferUsage::Instance,
                BatchLimits::instance_bytes(capacity),
            )]),
            template_vertices,
            template_indices,
            limits,
            driver,
        })
    }

    /// Destroys the renderer's buffers and hands the driver back.
    pub fn into_driver(mut self) -> D {
        self.geometry.destroy(&mut self.driver);
        self.instance_ring.destroy_all(&mut self.driver);
        self.driver.destroy_buffer(self.template_vertices);
        self.driver.destroy_buffer(self.template_indices);
        self.driver
    }

    /// Quads one instanced submission can carry.
    pub fn instance_capacity(&self) -> usize {
        self.instances.capacity()
    }

    /// Instance buffers the ring has allocated so far.
    pub fn instance_buffers(&self) -> usize {
        self.instance_ring.allocated()
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

        let set = self.instance_ring.acquire(&mut self.driver)?;
        let records = self.instances.as_bytes();
        let count = self.instances.len() as u32;
        let draw = InstancedDraw {
            template_vertices: BufferRegion::new(
                self.template_vertices,
                0,
                std::mem::size_of_val(&QUAD_CORNERS) as u64,
            ),
            template_indices: BufferRegion::new(
                self.template_indices,
                0,
                std::mem::size_of_val(&QUAD_INDICES) as u64,
            ),
            instances: BufferRegion::new(set[0], 0, records.len() as u64),
            instance_count: count,
        };

        let result = self
            .driver
            .write_buffer(set[0], 0, records)
            .and_then(|()| self.driver.submit_instanced(&draw));
        self.instance_ring.submitted(set);
        if result.is_ok() {
            self.session.stats.instances += count as u64;
        }
        result
    }
}

impl<D: BackendDriver> Renderer for InstancedRenderer<D> {
    fn strategy(&self) -> Strategy {
        Strategy::HardwareInstanced
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
        self.instance_ring.reclaim(&self.driver);
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
            panic!("instance arena of {} full right after a flush", self.instances.capacity());
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
    use crate::backend::recording::{RecordingDriver, SubmissionKind};
    use crate::backend::Capabilities;
    use crate::coords::Rect;
    use crate::paint::Color;

    fn renderer(limits: BatchLimits) -> InstancedRenderer<RecordingDriver> {
        let config = RendererConfig {
            limits,
            ..Default::default()
        };
        InstancedRenderer::new(RecordingDriver::new(Capabilities::instanced(4)), &config).unwrap()
    }

    fn quad(x: f32) -> QuadInstance {
        QuadInstance::solid(Rect::new(x, 0.0, 1.0, 1.0), Color::WHITE)
    }

    #[test]
    fn quads_share_one_instanced_submission() {
        let mut r = renderer(BatchLimits::default());
        let journal = r.driver.journal();
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        for i in 0..3 {
            r.draw_quad(&quad(i as f32)).unwrap();
        }
        let stats = r.end().unwrap();

        let subs = journal.submissions();
        assert_eq!(subs.len(), 1);
        assert!(matches!(subs[0].kind, SubmissionKind::Instanced { .. }));
        let xs: Vec<f32> = subs[0].instances().iter().map(|i| i.position[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(stats.instances, 3);
    }

    #[test]
    fn switching_to_geometry_flushes_quads_first() {
        let mut r = renderer(BatchLimits::default());
        let journal = r.driver.journal();
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.reserve(3, 3, None).unwrap().write_indices(&[0, 1, 2]);
        r.draw_quad(&quad(1.0)).unwrap();
        let stats = r.end().unwrap();

        let kinds: Vec<bool> = journal
            .submissions()
            .iter()
            .map(|s| matches!(s.kind, SubmissionKind::Instanced { .. }))
            .collect();
        assert_eq!(kinds, vec![true, false, true]);
        assert_eq!(stats.flushes_for(FlushReason::ModeSwitch), 2);
        assert_eq!(stats.flushes_for(FlushReason::End), 1);
    }

    #[test]
    fn capacity_follows_vertex_and_primitive_limits() {
        assert_eq!(renderer(BatchLimits::new(8, 16, 1)).instance_capacity(), 2);
        assert_eq!(renderer(BatchLimits::new(64, 6, 1)).instance_capacity(), 3);
    }

    #[test]
    fn into_driver_releases_everything() {
        let mut r = renderer(BatchLimits::default());
        r.begin(&FrameUniforms::IDENTITY).unwrap();
        r.draw_quad(&quad(0.0)).unwrap();
        r.reserve(3, 3, None).unwrap().write_indices(&[0, 1, 2]);
        r.end().unwrap();
        assert_eq!(r.instance_buffers(), 1);

        let driver = r.into_driver();
        assert_eq!(driver.live_buffers(), 0);
    }
}
