use crate::backend::{BackendDriver, BackendResult, BufferHandle, BufferUsage, FrameUniforms, TextureId};
use crate::batch::{BatchLimits, BatchStats, BindLock, FlushReason, OwnerThread, TextureSlotCache};

use super::strategy::{BatchPhase, PrimitiveState, StateChangePolicy};

/// State every strategy carries between `begin` and `end`.
///
/// Strategies own their accumulation buffers; the session owns what is
/// common to all of them: phase, texture slots, device bindings, primitive
/// state and counters.
#[derive(Debug)]
pub(super) struct Session {
    owner: OwnerThread,
    pub phase: BatchPhase,
    pub slots: TextureSlotCache,
    pub bind: BindLock,
    pub stats: BatchStats,
    pub state: PrimitiveState,
    pub policy: StateChangePolicy,
}

impl Session {
    pub fn new(limits: &BatchLimits, policy: StateChangePolicy) -> Self {
        Self {
            owner: OwnerThread::current(),
            phase: BatchPhase::Idle,
            slots: TextureSlotCache::new(limits.max_texture_units as usize),
            bind: BindLock::new(),
            stats: BatchStats::default(),
            state: PrimitiveState::default(),
            policy,
        }
    }

    /// Idle -> Begun.
    #[track_caller]
    pub fn begin(&mut self, driver: &mut dyn BackendDriver, uniforms: &FrameUniforms) -> BackendResult<()> {
        self.owner.check("begin");
        assert_eq!(self.phase, BatchPhase::Idle, "begin called while a batch is already open");

        self.slots.reset();
        self.bind.clear();
        self.stats = BatchStats::default();
        self.state = PrimitiveState::default();
        driver.set_per_frame_uniforms(uniforms)?;
        self.phase = BatchPhase::Begun;
        Ok(())
    }

    /// Begun -> Idle.
    pub fn end(&mut self) -> BatchStats {
        self.phase = BatchPhase::Idle;
        log::debug!(
            "batch session ended: {} flush(es), {} primitive(s), {} texture bind(s)",
            self.stats.flushes,
            self.stats.primitives,
            self.stats.texture_binds
        );
        self.stats.clone()
    }

    /// Asserts the calling thread and phase for a drawing operation.
    #[track_caller]
    pub fn require_begun(&self, op: &str) {
        self.owner.check(op);
        assert!(
            self.phase == BatchPhase::Begun,
            "{op} called outside begin/end (phase {:?})",
            self.phase
        );
    }

    /// Asserts a raw reservation can fit an empty batch.
    #[track_caller]
    pub fn check_reservation(limits: &BatchLimits, vertex_count: u32, index_count: u32) {
        assert!(
            vertex_count <= limits.max_vertices && index_count <= limits.max_indices(),
            "reservation of {vertex_count} vertices / {index_count} indices exceeds a whole batch \
             ({} vertices / {} indices)",
            limits.max_vertices,
            limits.max_indices()
        );
    }

    /// True when `texture` is new to the batch and no unit is free.
    #[inline]
    pub fn needs_slot_flush(&self, texture: Option<TextureId>) -> bool {
        texture.is_some_and(|t| self.slots.needs_flush_for(t))
    }

    /// Slot for `texture`, which must fit (callers flush first).
    pub fn assign_slot(&mut self, texture: Option<TextureId>) -> Option<u32> {
        let texture = texture?;
        match self.slots.get_or_assign(texture) {
            Some(slot) => Some(slot),
            None => panic!("no texture unit free for {texture:?} right after a flush"),
        }
    }

    /// Binds every slot in use and the current scissor, skipping what the
    /// device already holds.
    pub fn apply_bindings(&mut self, driver: &mut dyn BackendDriver) -> BackendResult<()> {
        for (slot, texture) in self.slots.iter() {
            if self.bind.bind(driver, texture, slot)? {
                self.stats.texture_binds += 1;
            }
        }
        self.bind.scissor(driver, self.state.clip)?;
        Ok(())
    }

    /// Closes a flush: counters, slot reset, back to `Begun`.
    pub fn finish_flush(&mut self, reason: FlushReason, submitted: bool) {
        if submitted {
            self.stats.record_flush(reason);
            log::trace!(
                "flush ({reason:?}): {} texture(s), {} flush(es) this session",
                self.slots.len(),
                self.stats.flushes
            );
        } else {
            log::debug!("flush ({reason:?}) failed, batch dropped");
        }
        self.slots.reset();
        self.phase = BatchPhase::Begun;
    }

    /// Whether moving to `next` must flush a non-empty batch first.
    #[inline]
    pub fn state_change_flushes(&self, next: &PrimitiveState) -> bool {
        self.policy.requires_flush(&self.state, next)
    }
}

/// Allocates a buffer holding `bytes` for the renderer's lifetime.
pub(super) fn upload_static(
    driver: &mut dyn BackendDriver,
    usage: BufferUsage,
    bytes: &[u8],
) -> BackendResult<BufferHandle> {
    let buffer = driver.allocate_buffer(usage, bytes.len() as u64)?;
    if let Err(err) = driver.write_buffer(buffer, 0, bytes) {
        driver.destroy_buffer(buffer);
        return Err(err);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DriverCall, RecordingDriver};
    use crate::backend::Capabilities;

    fn session(units: u32) -> Session {
        Session::new(&BatchLimits::new(64, 64, units), StateChangePolicy::FlushOnPipelineChange)
    }

    #[test]
    fn begin_forwards_uniforms_and_opens() {
        let mut driver = RecordingDriver::new(Capabilities::software(2));
        let journal = driver.journal();
        let mut s = session(2);
        s.begin(&mut driver, &FrameUniforms::IDENTITY).unwrap();
        assert_eq!(s.phase, BatchPhase::Begun);
        assert_eq!(journal.calls(), vec![DriverCall::SetFrameUniforms(FrameUniforms::IDENTITY)]);
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn begin_twice_panics() {
        let mut driver = RecordingDriver::new(Capabilities::software(2));
        let mut s = session(2);
        s.begin(&mut driver, &FrameUniforms::IDENTITY).unwrap();
        let _ = s.begin(&mut driver, &FrameUniforms::IDENTITY);
    }

    #[test]
    #[should_panic(expected = "outside begin/end")]
    fn drawing_while_idle_panics() {
        session(1).require_begun("draw_quad");
    }

    #[test]
    #[should_panic(expected = "exceeds a whole batch")]
    fn oversized_reservation_panics() {
        Session::check_reservation(&BatchLimits::new(8, 16, 1), 12, 6);
    }

    #[test]
    fn bindings_skip_units_already_holding_the_texture() {
        let mut driver = RecordingDriver::new(Capabilities::software(2));
        let journal = driver.journal();
        let mut s = session(2);
        s.begin(&mut driver, &FrameUniforms::IDENTITY).unwrap();

        s.assign_slot(Some(TextureId(1)));
        s.apply_bindings(&mut driver).unwrap();
        s.finish_flush(FlushReason::Explicit, true);
        s.assign_slot(Some(TextureId(1)));
        s.apply_bindings(&mut driver).unwrap();

        let binds = journal.count(|c| matches!(c, DriverCall::BindTexture { .. }));
        let scissors = journal.count(|c| matches!(c, DriverCall::SetScissor(_)));
        assert_eq!(binds, 1);
        assert_eq!(scissors, 1);
        assert_eq!(s.stats.texture_binds, 1);
    }

    #[test]
    fn failed_flush_is_not_counted() {
        let mut s = session(1);
        s.phase = BatchPhase::Flushing;
        s.finish_flush(FlushReason::Capacity, false);
        assert_eq!(s.stats.flushes, 0);
        assert_eq!(s.phase, BatchPhase::Begun);
    }
}
