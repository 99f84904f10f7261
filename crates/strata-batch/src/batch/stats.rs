/// Why a batch was submitted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FlushReason {
    /// Arena, index or instance capacity would be exceeded.
    Capacity,
    /// A new texture needed a slot and all units were taken.
    TextureSlots,
    /// A primitive-state change the renderer's policy flushes on.
    StateChange,
    /// Switching between instance records and raw geometry.
    ModeSwitch,
    /// Caller-requested `flush`.
    Explicit,
    /// Final flush of `end`.
    End,
}

impl FlushReason {
    pub const ALL: [FlushReason; 6] = [
        FlushReason::Capacity,
        FlushReason::TextureSlots,
        FlushReason::StateChange,
        FlushReason::ModeSwitch,
        FlushReason::Explicit,
        FlushReason::End,
    ];

    #[inline]
    const fn index(self) -> usize {
        match self {
            FlushReason::Capacity => 0,
            FlushReason::TextureSlots => 1,
            FlushReason::StateChange => 2,
            FlushReason::ModeSwitch => 3,
            FlushReason::Explicit => 4,
            FlushReason::End => 5,
        }
    }

    /// Flushes the renderer performs on its own, invisible to the caller.
    #[inline]
    pub const fn is_internal(self) -> bool {
        !matches!(self, FlushReason::Explicit | FlushReason::End)
    }
}

/// Counters for one `begin`/`end` session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Submissions issued (one per non-empty flush).
    pub flushes: u32,
    by_reason: [u32; 6],
    /// Draw calls committed: quads plus raw reservations.
    pub primitives: u64,
    pub vertices: u64,
    pub indices: u64,
    pub instances: u64,
    /// Driver `bind_texture` calls (redundant binds excluded).
    pub texture_binds: u32,
}

impl BatchStats {
    pub(crate) fn record_flush(&mut self, reason: FlushReason) {
        self.flushes += 1;
        self.by_reason[reason.index()] += 1;
    }

    /// Flushes attributed to `reason`.
    #[inline]
    pub fn flushes_for(&self, reason: FlushReason) -> u32 {
        self.by_reason[reason.index()]
    }

    /// Flushes the caller did not ask for.
    pub fn internal_flushes(&self) -> u32 {
        FlushReason::ALL
            .iter()
            .filter(|r| r.is_internal())
            .map(|&r| self.flushes_for(r))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_counted_separately() {
        let mut stats = BatchStats::default();
        stats.record_flush(FlushReason::Capacity);
        stats.record_flush(FlushReason::Capacity);
        stats.record_flush(FlushReason::End);
        assert_eq!(stats.flushes, 3);
        assert_eq!(stats.flushes_for(FlushReason::Capacity), 2);
        assert_eq!(stats.flushes_for(FlushReason::TextureSlots), 0);
        assert_eq!(stats.internal_flushes(), 2);
    }
}
