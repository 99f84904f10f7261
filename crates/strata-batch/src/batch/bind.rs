use smallvec::SmallVec;

use crate::backend::{BackendDriver, BackendResult, TextureId};
use crate::coords::Rect;

/// Device binding state for one `begin`/`end` session.
///
/// Tracks which texture each unit holds and which scissor is active so a
/// flush only issues driver calls for what actually changed. Owned by the
/// renderer's session and discarded at `end`; nothing about bindings is
/// process-wide.
#[derive(Debug, Default)]
pub struct BindLock {
    units: SmallVec<[Option<TextureId>; 16]>,
    /// `None` until the first scissor is applied in this session.
    scissor: Option<Option<Rect>>,
    binds_issued: u32,
    binds_skipped: u32,
}

impl BindLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `texture` to `slot` unless it is already bound there.
    ///
    /// Returns whether the driver was called.
    pub fn bind(
        &mut self,
        driver: &mut dyn BackendDriver,
        texture: TextureId,
        slot: u32,
    ) -> BackendResult<bool> {
        let unit = slot as usize;
        if self.units.len() <= unit {
            self.units.resize(unit + 1, None);
        }
        if self.units[unit] == Some(texture) {
            self.binds_skipped += 1;
            return Ok(false);
        }
        driver.bind_texture(texture, slot)?;
        self.units[unit] = Some(texture);
        self.binds_issued += 1;
        Ok(true)
    }

    /// Applies `clip` unless it is already the active scissor.
    pub fn scissor(&mut self, driver: &mut dyn BackendDriver, clip: Option<Rect>) -> BackendResult<bool> {
        if self.scissor == Some(clip) {
            return Ok(false);
        }
        driver.set_scissor(clip)?;
        self.scissor = Some(clip);
        Ok(true)
    }

    /// Texture currently held by `slot` in this session.
    #[inline]
    pub fn bound(&self, slot: u32) -> Option<TextureId> {
        self.units.get(slot as usize).copied().flatten()
    }

    /// Forgets all bindings; the next bind of every unit reaches the driver.
    pub fn clear(&mut self) {
        self.units.clear();
        self.scissor = None;
        self.binds_issued = 0;
        self.binds_skipped = 0;
    }

    #[inline]
    pub fn binds_issued(&self) -> u32 {
        self.binds_issued
    }

    #[inline]
    pub fn binds_skipped(&self) -> u32 {
        self.binds_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DriverCall, RecordingDriver};
    use crate::backend::Capabilities;

    #[test]
    fn rebinding_same_texture_is_skipped() {
        let mut driver = RecordingDriver::new(Capabilities::software(4));
        let journal = driver.journal();
        let mut lock = BindLock::new();

        assert!(lock.bind(&mut driver, TextureId(1), 0).unwrap());
        assert!(!lock.bind(&mut driver, TextureId(1), 0).unwrap());
        assert!(lock.bind(&mut driver, TextureId(2), 0).unwrap());

        let binds = journal
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DriverCall::BindTexture { .. }))
            .count();
        assert_eq!(binds, 2);
        assert_eq!(lock.binds_skipped(), 1);
        assert_eq!(lock.bound(0), Some(TextureId(2)));
    }

    #[test]
    fn clear_forces_rebind() {
        let mut driver = RecordingDriver::new(Capabilities::software(4));
        let mut lock = BindLock::new();
        lock.bind(&mut driver, TextureId(1), 1).unwrap();
        lock.clear();
        assert_eq!(lock.bound(1), None);
        assert!(lock.bind(&mut driver, TextureId(1), 1).unwrap());
    }

    #[test]
    fn first_scissor_always_reaches_driver() {
        let mut driver = RecordingDriver::new(Capabilities::software(4));
        let mut lock = BindLock::new();
        assert!(lock.scissor(&mut driver, None).unwrap());
        assert!(!lock.scissor(&mut driver, None).unwrap());
        assert!(lock.scissor(&mut driver, Some(Rect::new(0.0, 0.0, 5.0, 5.0))).unwrap());
    }
}
