use smallvec::SmallVec;

use crate::backend::TextureId;

/// Hard upper bound on texture units a batch may use.
pub const MAX_TEXTURE_UNITS: usize = 32;

/// Per-batch texture identity table.
///
/// Maps a [`TextureId`] to a dense slot in `0..capacity`, assigned in
/// first-use order. Lookup is a linear scan: the table never holds more than
/// [`MAX_TEXTURE_UNITS`] entries, and they live inline.
///
/// Slots are only meaningful until the next [`reset`](Self::reset), which the
/// renderer performs on every flush.
#[derive(Debug, Clone)]
pub struct TextureSlotCache {
    slots: SmallVec<[TextureId; 16]>,
    capacity: usize,
}

impl TextureSlotCache {
    /// # Panics
    /// Panics if `capacity` is zero or above [`MAX_TEXTURE_UNITS`].
    pub fn new(capacity: usize) -> Self {
        assert!(
            (1..=MAX_TEXTURE_UNITS).contains(&capacity),
            "texture slot capacity {capacity} outside 1..={MAX_TEXTURE_UNITS}"
        );
        Self {
            slots: SmallVec::new(),
            capacity,
        }
    }

    /// Slot of `texture` in the current batch, if assigned.
    #[inline]
    pub fn get(&self, texture: TextureId) -> Option<u32> {
        self.slots.iter().position(|&t| t == texture).map(|i| i as u32)
    }

    /// Existing slot, or the next free one. `None` means the batch is full
    /// and must be flushed before `texture` can be used.
    pub fn get_or_assign(&mut self, texture: TextureId) -> Option<u32> {
        if let Some(slot) = self.get(texture) {
            return Some(slot);
        }
        if self.is_full() {
            return None;
        }
        self.slots.push(texture);
        Some((self.slots.len() - 1) as u32)
    }

    #[inline]
    pub fn contains(&self, texture: TextureId) -> bool {
        self.get(texture).is_some()
    }

    /// True when `texture` cannot be assigned without a flush.
    #[inline]
    pub fn needs_flush_for(&self, texture: TextureId) -> bool {
        self.is_full() && !self.contains(texture)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// `(slot, texture)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, TextureId)> + '_ {
        self.slots.iter().enumerate().map(|(i, &t)| (i as u32, t))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_texture_same_slot() {
        let mut cache = TextureSlotCache::new(4);
        assert_eq!(cache.get_or_assign(TextureId(10)), Some(0));
        assert_eq!(cache.get_or_assign(TextureId(20)), Some(1));
        assert_eq!(cache.get_or_assign(TextureId(10)), Some(0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn full_cache_refuses_new_textures_but_serves_known_ones() {
        let mut cache = TextureSlotCache::new(2);
        cache.get_or_assign(TextureId(1));
        cache.get_or_assign(TextureId(2));
        assert!(cache.needs_flush_for(TextureId(3)));
        assert!(!cache.needs_flush_for(TextureId(2)));
        assert_eq!(cache.get_or_assign(TextureId(3)), None);
        assert_eq!(cache.get_or_assign(TextureId(2)), Some(1));
    }

    #[test]
    fn reset_restarts_slots_at_zero() {
        let mut cache = TextureSlotCache::new(2);
        cache.get_or_assign(TextureId(1));
        cache.get_or_assign(TextureId(2));
        cache.reset();
        assert_eq!(cache.get_or_assign(TextureId(2)), Some(0));
    }

    #[test]
    fn iter_reports_first_use_order() {
        let mut cache = TextureSlotCache::new(3);
        for t in [5, 3, 5, 8] {
            cache.get_or_assign(TextureId(t));
        }
        let pairs: Vec<_> = cache.iter().collect();
        assert_eq!(pairs, vec![(0, TextureId(5)), (1, TextureId(3)), (2, TextureId(8))]);
    }

    #[test]
    #[should_panic(expected = "texture slot capacity")]
    fn zero_capacity_is_rejected() {
        let _ = TextureSlotCache::new(0);
    }
}
