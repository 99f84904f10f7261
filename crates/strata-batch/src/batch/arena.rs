use std::ops::Range;

use bytemuck::Pod;

/// Fixed-capacity bump allocator over a typed staging region.
///
/// The region is allocated once and never grows. `reserve` either hands out
/// the next `count` elements or fails without touching the cursor, so a
/// failed reservation is a signal ("flush now"), never a partial write.
///
/// The backing memory is CPU resident: `unmap` just exposes the written
/// prefix for upload.
#[derive(Debug)]
pub struct Arena<T> {
    data: Vec<T>,
    cursor: usize,
}

impl<T: Pod> Arena<T> {
    /// Creates an arena holding `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::zeroed(); capacity],
            cursor: 0,
        }
    }

    /// Starts a new batch: the cursor goes back to zero.
    ///
    /// Stale contents are left in place; every reserved element is written by
    /// its producer before upload.
    #[inline]
    pub fn map(&mut self) {
        self.cursor = 0;
    }

    /// Alias for [`map`](Self::map), reads better at flush sites.
    #[inline]
    pub fn reset(&mut self) {
        self.map();
    }

    /// Bump-allocates `count` elements.
    ///
    /// Returns the reserved element range, or `None` if the region cannot hold
    /// `count` more elements. On `None` the cursor is unchanged.
    pub fn reserve(&mut self, count: usize) -> Option<Range<usize>> {
        let end = self.cursor.checked_add(count)?;
        if end > self.data.len() {
            return None;
        }
        let start = self.cursor;
        self.cursor = end;
        Some(start..end)
    }

    /// Mutable view of a previously reserved range.
    #[inline]
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [T] {
        debug_assert!(range.end <= self.cursor, "slice past the bump cursor");
        &mut self.data[range]
    }

    /// Ends the mapping and returns the elements written since the last reset.
    #[inline]
    pub fn unmap(&self) -> &[T] {
        &self.data[..self.cursor]
    }

    /// Written prefix as upload bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.unmap())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    #[inline]
    pub fn reserved_bytes(&self) -> usize {
        self.cursor * std::mem::size_of::<T>()
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_returns_prior_cursor() {
        let mut arena = Arena::<u32>::with_capacity(16);
        assert_eq!(arena.reserve(4), Some(0..4));
        assert_eq!(arena.reserve(6), Some(4..10));
        assert_eq!(arena.len(), 10);
        assert_eq!(arena.reserved_bytes(), 40);
    }

    #[test]
    fn failed_reserve_leaves_cursor_unchanged() {
        let mut arena = Arena::<u32>::with_capacity(8);
        arena.reserve(6).unwrap();
        assert_eq!(arena.reserve(3), None);
        assert_eq!(arena.len(), 6);
        // Exact fit still succeeds after a failure.
        assert_eq!(arena.reserve(2), Some(6..8));
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn map_resets_cursor_and_keeps_capacity() {
        let mut arena = Arena::<u32>::with_capacity(8);
        arena.reserve(8).unwrap();
        arena.map();
        assert!(arena.is_empty());
        assert_eq!(arena.capacity_bytes(), 32);
        assert_eq!(arena.reserve(8), Some(0..8));
    }

    #[test]
    fn unmap_exposes_written_prefix_only() {
        let mut arena = Arena::<u32>::with_capacity(8);
        let r = arena.reserve(2).unwrap();
        arena.slice_mut(r).copy_from_slice(&[7, 9]);
        assert_eq!(arena.unmap(), &[7, 9]);
        assert_eq!(arena.as_bytes().len(), 8);
    }

    #[test]
    fn zero_length_reserve_is_valid() {
        let mut arena = Arena::<u32>::with_capacity(0);
        assert_eq!(arena.reserve(0), Some(0..0));
        assert_eq!(arena.reserve(1), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cursor_is_sum_of_successes_and_never_exceeds_capacity(
                capacity in 0usize..256,
                sizes in proptest::collection::vec(0usize..64, 0..40),
            ) {
                let mut arena = Arena::<u64>::with_capacity(capacity);
                let mut expected = 0usize;
                for size in sizes {
                    let before = arena.reserved_bytes();
                    match arena.reserve(size) {
                        Some(range) => {
                            prop_assert_eq!(range.start * 8, before);
                            expected += size;
                        }
                        None => {
                            prop_assert!(expected + size > capacity);
                            prop_assert_eq!(arena.reserved_bytes(), before);
                        }
                    }
                    prop_assert_eq!(arena.reserved_bytes(), expected * 8);
                    prop_assert!(arena.reserved_bytes() <= arena.capacity_bytes());
                }
            }
        }
    }
}
