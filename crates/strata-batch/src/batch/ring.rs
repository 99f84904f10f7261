use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::backend::{BackendDriver, BackendResult, BufferHandle, BufferUsage};

/// One backing buffer per usage, in the order the ring was configured with.
pub type BufferSet = SmallVec<[BufferHandle; 2]>;

/// Free-list of backing buffer sets.
///
/// A flush takes a set with [`acquire`](Self::acquire), uploads into it and
/// hands it back with [`submitted`](Self::submitted). Submitted sets stay
/// in flight until the driver reports every buffer retired; only then are
/// they reused. While the device drains one set the CPU fills another, so
/// uploads never overwrite bytes a pending submission still reads.
#[derive(Debug)]
pub struct BufferRing {
    layout: SmallVec<[(BufferUsage, u64); 2]>,
    free: Vec<BufferSet>,
    in_flight: VecDeque<BufferSet>,
    allocated: usize,
}

impl BufferRing {
    /// `layout` lists `(usage, capacity_bytes)` for each buffer in a set.
    pub fn new(layout: &[(BufferUsage, u64)]) -> Self {
        Self {
            layout: layout.iter().copied().collect(),
            free: Vec::new(),
            in_flight: VecDeque::new(),
            allocated: 0,
        }
    }

    /// Moves every fully retired in-flight set back to the free-list.
    pub fn reclaim(&mut self, driver: &dyn BackendDriver) {
        let mut still_busy = VecDeque::with_capacity(self.in_flight.len());
        for set in self.in_flight.drain(..) {
            if set.iter().all(|&b| driver.buffer_retired(b)) {
                self.free.push(set);
            } else {
                still_busy.push_back(set);
            }
        }
        self.in_flight = still_busy;
    }

    /// Returns a set safe to overwrite, allocating a new one if every
    /// existing set is still in flight.
    pub fn acquire(&mut self, driver: &mut dyn BackendDriver) -> BackendResult<BufferSet> {
        self.reclaim(&*driver);
        if let Some(set) = self.free.pop() {
            return Ok(set);
        }

        let mut set = BufferSet::new();
        for &(usage, bytes) in &self.layout {
            match driver.allocate_buffer(usage, bytes) {
                Ok(handle) => set.push(handle),
                Err(err) => {
                    for handle in set {
                        driver.destroy_buffer(handle);
                    }
                    return Err(err);
                }
            }
        }
        self.allocated += 1;
        log::debug!(
            "buffer ring grew to {} set(s) ({} in flight)",
            self.allocated,
            self.in_flight.len()
        );
        Ok(set)
    }

    /// Marks `set` as read by a submission.
    #[inline]
    pub fn submitted(&mut self, set: BufferSet) {
        self.in_flight.push_back(set);
    }

    /// Destroys every set the ring owns, in flight or not.
    pub fn destroy_all(&mut self, driver: &mut dyn BackendDriver) {
        for set in self.free.drain(..).chain(self.in_flight.drain(..)) {
            for handle in set {
                driver.destroy_buffer(handle);
            }
        }
        self.allocated = 0;
    }

    /// Number of sets ever allocated and not destroyed.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
