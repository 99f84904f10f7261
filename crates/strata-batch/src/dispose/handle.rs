use std::fmt;
use std::sync::Arc;

use crate::backend::{BackendDriver, BufferHandle, TextureId};

use super::queue::{DisposalQueue, GpuResource, Tracked};

/// Owning handle to a driver resource.
///
/// Dropping the handle (on any thread) queues the resource on its
/// [`DisposalQueue`]; the owning thread destroys it at the next drain.
/// [`dispose_now`](Self::dispose_now) destroys it immediately instead.
pub struct GpuHandle<'q> {
    tracked: Arc<Tracked>,
    queue: &'q DisposalQueue,
}

impl<'q> GpuHandle<'q> {
    pub fn new(queue: &'q DisposalQueue, resource: GpuResource) -> Self {
        Self {
            tracked: Tracked::new(resource),
            queue,
        }
    }

    pub fn buffer(queue: &'q DisposalQueue, buffer: BufferHandle) -> Self {
        Self::new(queue, GpuResource::Buffer(buffer))
    }

    pub fn texture(queue: &'q DisposalQueue, texture: TextureId) -> Self {
        Self::new(queue, GpuResource::Texture(texture))
    }

    #[inline]
    pub fn resource(&self) -> GpuResource {
        self.tracked.resource()
    }

    /// Shared bookkeeping, for callers that enqueue explicitly.
    #[inline]
    pub fn tracked(&self) -> &Arc<Tracked> {
        &self.tracked
    }

    /// Destroys the resource on the calling (owning) thread. The enqueue
    /// that dropping the handle performs becomes a no-op.
    ///
    /// # Panics
    /// Debug builds only: panics off the queue's owning thread.
    #[track_caller]
    pub fn dispose_now(self, driver: &mut dyn BackendDriver) -> bool {
        self.queue.check_owner();
        self.tracked.dispose(driver)
    }
}

impl Drop for GpuHandle<'_> {
    fn drop(&mut self) {
        self.queue.enqueue(&self.tracked);
    }
}

impl fmt::Debug for GpuHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuHandle")
            .field("resource", &self.tracked.resource())
            .field("disposed", &self.tracked.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DriverCall, RecordingDriver};
    use crate::backend::{BufferUsage, Capabilities};

    #[test]
    fn drop_defers_destruction_to_drain() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let buffer = driver.allocate_buffer(BufferUsage::Index, 8).unwrap();
        let queue = DisposalQueue::new();

        drop(GpuHandle::buffer(&queue, buffer));
        assert_eq!(driver.live_buffers(), 1);
        assert_eq!(queue.drain_all(&mut driver), 1);
        assert_eq!(driver.live_buffers(), 0);
    }

    #[test]
    fn dispose_now_then_drop_destroys_once() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let journal = driver.journal();
        let queue = DisposalQueue::new();

        let handle = GpuHandle::texture(&queue, TextureId(4));
        assert!(handle.dispose_now(&mut driver));
        assert!(queue.is_empty());
        assert_eq!(queue.drain_all(&mut driver), 0);
        assert_eq!(journal.count(|c| matches!(c, DriverCall::ReleaseTexture(_))), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn dispose_now_off_the_owning_thread_panics() {
        let queue = DisposalQueue::new();
        let handle = GpuHandle::texture(&queue, TextureId(5));

        let result = std::thread::scope(|s| {
            s.spawn(move || {
                let mut other = RecordingDriver::new(Capabilities::software(1));
                handle.dispose_now(&mut other)
            })
            .join()
        });
        assert!(result.is_err());

        // Unwinding dropped the handle, so the owner still releases it.
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        assert_eq!(queue.drain_all(&mut driver), 1);
    }

    #[test]
    fn handle_dropped_on_another_thread() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let queue = DisposalQueue::new();
        let handle = GpuHandle::texture(&queue, TextureId(9));

        std::thread::scope(|s| {
            s.spawn(move || drop(handle));
        });
        assert_eq!(queue.drain_all(&mut driver), 1);
    }
}
