use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use state::InitCell;

use crate::backend::{BackendDriver, BufferHandle, TextureId};
use crate::batch::OwnerThread;

/// A driver object that must be destroyed on the owning thread.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GpuResource {
    Buffer(BufferHandle),
    Texture(TextureId),
}

impl GpuResource {
    fn destroy(self, driver: &mut dyn BackendDriver) {
        match self {
            GpuResource::Buffer(buffer) => driver.destroy_buffer(buffer),
            GpuResource::Texture(texture) => driver.release_texture(texture),
        }
    }
}

/// Disposal bookkeeping shared between a handle and the queue.
#[derive(Debug)]
pub struct Tracked {
    resource: GpuResource,
    enqueued: AtomicBool,
    disposed: AtomicBool,
}

impl Tracked {
    pub fn new(resource: GpuResource) -> Arc<Self> {
        Arc::new(Self {
            resource,
            enqueued: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn resource(&self) -> GpuResource {
        self.resource
    }

    #[inline]
    pub fn is_enqueued(&self) -> bool {
        self.enqueued.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Destroys the resource unless that already happened. Returns whether
    /// this call destroyed it.
    pub(super) fn dispose(&self, driver: &mut dyn BackendDriver) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.resource.destroy(driver);
        true
    }
}

/// Multi-producer queue of resources awaiting destruction.
///
/// Any thread may [`enqueue`](Self::enqueue). The queue belongs to the
/// thread that created it (for [`global`](Self::global), the first caller);
/// debug builds panic if any other thread drains it.
#[derive(Debug)]
pub struct DisposalQueue {
    sender: Sender<Arc<Tracked>>,
    receiver: Receiver<Arc<Tracked>>,
    owner: OwnerThread,
}

impl Default for DisposalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DisposalQueue {
    /// An isolated queue owned by the calling thread, unrelated to
    /// [`global`](Self::global).
    pub fn new() -> Self {
        Self::with_owner(OwnerThread::current())
    }

    /// An isolated queue drained by `owner`'s thread.
    pub fn with_owner(owner: OwnerThread) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            owner,
        }
    }

    /// The process-wide queue, owned by the thread that calls this first.
    /// Call it from the graphics thread before handing handles out.
    pub fn global() -> &'static DisposalQueue {
        static GLOBAL: InitCell<DisposalQueue> = InitCell::new();
        GLOBAL.get_or_init(DisposalQueue::new)
    }

    /// Queues `tracked` for destruction. Returns `false` if it was already
    /// queued or already destroyed.
    pub fn enqueue(&self, tracked: &Arc<Tracked>) -> bool {
        if tracked.is_disposed() || tracked.enqueued.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.sender.send(Arc::clone(tracked)).is_err() {
            log::warn!("disposal queue disconnected; {:?} leaked", tracked.resource);
            return false;
        }
        true
    }

    /// Destroys the oldest pending resource. Returns the number destroyed (0 or 1).
    #[track_caller]
    pub fn drain_one(&self, driver: &mut dyn BackendDriver) -> usize {
        self.check_owner();
        while let Ok(tracked) = self.receiver.try_recv() {
            if tracked.dispose(driver) {
                return 1;
            }
        }
        0
    }

    /// Destroys every pending resource in enqueue order. Returns the number destroyed.
    #[track_caller]
    pub fn drain_all(&self, driver: &mut dyn BackendDriver) -> usize {
        self.check_owner();
        let destroyed = self
            .receiver
            .try_iter()
            .filter(|tracked| tracked.dispose(driver))
            .count();
        if destroyed > 0 {
            log::debug!("disposal queue destroyed {destroyed} resource(s)");
        }
        destroyed
    }

    /// Entries waiting to be drained (including ones already disposed inline).
    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// # Panics
    /// Debug builds only: panics off the owning thread.
    #[inline]
    #[track_caller]
    pub fn check_owner(&self) {
        self.owner.check("disposal queue drain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DriverCall, RecordingDriver};
    use crate::backend::{BufferUsage, Capabilities};

    #[test]
    fn enqueue_twice_destroys_once() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let journal = driver.journal();
        let buffer = driver.allocate_buffer(BufferUsage::Vertex, 16).unwrap();
        let queue = DisposalQueue::new();
        let tracked = Tracked::new(GpuResource::Buffer(buffer));

        assert!(queue.enqueue(&tracked));
        assert!(!queue.enqueue(&tracked));
        assert_eq!(queue.drain_all(&mut driver), 1);
        assert_eq!(queue.drain_all(&mut driver), 0);
        assert_eq!(journal.count(|c| matches!(c, DriverCall::DestroyBuffer(_))), 1);
    }

    #[test]
    fn drains_in_enqueue_order() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let journal = driver.journal();
        let queue = DisposalQueue::new();
        for id in [3, 1, 2] {
            queue.enqueue(&Tracked::new(GpuResource::Texture(TextureId(id))));
        }

        assert_eq!(queue.drain_one(&mut driver), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain_all(&mut driver), 2);

        let released: Vec<u64> = journal
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::ReleaseTexture(t) => Some(t.0),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec![3, 1, 2]);
    }

    #[test]
    fn already_disposed_entries_are_skipped() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let queue = DisposalQueue::new();
        let tracked = Tracked::new(GpuResource::Texture(TextureId(1)));
        queue.enqueue(&tracked);
        assert!(tracked.dispose(&mut driver));

        assert_eq!(queue.drain_one(&mut driver), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn producers_on_other_threads() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let queue = DisposalQueue::new();
        std::thread::scope(|s| {
            for id in 0..4 {
                let queue = &queue;
                s.spawn(move || {
                    queue.enqueue(&Tracked::new(GpuResource::Texture(TextureId(id))));
                });
            }
        });
        assert_eq!(queue.drain_all(&mut driver), 4);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn a_stray_first_drain_does_not_take_ownership() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let queue = DisposalQueue::new();
        queue.enqueue(&Tracked::new(GpuResource::Texture(TextureId(2))));

        let stray = std::thread::scope(|s| {
            s.spawn(|| {
                let mut other = RecordingDriver::new(Capabilities::software(1));
                queue.drain_all(&mut other);
            })
            .join()
        });
        assert!(stray.is_err());
        assert_eq!(queue.drain_all(&mut driver), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn queue_built_for_another_thread_rejects_this_one() {
        let owner = std::thread::spawn(OwnerThread::current).join().unwrap();
        let queue = DisposalQueue::with_owner(owner);
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| queue.drain_all(&mut driver)));
        assert!(result.is_err());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn draining_from_a_second_thread_panics() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let queue = DisposalQueue::new();
        queue.drain_all(&mut driver);

        let result = std::thread::scope(|s| {
            s.spawn(|| {
                let mut other = RecordingDriver::new(Capabilities::software(1));
                queue.drain_all(&mut other);
            })
            .join()
        });
        assert!(result.is_err());
    }

    #[test]
    fn global_is_a_single_instance() {
        assert!(std::ptr::eq(DisposalQueue::global(), DisposalQueue::global()));
    }
}
