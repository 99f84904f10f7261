#[cfg(debug_assertions)]
use std::thread::{self, ThreadId};

/// Owning-thread guard for single-threaded GPU state.
///
/// Debug builds record the creating thread and panic when a guarded
/// operation runs anywhere else. Release builds compile the check away.
#[derive(Debug, Clone)]
pub struct OwnerThread {
    #[cfg(debug_assertions)]
    id: ThreadId,
}

impl OwnerThread {
    /// Binds to the calling thread.
    pub fn current() -> Self {
        Self {
            #[cfg(debug_assertions)]
            id: thread::current().id(),
        }
    }

    /// # Panics
    /// Debug builds only: panics if called off the owning thread.
    #[inline]
    #[track_caller]
    pub fn check(&self, op: &str) {
        #[cfg(debug_assertions)]
        assert_eq!(
            thread::current().id(),
            self.id,
            "{op} called off the thread that owns this graphics context"
        );
        #[cfg(not(debug_assertions))]
        let _ = op;
    }

    /// Whether the calling thread owns this guard (always true in release builds).
    #[inline]
    pub fn is_current(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            thread::current().id() == self.id
        }
        #[cfg(not(debug_assertions))]
        {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn owner_passes_on_creating_thread() {
        let owner = OwnerThread::current();
        owner.check("test");
        assert!(owner.is_current());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn foreign_thread_is_rejected() {
        let owner = OwnerThread::current();
        let result = thread::spawn(move || {
            std::panic::catch_unwind(|| owner.check("reserve")).is_err()
        })
        .join()
        .unwrap();
        assert!(result);
    }
}
