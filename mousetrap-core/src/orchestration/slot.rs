//! Single in-process scan slot (the Idle/Busy flag).
//!
//! Acquisition is a synchronous compare-and-set so two ticks in the same
//! process can never both observe Idle and both attempt a claim. The guard
//! is moved into the unit of work and frees the slot when dropped, whether
//! the scan finished, failed, or the task was aborted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mousetrap_model::Task;
use tokio::sync::watch;

struct SlotInner {
    busy: AtomicBool,
    current: watch::Sender<Option<Task>>,
}

#[derive(Clone)]
pub struct ScanSlot {
    inner: Arc<SlotInner>,
}

impl fmt::Debug for ScanSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSlot")
            .field("busy", &self.is_busy())
            .field(
                "current",
                &self
                    .inner
                    .current
                    .borrow()
                    .as_ref()
                    .map(|task| task.file_path.clone()),
            )
            .finish()
    }
}

impl Default for ScanSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSlot {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(SlotInner {
                busy: AtomicBool::new(false),
                current,
            }),
        }
    }

    /// Mark the slot Busy. Returns `None` when a scan already holds it.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard {
                inner: Arc::clone(&self.inner),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// The task currently being scanned by this process.
    pub fn current(&self) -> Option<Task> {
        self.inner.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Task>> {
        self.inner.current.subscribe()
    }
}

/// Proof that this process holds the slot.
pub struct SlotGuard {
    inner: Arc<SlotInner>,
}

impl fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGuard").finish_non_exhaustive()
    }
}

impl SlotGuard {
    /// Publish the claimed task to status readers and shutdown.
    pub fn publish(&self, task: &Task) {
        self.inner.current.send_replace(Some(task.clone()));
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.current.send_replace(None);
        self.inner.busy.store(false, Ordering::Release);
    }
}
