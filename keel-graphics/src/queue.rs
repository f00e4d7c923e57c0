//! Submission queues and their monotonic fences.

use crate::{traits::CommandDevice as _, BackendDevice, GraphicsError};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum QueueType {
    Graphics = 0,
    Compute = 1,
    Copy = 2,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [Self::Graphics, Self::Compute, Self::Copy];

    /// Fence values of each queue live in their own range, tagged in the top byte.
    pub fn fence_base(self) -> u64 {
        (self as u64) << 56
    }
}

/// A device queue.
///
/// Every call to [`Queue::signal`] hands out the next fence value. Work is
/// executed in submission order, so once a value completes, every smaller
/// value of the same queue has completed too.
pub struct Queue {
    ty: QueueType,
    next_fence_value: AtomicU64,
    last_completed_fence_value: AtomicU64,
    hal: Arc<BackendDevice>,
}

impl Queue {
    pub(crate) fn new(ty: QueueType, hal: Arc<BackendDevice>) -> Self {
        Self {
            ty,
            next_fence_value: AtomicU64::new(ty.fence_base() | 1),
            last_completed_fence_value: AtomicU64::new(ty.fence_base()),
            hal,
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    pub fn next_fence_value(&self) -> u64 {
        self.next_fence_value.load(Ordering::Acquire)
    }

    /// Cached lower bound of the completed fence value.
    pub fn last_completed_fence_value(&self) -> u64 {
        self.last_completed_fence_value.load(Ordering::Acquire)
    }

    /// Signals the next fence value after all work submitted so far.
    pub fn signal(&self) -> u64 {
        let value = self.next_fence_value.fetch_add(1, Ordering::AcqRel);
        self.hal.signal(self.ty, value);
        value
    }

    pub fn is_fence_complete(&self, value: u64) -> bool {
        if value > self.last_completed_fence_value() {
            self.refresh();
        }
        value <= self.last_completed_fence_value()
    }

    /// Blocks the calling thread until `value` completes.
    ///
    /// There is no timeout: a hung GPU blocks forever. A failed wait leaves
    /// the completed value where the backend reports it.
    pub fn wait_for_fence(&self, value: u64) -> Result<(), GraphicsError> {
        if self.is_fence_complete(value) {
            return Ok(());
        }
        log::trace!("Waiting for {:?} fence {:#x}", self.ty, value);
        let result = self.hal.wait(self.ty, value);
        self.refresh();
        result
    }

    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        let value = self.signal();
        self.wait_for_fence(value)
    }

    fn refresh(&self) {
        let completed = self.hal.completed_value(self.ty);
        self.last_completed_fence_value
            .fetch_max(completed, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("ty", &self.ty)
            .field("next_fence_value", &self.next_fence_value())
            .field("last_completed_fence_value", &self.last_completed_fence_value())
            .finish()
    }
}
