//! Job slots for the work queue.
//!
//! Every queued job holds one slot from the moment it is enqueued until the
//! worker has run it. When all slots are taken, [`JobSlots::acquire`] polls
//! until one frees up or the wait limit passes, and
//! [`JobSlots::try_acquire`] fails straight away.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{DispatchError, Result};

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Shared, lock-free count of unfinished jobs.
#[derive(Debug, Clone)]
pub struct JobSlots {
    in_use: Arc<AtomicUsize>,
    limit: usize,
    wait: Duration,
}

impl JobSlots {
    pub fn new(limit: usize, wait: Duration) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            limit,
            wait,
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Jobs enqueued but not yet run.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.in_use() >= self.limit
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Result<SlotGuard> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < self.limit).then_some(taken + 1)
            })
            .map_err(|_| DispatchError::BackpressureTimeout)?;

        Ok(SlotGuard {
            slots: self.clone(),
            committed: false,
        })
    }

    /// Take a slot, polling until one frees up or the wait limit passes.
    pub async fn acquire(&self) -> Result<SlotGuard> {
        let deadline = Instant::now() + self.wait;

        loop {
            if let Ok(slot) = self.try_acquire() {
                return Ok(slot);
            }
            if Instant::now() >= deadline {
                return Err(DispatchError::BackpressureTimeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Give back the slots of jobs the worker has finished.
    #[inline]
    pub fn release(&self, jobs: usize) {
        self.in_use.fetch_sub(jobs, Ordering::Release);
    }
}

/// A taken slot.
///
/// Dropping it frees the slot again. Once the job is in the channel,
/// [`SlotGuard::commit`] leaves the slot taken for the worker to release.
#[must_use = "dropping the guard frees the slot"]
pub struct SlotGuard {
    slots: JobSlots,
    committed: bool,
}

impl SlotGuard {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.slots.release(1);
        }
    }
}
