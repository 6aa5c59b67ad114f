//! Bounded announcement queue with latest-wins saturation
//!
//! When an enqueue finds the queue at or above its saturation threshold,
//! every pending announcement is discarded before the new one goes in.
//! Announcements about a scene that has since changed are worse than a gap.

use super::announcement::Announcement;
use super::lock;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// What the worker can take off the queue
#[derive(Debug)]
pub enum Slot {
    Announcement(Announcement),
    /// Wakes a worker parked in `dequeue` so it can exit
    Shutdown,
}

struct Inner {
    items: VecDeque<Slot>,
    closed: bool,
    saturation_drops: u64,
}

/// Bounded FIFO shared between producers and the delivery worker
pub struct AnnouncementQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
    threshold: usize,
}

impl AnnouncementQueue {
    /// Create a closed queue; `reopen` makes it accept announcements
    ///
    /// `threshold` is clamped to `1..=capacity` so the bound always holds.
    pub fn new(capacity: usize, threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity + 1),
                closed: true,
                saturation_drops: 0,
            }),
            ready: Condvar::new(),
            capacity,
            threshold: threshold.clamp(1, capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Add an announcement without waiting on the consumer
    ///
    /// Returns `false` only when the queue has been closed.
    pub fn enqueue(&self, announcement: Announcement) -> bool {
        let mut inner = lock(&self.inner);
        if inner.closed {
            debug!("Queue closed, rejecting: {}", announcement.text());
            return false;
        }

        let pending = Self::count(&inner.items);
        if pending >= self.threshold {
            inner.items.clear();
            inner.saturation_drops += pending as u64;
            debug!("Queue saturated, discarded {} pending announcements", pending);
        }

        inner.items.push_back(Slot::Announcement(announcement));
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Wait up to `timeout` for the next slot
    pub fn dequeue(&self, timeout: Duration) -> Option<Slot> {
        let inner = lock(&self.inner);
        let (mut inner, _) = self
            .ready
            .wait_timeout_while(inner, timeout, |inner| inner.items.is_empty())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.items.pop_front()
    }

    /// Discard every pending announcement, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut inner = lock(&self.inner);
        let cleared = Self::count(&inner.items);
        inner.items.clear();
        cleared
    }

    /// Stop accepting announcements
    pub fn close(&self) {
        lock(&self.inner).closed = true;
    }

    /// Accept announcements again
    pub fn reopen(&self) {
        lock(&self.inner).closed = false;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Queue the shutdown sentinel, even when closed
    pub fn push_shutdown(&self) {
        lock(&self.inner).items.push_back(Slot::Shutdown);
        self.ready.notify_all();
    }

    /// Pending announcements (the sentinel is not counted)
    pub fn len(&self) -> usize {
        Self::count(&lock(&self.inner).items)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an announcement with exactly `text` is still pending
    pub fn contains(&self, text: &str) -> bool {
        lock(&self.inner).items.iter().any(|slot| match slot {
            Slot::Announcement(announcement) => announcement.text() == text,
            Slot::Shutdown => false,
        })
    }

    /// Announcements discarded by the saturation policy so far
    pub fn saturation_drops(&self) -> u64 {
        lock(&self.inner).saturation_drops
    }

    fn count(items: &VecDeque<Slot>) -> usize {
        items
            .iter()
            .filter(|slot| matches!(slot, Slot::Announcement(_)))
            .count()
    }
}
