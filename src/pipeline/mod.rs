//! Asynchronous, rate-limited announcement delivery
//!
//! Producers call [`Announcer::enqueue`] from any thread. A single worker
//! drains the bounded queue, spaces deliveries by the cooldown, and speaks
//! through the backend chain. Nothing here ever blocks a producer on speech.

pub mod announcement;
pub mod lifecycle;
pub mod queue;
pub mod status;
pub mod worker;

pub use announcement::Announcement;
pub use lifecycle::{Announcer, WorkerState};
pub use queue::{AnnouncementQueue, Slot};
pub use status::{ClearReply, EnqueueReply, RestartReply, Status};
pub use worker::{Cooldown, CooldownPolicy};

use crate::{AnnouncerError, Result};
use std::sync::atomic::AtomicU64;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tunables for the delivery pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum pending announcements
    pub capacity: usize,
    /// Pending count at which the queue is cleared before inserting
    pub saturation_threshold: usize,
    /// Longest announcement in characters, ellipsis included
    pub max_text_len: usize,
    /// Minimum spacing between deliveries
    pub cooldown: Duration,
    pub cooldown_policy: CooldownPolicy,
    /// Wall-clock limit for one backend's delivery
    pub attempt_timeout: Duration,
    /// How long the worker waits on an empty queue before re-checking stop
    pub poll_interval: Duration,
    /// Pause after each delivery attempt
    pub cycle_delay: Duration,
    /// How long `start` waits for the worker to come up
    pub start_grace: Duration,
    /// How long `stop` waits for the worker to exit
    pub stop_timeout: Duration,
    /// Pause between stop and start on restart
    pub restart_settle: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            saturation_threshold: 9,
            max_text_len: 200,
            cooldown: Duration::from_millis(1500),
            cooldown_policy: CooldownPolicy::Discard,
            attempt_timeout: Duration::from_secs(8),
            poll_interval: Duration::from_secs(1),
            cycle_delay: Duration::from_millis(50),
            start_grace: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(3),
            restart_settle: Duration::from_millis(200),
        }
    }
}

impl PipelineSettings {
    /// Reject settings that would break the queue bound or hang the worker
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(AnnouncerError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.saturation_threshold == 0 || self.saturation_threshold > self.capacity {
            return Err(AnnouncerError::Config(format!(
                "saturation threshold must be between 1 and capacity ({}), got {}",
                self.capacity, self.saturation_threshold
            )));
        }
        if self.max_text_len < 4 {
            return Err(AnnouncerError::Config(
                "max text length must leave room for an ellipsis".to_string(),
            ));
        }
        for (name, value) in [
            ("attempt timeout", self.attempt_timeout),
            ("poll interval", self.poll_interval),
            ("start grace", self.start_grace),
            ("stop timeout", self.stop_timeout),
        ] {
            if value.is_zero() {
                return Err(AnnouncerError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}

/// Delivery counters since the announcer was created
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
}

/// State the announcer shares with its worker
pub(crate) struct Shared {
    pub settings: PipelineSettings,
    pub queue: AnnouncementQueue,
    pub cooldown: Mutex<Cooldown>,
    /// Text of the most recent delivery attempt through a non-empty chain
    pub last_attempted: Mutex<Option<String>>,
    pub stats: Stats,
}

impl Shared {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            queue: AnnouncementQueue::new(settings.capacity, settings.saturation_threshold),
            cooldown: Mutex::new(Cooldown::new(settings.cooldown)),
            last_attempted: Mutex::new(None),
            stats: Stats::default(),
            settings,
        }
    }
}
