//! The delivery worker: sole consumer of the announcement queue
//!
//! Each cycle waits briefly for an announcement, applies the cooldown,
//! and hands survivors to the backend chain. Failures are logged and the
//! loop carries on; only the stop flag or the shutdown sentinel end it.

use super::queue::Slot;
use super::{lock, Shared};
use crate::speech::BackendChain;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the worker does with an announcement while the cooldown runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownPolicy {
    /// Dequeue anyway and drop what arrives inside the window
    Discard,
    /// Leave announcements queued until the window closes
    Defer,
}

impl std::str::FromStr for CooldownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "defer" => Ok(Self::Defer),
            other => Err(format!("unknown cooldown policy '{}'", other)),
        }
    }
}

/// Minimum spacing between deliveries
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last_delivery: Option<Instant>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_delivery: None,
        }
    }

    /// Time left before another delivery may be attempted
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_delivery {
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        !self.remaining(now).is_zero()
    }

    /// Record a delivery that started at `at`
    pub fn mark(&mut self, at: Instant) {
        self.last_delivery = Some(at);
    }
}

/// Handle to a running worker thread
pub struct WorkerHandle {
    thread: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Shared liveness flag, cleared when the thread exits
    pub fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Ask the worker to exit at its next check
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait up to `grace` for the thread to report that it is running
    pub fn wait_alive(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while !self.is_alive() {
            if self.thread.is_finished() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Wait up to `timeout` for the thread to finish
    ///
    /// On timeout the thread is left detached and `false` is returned.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }

        if self.thread.join().is_err() {
            warn!("Delivery worker panicked");
        }
        true
    }
}

/// Clears the liveness flag however the worker exits
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Start a worker thread consuming `shared.queue` through `chain`
pub(crate) fn spawn(
    shared: Arc<Shared>,
    chain: Arc<BackendChain>,
) -> std::io::Result<WorkerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let alive = Arc::new(AtomicBool::new(false));

    let thread_stop = Arc::clone(&stop);
    let thread_alive = Arc::clone(&alive);
    let thread = thread::Builder::new()
        .name("announcer".to_string())
        .spawn(move || {
            thread_alive.store(true, Ordering::SeqCst);
            let _guard = AliveGuard(thread_alive);
            run(&shared, &chain, &thread_stop);
        })?;

    Ok(WorkerHandle {
        thread,
        stop,
        alive,
    })
}

fn run(shared: &Shared, chain: &BackendChain, stop: &AtomicBool) {
    let settings = &shared.settings;
    info!(
        "Delivery worker started with {} backend(s), cooldown {:?}",
        chain.len(),
        settings.cooldown
    );

    while !stop.load(Ordering::SeqCst) {
        if settings.cooldown_policy == CooldownPolicy::Defer {
            let remaining = lock(&shared.cooldown).remaining(Instant::now());
            if !remaining.is_zero() {
                thread::sleep(remaining.min(settings.poll_interval));
                continue;
            }
        }

        let announcement = match shared.queue.dequeue(settings.poll_interval) {
            None => continue,
            Some(Slot::Shutdown) => break,
            Some(Slot::Announcement(announcement)) => announcement,
        };

        if stop.load(Ordering::SeqCst) {
            debug!("Stopping, dropped: {}", announcement.text());
            break;
        }

        let now = Instant::now();
        if lock(&shared.cooldown).is_active(now) {
            shared.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("In cooldown, skipped: {}", announcement.text());
            continue;
        }

        debug!(
            "Delivering after {:?} in queue: {}",
            now.saturating_duration_since(announcement.enqueued_at()),
            announcement.text()
        );
        if !chain.is_empty() {
            // Failed attempts open the window too
            lock(&shared.cooldown).mark(now);
            *lock(&shared.last_attempted) = Some(announcement.text().to_string());
        }

        match chain
            .attempt(announcement.text(), settings.attempt_timeout)
            .into_result()
        {
            Ok(backend) => {
                shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Delivered through {}", backend);
            }
            Err(e) => {
                shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                if !chain.is_empty() {
                    warn!("Announcement dropped: {}", e);
                }
            }
        }

        thread::sleep(settings.cycle_delay);
    }

    info!("Delivery worker shut down");
}
