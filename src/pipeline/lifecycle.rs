//! The announcer service: queue, backend chain and worker lifecycle
//!
//! One [`Announcer`] owns everything the pipeline needs and is shared by
//! reference (usually an `Arc`) with every producer. Lifecycle operations
//! are serialized; `enqueue` and `status` never wait on them.

use super::status::{ClearReply, Status};
use super::worker::{self, WorkerHandle};
use super::{lock, Announcement, PipelineSettings, Shared};
use crate::compose::{Composer, Detection};
use crate::speech::backends::browser::BrowserBackend;
use crate::speech::{Backend, BackendChain, BackendSet};
use crate::{AnnouncerError, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of the delivery worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// What status readers see, swapped as a unit by lifecycle operations
struct View {
    state: WorkerState,
    chain: Arc<BackendChain>,
    alive: Option<Arc<AtomicBool>>,
}

/// Rate-limited announcement service
pub struct Announcer {
    shared: Arc<Shared>,

    /// Every configured backend, probed again on each start
    candidates: Vec<Arc<dyn Backend>>,

    /// Browser fallback whose outbox the client drains
    delegate: Option<Arc<BrowserBackend>>,

    /// Serializes synthesis across chains, including ones left behind by a restart
    synth_lock: Arc<Mutex<()>>,

    composer: Composer,

    /// Accept and drop announcements instead of queueing them
    muted: AtomicBool,

    /// Running worker; holding this lock serializes start/stop/restart
    control: Mutex<Option<WorkerHandle>>,

    view: RwLock<View>,
}

impl Announcer {
    /// Create a stopped announcer over `candidates`, highest priority first
    pub fn new(settings: PipelineSettings, candidates: Vec<Arc<dyn Backend>>) -> Result<Self> {
        settings.validate()?;
        let synth_lock = Arc::new(Mutex::new(()));

        Ok(Self {
            shared: Arc::new(Shared::new(settings)),
            candidates,
            delegate: None,
            view: RwLock::new(View {
                state: WorkerState::Stopped,
                chain: Arc::new(BackendChain::empty(Arc::clone(&synth_lock))),
                alive: None,
            }),
            synth_lock,
            composer: Composer::default(),
            muted: AtomicBool::new(false),
            control: Mutex::new(None),
        })
    }

    /// Create a stopped announcer from configured backends
    pub fn from_backends(settings: PipelineSettings, backends: BackendSet) -> Result<Self> {
        let mut announcer = Self::new(settings, backends.candidates)?;
        announcer.delegate = backends.delegate;
        Ok(announcer)
    }

    /// Use `composer` to turn detection batches into sentences
    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    /// Silence or unsilence announcements; muted enqueues succeed and are dropped
    pub fn set_muted(&self, muted: bool) {
        info!("Announcements {}", if muted { "muted" } else { "unmuted" });
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    fn view(&self) -> RwLockReadGuard<'_, View> {
        self.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn view_mut(&self) -> RwLockWriteGuard<'_, View> {
        self.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        debug!("Announcer state -> {:?}", state);
        self.view_mut().state = state;
    }

    pub fn state(&self) -> WorkerState {
        self.view().state
    }

    /// Start the worker; a no-op returning `true` when already running
    ///
    /// Re-probes every backend. Returns `false` when the worker could not be
    /// confirmed alive, or when no backend is available (the worker then
    /// runs anyway, accepting and dropping announcements).
    pub fn start(&self) -> bool {
        let mut control = lock(&self.control);
        if let Some(current) = control.as_ref() {
            if current.is_alive() && self.state() == WorkerState::Running {
                debug!("Announcer already running");
                return true;
            }
        }

        if let Some(stale) = control.take() {
            warn!("Replacing a delivery worker that exited on its own");
            stale.signal_stop();
        }

        self.set_state(WorkerState::Starting);
        let chain = Arc::new(BackendChain::probe_all(
            &self.candidates,
            Arc::clone(&self.synth_lock),
        ));

        let cleared = self.shared.queue.clear();
        if cleared > 0 {
            debug!("Discarded {} stale announcements on start", cleared);
        }
        // A fresh start announces the current scene again
        *lock(&self.shared.last_attempted) = None;
        self.shared.queue.reopen();

        let handle = match worker::spawn(Arc::clone(&self.shared), Arc::clone(&chain)) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn delivery worker: {}", e);
                self.fail_start(chain);
                return false;
            }
        };

        let grace = self.shared.settings.start_grace;
        if !handle.wait_alive(grace) {
            error!("Delivery worker not alive after {:?}", grace);
            handle.signal_stop();
            self.fail_start(chain);
            return false;
        }

        let available = !chain.is_empty();
        info!(
            "Announcer running with backends [{}]",
            chain.names().join(", ")
        );

        {
            let mut view = self.view_mut();
            view.state = WorkerState::Running;
            view.chain = chain;
            view.alive = Some(handle.alive_flag());
        }
        *control = Some(handle);

        available
    }

    fn fail_start(&self, chain: Arc<BackendChain>) {
        self.shared.queue.close();
        self.shared.queue.push_shutdown();
        let mut view = self.view_mut();
        view.state = WorkerState::Stopped;
        view.chain = chain;
        view.alive = None;
    }

    /// Stop the worker, waiting at most `timeout` for it to exit
    ///
    /// Idempotent. Pending announcements are discarded and further
    /// enqueues rejected. A worker that overruns `timeout` is left to
    /// finish in the background and `UngracefulShutdown` is returned;
    /// the announcer is considered stopped either way.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        let mut control = lock(&self.control);
        let Some(handle) = control.take() else {
            self.shared.queue.close();
            self.set_state(WorkerState::Stopped);
            return Ok(());
        };

        self.set_state(WorkerState::Stopping);
        handle.signal_stop();
        let cleared = self.shared.queue.clear();
        self.shared.queue.close();
        self.shared.queue.push_shutdown();
        debug!("Stopping delivery worker, discarded {} pending", cleared);

        let started = Instant::now();
        let graceful = handle.join_timeout(timeout);

        {
            let mut view = self.view_mut();
            view.state = WorkerState::Stopped;
            view.alive = None;
        }

        if graceful {
            info!("Delivery worker stopped in {:?}", started.elapsed());
            Ok(())
        } else {
            warn!(
                "Delivery worker still busy after {:?}, leaving it to finish",
                timeout
            );
            Err(AnnouncerError::UngracefulShutdown(timeout))
        }
    }

    /// Stop, settle, and start again with freshly probed backends
    pub fn restart(&self) -> bool {
        let settings = &self.shared.settings;
        if let Err(e) = self.stop(settings.stop_timeout) {
            warn!("Restart continuing after: {}", e);
        }
        thread::sleep(settings.restart_settle);
        self.start()
    }

    /// Queue `text` for delivery without waiting on speech
    ///
    /// Returns `false` when the announcer is stopped or `text` is blank.
    pub fn enqueue(&self, text: &str) -> bool {
        match Announcement::new(text, self.shared.settings.max_text_len) {
            Some(announcement) => self.push(announcement),
            None => {
                debug!("Ignoring empty announcement");
                false
            }
        }
    }

    fn push(&self, announcement: Announcement) -> bool {
        if self.is_muted() {
            if self.shared.queue.is_closed() {
                return false;
            }
            debug!("Muted, dropping: {}", announcement.text());
            return true;
        }
        self.shared.queue.enqueue(announcement)
    }

    /// Compose a detection batch into one sentence and queue it
    ///
    /// A sentence identical to the last one the worker attempted, or to
    /// one still pending, is not queued again. Returns `false` when there
    /// was nothing new to say or the queue rejected it.
    pub fn announce_detections(&self, detections: &[Detection]) -> bool {
        let Some(announcement) = self
            .composer
            .compose(detections)
            .and_then(|sentence| Announcement::new(&sentence, self.shared.settings.max_text_len))
        else {
            return false;
        };

        let text = announcement.text();
        let repeated = lock(&self.shared.last_attempted).as_deref() == Some(text)
            || self.shared.queue.contains(text);
        if repeated {
            debug!("Scene unchanged, not repeating: {}", text);
            return false;
        }
        self.push(announcement)
    }

    /// Discard every pending announcement
    pub fn clear_queue(&self) -> ClearReply {
        let cleared_count = self.shared.queue.clear();
        info!("Cleared {} pending announcements", cleared_count);
        ClearReply { cleared_count }
    }

    /// Drain announcements handed to the browser fallback
    pub fn take_delegated(&self) -> Vec<String> {
        self.delegate
            .as_ref()
            .map(|browser| browser.take())
            .unwrap_or_default()
    }

    pub fn status(&self) -> Status {
        let shared = &self.shared;
        let cooldown_remaining = lock(&shared.cooldown).remaining(Instant::now());
        let view = self.view();

        Status {
            queue_size: shared.queue.len(),
            current_backend: view.chain.current(),
            cooldown_remaining_ms: cooldown_remaining.as_millis() as u64,
            worker_alive: view
                .alive
                .as_ref()
                .map_or(false, |alive| alive.load(Ordering::SeqCst)),
            available_backends: view.chain.names(),
            state: view.state,
            delivered: shared.stats.delivered.load(Ordering::Relaxed),
            failed: shared.stats.failed.load(Ordering::Relaxed),
            skipped: shared.stats.skipped.load(Ordering::Relaxed),
            dropped: shared.queue.saturation_drops(),
            muted: self.is_muted(),
        }
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        let timeout = self.shared.settings.stop_timeout;
        if let Err(e) = self.stop(timeout) {
            debug!("Announcer dropped: {}", e);
        }
    }
}
