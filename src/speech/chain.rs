//! Ordered backend chain with per-attempt deadlines and fallback
//!
//! Built once per pipeline start from probe results. Each delivery walks
//! the chain from the top; the first backend that succeeds wins.
//!
//! A delivery runs on its own thread while the caller waits at most the
//! per-attempt timeout for its result. When the timeout elapses the backend
//! is asked to cancel and the chain moves on. The abandoned thread may still
//! run to completion in the background; whatever it returns is discarded.

use super::Backend;
use crate::{AnnouncerError, Result};
use log::{debug, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one trip through the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub success: bool,
    /// Backend that delivered the text, if any
    pub backend: Option<String>,
}

impl Attempt {
    fn failed() -> Self {
        Self {
            success: false,
            backend: None,
        }
    }

    /// Name of the backend that delivered, or `AllBackendsExhausted`
    pub fn into_result(self) -> Result<String> {
        match (self.success, self.backend) {
            (true, Some(backend)) => Ok(backend),
            _ => Err(AnnouncerError::AllBackendsExhausted),
        }
    }
}

/// Probed, priority-ordered set of available backends
pub struct BackendChain {
    backends: Vec<Arc<dyn Backend>>,

    /// Serializes all synthesis; engines are generally not reentrant
    synth_lock: Arc<Mutex<()>>,

    /// Last backend that succeeded, for status reporting only
    current: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BackendChain {
    /// Probe every candidate in priority order and keep the available ones
    ///
    /// `synth_lock` is shared across chains so a chain rebuilt on restart
    /// still excludes deliveries from the one it replaced.
    pub fn probe_all(candidates: &[Arc<dyn Backend>], synth_lock: Arc<Mutex<()>>) -> Self {
        let mut backends = Vec::new();

        for backend in candidates {
            info!("Probing {} speech backend...", backend.name());
            if backend.probe() {
                info!("✓ {} backend available", backend.name());
                backends.push(Arc::clone(backend));
            } else {
                info!("✗ {} backend unavailable", backend.name());
            }
        }

        if backends.is_empty() {
            warn!("No speech backend available; announcements will be accepted and dropped");
        }

        Self {
            backends,
            synth_lock,
            current: Mutex::new(None),
        }
    }

    /// A chain with no backends, used before the first start
    pub fn empty(synth_lock: Arc<Mutex<()>>) -> Self {
        Self {
            backends: Vec::new(),
            synth_lock,
            current: Mutex::new(None),
        }
    }

    /// Names of the available backends, highest priority first
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend that handled the most recent successful delivery
    pub fn current(&self) -> Option<String> {
        lock(&self.current).clone()
    }

    /// Try each backend in order until one delivers `text`
    ///
    /// Every call starts again from the highest-priority backend.
    pub fn attempt(&self, text: &str, per_attempt_timeout: Duration) -> Attempt {
        if self.backends.is_empty() {
            debug!("No backends available, dropping: {}", text);
            return Attempt::failed();
        }

        let _synth = lock(&self.synth_lock);

        for backend in &self.backends {
            if Self::deliver_bounded(backend, text, per_attempt_timeout) {
                let name = backend.name().to_string();
                *lock(&self.current) = Some(name.clone());
                return Attempt {
                    success: true,
                    backend: Some(name),
                };
            }
        }

        warn!("All speech backends failed for: {}", text);
        Attempt::failed()
    }

    /// Run one delivery on a side thread and wait at most `timeout` for it
    fn deliver_bounded(backend: &Arc<dyn Backend>, text: &str, timeout: Duration) -> bool {
        let (tx, rx) = mpsc::channel();
        let deadline = Instant::now() + timeout;
        let worker_backend = Arc::clone(backend);
        let owned_text = text.to_string();

        let spawned = thread::Builder::new()
            .name(format!("deliver-{}", backend.name()))
            .spawn(move || {
                let result = worker_backend.deliver(&owned_text, deadline);
                // Receiver is gone if the attempt was abandoned
                let _ = tx.send(result);
            });

        if let Err(e) = spawned {
            warn!("Failed to start delivery thread for {}: {}", backend.name(), e);
            return false;
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                debug!("{} delivered: {}", backend.name(), text);
                true
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", backend.name(), e);
                false
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} timed out after {:?}, cancelling and falling back",
                    backend.name(),
                    timeout
                );
                backend.cancel();
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("{} delivery thread exited without a result", backend.name());
                false
            }
        }
    }
}
