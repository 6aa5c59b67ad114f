//! Concrete speech backends

// OS speech service through the tts crate (Speech Dispatcher, AVFoundation, SAPI)
pub mod native;

// Local espeak-ng subprocess, with WSLG PulseAudio detection
pub mod espeak;

// Cloud voice rendered to MP3 and played by a local player
pub mod cloud;

// No-op fallback that leaves speaking to the browser client
pub mod browser;

use crate::{AnnouncerError, Result};
use log::debug;
use std::process::Child;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running speech process is polled for completion
const CHILD_POLL: Duration = Duration::from_millis(20);

/// Holder for the speech process a backend is currently running
///
/// The delivering thread waits on the child while the worker may kill it
/// through [`ChildSlot::kill`], so the lock is only held for single polls.
#[derive(Default)]
pub(crate) struct ChildSlot {
    child: Mutex<Option<Child>>,
}

impl ChildSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `child`, killing whatever was running before
    pub(crate) fn replace(&self, child: Child) {
        let mut slot = self.lock();
        if let Some(mut old) = slot.replace(child) {
            let _ = old.kill();
            let _ = old.wait();
        }
    }

    /// Kill the tracked process, if any
    pub(crate) fn kill(&self) {
        if let Some(mut child) = self.lock().take() {
            debug!("Killing speech process {}", child.id());
            match child.kill() {
                Ok(_) => {
                    let _ = child.wait(); // Clean up zombie
                }
                Err(e) => debug!("Failed to kill speech process: {}", e),
            }
        }
    }

    /// Wait for the tracked process to exit, killing it at `deadline`
    pub(crate) fn wait(&self, backend: &str, deadline: Instant) -> Result<()> {
        let started = Instant::now();
        loop {
            {
                let mut slot = self.lock();
                let Some(child) = slot.as_mut() else {
                    return Err(AnnouncerError::BackendDelivery(format!(
                        "{} speech process was cancelled",
                        backend
                    )));
                };

                if let Some(status) = child.try_wait()? {
                    slot.take();
                    return if status.success() {
                        Ok(())
                    } else {
                        Err(AnnouncerError::BackendDelivery(format!(
                            "{} speech process exited with {}",
                            backend, status
                        )))
                    };
                }
            }

            if Instant::now() >= deadline {
                self.kill();
                return Err(AnnouncerError::BackendTimeout {
                    backend: backend.to_string(),
                    timeout: started.elapsed(),
                });
            }

            thread::sleep(CHILD_POLL);
        }
    }
}
