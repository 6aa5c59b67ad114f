//! Shared test utilities

#![allow(dead_code)]

use annunciator::pipeline::{CooldownPolicy, PipelineSettings};
use annunciator::speech::Backend;
use annunciator::{AnnouncerError, Announcer, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How a scripted backend answers a delivery
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Take this long, then succeed
    Succeed(Duration),
    Fail,
    /// Block until cancelled (or a few seconds pass)
    Hang,
}

/// One recorded delivery call
#[derive(Debug, Clone)]
pub struct Call {
    pub backend: String,
    pub text: String,
    pub at: Instant,
}

/// Deliveries seen by every backend sharing it, in call order
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.text).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn record(&self, backend: &str, text: &str) {
        self.0.lock().unwrap().push(Call {
            backend: backend.to_string(),
            text: text.to_string(),
            at: Instant::now(),
        });
    }
}

/// Backend with scripted availability and behavior
pub struct ScriptedBackend {
    name: String,
    available: AtomicBool,
    behavior: Behavior,
    cancelled: AtomicBool,
    log: CallLog,
}

impl ScriptedBackend {
    pub fn new(name: &str, behavior: Behavior, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            available: AtomicBool::new(true),
            behavior,
            cancelled: AtomicBool::new(false),
            log: log.clone(),
        })
    }

    pub fn unavailable(name: &str, log: &CallLog) -> Arc<Self> {
        let backend = Self::new(name, Behavior::Succeed(Duration::ZERO), log);
        backend.set_available(false);
        backend
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn deliver(&self, text: &str, _deadline: Instant) -> Result<()> {
        self.log.record(&self.name, text);
        match self.behavior {
            Behavior::Succeed(delay) => {
                thread::sleep(delay);
                Ok(())
            }
            Behavior::Fail => Err(AnnouncerError::BackendDelivery(format!(
                "{} refused",
                self.name
            ))),
            Behavior::Hang => {
                let give_up = Instant::now() + Duration::from_secs(3);
                while !self.cancelled.load(Ordering::SeqCst) && Instant::now() < give_up {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(AnnouncerError::BackendDelivery("cancelled".to_string()))
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Settings scaled down so timing tests finish quickly
pub fn fast_settings(cooldown: Duration, policy: CooldownPolicy) -> PipelineSettings {
    PipelineSettings {
        cooldown,
        cooldown_policy: policy,
        attempt_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        cycle_delay: Duration::from_millis(1),
        start_grace: Duration::from_millis(500),
        stop_timeout: Duration::from_secs(2),
        restart_settle: Duration::from_millis(10),
        ..PipelineSettings::default()
    }
}

/// Announcer over scripted backends, highest priority first
pub fn announcer(settings: PipelineSettings, backends: &[Arc<ScriptedBackend>]) -> Announcer {
    let candidates: Vec<Arc<dyn Backend>> = backends
        .iter()
        .map(|b| Arc::clone(b) as Arc<dyn Backend>)
        .collect();
    Announcer::new(settings, candidates).expect("valid settings")
}

/// Poll `condition` for up to three seconds
pub fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
