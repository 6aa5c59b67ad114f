//! Native TTS backend using the tts crate
//!
//! The `tts` crate gives a unified interface to:
//! - Speech Dispatcher on Linux (via native bindings)
//! - AVFoundation on macOS/iOS (via native bindings)
//! - WinRT/SAPI on Windows
//!
//! The engine handle is created on the first successful probe and reused.

use crate::speech::Backend;
use crate::{AnnouncerError, Result};
use log::{debug, error, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tts::Tts as TtsCrate;

/// How often the engine is asked whether it is still speaking
const SPEAKING_POLL: Duration = Duration::from_millis(25);

/// OS speech service backend
pub struct NativeBackend {
    /// Engine handle, `None` until a probe succeeds
    tts: Mutex<Option<TtsCrate>>,

    /// Configured rate setting (0-100)
    rate: Option<u8>,

    /// Configured volume setting (0-100)
    volume: Option<u8>,
}

impl NativeBackend {
    pub fn new(rate: Option<u8>, volume: Option<u8>) -> Self {
        Self {
            tts: Mutex::new(None),
            rate,
            volume,
        }
    }

    fn engine(&self) -> MutexGuard<'_, Option<TtsCrate>> {
        self.tts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map a 0-100 rate onto the engine's own range, 50 being its normal rate
    fn convert_rate(rate: u8, min: f32, normal: f32, max: f32) -> f32 {
        let rate = f32::from(rate.min(100));
        if rate <= 50.0 {
            min + (normal - min) * rate / 50.0
        } else {
            normal + (max - normal) * (rate - 50.0) / 50.0
        }
    }

    /// Convert volume (0-100) to tts crate volume (0.0-1.0)
    fn convert_volume(volume: u8) -> f32 {
        f32::from(volume.min(100)) / 100.0
    }

    fn apply_settings(&self, tts: &mut TtsCrate) {
        let features = tts.supported_features();

        if let Some(rate) = self.rate {
            if features.rate {
                let converted =
                    Self::convert_rate(rate, tts.min_rate(), tts.normal_rate(), tts.max_rate());
                if let Err(e) = tts.set_rate(converted) {
                    warn!("Failed to set native speech rate: {}", e);
                }
            } else {
                warn!("Rate control not supported on this platform");
            }
        }

        if let Some(volume) = self.volume {
            if features.volume {
                if let Err(e) = tts.set_volume(Self::convert_volume(volume)) {
                    warn!("Failed to set native speech volume: {}", e);
                }
            } else {
                warn!("Volume control not supported on this platform");
            }
        }
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn probe(&self) -> bool {
        let mut engine = self.engine();
        if engine.is_some() {
            return true;
        }

        debug!("Creating native TTS engine");
        match TtsCrate::default() {
            Ok(mut tts) => {
                self.apply_settings(&mut tts);
                *engine = Some(tts);
                true
            }
            Err(e) => {
                debug!("Native TTS unavailable: {}", e);
                false
            }
        }
    }

    fn deliver(&self, text: &str, deadline: Instant) -> Result<()> {
        // Clone the handle so cancel() can take the lock while we wait
        let mut tts = self
            .engine()
            .clone()
            .ok_or_else(|| AnnouncerError::BackendUnavailable("native".to_string()))?;

        debug!("Speaking: {}", text);
        tts.speak(text, false).map_err(|e| {
            error!("Failed to speak: {}", e);
            AnnouncerError::BackendDelivery(format!("native speak failed: {}", e))
        })?;

        if !tts.supported_features().is_speaking {
            // No way to observe completion; queued with the engine is the best we get
            return Ok(());
        }

        let started = Instant::now();
        loop {
            match tts.is_speaking() {
                Ok(false) => return Ok(()),
                Ok(true) => {}
                Err(e) => {
                    return Err(AnnouncerError::BackendDelivery(format!(
                        "native speech state unknown: {}",
                        e
                    )))
                }
            }

            if Instant::now() >= deadline {
                let _ = tts.stop();
                return Err(AnnouncerError::BackendTimeout {
                    backend: "native".to_string(),
                    timeout: started.elapsed(),
                });
            }

            thread::sleep(SPEAKING_POLL);
        }
    }

    fn cancel(&self) {
        debug!("Canceling native speech");
        if let Some(tts) = self.engine().as_mut() {
            if let Err(e) = tts.stop() {
                error!("Failed to cancel speech: {}", e);
            }
        }
    }
}
