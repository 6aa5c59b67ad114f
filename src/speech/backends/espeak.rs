//! Local TTS engine backend using espeak-ng
//!
//! Spawns one espeak-ng process per announcement and waits for it to
//! finish. On WSL with WSLG the PulseAudio server at /mnt/wslg/PulseServer
//! is detected and handed to the process.
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)

use super::ChildSlot;
use crate::platform::{find_program, is_wsl};
use crate::speech::Backend;
use crate::{AnnouncerError, Result};
use log::{debug, error, info, warn};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

const WSLG_PULSE_PATH: &str = "/mnt/wslg/PulseServer";

/// espeak-ng subprocess backend
pub struct EspeakBackend {
    /// Currently running espeak-ng process
    current: ChildSlot,

    /// Path to espeak-ng, found by probe
    espeak_path: Mutex<Option<String>>,

    /// PULSE_SERVER to pass to the process, when auto-detected
    pulse_server: Mutex<Option<String>>,

    /// espeak speed in words per minute
    speed: u16,

    /// espeak amplitude (0-200)
    amplitude: u8,

    /// Voice name for espeak-ng
    voice: String,
}

impl EspeakBackend {
    pub fn new(rate: Option<u8>, volume: Option<u8>, language: &str) -> Self {
        Self {
            current: ChildSlot::default(),
            espeak_path: Mutex::new(None),
            pulse_server: Mutex::new(None),
            speed: Self::rate_to_espeak_speed(rate.unwrap_or(50)),
            amplitude: Self::volume_to_espeak_amplitude(volume.unwrap_or(80)),
            voice: Self::voice_for_language(language).to_string(),
        }
    }

    /// Work out which PulseAudio server espeak-ng should talk to
    ///
    /// `Ok(None)` means the default configuration applies.
    fn detect_pulseaudio() -> Result<Option<String>> {
        if std::env::var("PULSE_SERVER").is_ok() {
            debug!("PULSE_SERVER already set via environment");
            return Ok(None);
        }

        if std::path::Path::new(WSLG_PULSE_PATH).exists() {
            info!("Auto-detected WSLG PulseAudio server at {}", WSLG_PULSE_PATH);
            return Ok(Some(WSLG_PULSE_PATH.to_string()));
        }

        if is_wsl() {
            warn!("WSLG PulseAudio server not found at {}", WSLG_PULSE_PATH);
            warn!("Make sure WSLg is installed and running, or set PULSE_SERVER");
            return Err(AnnouncerError::BackendUnavailable(
                "PulseAudio server not found. Install WSLg or set PULSE_SERVER environment variable."
                    .to_string(),
            ));
        }

        Ok(None)
    }

    /// Convert rate (0-100) to espeak speed (80-450 wpm)
    fn rate_to_espeak_speed(rate: u8) -> u16 {
        80 + (u16::from(rate.min(100)) * 370 / 100)
    }

    /// Convert volume (0-100) to espeak amplitude (0-200)
    fn volume_to_espeak_amplitude(volume: u8) -> u8 {
        ((u16::from(volume.min(100)) * 200) / 100) as u8
    }

    /// espeak-ng voice for a language tag, English when unknown
    fn voice_for_language(language: &str) -> &'static str {
        const VOICES: &[&str] = &[
            "en", "en-us", "en-gb", "es", "fr", "de", "it", "pt", "ru", "hi", "ar", "zh",
        ];

        let wanted = language.trim().to_lowercase();
        VOICES
            .iter()
            .find(|v| **v == wanted)
            .or_else(|| {
                let primary = wanted.split(['-', '_']).next().unwrap_or("");
                VOICES.iter().find(|v| **v == primary)
            })
            .copied()
            .unwrap_or("en")
    }

    fn command(&self, espeak_path: &str, text: &str) -> Command {
        let mut cmd = Command::new(espeak_path);
        cmd.arg("-v").arg(&self.voice);
        cmd.arg("-s").arg(self.speed.to_string());
        cmd.arg("-a").arg(self.amplitude.to_string());
        cmd.arg("--").arg(text);

        if let Some(server) = self
            .pulse_server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
        {
            cmd.env("PULSE_SERVER", server);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd
    }
}

impl Backend for EspeakBackend {
    fn name(&self) -> &str {
        "espeak"
    }

    fn probe(&self) -> bool {
        let pulse_server = match Self::detect_pulseaudio() {
            Ok(server) => server,
            Err(e) => {
                debug!("espeak backend unavailable: {}", e);
                return false;
            }
        };

        let Some(path) = find_program(&[("espeak-ng", "--version"), ("/usr/bin/espeak-ng", "--version")])
        else {
            debug!("espeak-ng not found. Install with: sudo apt install espeak-ng");
            return false;
        };

        debug!("Found espeak-ng at: {}", path);
        *self
            .pulse_server
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = pulse_server;
        *self
            .espeak_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path);
        true
    }

    fn deliver(&self, text: &str, deadline: Instant) -> Result<()> {
        let espeak_path = self
            .espeak_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AnnouncerError::BackendUnavailable("espeak".to_string()))?;

        debug!("Speaking: {}", text);
        let child = self.command(&espeak_path, text).spawn().map_err(|e| {
            error!("Failed to spawn espeak-ng: {}", e);
            AnnouncerError::BackendDelivery(format!("Failed to start espeak-ng: {}", e))
        })?;

        self.current.replace(child);
        self.current.wait(self.name(), deadline)
    }

    fn cancel(&self) {
        debug!("Canceling espeak speech");
        self.current.kill();
    }
}

impl Drop for EspeakBackend {
    fn drop(&mut self) {
        self.current.kill();
    }
}
