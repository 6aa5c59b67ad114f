//! Cloud voice backend
//!
//! Fetches an MP3 rendering of the text from an HTTP speech endpoint and
//! plays it with the first local player found at probe time. The endpoint
//! receives the text in `q` and the language in `tl`, the way the public
//! translate TTS endpoint expects them.

use super::ChildSlot;
use crate::platform::find_program;
use crate::speech::Backend;
use crate::{AnnouncerError, Result};
use log::{debug, error};
use reqwest::blocking::Client;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Known players and the arguments that make them play a file and exit quietly
const PLAYERS: &[(&str, &str, &[&str])] = &[
    ("mpg123", "--version", &["-q"]),
    ("ffplay", "-version", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("mpv", "--version", &["--no-video", "--really-quiet"]),
];

/// HTTP speech service plus local MP3 player
pub struct CloudBackend {
    client: Client,
    endpoint: reqwest::Url,
    language: String,

    /// Players allowed by configuration, in preference order
    allowed_players: Vec<String>,

    /// Player chosen by probe
    player: Mutex<Option<String>>,

    /// Currently running player process
    current: ChildSlot,
}

impl CloudBackend {
    pub fn new(endpoint: &str, language: &str, allowed_players: Vec<String>) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            AnnouncerError::Config(format!("Invalid cloud endpoint '{}': {}", endpoint, e))
        })?;

        let client = Client::builder()
            .user_agent(concat!("annunciator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            language: language.to_string(),
            allowed_players,
            player: Mutex::new(None),
            current: ChildSlot::default(),
        })
    }

    /// Player arguments for a known player name
    fn player_args(player: &str) -> &'static [&'static str] {
        PLAYERS
            .iter()
            .find(|(name, _, _)| *name == player)
            .map(|(_, _, args)| *args)
            .unwrap_or(&[])
    }

    /// Candidate players in configured order, limited to ones we know how to drive
    fn player_candidates(&self) -> Vec<(&'static str, &'static str)> {
        self.allowed_players
            .iter()
            .filter_map(|wanted| {
                PLAYERS
                    .iter()
                    .find(|(name, _, _)| name == wanted)
                    .map(|(name, version_arg, _)| (*name, *version_arg))
            })
            .collect()
    }

    /// Download the rendered speech for `text`
    fn fetch(&self, text: &str, deadline: Instant) -> Result<Vec<u8>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AnnouncerError::BackendTimeout {
                backend: self.name().to_string(),
                timeout: remaining,
            });
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.language.as_str()),
                ("q", text),
            ])
            .timeout(remaining)
            .send()?
            .error_for_status()?;

        let audio = response.bytes()?;
        if audio.is_empty() {
            return Err(AnnouncerError::BackendDelivery(
                "cloud speech service returned no audio".to_string(),
            ));
        }

        debug!("Fetched {} bytes of speech audio", audio.len());
        Ok(audio.to_vec())
    }
}

impl Backend for CloudBackend {
    fn name(&self) -> &str {
        "cloud"
    }

    fn probe(&self) -> bool {
        match find_program(&self.player_candidates()) {
            Some(player) => {
                debug!("Cloud voice will play through {}", player);
                *self.player.lock().unwrap_or_else(PoisonError::into_inner) = Some(player);
                true
            }
            None => {
                debug!(
                    "No MP3 player found for cloud voice (tried: {})",
                    self.allowed_players.join(", ")
                );
                false
            }
        }
    }

    fn deliver(&self, text: &str, deadline: Instant) -> Result<()> {
        let player = self
            .player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AnnouncerError::BackendUnavailable("cloud".to_string()))?;

        let audio = self.fetch(text, deadline)?;

        // Kept alive until playback ends; removed on drop
        let mut file = tempfile::Builder::new()
            .prefix("annunciator-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;

        let child = Command::new(&player)
            .args(Self::player_args(&player))
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {}: {}", player, e);
                AnnouncerError::BackendDelivery(format!("Failed to start {}: {}", player, e))
            })?;

        self.current.replace(child);
        self.current.wait(self.name(), deadline)
    }

    fn cancel(&self) {
        debug!("Canceling cloud playback");
        self.current.kill();
    }
}

impl Drop for CloudBackend {
    fn drop(&mut self) {
        self.current.kill();
    }
}
