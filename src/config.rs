//! Configuration management
//!
//! Settings live in an INI file (`~/.annunciator.cfg` by default), created
//! with defaults on first run. Missing keys fall back to the defaults below.

use crate::compose::Composer;
use crate::pipeline::{CooldownPolicy, PipelineSettings};
use crate::{AnnouncerError, Result};
use ini::Ini;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BACKENDS: &str = "native, espeak, cloud, browser";
const DEFAULT_CLOUD_ENDPOINT: &str = "https://translate.google.com/translate_tts";
const DEFAULT_PLAYERS: &str = "mpg123, ffplay, mpv";
const DEFAULT_LABELS: &str = "person, car, bus, bicycle, motorcycle, dog, cat, bird, horse, \
     chair, couch, bed, dining table, toilet, bottle, cup, wine glass, bowl, book, laptop, \
     cell phone, tv, remote, door, stairs, traffic light, stop sign";

/// Application configuration
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path
    path: PathBuf,
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| AnnouncerError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default at {:?}", path);
            let default = Self::default_config();
            default
                .write_to_file(path)
                .map_err(|e| AnnouncerError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: path.to_path_buf(),
        })
    }

    /// Parse configuration text without touching the filesystem
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| AnnouncerError::IniParse(format!("Failed to parse config: {}", e)))?;
        Ok(Self {
            ini,
            path: PathBuf::new(),
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| AnnouncerError::Config(format!("Failed to save config: {}", e)))
    }

    /// Default config file path (~/.annunciator.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".annunciator.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let defaults = PipelineSettings::default();
        let mut ini = Ini::new();

        ini.with_section(Some("queue"))
            .set("capacity", defaults.capacity.to_string())
            .set("saturation_threshold", defaults.saturation_threshold.to_string())
            .set("max_text_len", defaults.max_text_len.to_string());

        ini.with_section(Some("delivery"))
            .set("cooldown_ms", millis(defaults.cooldown))
            .set("cooldown_policy", "discard")
            .set("attempt_timeout_ms", millis(defaults.attempt_timeout))
            .set("poll_interval_ms", millis(defaults.poll_interval))
            .set("cycle_delay_ms", millis(defaults.cycle_delay));

        ini.with_section(Some("lifecycle"))
            .set("start_grace_ms", millis(defaults.start_grace))
            .set("stop_timeout_ms", millis(defaults.stop_timeout))
            .set("restart_settle_ms", millis(defaults.restart_settle));

        ini.with_section(Some("backends"))
            .set("order", DEFAULT_BACKENDS);

        ini.with_section(Some("voice"))
            .set("rate", "50")
            .set("volume", "80")
            .set("language", "en")
            .set("mute", "false");

        ini.with_section(Some("cloud"))
            .set("endpoint", DEFAULT_CLOUD_ENDPOINT)
            .set("players", DEFAULT_PLAYERS);

        ini.with_section(Some("detection"))
            .set("min_confidence", "0.5")
            .set("labels", DEFAULT_LABELS);

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Comma-separated list, empty entries removed
    pub fn get_list(&self, section: &str, key: &str, default: &str) -> Vec<String> {
        self.get_string(section, key, default)
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }

    fn get_usize(&self, section: &str, key: &str, default: usize) -> Result<usize> {
        let value = self.get_int(section, key, default as i64);
        usize::try_from(value).map_err(|_| {
            AnnouncerError::Config(format!("[{}] {} must not be negative", section, key))
        })
    }

    fn get_duration_ms(&self, section: &str, key: &str, default: Duration) -> Result<Duration> {
        let value = self.get_int(section, key, default.as_millis() as i64);
        u64::try_from(value)
            .map(Duration::from_millis)
            .map_err(|_| AnnouncerError::Config(format!("[{}] {} must not be negative", section, key)))
    }

    /// Validated pipeline tunables
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let defaults = PipelineSettings::default();

        let capacity = self.get_usize("queue", "capacity", defaults.capacity)?;
        let saturation_threshold = self.get_usize(
            "queue",
            "saturation_threshold",
            capacity.saturating_sub(1).max(1),
        )?;

        let policy_text = self.get_string("delivery", "cooldown_policy", "discard");
        let cooldown_policy = policy_text
            .parse::<CooldownPolicy>()
            .map_err(AnnouncerError::Config)?;

        let settings = PipelineSettings {
            capacity,
            saturation_threshold,
            max_text_len: self.get_usize("queue", "max_text_len", defaults.max_text_len)?,
            cooldown: self.get_duration_ms("delivery", "cooldown_ms", defaults.cooldown)?,
            cooldown_policy,
            attempt_timeout: self.get_duration_ms(
                "delivery",
                "attempt_timeout_ms",
                defaults.attempt_timeout,
            )?,
            poll_interval: self.get_duration_ms(
                "delivery",
                "poll_interval_ms",
                defaults.poll_interval,
            )?,
            cycle_delay: self.get_duration_ms("delivery", "cycle_delay_ms", defaults.cycle_delay)?,
            start_grace: self.get_duration_ms("lifecycle", "start_grace_ms", defaults.start_grace)?,
            stop_timeout: self.get_duration_ms(
                "lifecycle",
                "stop_timeout_ms",
                defaults.stop_timeout,
            )?,
            restart_settle: self.get_duration_ms(
                "lifecycle",
                "restart_settle_ms",
                defaults.restart_settle,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Backend names in priority order
    pub fn backend_order(&self) -> Vec<String> {
        self.get_list("backends", "order", DEFAULT_BACKENDS)
            .into_iter()
            .map(|name| name.to_lowercase())
            .collect()
    }

    /// Speech rate (0-100)
    pub fn rate(&self) -> Option<u8> {
        self.get_int("voice", "rate", -1)
            .try_into()
            .ok()
            .filter(|&r| r <= 100)
    }

    /// Speech volume (0-100)
    pub fn volume(&self) -> Option<u8> {
        self.get_int("voice", "volume", -1)
            .try_into()
            .ok()
            .filter(|&v| v <= 100)
    }

    /// Start with announcements silenced
    pub fn mute(&self) -> bool {
        self.get_bool("voice", "mute", false)
    }

    /// Language tag for backends that support more than one
    pub fn language(&self) -> String {
        self.get_string("voice", "language", "en")
    }

    pub fn cloud_endpoint(&self) -> String {
        self.get_string("cloud", "endpoint", DEFAULT_CLOUD_ENDPOINT)
    }

    /// MP3 players the cloud backend may use, in preference order
    pub fn cloud_players(&self) -> Vec<String> {
        self.get_list("cloud", "players", DEFAULT_PLAYERS)
    }

    /// Detections below this confidence are never announced
    pub fn min_confidence(&self) -> f32 {
        let value = self.get_float("detection", "min_confidence", 0.5);
        if (0.0..=1.0).contains(&value) {
            value
        } else {
            warn!("min_confidence {} out of range, using 0.5", value);
            0.5
        }
    }

    /// Labels worth announcing; `None` when the list is empty (announce all)
    pub fn labels(&self) -> Option<HashSet<String>> {
        let labels = self.get_list("detection", "labels", DEFAULT_LABELS);
        if labels.is_empty() {
            None
        } else {
            Some(labels.into_iter().collect())
        }
    }

    /// Sentence composer configured from `[detection]`
    pub fn composer(&self) -> Composer {
        Composer::new(self.min_confidence(), self.labels())
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}
