//! Speech backend abstraction
//!
//! Every way of turning text into sound implements [`Backend`]. The
//! delivery chain only ever talks to backends through this trait.

use super::backends::browser::BrowserBackend;
use super::backends::cloud::CloudBackend;
use super::backends::espeak::EspeakBackend;
use super::backends::native::NativeBackend;
use crate::config::Config;
use crate::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Capability contract for a speech backend
///
/// Methods take `&self` because a delivery may still be running on a side
/// thread when the worker asks the backend to cancel it.
pub trait Backend: Send + Sync {
    /// Short identifier reported in status and logs
    fn name(&self) -> &str;

    /// Check whether the backend can speak right now
    ///
    /// Called once per pipeline start. May acquire resources (engine
    /// handles, program paths) that later deliveries reuse.
    fn probe(&self) -> bool;

    /// Speak `text`, returning once it has been rendered
    ///
    /// Implementations should give up at `deadline`, but the chain does not
    /// rely on it: a delivery that overruns is abandoned regardless.
    fn deliver(&self, text: &str, deadline: Instant) -> Result<()>;

    /// Best-effort stop of an in-flight delivery
    fn cancel(&self);
}

/// Backends built from configuration, in priority order
pub struct BackendSet {
    /// Candidates to probe, highest priority first
    pub candidates: Vec<Arc<dyn Backend>>,

    /// Handle to the browser-delegated fallback, when configured
    pub delegate: Option<Arc<BrowserBackend>>,
}

/// Build the configured backends in priority order
///
/// Names come from `[backends] order`. Unknown names are skipped with a
/// warning; probing happens later, when the pipeline starts.
pub fn create_backends(config: &Config) -> Result<BackendSet> {
    let mut candidates: Vec<Arc<dyn Backend>> = Vec::new();
    let mut delegate = None;

    for name in config.backend_order() {
        match name.as_str() {
            "native" => {
                candidates.push(Arc::new(NativeBackend::new(
                    config.rate(),
                    config.volume(),
                )));
            }
            "espeak" => {
                candidates.push(Arc::new(EspeakBackend::new(
                    config.rate(),
                    config.volume(),
                    &config.language(),
                )));
            }
            "cloud" => {
                candidates.push(Arc::new(CloudBackend::new(
                    &config.cloud_endpoint(),
                    &config.language(),
                    config.cloud_players(),
                )?));
            }
            "browser" => {
                let browser = Arc::new(BrowserBackend::new());
                delegate = Some(Arc::clone(&browser));
                candidates.push(browser);
            }
            other => warn!("Unknown speech backend '{}' in config, skipping", other),
        }
    }

    info!(
        "Configured speech backends: {}",
        candidates
            .iter()
            .map(|b| b.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(BackendSet {
        candidates,
        delegate,
    })
}
