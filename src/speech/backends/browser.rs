//! Browser-delegated fallback
//!
//! Produces no sound itself. Delivered text lands in an outbox that the
//! client adapter drains and speaks with its own speech API, so this
//! backend is always available and always succeeds.

use crate::speech::Backend;
use crate::Result;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Announcements kept for a client that has stopped polling
const OUTBOX_LIMIT: usize = 16;

/// Fallback that hands text to the listening client
#[derive(Default)]
pub struct BrowserBackend {
    outbox: Mutex<VecDeque<String>>,
}

impl BrowserBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn outbox(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take every announcement waiting for the client, oldest first
    pub fn take(&self) -> Vec<String> {
        self.outbox().drain(..).collect()
    }

    /// Number of announcements waiting for the client
    pub fn pending(&self) -> usize {
        self.outbox().len()
    }
}

impl Backend for BrowserBackend {
    fn name(&self) -> &str {
        "browser"
    }

    fn probe(&self) -> bool {
        true
    }

    fn deliver(&self, text: &str, _deadline: Instant) -> Result<()> {
        let mut outbox = self.outbox();
        while outbox.len() >= OUTBOX_LIMIT {
            outbox.pop_front();
        }
        outbox.push_back(text.to_string());
        debug!("Delegated to browser: {}", text);
        Ok(())
    }

    fn cancel(&self) {}
}
