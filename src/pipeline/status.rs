//! Replies exposed to callers of the announcer
//!
//! Serialized in camelCase so an HTTP or IPC adapter can pass them through.

use super::WorkerState;
use serde::Serialize;

/// Snapshot of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub queue_size: usize,
    pub current_backend: Option<String>,
    pub cooldown_remaining_ms: u64,
    pub worker_alive: bool,
    pub available_backends: Vec<String>,
    pub state: WorkerState,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReply {
    pub queued: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReply {
    pub cleared_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartReply {
    pub success: bool,
}
