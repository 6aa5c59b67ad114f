//! annunciator - spoken announcements for object detection streams
//!
//! Turns detection batches into short sentences and speaks them through a
//! rate-limited, lossy delivery pipeline so speech never stalls the
//! perception loop that feeds it.

pub mod compose;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod speech;

pub use error::{AnnouncerError, Result};
pub use pipeline::Announcer;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "annunciator";
