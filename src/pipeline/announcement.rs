//! A single pending announcement

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const ELLIPSIS: &str = "...";

/// Text waiting to be spoken, stamped with when it was queued
#[derive(Debug, Clone)]
pub struct Announcement {
    text: String,
    enqueued_at: Instant,
}

impl Announcement {
    /// Normalize `text` and bound it to `max_chars` characters
    ///
    /// Whitespace runs collapse to single spaces. Longer text is cut and
    /// ends with an ellipsis. Returns `None` when nothing is left to say.
    pub fn new(text: &str, max_chars: usize) -> Option<Self> {
        let collapsed = WHITESPACE.replace_all(text.trim(), " ");
        if collapsed.is_empty() {
            return None;
        }

        let text = if collapsed.chars().count() > max_chars {
            let keep = max_chars.saturating_sub(ELLIPSIS.len());
            let mut cut: String = collapsed.chars().take(keep).collect();
            cut.truncate(cut.trim_end().len());
            cut.push_str(ELLIPSIS);
            cut
        } else {
            collapsed.into_owned()
        };

        Some(Self {
            text,
            enqueued_at: Instant::now(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }
}
